// Allowlist / denylist filtering of tool names

use globset::{Glob, GlobMatcher};

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid tool pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// A single name pattern.
///
/// Patterns are exact names (`github.repos.list`), globs (`*.delete_*`, `k8s.?ore*`)
/// or the `prefix.*` convenience form.
#[derive(Debug, Clone)]
pub struct NamePattern {
    raw: String,
    glob: Option<GlobMatcher>,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self, FilterError> {
        let glob = if pattern.contains(['*', '?']) {
            let glob = Glob::new(pattern).map_err(|source| FilterError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
            Some(glob.compile_matcher())
        } else {
            None
        };

        Ok(Self {
            raw: pattern.to_string(),
            glob,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        if name == self.raw {
            return true;
        }

        if let Some(glob) = &self.glob {
            if glob.is_match(name) {
                return true;
            }
        }

        match self.raw.strip_suffix(".*") {
            Some(prefix) => name.starts_with(&format!("{}.", prefix)),
            None => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Allowlist / denylist rule set applied at catalog build time
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    allowlist: Vec<NamePattern>,
    denylist: Vec<NamePattern>,
}

impl ToolFilter {
    pub fn new<A, D>(allowlist: A, denylist: D) -> Result<Self, FilterError>
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Ok(Self {
            allowlist: compile(allowlist)?,
            denylist: compile(denylist)?,
        })
    }

    /// Filter that accepts every name
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn should_include(&self, name: &str) -> bool {
        if !self.allowlist.is_empty() && !self.allowlist.iter().any(|p| p.matches(name)) {
            return false;
        }

        !self.denylist.iter().any(|p| p.matches(name))
    }

    pub fn is_empty(&self) -> bool {
        self.allowlist.is_empty() && self.denylist.is_empty()
    }
}

fn compile<I>(patterns: I) -> Result<Vec<NamePattern>, FilterError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|p| p.as_ref().trim().to_string())
        .filter(|p| !p.is_empty())
        .map(|p| NamePattern::new(&p))
        .collect()
}

/// Split a comma-separated pattern list
pub fn parse_patterns(patterns: &str) -> Vec<String> {
    patterns
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

// Heuristic classification of destructive operations
//
// Classification looks only at the operation name and the source hint. It can flag harmless
// operations and miss destructive ones; stricter policies plug in through `SafetyPolicy`.

use crate::descriptor::MethodDescriptor;

/// Name fragments that indicate mutating or destructive intent
pub const DANGEROUS_MARKERS: &[&str] = &[
    "delete", "remove", "destroy", "drop", "create", "update", "patch", "write",
];

/// Decides whether an operation is unsafe to run without explicit opt-in
pub trait SafetyPolicy: Send + Sync {
    fn is_dangerous(&self, name: &str, unsafe_hint: Option<bool>) -> bool;

    fn classify(&self, descriptor: &MethodDescriptor) -> bool {
        self.is_dangerous(&descriptor.name, descriptor.unsafe_hint)
    }
}

/// Default policy: case-insensitive substring match against `DANGEROUS_MARKERS`
#[derive(Debug, Clone, Default)]
pub struct LexicalSafetyPolicy;

impl SafetyPolicy for LexicalSafetyPolicy {
    fn is_dangerous(&self, name: &str, unsafe_hint: Option<bool>) -> bool {
        unsafe_hint.unwrap_or(false) || has_dangerous_marker(name)
    }
}

/// Policy that only trusts operations whose last name segment starts with an allowed verb
#[derive(Debug, Clone)]
pub struct SafeVerbPolicy {
    safe_verbs: Vec<String>,
}

impl SafeVerbPolicy {
    pub fn new(safe_verbs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            safe_verbs: safe_verbs
                .into_iter()
                .map(|v| v.into().to_lowercase())
                .collect(),
        }
    }
}

impl Default for SafeVerbPolicy {
    fn default() -> Self {
        Self::new(["get", "list", "read", "describe", "search", "find", "count", "show"])
    }
}

impl SafetyPolicy for SafeVerbPolicy {
    fn is_dangerous(&self, name: &str, unsafe_hint: Option<bool>) -> bool {
        if unsafe_hint.unwrap_or(false) {
            return true;
        }
        let last = name.rsplit('.').next().unwrap_or(name).to_lowercase();
        !self.safe_verbs.iter().any(|verb| last.starts_with(verb.as_str()))
    }
}

pub fn has_dangerous_marker(name: &str) -> bool {
    let lower = name.to_lowercase();
    DANGEROUS_MARKERS.iter().any(|marker| lower.contains(marker))
}

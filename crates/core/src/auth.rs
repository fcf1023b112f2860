// Best-effort credential injection per tool namespace

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Argument key used by token providers unless configured otherwise
pub const DEFAULT_TOKEN_ARGUMENT: &str = "__auth_token";

/// Attaches authentication material to call arguments.
///
/// Implementations must be total: a failure to find credentials leaves the arguments as they are.
pub trait CredentialInjector: Send + Sync {
    fn inject(&self, namespace: &str, arguments: Value) -> Value;

    fn has_credentials(&self, namespace: &str) -> bool;
}

/// Injector for deployments without any credentials
#[derive(Debug, Clone, Default)]
pub struct NoCredentials;

impl CredentialInjector for NoCredentials {
    fn inject(&self, _namespace: &str, arguments: Value) -> Value {
        arguments
    }

    fn has_credentials(&self, _namespace: &str) -> bool {
        false
    }
}

/// A provider of credentials for some namespaces
pub trait CredentialProvider: Send + Sync {
    fn can_handle(&self, namespace: &str) -> bool;

    fn is_configured(&self) -> bool;

    fn inject(&self, arguments: &mut Map<String, Value>) -> Result<()>;
}

/// Where a token comes from
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Read from an environment variable at call time
    Env(String),
    Static(String),
}

impl TokenSource {
    fn resolve(&self) -> Result<String> {
        match self {
            Self::Env(var) => std::env::var(var).with_context(|| format!("{} is not set", var)),
            Self::Static(token) => Ok(token.clone()),
        }
    }
}

/// Injects a bearer-style token under a fixed argument key
#[derive(Debug, Clone)]
pub struct TokenProvider {
    namespace: String,
    source: TokenSource,
    argument: String,
    scheme: Option<String>,
}

impl TokenProvider {
    pub fn new(namespace: impl Into<String>, source: TokenSource) -> Self {
        Self {
            namespace: namespace.into(),
            source,
            argument: DEFAULT_TOKEN_ARGUMENT.to_string(),
            scheme: None,
        }
    }

    pub fn from_env(namespace: impl Into<String>, var: impl Into<String>) -> Self {
        Self::new(namespace, TokenSource::Env(var.into()))
    }

    /// Argument key the token is written to
    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.argument = argument.into();
        self
    }

    /// Prefix such as `Bearer` prepended to the token
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }
}

impl CredentialProvider for TokenProvider {
    fn can_handle(&self, namespace: &str) -> bool {
        namespace == self.namespace
            || namespace
                .strip_prefix(self.namespace.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    }

    fn is_configured(&self) -> bool {
        self.source.resolve().is_ok()
    }

    fn inject(&self, arguments: &mut Map<String, Value>) -> Result<()> {
        if arguments.contains_key(&self.argument) {
            return Ok(());
        }

        let token = self.source.resolve()?;
        let value = match &self.scheme {
            Some(scheme) => format!("{} {}", scheme, token),
            None => token,
        };
        arguments.insert(self.argument.clone(), Value::String(value));
        Ok(())
    }
}

/// Routes injection to the first provider that handles a namespace
#[derive(Default, Clone)]
pub struct AuthManager {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl AuthManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn CredentialProvider>) {
        self.providers.push(provider);
    }

    pub fn with_provider(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.register(Arc::new(provider));
        self
    }

    fn provider_for(&self, namespace: &str) -> Option<&Arc<dyn CredentialProvider>> {
        self.providers.iter().find(|p| p.can_handle(namespace))
    }
}

impl CredentialInjector for AuthManager {
    fn inject(&self, namespace: &str, arguments: Value) -> Value {
        let Some(provider) = self.provider_for(namespace) else {
            return arguments;
        };
        let Value::Object(mut map) = arguments else {
            return arguments;
        };

        let original = map.clone();
        match provider.inject(&mut map) {
            Ok(()) => Value::Object(map),
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "No credentials injected");
                Value::Object(original)
            }
        }
    }

    fn has_credentials(&self, namespace: &str) -> bool {
        self.provider_for(namespace)
            .is_some_and(|provider| provider.is_configured())
    }
}

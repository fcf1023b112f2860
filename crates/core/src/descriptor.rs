// Method descriptors, operation bindings and the descriptor source abstraction

use crate::error::OperationError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// How a parameter is passed to the underlying operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// Implicit receiver (`self`, `cls`), never exposed
    Receiver,
    #[default]
    Positional,
    Keyword,
    /// Catch-all positional arguments, cannot be expressed in an object shape
    VariadicPositional,
    /// Catch-all keyword arguments, cannot be expressed in an object shape
    VariadicKeyword,
}

impl ParameterKind {
    /// Whether the parameter can appear as a property of the tool input
    pub fn is_representable(&self) -> bool {
        matches!(self, Self::Positional | Self::Keyword)
    }
}

/// Default value of a parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// A value that only has a textual rendering (e.g. a sentinel object)
    Opaque { repr: String },
    /// A value with a JSON representation
    Json(Value),
}

impl DefaultValue {
    pub fn opaque(repr: impl Into<String>) -> Self {
        Self::Opaque { repr: repr.into() }
    }

    /// Representation recorded in the input schema
    pub fn to_schema_value(&self) -> Value {
        match self {
            Self::Json(value) => value.clone(),
            Self::Opaque { repr } => Value::String(repr.clone()),
        }
    }
}

/// A single parameter of a method descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
    #[serde(default)]
    pub kind: ParameterKind,
    /// An explicit `null` counts as a default
    #[serde(
        default,
        deserialize_with = "present_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<DefaultValue>,
}

fn present_default<'de, D>(deserializer: D) -> Result<Option<DefaultValue>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    DefaultValue::deserialize(deserializer).map(Some)
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_hint: None,
            kind: ParameterKind::Positional,
            default: None,
        }
    }

    pub fn typed(name: impl Into<String>, type_hint: impl Into<String>) -> Self {
        Self::new(name).with_type(type_hint)
    }

    pub fn with_type(mut self, type_hint: impl Into<String>) -> Self {
        self.type_hint = Some(type_hint.into());
        self
    }

    pub fn with_kind(mut self, kind: ParameterKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Json(default.into()));
        self
    }

    pub fn with_opaque_default(mut self, repr: impl Into<String>) -> Self {
        self.default = Some(DefaultValue::opaque(repr));
        self
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// Raw shape of an operation as produced by a descriptor source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Dotted name, unique within one load (e.g. `github.repos.list`)
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    /// Source-provided hint that the operation mutates state
    #[serde(default, rename = "unsafe", skip_serializing_if = "Option::is_none")]
    pub unsafe_hint: Option<bool>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            documentation: None,
            unsafe_hint: None,
        }
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn documented(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }

    pub fn unsafe_hint(mut self, hint: bool) -> Self {
        self.unsafe_hint = Some(hint);
        self
    }

    /// Names of parameters that can be passed through a tool call, in declared order
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| p.kind.is_representable())
            .map(|p| p.name.as_str())
            .collect()
    }
}

/// An operation that suspends while running (I/O-bound calls)
#[async_trait::async_trait]
pub trait AsyncOperation: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Value, OperationError>;
}

/// Synchronous operation body
pub type DirectFn = dyn Fn(Value) -> Result<Value, OperationError> + Send + Sync;

/// Callable binding behind a tool
#[derive(Clone)]
pub enum Operation {
    /// Ordinary call, executed on the blocking pool
    Direct(Arc<DirectFn>),
    /// Suspending call, awaited on the runtime
    Awaited(Arc<dyn AsyncOperation>),
}

impl Operation {
    pub fn direct<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, OperationError> + Send + Sync + 'static,
    {
        Self::Direct(Arc::new(f))
    }

    pub fn awaited(op: impl AsyncOperation + 'static) -> Self {
        Self::Awaited(Arc::new(op))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Awaited(_) => "awaited",
        }
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation::{}", self.kind())
    }
}

/// A descriptor together with the binding that executes it
#[derive(Debug, Clone)]
pub struct DiscoveredMethod {
    pub descriptor: MethodDescriptor,
    pub operation: Operation,
}

impl DiscoveredMethod {
    pub fn new(descriptor: MethodDescriptor, operation: Operation) -> Self {
        Self {
            descriptor,
            operation,
        }
    }
}

/// Supplies method descriptors for a namespace
pub trait DescriptorSource: Send + Sync {
    /// List the operations available in a namespace; fails per namespace
    fn list_descriptors(&self, namespace: &str) -> Result<Vec<DiscoveredMethod>>;
}

/// In-memory descriptor source
#[derive(Debug, Default)]
pub struct StaticSource {
    namespaces: HashMap<String, Vec<DiscoveredMethod>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method under a namespace
    pub fn register(
        &mut self,
        namespace: impl Into<String>,
        descriptor: MethodDescriptor,
        operation: Operation,
    ) -> &mut Self {
        self.namespaces
            .entry(namespace.into())
            .or_default()
            .push(DiscoveredMethod::new(descriptor, operation));
        self
    }

    pub fn with(
        mut self,
        namespace: impl Into<String>,
        descriptor: MethodDescriptor,
        operation: Operation,
    ) -> Self {
        self.register(namespace, descriptor, operation);
        self
    }
}

impl DescriptorSource for StaticSource {
    fn list_descriptors(&self, namespace: &str) -> Result<Vec<DiscoveredMethod>> {
        self.namespaces
            .get(namespace)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("namespace not found: {}", namespace))
    }
}

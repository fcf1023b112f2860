// Core catalog and invocation pipeline for toolbridge

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod dry_run;
pub mod engine;
pub mod error;
pub mod executor;
pub mod filter;
pub mod metrics;
pub mod pagination;
pub mod rate_limit;
pub mod redact;
pub mod safety;
pub mod schema;

pub use auth::{AuthManager, CredentialInjector, NoCredentials, TokenProvider, TokenSource};
pub use catalog::{CatalogBuilder, Tool, ToolCatalog, ToolMetadata};
pub use config::{ConfigError, ServerConfig};
pub use descriptor::{
    AsyncOperation, DescriptorSource, DiscoveredMethod, MethodDescriptor, Operation, Parameter,
    ParameterKind, StaticSource,
};
pub use engine::{CallOptions, EngineStats, ExecutionResult, InvocationEngine};
pub use error::{ErrorKind, InvocationError, OperationError};
pub use metrics::{MetricsCollector, MetricsSink};
pub use schema::{InputSchema, SchemaEnhancer};

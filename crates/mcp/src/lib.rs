// MCP (Model Context Protocol) front-end for the tool bridge
// Manifest-declared HTTP operations are exposed as tools over JSON-RPC on stdio

pub mod enhancer;
pub mod http;
pub mod manifest;
pub mod protocol;
pub mod server;
pub mod validation;

pub use enhancer::OpenAiSchemaEnhancer;
pub use http::{http_client, http_client_with_timeout, HttpMethod, HttpOperation};
pub use manifest::{Manifest, ManifestSource};
pub use server::{McpServer, ServerOptions, MAX_FRAME_BYTES};

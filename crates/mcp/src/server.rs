// MCP server: JSON-RPC dispatch over newline-delimited stdio frames

use crate::protocol::*;
use crate::validation::{validate_envelope, validate_tool_name, ArgumentValidator};
use anyhow::{Context, Result};
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use toolbridge_core::metrics::{labels, Labels};
use toolbridge_core::{CallOptions, InvocationEngine, InvocationError, MetricsSink};
use tracing::{debug, info, warn};

pub const SERVER_NAME: &str = "toolbridge";

/// Longest accepted request frame
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Dispatcher switches that live outside the engine
#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// Reject calls that omit required arguments
    pub strict_arguments: bool,
    /// Whether tool schemas were enhanced by a text-generation model
    pub llm_schemas: bool,
    /// Frames longer than this are answered with a parse error and skipped
    pub max_frame_bytes: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            strict_arguments: false,
            llm_schemas: false,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

/// One decoded stdin frame
#[derive(Debug, PartialEq)]
enum Frame {
    Line(String),
    /// A frame that cannot be a request: not UTF-8, or over the length limit
    Invalid(String),
}

/// Newline-delimited frames that survive malformed input.
/// Oversized and non-UTF-8 lines become `Frame::Invalid` instead of ending the stream.
struct RequestCodec {
    lines: LinesCodec,
}

impl RequestCodec {
    fn new(max_frame_bytes: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_frame_bytes),
        }
    }

    fn recover(
        result: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Frame>, LinesCodecError> {
        match result {
            Ok(line) => Ok(line.map(Frame::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                Ok(Some(Frame::Invalid("frame exceeds maximum length".to_string())))
            }
            Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                Ok(Some(Frame::Invalid("frame is not valid UTF-8".to_string())))
            }
            Err(e) => Err(e),
        }
    }
}

impl Decoder for RequestCodec {
    type Item = Frame;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::recover(self.lines.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::recover(self.lines.decode_eof(buf))
    }
}

pub struct McpServer {
    engine: Arc<InvocationEngine>,
    metrics: Arc<dyn MetricsSink>,
    arguments: ArgumentValidator,
    options: ServerOptions,
}

impl McpServer {
    pub fn new(engine: Arc<InvocationEngine>, options: ServerOptions) -> Self {
        let metrics = engine.metrics().clone();
        let catalog = engine.catalog();
        metrics.set_gauge("catalog.tools", catalog.len() as f64, Labels::new());
        let arguments = ArgumentValidator::compile(catalog, options.strict_arguments);

        Self {
            engine,
            metrics,
            arguments,
            options,
        }
    }

    /// Serve requests until the reader is exhausted, one response line per request
    pub async fn run<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let codec = RequestCodec::new(self.options.max_frame_bytes);
        let mut requests = FramedRead::new(reader, codec);
        let mut responses = FramedWrite::new(writer, LinesCodec::new());

        info!(tools = self.engine.catalog().len(), "MCP server ready");

        while let Some(frame) = requests.next().await {
            let response = match frame.context("Failed to read request frame")? {
                Frame::Line(line) if line.trim().is_empty() => continue,
                Frame::Line(line) => self.handle_line(&line).await,
                Frame::Invalid(reason) => {
                    warn!(reason = %reason, "Rejected request frame");
                    Some(JsonRpcResponse::error(
                        Value::Null,
                        JsonRpcError::parse_error(reason),
                    ))
                }
            };

            if let Some(response) = response {
                let frame =
                    serde_json::to_string(&response).context("Failed to serialize response")?;
                responses
                    .send(frame)
                    .await
                    .context("Failed to write response frame")?;
            }
        }

        info!("Input closed, MCP server stopping");
        Ok(())
    }

    /// Handle one raw frame; notifications yield no response
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let message: Value = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Unparseable request");
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    JsonRpcError::parse_error(e),
                ));
            }
        };

        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let request = match validate_envelope(message) {
            Ok(request) => request,
            Err(e) => return Some(JsonRpcResponse::error(id, e)),
        };

        self.handle_request(request).await
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            debug!(method = %request.method, "Notification received");
            return None;
        }
        let id = request.id.clone().unwrap_or_default();

        let started = Instant::now();
        let method_labels = labels(&[("method", request.method.as_str())]);
        self.metrics
            .increment_counter("requests", method_labels.clone());

        debug!(method = %request.method, id = %id, "Request");
        let outcome = self.dispatch(&request.method, request.params).await;

        if outcome.is_err() {
            self.metrics
                .increment_counter("requests.failed", method_labels.clone());
        }
        self.metrics.observe_histogram(
            "request.duration_ms",
            started.elapsed().as_secs_f64() * 1000.0,
            method_labels,
        );

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                debug!(method = %request.method, code = error.code, message = %error.message, "Request failed");
                JsonRpcResponse::error(id, error)
            }
        })
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            "initialize" => self.initialize(params),
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(params).await,
            "server/info" => self.server_info(),
            "cache/clear" => self.clear_cache(),
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();
        if let Some(client) = &params.client_info {
            info!(client = %client.name, version = %client.version, "Client connected");
        }

        to_result(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
    }

    fn list_tools(&self) -> Result<Value, JsonRpcError> {
        let tools = self
            .engine
            .catalog()
            .tools()
            .map(|tool| ToolSchema {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.input_schema.to_value(),
            })
            .collect();

        to_result(ListToolsResult { tools })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| JsonRpcError::invalid_request(format!("invalid params: {}", e)))?;
        validate_tool_name(&params.name)?;

        let tool = self
            .engine
            .catalog()
            .get(&params.name)
            .ok_or_else(|| InvocationError::not_found(&params.name))?;
        let arguments = self.arguments.validate(&tool.name, params.arguments)?;

        let outcome = self
            .engine
            .call(&params.name, arguments, CallOptions::default())
            .await;

        let metadata = CallMetadata {
            cached: outcome.cached,
            duration_ms: outcome.duration_ms,
            dry_run: outcome.dry_run,
            truncated: outcome.truncated,
        };
        let result = outcome.into_result()?;

        to_result(CallToolResult {
            content: vec![ToolContent::from_value(&result)],
            metadata,
        })
    }

    fn server_info(&self) -> Result<Value, JsonRpcError> {
        let catalog = self.engine.catalog();
        to_result(ServerInfoResult {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tools_count: catalog.len(),
            namespaces: catalog.namespaces(),
            features: Features {
                caching: self.engine.cache().is_some(),
                rate_limiting: self.engine.rate_limiter().is_some(),
                dry_run: self.engine.dry_run().is_enabled(),
                redaction: self.engine.redacts_secrets(),
                llm_schemas: self.options.llm_schemas,
                validation: true,
                metrics: true,
            },
            stats: ServerStats {
                engine: self.engine.stats(),
                metrics: self.metrics.snapshot(),
            },
        })
    }

    fn clear_cache(&self) -> Result<Value, JsonRpcError> {
        if self.engine.clear_cache() {
            Ok(json!({ "message": "cache cleared" }))
        } else {
            Err(JsonRpcError::invalid_request("caching not enabled"))
        }
    }
}

fn to_result<T: serde::Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::internal_error(format!("serialization failed: {}", e)))
}

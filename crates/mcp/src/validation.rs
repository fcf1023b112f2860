// Request validation performed before any side effect

use crate::protocol::{JsonRpcError, JsonRpcRequest, JSONRPC_VERSION};
use jsonschema::{Draft, Validator};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;
use toolbridge_core::{InputSchema, ToolCatalog};
use tracing::warn;

static TOOL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").unwrap());

/// Check the JSON-RPC envelope and decode it into a request
pub fn validate_envelope(message: Value) -> Result<JsonRpcRequest, JsonRpcError> {
    let Value::Object(envelope) = &message else {
        return Err(JsonRpcError::invalid_request("request must be a JSON object"));
    };

    match envelope.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        _ => {
            return Err(JsonRpcError::invalid_request(
                "invalid jsonrpc version, expected \"2.0\"",
            ))
        }
    }

    match envelope.get("method") {
        Some(Value::String(_)) => {}
        Some(_) => return Err(JsonRpcError::invalid_request("method must be a string")),
        None => return Err(JsonRpcError::invalid_request("missing method")),
    }

    serde_json::from_value(message)
        .map_err(|e| JsonRpcError::invalid_request(format!("malformed request: {}", e)))
}

pub fn validate_tool_name(name: &str) -> Result<(), JsonRpcError> {
    if name.is_empty() {
        return Err(JsonRpcError::invalid_request("tool name is required"));
    }
    if !TOOL_NAME.is_match(name) {
        return Err(JsonRpcError::invalid_request(format!(
            "invalid tool name: {}",
            name
        )));
    }
    Ok(())
}

/// Compiled argument schemas, one per catalog tool
pub struct ArgumentValidator {
    validators: HashMap<String, Validator>,
}

impl ArgumentValidator {
    /// Compile every tool schema; a tool whose schema does not compile is
    /// logged and left unchecked
    pub fn compile(catalog: &ToolCatalog, strict: bool) -> Self {
        let validators = catalog
            .tools()
            .filter_map(|tool| match compile_schema(&tool.input_schema, strict) {
                Ok(validator) => Some((tool.name.clone(), validator)),
                Err(e) => {
                    warn!(
                        tool = %tool.name,
                        error = %e,
                        "Tool schema does not compile, arguments unchecked"
                    );
                    None
                }
            })
            .collect();

        Self { validators }
    }

    /// Normalize call arguments to an object and check them against the tool schema
    pub fn validate(&self, tool: &str, arguments: Option<Value>) -> Result<Value, JsonRpcError> {
        let arguments = match arguments {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(Value::Object(map)) => Value::Object(map),
            Some(_) => return Err(JsonRpcError::invalid_request("arguments must be an object")),
        };

        let Some(validator) = self.validators.get(tool) else {
            return Ok(arguments);
        };
        let messages: Vec<String> = validator
            .iter_errors(&arguments)
            .map(|err| err.to_string())
            .collect();
        if !messages.is_empty() {
            return Err(JsonRpcError::invalid_request(format!(
                "invalid arguments: {}",
                messages.join("; ")
            )));
        }

        Ok(arguments)
    }
}

fn compile_schema(schema: &InputSchema, strict: bool) -> Result<Validator, String> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema.validation_schema(strict))
        .map_err(|err| format!("invalid schema: {err}"))
}

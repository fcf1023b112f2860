// HTTP-backed operations for manifest-declared methods

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use toolbridge_core::auth::DEFAULT_TOKEN_ARGUMENT;
use toolbridge_core::descriptor::AsyncOperation;
use toolbridge_core::OperationError;
use tracing::debug;
use url::Url;

/// Longest error body echoed back in an error message
const MAX_ERROR_BODY: usize = 512;

/// Prefix of argument keys reserved for the bridge itself
const RESERVED_PREFIX: &str = "__";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole-request bound for outbound calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    fn as_reqwest(&self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }

    /// Whether remaining arguments travel in the query string rather than a JSON body
    fn uses_query(&self) -> bool {
        matches!(self, Self::Get | Self::Delete)
    }
}

/// Build the shared HTTP client used by every operation
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    http_client_with_timeout(REQUEST_TIMEOUT)
}

/// Client whose requests fail once `timeout` elapses, connection included
pub fn http_client_with_timeout(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("toolbridge/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .timeout(timeout)
        .build()
}

/// Calls one endpoint, mapping arguments to path, query and body
#[derive(Debug, Clone)]
pub struct HttpOperation {
    client: reqwest::Client,
    method: HttpMethod,
    base_url: Url,
    path: String,
    auth_header: String,
}

impl HttpOperation {
    pub fn new(client: reqwest::Client, method: HttpMethod, base_url: Url, path: impl Into<String>) -> Self {
        Self {
            client,
            method,
            base_url,
            path: path.into(),
            auth_header: reqwest::header::AUTHORIZATION.to_string(),
        }
    }

    /// Header that carries the injected credential
    pub fn with_auth_header(mut self, header: impl Into<String>) -> Self {
        self.auth_header = header.into();
        self
    }

    /// Resolve `{param}` placeholders, consuming the matching arguments
    fn build_url(&self, arguments: &mut Map<String, Value>) -> Result<Url, OperationError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                OperationError::new("InvalidUrl", format!("not a base url: {}", self.base_url))
            })?;
            segments.pop_if_empty();
            for raw in self.path.split('/').filter(|s| !s.is_empty()) {
                segments.push(&substitute(raw, arguments)?);
            }
        }
        Ok(url)
    }
}

fn substitute(segment: &str, arguments: &mut Map<String, Value>) -> Result<String, OperationError> {
    let mut out = String::new();
    let mut rest = segment;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        let value = arguments.remove(name).ok_or_else(|| {
            OperationError::new("MissingParameter", format!("missing path parameter: {}", name))
        })?;
        out.push_str(&rest[..start]);
        out.push_str(&scalar_text(&value));
        rest = &rest[start + len + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn map_send_error(err: reqwest::Error) -> OperationError {
    if err.is_timeout() {
        OperationError::new("Timeout", format!("timeout: {}", err))
    } else if err.is_connect() {
        OperationError::new("ConnectionError", format!("connection failed: {}", err))
    } else {
        OperationError::new("HttpError", format!("request failed: {}", err))
    }
}

#[async_trait::async_trait]
impl AsyncOperation for HttpOperation {
    async fn call(&self, arguments: Value) -> Result<Value, OperationError> {
        let mut arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(OperationError::new("TypeError", "arguments must be an object")),
        };

        let token = arguments.remove(DEFAULT_TOKEN_ARGUMENT);
        arguments.retain(|key, _| !key.starts_with(RESERVED_PREFIX));

        let url = self.build_url(&mut arguments)?;
        debug!(method = ?self.method, url = %url, "HTTP operation");

        let mut request = self.client.request(self.method.as_reqwest(), url);
        if let Some(token) = token {
            request = request.header(self.auth_header.as_str(), scalar_text(&token));
        }
        request = if self.method.uses_query() {
            let query: Vec<(String, String)> = arguments
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), scalar_text(v)))
                .collect();
            request.query(&query)
        } else {
            request.json(&arguments)
        };

        let response = request.send().await.map_err(map_send_error)?;
        let status = response.status();
        let body = response.text().await.map_err(map_send_error)?;

        if !status.is_success() {
            let mut detail = body.trim().to_string();
            if detail.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !detail.is_char_boundary(cut) {
                    cut -= 1;
                }
                detail.truncate(cut);
            }
            return Err(OperationError::new(
                "HttpError",
                format!("HTTP {}: {}", status.as_u16(), detail),
            ));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

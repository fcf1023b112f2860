// Schema enhancer backed by an OpenAI-compatible chat completions endpoint

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use toolbridge_core::{InputSchema, SchemaEnhancer};
use tracing::debug;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const SYSTEM_PROMPT: &str = "You improve JSON Schemas for tool inputs. Reply with the complete \
    schema as a single JSON object and nothing else. Keep every property, its type, default \
    and the required list unchanged; only add or improve property descriptions.";

/// Rewrites property descriptions with a text-generation model
pub struct OpenAiSchemaEnhancer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiSchemaEnhancer {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Build from the environment; None when no API key is set
    pub fn from_env(client: reqwest::Client, base_url: &str, model: &str) -> Option<Self> {
        let api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())?;
        Some(Self::new(client, base_url, model, api_key))
    }

    fn prompt(schema: &InputSchema, documentation: Option<&str>) -> String {
        format!(
            "Schema:\n{}\n\nDocumentation:\n{}",
            serde_json::to_string_pretty(schema).unwrap_or_default(),
            documentation.unwrap_or("(none)")
        )
    }
}

/// Drop a surrounding Markdown code fence, if any
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[async_trait::async_trait]
impl SchemaEnhancer for OpenAiSchemaEnhancer {
    async fn enhance(
        &self,
        schema: &InputSchema,
        documentation: Option<&str>,
    ) -> Result<InputSchema> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": Self::prompt(schema, documentation)},
            ],
        });

        let completion: ChatCompletion = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to reach schema enhancer")?
            .error_for_status()
            .context("Schema enhancer rejected the request")?
            .json()
            .await
            .context("Malformed completion response")?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("Completion has no content")?;

        debug!(model = %self.model, "Schema enhanced");
        serde_json::from_str(strip_code_fence(&content)).context("Completion is not a schema")
    }
}

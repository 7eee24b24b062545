use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::base::ModelCaller;
use super::utils::{completion_text, get_model, handle_response};
use crate::config::ProviderConfig;
use crate::history::OrchestrationMessage;

pub const APP_TITLE: &str = "Compute Community Chat";

/// A model listed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl ModelInfo {
    fn from_entry(entry: &Value) -> Self {
        let field = |key: &str| {
            entry
                .get(key)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
        };
        let id = field("id").or_else(|| field("model")).unwrap_or_default();
        Self {
            id: id.to_string(),
            name: field("name")
                .or_else(|| field("id"))
                .or_else(|| field("model"))
                .unwrap_or("Unknown Model")
                .to_string(),
            description: field("description").unwrap_or_default().to_string(),
        }
    }
}

/// Chat completions against any OpenAI-compatible host: OpenRouter, vLLM,
/// llama.cpp server and friends.
#[derive(Debug, Serialize)]
pub struct OpenAiCompatibleProvider {
    #[serde(skip)]
    client: Client,
    host: String,
    #[serde(skip)]
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatibleProvider {
    pub fn new<H: Into<String>, M: Into<String>>(
        host: H,
        api_key: Option<String>,
        model: M,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    pub fn from_config(config: &ProviderConfig, timeout: Duration) -> Result<Self> {
        Self::new(
            config.host.clone(),
            config.api_key.clone(),
            config.model.clone(),
            timeout,
        )
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn with_headers(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request.header("X-Title", APP_TITLE);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        if !self.host.contains("openrouter") {
            request = request.header("ngrok-skip-browser-warning", "true");
        }
        request
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!("{}/chat/completions", self.host);
        let response = self
            .with_headers(self.client.post(&url))
            .json(&payload)
            .send()
            .await?;

        handle_response(Some(&payload), response).await
    }

    /// Models offered by the host. Accepts `{"data": [...]}`, a bare array or
    /// `{"models": [...]}`.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/models", self.host);
        let response = self.with_headers(self.client.get(&url)).send().await?;
        let body = handle_response(None, response).await?;

        let entries = match &body {
            Value::Array(entries) => entries,
            Value::Object(_) => body
                .get("data")
                .or_else(|| body.get("models"))
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("Unknown model list format: {}", body))?,
            _ => return Err(anyhow!("Unknown model list format: {}", body)),
        };

        Ok(entries.iter().map(ModelInfo::from_entry).collect())
    }

    /// `/health` lives at the server root, next to the `/v1` API prefix.
    fn health_url(&self) -> String {
        let root = self.host.strip_suffix("/v1").unwrap_or(&self.host);
        format!("{}/health", root)
    }

    /// True when the server's `/health` answers 200.
    pub async fn check_health(&self) -> bool {
        let url = self.health_url();
        match self.client.get(&url).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                tracing::debug!(error = %e, "health check failed");
                false
            }
        }
    }
}

#[async_trait]
impl ModelCaller for OpenAiCompatibleProvider {
    #[tracing::instrument(skip(self, history), fields(model = %self.model, messages = history.len()))]
    async fn complete(&self, history: &[OrchestrationMessage]) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": history,
        });

        let response = self.post(payload).await?;

        if let Some(error) = response.get("error") {
            return Err(anyhow!("Model API error: {}", error));
        }

        let text = completion_text(&response)
            .ok_or_else(|| anyhow!("Completion has no message content: {}", response))?;
        tracing::debug!(model = %get_model(&response), output = text, "completion received");
        Ok(text.to_string())
    }
}

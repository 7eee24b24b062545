use anyhow::{Error, Result};
use reqwest::{Response, StatusCode};
use serde_json::Value;

use crate::providers::errors::ProviderError;

// Maps a non-ok response status to a ProviderError
pub async fn non_ok_response_to_provider_error(
    payload: Option<&Value>,
    response: Response,
) -> ProviderError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Authentication(format!(
                "Authentication failed. Please ensure your API key is valid. Status: {}. Response: {:?}",
                status,
                response.text().await.unwrap_or_default()
            ))
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimitExceeded(format!(
            "Rate limit exceeded. Please retry after some time. Status: {}",
            status
        )),
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE => {
            ProviderError::ServerError(format!("Server error occurred. Status: {}", status))
        }
        _ => {
            tracing::debug!(
                "Provider request failed with status: {}. Body: {:?}. Payload: {:?}",
                status,
                response.text().await.unwrap_or_default(),
                payload
            );
            ProviderError::RequestFailed(format!("Request failed with status: {}.", status))
        }
    }
}

pub async fn handle_response(payload: Option<&Value>, response: Response) -> Result<Value, Error> {
    match response.status() {
        StatusCode::OK => Ok(response.json().await?),
        _ => Err(non_ok_response_to_provider_error(payload, response)
            .await
            .into()),
    }
}

/// Pull the assistant text out of a chat completion response.
pub fn completion_text(response: &Value) -> Option<&str> {
    response
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

/// Extract the model name from a JSON object. Common with most providers to have this top level attribute.
pub fn get_model(data: &Value) -> String {
    data.get("model")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string()
}

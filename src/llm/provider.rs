use async_trait::async_trait;
use reqwest::Response;
use serde_json::Value;
use tokio::sync::mpsc;

use super::types::ChatRequest;
use crate::core::errors::ApiError;

/// Ordered completion deltas. The sender side belongs to the provider's
/// transport task; dropping the receiver ends that task.
pub type TokenStream = mpsc::Receiver<Result<String, ApiError>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai", "anthropic", "google")
    fn name(&self) -> &str;

    /// whether `embed` is backed by a native embeddings API
    fn supports_embeddings(&self) -> bool {
        true
    }

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError>;

    /// chat completion (streaming)
    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<TokenStream, ApiError>;

    /// generate embeddings, one vector per input, in input order
    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError>;
}

/// Turns a non-success HTTP response into a normalized provider error.
pub(crate) async fn ensure_success(provider: &str, res: Response) -> Result<Response, ApiError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|payload| extract_error_message(&payload))
        .unwrap_or_default();
    tracing::warn!("{} responded with {}", provider, status);
    Err(ApiError::provider(provider, Some(status.as_u16()), detail))
}

/// All three vendors nest a human readable message under `error.message`;
/// some error events carry it at the top level.
pub(crate) fn extract_error_message(payload: &Value) -> Option<String> {
    payload
        .get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(|m| m.as_str())
        .or_else(|| payload.get("message").and_then(|m| m.as_str()))
        .map(|m| m.to_string())
}

pub(crate) fn parse_vector(values: &[Value]) -> Vec<f32> {
    values
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_message_is_found_in_common_shapes() {
        assert_eq!(
            extract_error_message(&json!({"error": {"message": "bad key"}})).as_deref(),
            Some("bad key")
        );
        assert_eq!(
            extract_error_message(&json!({"error": "overloaded"})).as_deref(),
            Some("overloaded")
        );
        assert_eq!(
            extract_error_message(&json!({"message": "quota"})).as_deref(),
            Some("quota")
        );
        assert!(extract_error_message(&json!({"ok": true})).is_none());
    }

    #[test]
    fn vectors_skip_non_numbers() {
        let values = vec![json!(0.5), json!("x"), json!(1)];
        assert_eq!(parse_vector(&values), vec![0.5, 1.0]);
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{ensure_success, extract_error_message, parse_vector, LlmProvider, TokenStream};
use super::sse::{forward_stream, SseMessage, StreamStep};
use super::types::ChatRequest;
use crate::core::errors::ApiError;

const PROVIDER: &str = "google";
const EMBED_BATCH_SIZE: usize = 100;

/// Gemini `generateContent` family of endpoints.
#[derive(Clone)]
pub struct GoogleProvider {
    base_url: String,
    api_key: String,
    request_timeout: Duration,
    client: Client,
}

impl GoogleProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            request_timeout,
            client: super::http_client()?,
        })
    }

    fn model_url(&self, model_id: &str, action: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.base_url,
            bare_model(model_id),
            action
        )
    }

    fn body(request: &ChatRequest) -> Value {
        let contents: Vec<Value> = request
            .conversation()
            .map(|m| {
                let role = if m.role == "assistant" { "model" } else { "user" };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut generation = serde_json::Map::new();
        if let Some(t) = request.temperature {
            generation.insert("temperature".to_string(), json!(t));
        }
        if let Some(t) = request.max_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(t));
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation,
        });
        if let (Some(obj), Some(system)) = (body.as_object_mut(), request.system_prompt()) {
            obj.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": system }] }),
            );
        }
        body
    }

    async fn embed_batch(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        let model = format!("models/{}", bare_model(model_id));
        let requests: Vec<Value> = inputs
            .iter()
            .map(|text| json!({ "model": model, "content": { "parts": [{ "text": text }] } }))
            .collect();

        let res = self
            .client
            .post(self.model_url(model_id, "batchEmbedContents"))
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.request_timeout)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(|e| ApiError::transport(PROVIDER, e))?;
        let res = ensure_success(PROVIDER, res).await?;
        let payload: Value = res
            .json()
            .await
            .map_err(|e| ApiError::transport(PROVIDER, e))?;

        Ok(payload["embeddings"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item["values"].as_array())
                    .map(|vals| parse_vector(vals))
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn bare_model(model_id: &str) -> &str {
    model_id.strip_prefix("models/").unwrap_or(model_id)
}

fn candidate_text(payload: &Value) -> String {
    payload["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Each SSE message is a full `GenerateContentResponse`; the stream simply
/// ends when the connection closes.
fn parse_stream_message(message: &SseMessage) -> StreamStep {
    let Ok(json) = serde_json::from_str::<Value>(&message.data) else {
        return StreamStep::Skip;
    };
    if json.get("error").is_some() {
        return StreamStep::Error(extract_error_message(&json).unwrap_or_default());
    }
    let text = candidate_text(&json);
    if text.is_empty() {
        StreamStep::Skip
    } else {
        StreamStep::Delta(text)
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError> {
        let res = self
            .client
            .post(self.model_url(model_id, "generateContent"))
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.request_timeout)
            .json(&Self::body(&request))
            .send()
            .await
            .map_err(|e| ApiError::transport(PROVIDER, e))?;
        let res = ensure_success(PROVIDER, res).await?;
        let payload: Value = res
            .json()
            .await
            .map_err(|e| ApiError::transport(PROVIDER, e))?;

        Ok(candidate_text(&payload))
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<TokenStream, ApiError> {
        let res = self
            .client
            .post(self.model_url(model_id, "streamGenerateContent"))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::body(&request))
            .send()
            .await
            .map_err(|e| ApiError::transport(PROVIDER, e))?;
        let res = ensure_success(PROVIDER, res).await?;

        Ok(forward_stream(PROVIDER, res, parse_stream_message))
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        let mut embeddings = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(EMBED_BATCH_SIZE) {
            embeddings.extend(self.embed_batch(batch, model_id).await?);
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    #[test]
    fn model_prefix_is_stripped() {
        assert_eq!(bare_model("models/text-embedding-004"), "text-embedding-004");
        assert_eq!(bare_model("gemini-2.5-flash-lite"), "gemini-2.5-flash-lite");
    }

    #[test]
    fn body_moves_system_prompt_into_instruction() {
        let request = ChatRequest::new(vec![
            ChatMessage::system("rules"),
            ChatMessage::user("hello"),
        ])
        .with_max_tokens(100);
        let body = GoogleProvider::body(&request);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "rules");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 100);
    }

    #[test]
    fn stream_parser_joins_candidate_parts() {
        let message = SseMessage {
            event: None,
            data: r#"{"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}}]}"#
                .to_string(),
        };
        assert_eq!(parse_stream_message(&message), StreamStep::Delta("ab".to_string()));

        let empty = SseMessage {
            event: None,
            data: r#"{"candidates":[{"finishReason":"STOP"}]}"#.to_string(),
        };
        assert_eq!(parse_stream_message(&empty), StreamStep::Skip);
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{ensure_success, extract_error_message, parse_vector, LlmProvider, TokenStream};
use super::sse::{forward_stream, SseMessage, StreamStep};
use super::types::ChatRequest;
use crate::core::errors::ApiError;

const PROVIDER: &str = "openai";
/// The embeddings endpoint accepts at most this many inputs per call.
const EMBED_BATCH_SIZE: usize = 2048;

#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    request_timeout: Duration,
    client: Client,
}

impl OpenAiProvider {
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

    fn body(request: &ChatRequest, model_id: &str, stream: bool) -> Value {
        let mut body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }
        body
    }

    async fn embed_batch(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::transport(PROVIDER, e))?;
        let res = ensure_success(PROVIDER, res).await?;
        let payload: Value = res
            .json()
            .await
            .map_err(|e| ApiError::transport(PROVIDER, e))?;

        let mut rows: Vec<(u64, Vec<f32>)> = payload["data"]
            .as_array()
            .map(|data| {
                data.iter()
                    .enumerate()
                    .filter_map(|(position, item)| {
                        let index = item["index"].as_u64().unwrap_or(position as u64);
                        item["embedding"]
                            .as_array()
                            .map(|vals| (index, parse_vector(vals)))
                    })
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|(index, _)| *index);

        Ok(rows.into_iter().map(|(_, vector)| vector).collect())
    }
}

/// Chat-completions chunks carry text under `choices[0].delta.content`;
/// the stream ends with a literal `[DONE]`.
fn parse_stream_message(message: &SseMessage) -> StreamStep {
    let data = message.data.trim();
    if data == "[DONE]" {
        return StreamStep::Done;
    }
    let Ok(json) = serde_json::from_str::<Value>(data) else {
        return StreamStep::Skip;
    };
    if json.get("error").is_some() {
        return StreamStep::Error(extract_error_message(&json).unwrap_or_default());
    }
    match json["choices"][0]["delta"]["content"].as_str() {
        Some(content) => StreamStep::Delta(content.to_string()),
        None => StreamStep::Skip,
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::body(&request, model_id, false);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::transport(PROVIDER, e))?;
        let res = ensure_success(PROVIDER, res).await?;

        let payload: Value = res
            .json()
            .await
            .map_err(|e| ApiError::transport(PROVIDER, e))?;

        Ok(payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<TokenStream, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::body(&request, model_id, true);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
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

    fn message(data: &str) -> SseMessage {
        SseMessage {
            event: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn stream_parser_reads_deltas_and_done() {
        assert_eq!(
            parse_stream_message(&message(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#)),
            StreamStep::Delta("Hi".to_string())
        );
        assert_eq!(
            parse_stream_message(&message(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#)),
            StreamStep::Skip
        );
        assert_eq!(parse_stream_message(&message("[DONE]")), StreamStep::Done);
    }

    #[test]
    fn stream_parser_surfaces_error_payloads() {
        assert_eq!(
            parse_stream_message(&message(r#"{"error":{"message":"rate limited"}}"#)),
            StreamStep::Error("rate limited".to_string())
        );
    }

    #[test]
    fn request_body_includes_sampling_options() {
        let request = ChatRequest::new(vec![super::super::types::ChatMessage::user("q")])
            .with_temperature(0.2)
            .with_max_tokens(64);
        let body = OpenAiProvider::body(&request, "gpt-4o-mini", true);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["messages"][0]["role"], "user");
    }
}

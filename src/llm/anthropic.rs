use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

use super::provider::{ensure_success, extract_error_message, LlmProvider, TokenStream};
use super::sse::{forward_stream, SseMessage, StreamStep};
use super::types::ChatRequest;
use crate::core::errors::ApiError;

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

/// Anthropic messages API. Chat only: there is no embeddings endpoint.
#[derive(Clone)]
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    default_max_tokens: u32,
    request_timeout: Duration,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_max_tokens: u32,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_max_tokens,
            request_timeout,
            client: super::http_client()?,
        })
    }

    fn post(&self) -> RequestBuilder {
        self.client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
    }

    fn body(&self, request: &ChatRequest, model_id: &str, stream: bool) -> Value {
        let messages: Vec<Value> = request
            .conversation()
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect();

        let mut body = json!({
            "model": model_id,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(self.default_max_tokens),
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(system) = request.system_prompt() {
                obj.insert("system".to_string(), json!(system));
            }
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
        }
        body
    }
}

fn parse_stream_message(message: &SseMessage) -> StreamStep {
    let Ok(json) = serde_json::from_str::<Value>(&message.data) else {
        return StreamStep::Skip;
    };
    let kind = message
        .event
        .as_deref()
        .or_else(|| json["type"].as_str())
        .unwrap_or_default();

    match kind {
        "content_block_delta" => match json["delta"]["text"].as_str() {
            Some(text) if json["delta"]["type"] == "text_delta" => {
                StreamStep::Delta(text.to_string())
            }
            _ => StreamStep::Skip,
        },
        "message_stop" => StreamStep::Done,
        "error" => StreamStep::Error(extract_error_message(&json).unwrap_or_default()),
        _ => StreamStep::Skip,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn supports_embeddings(&self) -> bool {
        false
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError> {
        let body = self.body(&request, model_id, false);
        let res = self
            .post()
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

        let text = payload["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();
        Ok(text)
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<TokenStream, ApiError> {
        let body = self.body(&request, model_id, true);
        let res = self
            .post()
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::transport(PROVIDER, e))?;
        let res = ensure_success(PROVIDER, res).await?;

        Ok(forward_stream(PROVIDER, res, parse_stream_message))
    }

    async fn embed(&self, _inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        Err(ApiError::Configuration(
            "Anthropic does not provide embeddings; set OPENAI_API_KEY to enable the OpenAI fallback"
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new("http://localhost", "key", 512, Duration::from_secs(5))
            .expect("client")
    }

    #[test]
    fn system_prompt_goes_out_of_band() {
        let request = ChatRequest::new(vec![
            ChatMessage::system("answer from context"),
            ChatMessage::user("question"),
        ]);
        let body = provider().body(&request, "claude", false);
        assert_eq!(body["system"], "answer from context");
        assert_eq!(body["messages"].as_array().map(|m| m.len()), Some(1));
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 512);
    }

    #[test]
    fn stream_parser_follows_event_names() {
        let delta = SseMessage {
            event: Some("content_block_delta".to_string()),
            data: r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"Hel"}}"#
                .to_string(),
        };
        assert_eq!(parse_stream_message(&delta), StreamStep::Delta("Hel".to_string()));

        let ping = SseMessage {
            event: Some("ping".to_string()),
            data: r#"{"type":"ping"}"#.to_string(),
        };
        assert_eq!(parse_stream_message(&ping), StreamStep::Skip);

        let stop = SseMessage {
            event: Some("message_stop".to_string()),
            data: r#"{"type":"message_stop"}"#.to_string(),
        };
        assert_eq!(parse_stream_message(&stop), StreamStep::Done);

        let error = SseMessage {
            event: Some("error".to_string()),
            data: r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#
                .to_string(),
        };
        assert_eq!(
            parse_stream_message(&error),
            StreamStep::Error("Overloaded".to_string())
        );
    }

    #[tokio::test]
    async fn embed_is_a_configuration_error() {
        let err = provider()
            .embed(&["x".to_string()], "any")
            .await
            .expect_err("no embeddings");
        assert!(matches!(err, ApiError::Configuration(_)));
    }
}

//! Incremental server-sent-events decoding for provider streams.
//!
//! Network chunks split lines (and UTF-8 sequences) arbitrarily, so bytes are
//! buffered until a full line is available.

use futures_util::StreamExt;
use reqwest::Response;
use tokio::sync::mpsc;

use super::provider::TokenStream;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(bytes);
        let mut messages = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(message) = self.process_line(&line) {
                messages.push(message);
            }
        }

        messages
    }

    /// Flushes a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseMessage> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            if let Some(message) = self.process_line(&line) {
                return Some(message);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseMessage { event, data })
    }
}

/// What a provider-specific parser makes of one SSE message.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamStep {
    Delta(String),
    Skip,
    Done,
    Error(String),
}

/// Pumps a streaming HTTP response into a [`TokenStream`].
///
/// The pump stops as soon as the receiver is dropped, releasing the
/// connection, so a disconnected client never keeps a provider stream alive.
pub fn forward_stream<F>(provider: &'static str, response: Response, mut parse: F) -> TokenStream
where
    F: FnMut(&SseMessage) -> StreamStep + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);
    let mut stream = response.bytes_stream();

    tokio::spawn(async move {
        let mut decoder = SseDecoder::new();
        loop {
            let item = tokio::select! {
                _ = tx.closed() => {
                    tracing::debug!("{} stream receiver dropped; closing upstream", provider);
                    return;
                }
                item = stream.next() => item,
            };

            let exhausted = item.is_none();
            let messages = match item {
                Some(Ok(bytes)) => decoder.push(&bytes),
                Some(Err(e)) => {
                    let _ = tx.send(Err(ApiError::transport(provider, e))).await;
                    return;
                }
                None => decoder.finish().into_iter().collect(),
            };

            for message in messages {
                match parse(&message) {
                    StreamStep::Delta(text) => {
                        if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                            return;
                        }
                    }
                    StreamStep::Skip => {}
                    StreamStep::Done => return,
                    StreamStep::Error(message) => {
                        let _ = tx
                            .send(Err(ApiError::provider(provider, None, message)))
                            .await;
                        return;
                    }
                }
            }

            if exhausted {
                return;
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let messages = decoder.push(b":1}\n\ndata: second\n\n");
        assert_eq!(
            messages,
            vec![
                SseMessage {
                    event: None,
                    data: "{\"a\":1}".to_string()
                },
                SseMessage {
                    event: None,
                    data: "second".to_string()
                },
            ]
        );
    }

    #[test]
    fn keeps_event_names_and_handles_crlf() {
        let mut decoder = SseDecoder::new();
        let messages =
            decoder.push(b"event: content_block_delta\r\ndata: x\r\n\r\n: keepalive\r\n\r\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event.as_deref(), Some("content_block_delta"));
        assert_eq!(messages[0].data, "x");
    }

    #[test]
    fn multibyte_characters_survive_chunk_boundaries() {
        let mut decoder = SseDecoder::new();
        let payload = "data: héllo\n\n".as_bytes();
        let split = payload.iter().position(|b| *b == 0xC3).expect("é lead byte") + 1;
        assert!(decoder.push(&payload[..split]).is_empty());
        let messages = decoder.push(&payload[split..]);
        assert_eq!(messages[0].data, "héllo");
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        let last = decoder.finish().expect("trailing event");
        assert_eq!(last.data, "tail");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn multiple_data_lines_join_with_newline() {
        let mut decoder = SseDecoder::new();
        let messages = decoder.push(b"data: one\ndata: two\n\n");
        assert_eq!(messages[0].data, "one\ntwo");
    }
}

//! Streaming chat capability client.
//!
//! Sends one chat turn and exposes the response as an incremental chunk
//! stream parsed from the endpoint's SSE body. Chunks are raw text deltas;
//! the streaming assembler concatenates them. There is no cancellation:
//! once started, the stream runs to completion or channel error.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::EndpointConfig;
use crate::error::{Result, TernError};

use super::{ChatCapability, ChatRequest, ChunkStream};

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    #[serde(flatten)]
    request: &'a ChatRequest,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// SSE terminator payload.
const DONE_MARKER: &str = "[DONE]";

/// HTTP adapter for the streaming chat endpoint.
pub struct HttpChatClient {
    http: reqwest::Client,
    endpoint: EndpointConfig,
}

impl HttpChatClient {
    /// Create a client against the configured endpoint.
    pub fn new(http: reqwest::Client, endpoint: EndpointConfig) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl ChatCapability for HttpChatClient {
    async fn send(&self, request: ChatRequest) -> Result<ChunkStream> {
        let url = format!("{}/chat", self.endpoint.base_url.trim_end_matches('/'));
        let mut http_request = self
            .http
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(&ChatBody {
                request: &request,
                stream: true,
            });
        if let Some(key) = &self.endpoint.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await?;
        if !response.status().is_success() {
            return Err(TernError::Capability(format!(
                "chat endpoint returned {}",
                response.status()
            ))
            .into());
        }

        let (tx, rx) = mpsc::channel::<Result<String>>(32);
        let byte_stream = response.bytes_stream();
        tokio::spawn(async move {
            parse_chat_sse(byte_stream, tx).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Parse an SSE byte stream into text deltas.
///
/// Events are separated by blank lines; each `data:` payload carries a JSON
/// `{"delta": "..."}` fragment or the `[DONE]` terminator. A transport error
/// or explicit error field is forwarded once and terminates the channel.
async fn parse_chat_sse(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>>,
    tx: mpsc::Sender<Result<String>>,
) {
    // Buffer accumulates raw bytes between `\n\n` boundaries.
    let mut buffer = String::new();

    tokio::pin!(byte_stream);

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(err) => {
                let _ = tx
                    .send(Err(TernError::Capability(format!("chat stream failed: {}", err))
                        .into()))
                    .await;
                return;
            }
        };

        let text = match std::str::from_utf8(&chunk) {
            Ok(s) => s.to_string(),
            Err(_) => continue,
        };
        buffer.push_str(&text);

        // SSE events are separated by blank lines (`\n\n`).
        while let Some(pos) = buffer.find("\n\n") {
            let event_block = buffer[..pos].to_string();
            buffer = buffer[pos + 2..].to_string();
            if !forward_event(&event_block, &tx).await {
                return;
            }
        }
    }

    // Flush any remaining partial event.
    if !buffer.is_empty() {
        forward_event(&buffer, &tx).await;
    }
}

/// Forward one SSE event block. Returns false when the stream should end.
async fn forward_event(event_block: &str, tx: &mpsc::Sender<Result<String>>) -> bool {
    for line in event_block.lines() {
        let Some(payload) = line.strip_prefix("data:") else {
            // SSE comments and non-data fields are ignored.
            continue;
        };
        let payload = payload.trim();

        if payload == DONE_MARKER {
            return false;
        }

        match serde_json::from_str::<ChatDelta>(payload) {
            Ok(ChatDelta {
                error: Some(error), ..
            }) => {
                let _ = tx.send(Err(TernError::Capability(error).into())).await;
                return false;
            }
            Ok(ChatDelta {
                delta: Some(delta), ..
            }) => {
                if tx.send(Ok(delta)).await.is_err() {
                    return false;
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!("skipping unparseable chat SSE payload: {}", err);
            }
        }
    }
    true
}

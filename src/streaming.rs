//! Streaming assembler for the chat capability.
//!
//! Consumes the incremental chunk stream and replaces one in-progress
//! assistant message with the cumulative concatenation of all chunks
//! received so far. Append-only: no diff or patch semantics. Termination is
//! channel close or channel error; there is no cancellation.

use futures::StreamExt;

use crate::capabilities::ChunkStream;
use crate::error::Result;

/// Assembly notifications, observed by the transcript in arrival order.
#[derive(Debug, PartialEq, Eq)]
pub enum AssemblerEvent<'a> {
    /// First non-empty chunk arrived: instantiate the assistant message and
    /// clear any typing indicator.
    Started,
    /// Cumulative content so far; replaces the message body in place.
    ContentUpdated(&'a str),
}

/// Drain a chunk stream, invoking `on_event` as content accumulates.
///
/// Returns the full concatenated text when the channel closes. A mid-stream
/// error is returned as-is; the caller discards the partial text in favor of
/// an error message.
///
/// # Arguments
///
/// * `stream` - The incremental response channel
/// * `on_event` - Observer invoked on start and on every content update
pub async fn assemble(
    mut stream: ChunkStream,
    mut on_event: impl FnMut(AssemblerEvent<'_>),
) -> Result<String> {
    let mut text = String::new();
    let mut started = false;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }

        if !started {
            started = true;
            on_event(AssemblerEvent::Started);
        }

        text.push_str(&chunk);
        on_event(AssemblerEvent::ContentUpdated(&text));
    }

    tracing::debug!(chars = text.len(), "chat stream closed");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TernError;

    fn stream_of(chunks: Vec<Result<String>>) -> ChunkStream {
        Box::pin(futures::stream::iter(chunks))
    }

    fn ok_chunks(chunks: &[&str]) -> ChunkStream {
        stream_of(chunks.iter().map(|c| Ok(c.to_string())).collect())
    }

    #[tokio::test]
    async fn test_exact_concatenation() {
        let text = assemble(ok_chunks(&["Hel", "lo ", "world"]), |_| {})
            .await
            .unwrap();
        assert_eq!(text, "Hello world");
    }

    #[tokio::test]
    async fn test_started_fires_once_on_first_nonempty_chunk() {
        let mut events: Vec<String> = Vec::new();
        assemble(ok_chunks(&["", "a", "b"]), |event| match event {
            AssemblerEvent::Started => events.push("started".to_string()),
            AssemblerEvent::ContentUpdated(text) => events.push(format!("content:{}", text)),
        })
        .await
        .unwrap();

        assert_eq!(events, vec!["started", "content:a", "content:ab"]);
    }

    #[tokio::test]
    async fn test_updates_are_cumulative() {
        let mut snapshots = Vec::new();
        assemble(ok_chunks(&["Hel", "lo ", "world"]), |event| {
            if let AssemblerEvent::ContentUpdated(text) = event {
                snapshots.push(text.to_string());
            }
        })
        .await
        .unwrap();

        assert_eq!(snapshots, vec!["Hel", "Hello ", "Hello world"]);
    }

    #[tokio::test]
    async fn test_empty_stream_never_starts() {
        let mut started = false;
        let text = assemble(ok_chunks(&[]), |event| {
            if event == AssemblerEvent::Started {
                started = true;
            }
        })
        .await
        .unwrap();

        assert_eq!(text, "");
        assert!(!started);
    }

    #[tokio::test]
    async fn test_mid_stream_error_propagates() {
        let stream = stream_of(vec![
            Ok("partial".to_string()),
            Err(TernError::Capability("connection reset".to_string()).into()),
        ]);

        let err = assemble(stream, |_| {}).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }
}

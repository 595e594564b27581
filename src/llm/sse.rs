//! Server-sent event decoding for provider streams.
//!
//! Framing is shared by every provider:
//! - bytes are buffered until a `\n` completes a line; the trailing partial
//!   line stays in the buffer for the next read
//! - blank lines, non-`data:` fields and the `[DONE]` terminator are skipped
//! - the `data:` payload goes to a provider-specific parser
//!
//! A payload that fails to parse is reported to the observer and skipped.
//! The stream ends when the transport does; a trailing incomplete line is
//! discarded at that point.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};

use super::DeltaStream;
use crate::error::ProviderError;
use crate::observer::Observer;
use crate::types::StreamDelta;

/// SSE field prefix carrying a payload.
pub const DATA_PREFIX: &str = "data:";
/// Literal payload that marks the end of an OpenAI-style stream.
pub const DONE_MARKER: &str = "[DONE]";

/// What a provider found in one `data:` payload.
#[derive(Debug)]
pub enum ChunkEvent {
    /// Incremental text to emit (may be empty, which emits nothing)
    Text(String),
    /// Valid payload with nothing to emit (role-only chunk, ping, ...)
    Ignore,
    /// The provider reported an error inside the stream
    Error(ProviderError),
}

/// Provider-specific payload parser.
pub type ChunkParser = fn(&str) -> Result<ChunkEvent, serde_json::Error>;

/// Byte buffer that hands out complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Take the next complete line, without its `\n` or `\r\n`.
    ///
    /// Lines are decoded only once complete, so a multi-byte character
    /// split across reads is reassembled before decoding.
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=newline).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Bytes of the incomplete trailing line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Extract the payload of a `data:` line.
///
/// Returns `None` for blank lines, other SSE fields, comments, empty
/// payloads and the `[DONE]` terminator.
pub fn extract_data(line: &str) -> Option<&str> {
    let data = line.trim().strip_prefix(DATA_PREFIX)?.trim();
    if data.is_empty() || data == DONE_MARKER {
        return None;
    }
    Some(data)
}

struct Decoder {
    provider: String,
    bytes: Option<BoxStream<'static, Result<Bytes, reqwest::Error>>>,
    lines: LineBuffer,
    parser: ChunkParser,
    observer: Arc<dyn Observer>,
    emitted: usize,
}

impl Decoder {
    /// Drop the transport handle and any buffered bytes.
    fn release(&mut self) {
        self.bytes = None;
        self.lines.clear();
    }

    fn handle_line(&mut self, line: &str) -> Option<Result<StreamDelta, ProviderError>> {
        let data = extract_data(line)?;
        match (self.parser)(data) {
            Ok(ChunkEvent::Text(text)) if !text.is_empty() => {
                self.emitted += 1;
                Some(Ok(StreamDelta::new(text)))
            }
            Ok(ChunkEvent::Text(_)) | Ok(ChunkEvent::Ignore) => None,
            Ok(ChunkEvent::Error(err)) => Some(Err(err)),
            Err(e) => {
                self.observer
                    .chunk_skipped(&self.provider, line, &e.to_string());
                None
            }
        }
    }

    async fn next_delta(&mut self) -> Option<Result<StreamDelta, ProviderError>> {
        loop {
            while let Some(line) = self.lines.next_line() {
                if let Some(item) = self.handle_line(&line) {
                    if let Err(err) = &item {
                        self.observer.request_failed(&self.provider, err);
                        self.release();
                    }
                    return Some(item);
                }
            }

            let bytes = self.bytes.as_mut()?;
            match bytes.next().await {
                Some(Ok(chunk)) => self.lines.push(&chunk),
                Some(Err(e)) => {
                    let err = ProviderError::from_transport(e);
                    self.observer.request_failed(&self.provider, &err);
                    self.release();
                    return Some(Err(err));
                }
                None => {
                    self.release();
                    self.observer.stream_finished(&self.provider, self.emitted);
                    return None;
                }
            }
        }
    }
}

/// Turn a response byte stream into a [`DeltaStream`].
///
/// Each item waits on the next network read only when the consumer asks
/// for it. After an `Err` item the stream is finished.
pub fn decode_stream<S>(
    bytes: S,
    provider: impl Into<String>,
    parser: ChunkParser,
    observer: Arc<dyn Observer>,
) -> DeltaStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let decoder = Decoder {
        provider: provider.into(),
        bytes: Some(bytes.boxed()),
        lines: LineBuffer::new(),
        parser,
        observer,
        emitted: 0,
    };

    stream::unfold(decoder, |mut decoder| async move {
        decoder
            .next_delta()
            .await
            .map(|item| (item, decoder))
    })
    .boxed()
}

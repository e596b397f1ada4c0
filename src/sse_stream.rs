//! Inbound Server-Sent Events parsing for vendor HTTP responses.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, BytesMut};
use futures_util::{Stream, StreamExt};
use memchr::memmem;

use crate::Error;

/// Upper bound on a single buffered, not yet terminated event.
const MAX_EVENT_BYTES: usize = 1_000_000;

/// One event received from a vendor SSE endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// Value of the `event:` field, if any.
    pub event_type: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

impl SseEvent {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event_type: None,
            data: data.into(),
        }
    }

    /// OpenAI-style end-of-stream sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }

    fn parse(block: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut data_lines: Vec<&str> = Vec::new();

        for line in block.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => event_type = Some(value.to_string()),
                "data" => data_lines.push(value),
                _ => {}
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        Some(SseEvent {
            event_type,
            data: data_lines.join("\n"),
        })
    }
}

/// Parses SSE events out of a byte stream whose chunks may split events,
/// lines, or UTF-8 sequences at arbitrary points.
pub struct SseStream<S> {
    inner: S,
    buffer: BytesMut,
    events: VecDeque<SseEvent>,
    /// Failure found while draining a chunk, reported after the events parsed before it.
    pending_error: Option<Error>,
    finished: bool,
}

impl<S> SseStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: BytesMut::new(),
            events: VecDeque::new(),
            pending_error: None,
            finished: false,
        }
    }

    /// Move every complete event out of the buffer.
    fn drain_complete_events(&mut self) -> Result<(), Error> {
        while let Some((end, separator_len)) = find_event_end(&self.buffer) {
            let block = self.buffer.split_to(end);
            self.buffer.advance(separator_len);

            let text = std::str::from_utf8(&block)
                .map_err(|e| Error::streaming(format!("Invalid UTF-8 in SSE event: {e}")))?;
            if let Some(event) = SseEvent::parse(text) {
                self.events.push_back(event);
            }
        }
        Ok(())
    }

    /// Parse whatever is left once the byte stream ended without a final blank line.
    fn flush_trailing_event(&mut self) {
        let remainder = self.buffer.split();
        match std::str::from_utf8(&remainder) {
            Ok(text) if !text.trim().is_empty() => {
                if let Some(event) = SseEvent::parse(text) {
                    self.events.push_back(event);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "dropping undecodable trailing SSE bytes"),
        }
    }
}

/// Position and length of the first event separator (`\n\n` or `\r\n\r\n`).
fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = memmem::find(buffer, b"\n\n").map(|pos| (pos, 2));
    let crlf = memmem::find(buffer, b"\r\n\r\n").map(|pos| (pos, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    type Item = Result<SseEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if let Some(e) = self.pending_error.take() {
                return Poll::Ready(Some(Err(e)));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    self.buffer.extend_from_slice(&chunk);
                    if let Err(e) = self.drain_complete_events() {
                        self.buffer.clear();
                        self.pending_error = Some(e);
                    } else if self.buffer.len() > MAX_EVENT_BYTES {
                        self.buffer.clear();
                        self.pending_error = Some(Error::streaming("SSE event exceeded maximum size"));
                    }
                }
                Some(Err(e)) => {
                    return Poll::Ready(Some(Err(Error::streaming(format!(
                        "Stream error: {e}"
                    )))));
                }
                None => {
                    self.finished = true;
                    self.flush_trailing_event();
                }
            }
        }
    }
}

/// Extension trait to add SSE parsing to byte streams.
pub trait SseStreamExt: Stream {
    /// Parse this byte stream as SSE events.
    fn sse_events(self) -> SseStream<Self>
    where
        Self: Sized,
    {
        SseStream::new(self)
    }
}

impl<S: Stream> SseStreamExt for S {}

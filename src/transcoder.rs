//! Outbound SSE framing of a fragment stream.
//!
//! Wire grammar, one block per frame, each followed by a blank line:
//!
//! ```text
//! f:{"messageId":"msg-<id>"}
//! 0:"<fragment>"
//! :keepalive
//! d:{"finishReason":"stop","usage":{"promptTokens":0,"completionTokens":0}}
//! e:{"finishReason":"stop","usage":{"promptTokens":0,"completionTokens":0},"isContinued":false}
//! ```
//!
//! Every block is flushed as soon as it is written.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::streaming::FragmentStream;
use crate::types::{UsageHandle, UsageMetadata};
use crate::Error;

/// Default interval between keep-alive comments.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

const FINISH_REASON: &str = "stop";

/// How a transcoding run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeOutcome {
    /// The fragment stream closed and the terminal frame pair was written.
    Completed,
    /// The request was cancelled; no terminal frames were written.
    Cancelled,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartFrame<'a> {
    message_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    prompt_tokens: i32,
    completion_tokens: i32,
}

impl From<UsageMetadata> for WireUsage {
    fn from(usage: UsageMetadata) -> Self {
        Self {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinishFrame<'a> {
    finish_reason: &'static str,
    usage: &'a WireUsage,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EndFrame<'a> {
    finish_reason: &'static str,
    usage: &'a WireUsage,
    is_continued: bool,
}

/// Writes frames to the transport, flushing after each one.
struct FrameWriter<'w, W> {
    writer: &'w mut W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<'_, W> {
    async fn write_block(&mut self, block: &str) -> Result<(), Error> {
        let framed = format!("{block}\n\n");
        self.writer.write_all(framed.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn write_frame<T: Serialize>(&mut self, prefix: char, payload: &T) -> Result<(), Error> {
        let payload = serde_json::to_string(payload)?;
        self.write_block(&format!("{prefix}:{payload}")).await
    }
}

/// SSE framer for a single response.
#[derive(Debug, Clone)]
pub struct SseTranscoder {
    keep_alive: Duration,
}

impl Default for SseTranscoder {
    fn default() -> Self {
        Self {
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}

impl SseTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keep_alive(mut self, period: Duration) -> Self {
        self.keep_alive = period;
        self
    }

    /// Drain `stream` into `writer` as framed SSE until the stream closes or
    /// `cancel` fires.
    ///
    /// When `usage` is given, the terminal frames report the counts captured
    /// by the adapter; otherwise they report zeros.
    pub async fn run<W>(
        &self,
        cancel: &CancellationToken,
        writer: &mut W,
        mut stream: FragmentStream,
        usage: Option<&UsageHandle>,
    ) -> Result<TranscodeOutcome, Error>
    where
        W: AsyncWrite + Unpin,
    {
        let mut frames = FrameWriter { writer };
        let result = self.transcode(cancel, &mut frames, &mut stream, usage).await;

        match &result {
            Ok(TranscodeOutcome::Cancelled) => tracing::debug!("transcoding cancelled"),
            Ok(TranscodeOutcome::Completed) => {}
            Err(e) => tracing::warn!(error = %e, "transcoding aborted"),
        }
        result
    }

    async fn transcode<W: AsyncWrite + Unpin>(
        &self,
        cancel: &CancellationToken,
        frames: &mut FrameWriter<'_, W>,
        stream: &mut FragmentStream,
        usage: Option<&UsageHandle>,
    ) -> Result<TranscodeOutcome, Error> {
        let message_id = format!("msg-{}", Uuid::new_v4().simple());
        frames
            .write_frame('f', &StartFrame {
                message_id: &message_id,
            })
            .await?;

        let mut keep_alive = interval_at(Instant::now() + self.keep_alive, self.keep_alive);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(TranscodeOutcome::Cancelled),
                fragment = stream.recv() => match fragment {
                    Some(fragment) if fragment.is_empty() => {}
                    Some(fragment) => frames.write_frame('0', &fragment).await?,
                    None => break,
                },
                _ = keep_alive.tick() => frames.write_block(":keepalive").await?,
            }
        }

        let usage: WireUsage = usage
            .and_then(UsageHandle::get)
            .unwrap_or_default()
            .into();
        frames
            .write_frame('d', &FinishFrame {
                finish_reason: FINISH_REASON,
                usage: &usage,
            })
            .await?;
        frames
            .write_frame('e', &EndFrame {
                finish_reason: FINISH_REASON,
                usage: &usage,
                is_continued: false,
            })
            .await?;

        Ok(TranscodeOutcome::Completed)
    }
}

/// Response headers the owning HTTP server must send with the framed stream.
pub fn sse_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

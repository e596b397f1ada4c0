//! The streaming channel contract shared by every adapter.
//!
//! An adapter spawns one task per request that drains the vendor stream into a
//! [`FragmentSender`]. The caller reads the matching [`FragmentStream`]; channel
//! closure is the only end-of-stream signal. Usage metadata travels separately
//! through a [`UsageHandle`].

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::{UsageHandle, UsageMetadata};

/// Number of fragments that may be queued ahead of a slow consumer.
pub const FRAGMENT_BUFFER: usize = 16;

/// Receiving half of a fragment channel.
///
/// Yields text and tool-call fragments in vendor order and ends when the
/// producer finished, failed, or was cancelled.
#[derive(Debug)]
pub struct FragmentStream {
    rx: mpsc::Receiver<String>,
}

impl FragmentStream {
    /// Receive the next fragment, or `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Drain the stream and concatenate every fragment.
    pub async fn collect_text(mut self) -> String {
        let mut text = String::new();
        while let Some(fragment) = self.rx.recv().await {
            text.push_str(&fragment);
        }
        text
    }

    /// A stream that replays the given fragments and then closes.
    pub fn from_fragments<I>(fragments: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::channel(fragments.len().max(1));
        for fragment in fragments {
            // Capacity covers every fragment, so this cannot fail.
            let _ = tx.try_send(fragment);
        }
        Self { rx }
    }
}

impl Stream for FragmentStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Sending half of a fragment channel, owned by exactly one producer task.
///
/// Dropping it closes the channel.
#[derive(Debug)]
pub struct FragmentSender {
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl FragmentSender {
    /// Forward one fragment.
    ///
    /// Returns `false` when the request was cancelled or the consumer went
    /// away; the producer must stop in that case.
    pub async fn send(&self, fragment: impl Into<String>) -> bool {
        let fragment = fragment.into();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(fragment) => sent.is_ok(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the next vendor event unless the request is cancelled first.
    ///
    /// `None` means cancelled; `Some(None)` means the vendor stream ended.
    pub async fn next_event<S>(&self, events: &mut S) -> Option<Option<S::Item>>
    where
        S: Stream + Unpin,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = events.next() => Some(event),
        }
    }
}

/// Create a fragment channel bound to the caller's cancellation token.
pub fn fragment_channel(cancel: &CancellationToken) -> (FragmentSender, FragmentStream) {
    let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
    (
        FragmentSender {
            tx,
            cancel: cancel.clone(),
        },
        FragmentStream { rx },
    )
}

/// Fragment stream plus the usage side-channel.
#[derive(Debug)]
pub struct StreamResult {
    pub stream: FragmentStream,
    pub usage: UsageHandle,
}

impl StreamResult {
    pub fn new(stream: FragmentStream, usage: UsageHandle) -> Self {
        Self { stream, usage }
    }

    /// Usage captured so far; only final once `stream` has been drained.
    pub fn usage(&self) -> Option<UsageMetadata> {
        self.usage.get()
    }

    pub fn into_parts(self) -> (FragmentStream, UsageHandle) {
        (self.stream, self.usage)
    }
}

/// Encode the inline marker announcing a new tool call in the fragment stream.
pub fn tool_call_start_marker(id: &str, name: &str) -> String {
    serde_json::json!({
        "type": "tool_call_start",
        "id": id,
        "function": { "name": name },
    })
    .to_string()
}

/// Derive a token that is cancelled with `parent` or once `timeout` elapses.
///
/// A timer task runs until the token is cancelled. Cancel the returned token
/// when the request finishes early to stop it.
pub fn cancel_after(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let child = parent.child_token();
    let deadline = child.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = deadline.cancelled() => {}
            _ = tokio::time::sleep(timeout) => deadline.cancel(),
        }
    });
    child
}

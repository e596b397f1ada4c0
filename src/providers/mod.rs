//! Provider implementations for different LLM services.

pub mod bedrock;
pub mod gemini;
pub mod openai;

// Re-export commonly used provider types
pub use bedrock::BedrockProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::Error;

/// Start a vendor streaming call, giving up if the request is cancelled first.
///
/// Dropping the pending call aborts the underlying connection.
pub(crate) async fn start_stream<T, F>(
    provider: &'static str,
    cancel: &CancellationToken,
    call: F,
) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::provider(provider, "request cancelled before the stream started")),
        result = call => result,
    };

    if let Err(e) = &result {
        tracing::error!(provider, error = %e, "failed to start vendor stream");
    }
    result
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use futures_util::Stream;

    /// Stream wrapper that records when the vendor stream is released.
    pub struct TrackedStream<S> {
        inner: S,
        released: Arc<AtomicBool>,
    }

    impl<S> TrackedStream<S> {
        pub fn new(inner: S) -> (Self, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            (
                Self {
                    inner,
                    released: released.clone(),
                },
                released,
            )
        }
    }

    impl<S: Stream + Unpin> Stream for TrackedStream<S> {
        type Item = S::Item;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Pin::new(&mut self.inner).poll_next(cx)
        }
    }

    impl<S> Drop for TrackedStream<S> {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    /// Poll until the tracked stream has been dropped by the draining task.
    pub async fn wait_released(released: &AtomicBool) {
        for _ in 0..200 {
            if released.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("vendor stream was never released");
    }
}

use tokio_util::sync::CancellationToken;

use crate::streaming::{FragmentStream, StreamResult};
use crate::types::{Message, Tool, ToolChoice};
use crate::Error;

/// A chat provider that streams completions as text and tool-call fragments.
///
/// Every vendor adapter implements [`ChatProvider::chat_stream_with_tools_and_usage`];
/// the other operations are narrower views of it. All operations fail with
/// [`Error::InvalidArgument`] on an empty conversation before any network call,
/// and with [`Error::ProviderUnavailable`] when the vendor call cannot be started.
/// Failures after the stream started only close the fragment stream early.
///
/// Cancelling `cancel` stops the draining task, releases the vendor stream and
/// closes the fragment stream.
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync + 'static {
    /// Short vendor name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Stream a completion with tools and expose usage once the stream is drained.
    async fn chat_stream_with_tools_and_usage(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
    ) -> Result<StreamResult, Error>;

    /// Stream a completion without tools.
    async fn chat_stream(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
    ) -> Result<FragmentStream, Error> {
        self.chat_stream_with_tools(cancel, messages, &[], ToolChoice::Auto)
            .await
    }

    /// Stream a completion with declared tools.
    async fn chat_stream_with_tools(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
    ) -> Result<FragmentStream, Error> {
        let result = self
            .chat_stream_with_tools_and_usage(cancel, messages, tools, tool_choice)
            .await?;
        Ok(result.stream)
    }

    /// Stream a completion without tools and expose usage.
    async fn chat_stream_with_usage(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
    ) -> Result<StreamResult, Error> {
        self.chat_stream_with_tools_and_usage(cancel, messages, &[], ToolChoice::Auto)
            .await
    }
}

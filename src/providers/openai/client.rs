use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use super::types::*;
use crate::provider::ChatProvider;
use crate::providers::start_stream;
use crate::sse_stream::SseStreamExt;
use crate::streaming::{fragment_channel, tool_call_start_marker, FragmentSender, StreamResult};
use crate::types::{validate_messages, Message, Role, Tool, ToolChoice, UsageHandle, UsageMetadata};
use crate::Error;

const PROVIDER: &str = "OpenAI";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Stream of decoded `chat.completion.chunk` events.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, Error>> + Send>>;

/// The part of the OpenAI API this adapter depends on.
#[async_trait::async_trait]
pub trait ChatCompletionsApi: Send + Sync + 'static {
    /// Start a streaming chat completion. The stream ends after `[DONE]`.
    async fn create_chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStream, Error>;
}

/// [`ChatCompletionsApi`] over HTTPS with `reqwest`.
pub struct HttpChatCompletionsApi {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HttpChatCompletionsApi {
    pub fn new(api_key: String, base_url: Option<String>) -> Result<Self, Error> {
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

#[async_trait::async_trait]
impl ChatCompletionsApi for HttpChatCompletionsApi {
    async fn create_chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStream, Error> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAIError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(Error::provider(
                PROVIDER,
                format!("API error ({status}): {message}"),
            ));
        }

        let chunks = response
            .bytes_stream()
            .sse_events()
            .take_while(|event| {
                let done = matches!(event, Ok(event) if event.is_done());
                futures_util::future::ready(!done)
            })
            .filter_map(|event| async move {
                match event {
                    Ok(event) => match serde_json::from_str::<ChatCompletionChunk>(&event.data) {
                        Ok(chunk) => Some(Ok(chunk)),
                        Err(e) => {
                            tracing::debug!(provider = PROVIDER, error = %e, data = %event.data, "skipping unparseable SSE chunk");
                            None
                        }
                    },
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(Box::pin(chunks))
    }
}

/// OpenAI provider implementation.
pub struct OpenAIProvider {
    api: Arc<dyn ChatCompletionsApi>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider.
    pub fn new(api_key: String, model: String) -> Result<Self, Error> {
        let api = HttpChatCompletionsApi::new(api_key, None)?;
        Ok(Self::with_api(Arc::new(api), model))
    }

    /// Create a new OpenAI provider with custom base URL.
    pub fn new_with_base_url(api_key: String, base_url: String, model: String) -> Result<Self, Error> {
        let api = HttpChatCompletionsApi::new(api_key, Some(base_url))?;
        Ok(Self::with_api(Arc::new(api), model))
    }

    /// Create a provider over any implementation of the OpenAI streaming API.
    pub fn with_api(api: Arc<dyn ChatCompletionsApi>, model: String) -> Self {
        Self {
            api,
            model,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Convert canonical messages and tools to a Chat Completions request.
    pub fn convert_request(
        &self,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
    ) -> ChatCompletionRequest {
        let (tools, tool_choice) = match tool_choice {
            _ if tools.is_empty() => (None, None),
            ToolChoice::None => (None, None),
            ToolChoice::Auto => (Some(Self::convert_tools(tools)), Some("auto".to_string())),
            ToolChoice::Required => (
                Some(Self::convert_tools(tools)),
                Some("required".to_string()),
            ),
        };

        ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.iter().map(Self::convert_message).collect(),
            stream: true,
            temperature: self.temperature,
            tools,
            tool_choice,
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    fn convert_message(message: &Message) -> OpenAIMessage {
        let tool_calls: Vec<OpenAIToolCall> = message
            .tool_calls
            .iter()
            .map(|call| OpenAIToolCall {
                id: call.id.clone(),
                r#type: "function".to_string(),
                function: OpenAIFunctionCall {
                    name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                },
            })
            .collect();

        // Assistant turns that only call tools carry no text.
        let content = if message.role == Role::Assistant
            && !tool_calls.is_empty()
            && message.content.is_empty()
        {
            None
        } else {
            Some(message.content.clone())
        };

        OpenAIMessage {
            role: message.role.as_str().to_string(),
            content,
            tool_calls,
            tool_call_id: match message.role {
                Role::Tool => message.tool_call_id.clone(),
                _ => None,
            },
        }
    }

    fn convert_tools(tools: &[Tool]) -> Vec<OpenAITool> {
        tools
            .iter()
            .map(|tool| OpenAITool {
                r#type: "function".to_string(),
                function: OpenAIFunctionDefinition {
                    name: tool.function.name.clone(),
                    description: tool.function.description.clone(),
                    parameters: tool.function.parameters.clone(),
                },
            })
            .collect()
    }

    /// Fragments carried by one chunk, in the order they must be forwarded.
    ///
    /// Usage is written to `usage` and never becomes a fragment.
    fn chunk_fragments(
        chunk: ChatCompletionChunk,
        announced: &mut HashSet<u32>,
        usage: &UsageHandle,
    ) -> Vec<String> {
        if let Some(reported) = chunk.usage {
            usage.set(UsageMetadata::new(
                reported.prompt_tokens,
                reported.completion_tokens,
                reported.total_tokens,
            ));
        }

        let mut fragments = Vec::new();
        let Some(choice) = chunk.choices.into_iter().next() else {
            return fragments;
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                fragments.push(content);
            }
        }

        for call in choice.delta.tool_calls.unwrap_or_default() {
            let function = call.function.unwrap_or_default();
            if let Some(id) = call.id.as_deref() {
                if announced.insert(call.index) {
                    let name = function.name.as_deref().unwrap_or_default();
                    fragments.push(tool_call_start_marker(id, name));
                }
            }
            if let Some(arguments) = function.arguments {
                if !arguments.is_empty() {
                    fragments.push(arguments);
                }
            }
        }

        fragments
    }

    /// Drain the chunk stream into the fragment channel.
    async fn drain(mut chunks: ChunkStream, tx: FragmentSender, usage: UsageHandle) {
        let mut announced = HashSet::new();

        loop {
            let chunk = match tx.next_event(&mut chunks).await {
                None => {
                    tracing::debug!(provider = PROVIDER, "stream cancelled");
                    break;
                }
                Some(None) => break,
                Some(Some(Ok(chunk))) => chunk,
                Some(Some(Err(e))) => {
                    tracing::warn!(provider = PROVIDER, error = %e, "stream interrupted");
                    break;
                }
            };

            for fragment in Self::chunk_fragments(chunk, &mut announced, &usage) {
                if !tx.send(fragment).await {
                    return;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ChatProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn chat_stream_with_tools_and_usage(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
    ) -> Result<StreamResult, Error> {
        validate_messages(messages)?;
        let request = self.convert_request(messages, tools, tool_choice);

        let chunks = start_stream(
            PROVIDER,
            cancel,
            self.api.create_chat_completion_stream(&request),
        )
        .await?;

        let (tx, stream) = fragment_channel(cancel);
        let usage = UsageHandle::new();
        tokio::spawn(Self::drain(chunks, tx, usage.clone()));

        Ok(StreamResult::new(stream, usage))
    }
}

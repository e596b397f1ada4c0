use std::pin::Pin;
use std::sync::Arc;

use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::types::{
    AnyToolChoice, AutoToolChoice, ContentBlock, ContentBlockDelta, ContentBlockStart,
    ConversationRole, ConverseStreamOutput, InferenceConfiguration, Message as BedrockMessage,
    SystemContentBlock, Tool as BedrockTool, ToolChoice as BedrockToolChoice, ToolConfiguration,
    ToolInputSchema, ToolResultBlock, ToolResultContentBlock, ToolSpecification, ToolUseBlock,
};
use aws_sdk_bedrockruntime::Client as BedrockClient;
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::types::*;
use crate::provider::ChatProvider;
use crate::providers::start_stream;
use crate::streaming::{fragment_channel, tool_call_start_marker, FragmentSender, StreamResult};
use crate::types::{
    parse_tool_arguments, validate_messages, Message, Role, Tool, ToolChoice, UsageHandle,
    UsageMetadata,
};
use crate::Error;

const PROVIDER: &str = "Bedrock";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Stream of decoded Converse events.
pub type ConverseEventStream = Pin<Box<dyn Stream<Item = Result<ConverseEvent, Error>> + Send>>;

/// The part of the Bedrock runtime API this adapter depends on.
#[async_trait::async_trait]
pub trait ConverseStreamApi: Send + Sync + 'static {
    async fn converse_stream(
        &self,
        request: &ConverseStreamRequest,
    ) -> Result<ConverseEventStream, Error>;
}

/// [`ConverseStreamApi`] backed by the AWS SDK.
pub struct SdkConverseApi {
    client: BedrockClient,
}

impl SdkConverseApi {
    /// Load AWS configuration for `region`.
    ///
    /// Without explicit credentials the default provider chain is used
    /// (environment, shared profile, instance role).
    pub async fn new(
        region: String,
        credentials: Option<BedrockCredentials>,
        endpoint_url: Option<String>,
    ) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region));

        if let Some(credentials) = credentials {
            loader = loader.credentials_provider(aws_credential_types::Credentials::new(
                credentials.access_key_id,
                credentials.secret_access_key,
                credentials.session_token,
                None,
                "llm-chat-stream",
            ));
        }
        if let Some(url) = endpoint_url {
            loader = loader.endpoint_url(url);
        }

        let config = loader.load().await;
        Self {
            client: BedrockClient::new(&config),
        }
    }

    /// Map one SDK event, or `None` for events that carry nothing we forward.
    fn convert_event(output: ConverseStreamOutput) -> Option<ConverseEvent> {
        match output {
            ConverseStreamOutput::ContentBlockStart(start) => match start.start() {
                Some(ContentBlockStart::ToolUse(tool)) => Some(ConverseEvent::ToolUseStart {
                    tool_use_id: tool.tool_use_id().to_string(),
                    name: tool.name().to_string(),
                }),
                _ => None,
            },
            ConverseStreamOutput::ContentBlockDelta(delta) => match delta.delta() {
                Some(ContentBlockDelta::Text(text)) => Some(ConverseEvent::TextDelta(text.clone())),
                Some(ContentBlockDelta::ToolUse(tool)) => {
                    Some(ConverseEvent::ToolUseDelta(tool.input().to_string()))
                }
                _ => None,
            },
            ConverseStreamOutput::Metadata(metadata) => metadata.usage().map(|usage| {
                ConverseEvent::Metadata(UsageMetadata::new(
                    usage.input_tokens(),
                    usage.output_tokens(),
                    usage.total_tokens(),
                ))
            }),
            ConverseStreamOutput::MessageStop(_) => Some(ConverseEvent::MessageStop),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl ConverseStreamApi for SdkConverseApi {
    async fn converse_stream(
        &self,
        request: &ConverseStreamRequest,
    ) -> Result<ConverseEventStream, Error> {
        let output = self
            .client
            .converse_stream()
            .model_id(&request.model_id)
            .set_system(Some(request.system.clone()))
            .set_messages(Some(request.messages.clone()))
            .set_inference_config(request.inference_config.clone())
            .set_tool_config(request.tool_config.clone())
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, DisplayErrorContext(&e).to_string()))?;

        let events = futures_util::stream::unfold(Some(output.stream), |receiver| async move {
            let mut receiver = receiver?;
            match receiver.recv().await {
                Ok(Some(output)) => Some((Ok(SdkConverseApi::convert_event(output)), Some(receiver))),
                Ok(None) => None,
                Err(e) => Some((
                    Err(Error::streaming(DisplayErrorContext(&e).to_string())),
                    None,
                )),
            }
        })
        .filter_map(|event| async move { event.transpose() });

        Ok(Box::pin(events))
    }
}

/// AWS Bedrock provider using the Converse API.
pub struct BedrockProvider {
    api: Arc<dyn ConverseStreamApi>,
    model_id: String,
    temperature: Option<f32>,
}

impl BedrockProvider {
    /// Create a provider using the default AWS credential chain.
    pub async fn new(region: String, model_id: String) -> Self {
        let api = SdkConverseApi::new(region, None, None).await;
        Self::with_api(Arc::new(api), model_id)
    }

    /// Create a provider with static credentials.
    pub async fn with_credentials(
        region: String,
        model_id: String,
        credentials: BedrockCredentials,
    ) -> Self {
        let api = SdkConverseApi::new(region, Some(credentials), None).await;
        Self::with_api(Arc::new(api), model_id)
    }

    /// Create a provider over any implementation of the Converse streaming API.
    pub fn with_api(api: Arc<dyn ConverseStreamApi>, model_id: String) -> Self {
        Self {
            api,
            model_id,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Convert canonical messages and tools to Converse inputs.
    pub fn convert_request(
        &self,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
    ) -> Result<ConverseStreamRequest, Error> {
        let mut system = Vec::new();
        let mut converted: Vec<BedrockMessage> = Vec::new();
        let mut pending_results: Vec<ContentBlock> = Vec::new();

        for message in messages {
            if message.role != Role::Tool && !pending_results.is_empty() {
                converted.push(user_message(std::mem::take(&mut pending_results))?);
            }

            match message.role {
                Role::System => system.push(SystemContentBlock::Text(message.content.clone())),
                Role::User => {
                    converted.push(user_message(vec![ContentBlock::Text(message.content.clone())])?)
                }
                Role::Assistant => {
                    let mut content = Vec::new();
                    if !message.content.is_empty() {
                        content.push(ContentBlock::Text(message.content.clone()));
                    }
                    for call in &message.tool_calls {
                        let input = serde_json::Value::Object(parse_tool_arguments(&call.function.arguments));
                        let tool_use = ToolUseBlock::builder()
                            .tool_use_id(&call.id)
                            .name(&call.function.name)
                            .input(value_to_document(&input))
                            .build()
                            .map_err(|e| Error::invalid_argument(format!("invalid tool call: {e}")))?;
                        content.push(ContentBlock::ToolUse(tool_use));
                    }
                    if content.is_empty() {
                        continue;
                    }
                    let message = BedrockMessage::builder()
                        .role(ConversationRole::Assistant)
                        .set_content(Some(content))
                        .build()
                        .map_err(|e| Error::invalid_argument(format!("invalid message: {e}")))?;
                    converted.push(message);
                }
                Role::Tool => {
                    // Results for parallel calls must share one user turn.
                    let result = ToolResultBlock::builder()
                        .tool_use_id(message.tool_call_id.as_deref().unwrap_or_default())
                        .content(ToolResultContentBlock::Text(message.content.clone()))
                        .build()
                        .map_err(|e| Error::invalid_argument(format!("invalid tool result: {e}")))?;
                    pending_results.push(ContentBlock::ToolResult(result));
                }
            }
        }
        if !pending_results.is_empty() {
            converted.push(user_message(pending_results)?);
        }

        let tool_config = match tool_choice {
            _ if tools.is_empty() => None,
            ToolChoice::None => None,
            ToolChoice::Auto => Some(Self::convert_tools(
                tools,
                BedrockToolChoice::Auto(AutoToolChoice::builder().build()),
            )?),
            ToolChoice::Required => Some(Self::convert_tools(
                tools,
                BedrockToolChoice::Any(AnyToolChoice::builder().build()),
            )?),
        };

        Ok(ConverseStreamRequest {
            model_id: self.model_id.clone(),
            system,
            messages: converted,
            inference_config: self
                .temperature
                .map(|t| InferenceConfiguration::builder().temperature(t).build()),
            tool_config,
        })
    }

    fn convert_tools(tools: &[Tool], choice: BedrockToolChoice) -> Result<ToolConfiguration, Error> {
        let mut config = ToolConfiguration::builder().tool_choice(choice);
        for tool in tools {
            let spec = ToolSpecification::builder()
                .name(&tool.function.name)
                .description(&tool.function.description)
                .input_schema(ToolInputSchema::Json(value_to_document(&tool.function.parameters)))
                .build()
                .map_err(|e| Error::invalid_argument(format!("invalid tool definition: {e}")))?;
            config = config.tools(BedrockTool::ToolSpec(spec));
        }
        config
            .build()
            .map_err(|e| Error::invalid_argument(format!("invalid tool configuration: {e}")))
    }

    /// The fragment an event contributes, if any.
    fn event_fragment(event: ConverseEvent, usage: &UsageHandle) -> Option<String> {
        match event {
            ConverseEvent::ToolUseStart { tool_use_id, name } => {
                Some(tool_call_start_marker(&tool_use_id, &name))
            }
            ConverseEvent::TextDelta(text) | ConverseEvent::ToolUseDelta(text) => {
                (!text.is_empty()).then_some(text)
            }
            ConverseEvent::Metadata(metadata) => {
                usage.set(metadata);
                None
            }
            // The metadata event with usage follows messageStop, so keep reading.
            ConverseEvent::MessageStop => None,
        }
    }

    async fn drain(mut events: ConverseEventStream, tx: FragmentSender, usage: UsageHandle) {
        loop {
            let event = match tx.next_event(&mut events).await {
                None => {
                    tracing::debug!(provider = PROVIDER, "stream cancelled");
                    break;
                }
                Some(None) => break,
                Some(Some(Ok(event))) => event,
                Some(Some(Err(e))) => {
                    tracing::warn!(provider = PROVIDER, error = %e, "stream interrupted");
                    break;
                }
            };

            if let Some(fragment) = Self::event_fragment(event, &usage) {
                if !tx.send(fragment).await {
                    return;
                }
            }
        }
    }
}

fn user_message(content: Vec<ContentBlock>) -> Result<BedrockMessage, Error> {
    BedrockMessage::builder()
        .role(ConversationRole::User)
        .set_content(Some(content))
        .build()
        .map_err(|e| Error::invalid_argument(format!("invalid message: {e}")))
}

#[async_trait::async_trait]
impl ChatProvider for BedrockProvider {
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
        let request = self.convert_request(messages, tools, tool_choice)?;

        let events = start_stream(PROVIDER, cancel, self.api.converse_stream(&request)).await?;

        let (tx, stream) = fragment_channel(cancel);
        let usage = UsageHandle::new();
        tokio::spawn(Self::drain(events, tx, usage.clone()));

        Ok(StreamResult::new(stream, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support::{wait_released, TrackedStream};
    use crate::types::ToolCall;
    use aws_smithy_types::{Document, Number};
    use futures_util::stream;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeApi {
        events: Mutex<Option<ConverseEventStream>>,
        requests: Mutex<Vec<ConverseStreamRequest>>,
    }

    impl FakeApi {
        fn new(events: ConverseEventStream) -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Some(events)),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl ConverseStreamApi for FakeApi {
        async fn converse_stream(
            &self,
            request: &ConverseStreamRequest,
        ) -> Result<ConverseEventStream, Error> {
            self.requests.lock().unwrap().push(request.clone());
            self.events
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| Error::provider(PROVIDER, "no scripted stream"))
        }
    }

    fn provider(api: Arc<FakeApi>) -> BedrockProvider {
        BedrockProvider::with_api(api, "anthropic.claude-3-haiku-20240307-v1:0".to_string())
    }

    fn empty() -> Arc<FakeApi> {
        FakeApi::new(Box::pin(stream::empty()))
    }

    #[test]
    fn test_request_conversion() {
        let provider = provider(empty()).with_temperature(Some(0.1));
        let messages = vec![
            Message::system("Be brief"),
            Message::user("Weather?"),
            Message::assistant_with_tool_calls(
                "",
                vec![
                    ToolCall::function("t1", "get_weather", r#"{"location":"Boston","days":2}"#),
                    ToolCall::function("t2", "get_time", ""),
                ],
            ),
            Message::tool("t1", "Sunny"),
            Message::tool("t2", "Noon"),
            Message::assistant(""),
        ];

        let request = provider
            .convert_request(&messages, &[], ToolChoice::Auto)
            .unwrap();

        assert_eq!(request.system, vec![SystemContentBlock::Text("Be brief".to_string())]);
        // The empty trailing assistant turn is dropped.
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].role(), &ConversationRole::User);

        let assistant = &request.messages[1];
        assert_eq!(assistant.role(), &ConversationRole::Assistant);
        assert_eq!(assistant.content().len(), 2);
        let ContentBlock::ToolUse(first) = &assistant.content()[0] else {
            panic!("expected tool use");
        };
        assert_eq!(first.tool_use_id(), "t1");
        let Document::Object(input) = first.input() else {
            panic!("expected object input");
        };
        assert_eq!(input["days"], Document::Number(Number::PosInt(2)));
        let ContentBlock::ToolUse(second) = &assistant.content()[1] else {
            panic!("expected tool use");
        };
        assert_eq!(second.input(), &Document::Object(Default::default()));

        let results = &request.messages[2];
        assert_eq!(results.role(), &ConversationRole::User);
        assert_eq!(results.content().len(), 2);
        let ContentBlock::ToolResult(result) = &results.content()[1] else {
            panic!("expected tool result");
        };
        assert_eq!(result.tool_use_id(), "t2");

        assert_eq!(
            request.inference_config.unwrap().temperature(),
            Some(0.1)
        );
        assert!(request.tool_config.is_none());
    }

    #[test]
    fn test_tool_choice_mapping() {
        let provider = provider(empty());
        let tools = vec![Tool::function("get_weather", "Get weather", json!({"type": "object"}))];
        let messages = [Message::user("hi")];

        let auto = provider.convert_request(&messages, &tools, ToolChoice::Auto).unwrap();
        let config = auto.tool_config.unwrap();
        assert_eq!(config.tools().len(), 1);
        assert!(matches!(config.tool_choice(), Some(BedrockToolChoice::Auto(_))));

        let required = provider.convert_request(&messages, &tools, ToolChoice::Required).unwrap();
        assert!(matches!(
            required.tool_config.unwrap().tool_choice(),
            Some(BedrockToolChoice::Any(_))
        ));

        let none = provider.convert_request(&messages, &tools, ToolChoice::None).unwrap();
        assert!(none.tool_config.is_none());
        assert!(none.inference_config.is_none());
    }

    #[tokio::test]
    async fn test_stream_with_tool_use_and_usage() {
        let events = vec![
            Ok(ConverseEvent::TextDelta("Let me check.".to_string())),
            Ok(ConverseEvent::ToolUseStart {
                tool_use_id: "tu_1".to_string(),
                name: "get_weather".to_string(),
            }),
            Ok(ConverseEvent::ToolUseDelta("{\"location\":".to_string())),
            Ok(ConverseEvent::ToolUseDelta("\"Boston\"}".to_string())),
            Ok(ConverseEvent::MessageStop),
            Ok(ConverseEvent::Metadata(UsageMetadata::new(12, 8, 20))),
        ];
        let provider = provider(FakeApi::new(Box::pin(stream::iter(events))));

        let result = provider
            .chat_stream_with_usage(&CancellationToken::new(), &[Message::user("Weather?")])
            .await
            .unwrap();
        let (stream, usage) = result.into_parts();
        let fragments: Vec<String> = stream.collect().await;

        assert_eq!(
            fragments,
            vec![
                "Let me check.".to_string(),
                tool_call_start_marker("tu_1", "get_weather"),
                "{\"location\":".to_string(),
                "\"Boston\"}".to_string(),
            ]
        );
        assert_eq!(usage.get(), Some(UsageMetadata::new(12, 8, 20)));
    }

    #[tokio::test]
    async fn test_start_error_propagates() {
        let api = empty();
        api.events.lock().unwrap().take();
        let result = provider(api)
            .chat_stream(&CancellationToken::new(), &[Message::user("hi")])
            .await;
        assert!(matches!(result, Err(Error::ProviderUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_cancel_releases_vendor_stream() {
        let scripted = stream::iter(vec![Ok(ConverseEvent::TextDelta("first".to_string()))])
            .chain(stream::pending());
        let (tracked, released) = TrackedStream::new(Box::pin(scripted));
        let provider = provider(FakeApi::new(Box::pin(tracked)));

        let cancel = CancellationToken::new();
        let mut stream = provider
            .chat_stream(&cancel, &[Message::user("hi")])
            .await
            .unwrap();

        assert_eq!(stream.recv().await.as_deref(), Some("first"));
        cancel.cancel();
        assert_eq!(stream.recv().await, None);
        wait_released(&released).await;
    }
}

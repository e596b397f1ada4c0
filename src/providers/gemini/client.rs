use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use ijson::IValue;
use reqwest::{Client, RequestBuilder};
use serde_json::value::to_raw_value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::types::*;
use crate::provider::ChatProvider;
use crate::providers::start_stream;
use crate::sse_stream::SseStreamExt;
use crate::streaming::{fragment_channel, tool_call_start_marker, FragmentSender, StreamResult};
use crate::types::{
    parse_tool_arguments, validate_messages, Message, Role, Tool, ToolChoice, UsageHandle,
};
use crate::Error;

const PROVIDER: &str = "Gemini";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const GENERATIVE_LANGUAGE_URL: &str = "https://generativelanguage.googleapis.com";

/// Stream of decoded `GenerateContentResponse` chunks.
pub type GeminiResponseStream = Pin<Box<dyn Stream<Item = Result<GeminiResponse, Error>> + Send>>;

/// The part of the Gemini API this adapter depends on.
#[async_trait::async_trait]
pub trait GenerateContentApi: Send + Sync + 'static {
    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GeminiRequest,
    ) -> Result<GeminiResponseStream, Error>;
}

/// Authentication method for the Gemini HTTP API.
#[derive(Debug, Clone)]
pub enum GeminiAuth {
    /// Static OAuth access token, sent as a bearer header.
    AccessToken(String),
    /// Application Default Credentials.
    ApplicationDefault,
    /// Service account key in JSON form.
    ServiceAccount(String),
    /// Generative Language API key. Uses the public endpoint instead of Vertex AI.
    ApiKey(String),
}

/// [`GenerateContentApi`] over HTTPS, against Vertex AI or the Generative Language API.
pub struct HttpGenerateContentApi {
    client: Client,
    project_id: String,
    location: String,
    auth: GeminiAuth,
    token_provider: Option<Arc<dyn TokenProvider>>,
    base_url: Option<String>,
}

impl HttpGenerateContentApi {
    /// Build the client, resolving credentials up front for ADC and service accounts.
    pub async fn new(project_id: String, location: String, auth: GeminiAuth) -> Result<Self, Error> {
        let client = Client::builder().build()?;

        let token_provider: Option<Arc<dyn TokenProvider>> = match &auth {
            GeminiAuth::ApplicationDefault => Some(gcp_auth::provider().await.map_err(|e| {
                Error::auth(format!("failed to load application default credentials: {e}"))
            })?),
            GeminiAuth::ServiceAccount(json) => {
                let account = CustomServiceAccount::from_json(json)
                    .map_err(|e| Error::auth(format!("invalid service account key: {e}")))?;
                Some(Arc::new(account) as Arc<dyn TokenProvider>)
            }
            GeminiAuth::AccessToken(_) | GeminiAuth::ApiKey(_) => None,
        };

        Ok(Self {
            client,
            project_id,
            location,
            auth,
            token_provider,
            base_url: None,
        })
    }

    /// Point the client at a different host (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn endpoint(&self, model: &str) -> String {
        if let GeminiAuth::ApiKey(_) = self.auth {
            let base = self.base_url.as_deref().unwrap_or(GENERATIVE_LANGUAGE_URL);
            return format!(
                "{}/v1beta/models/{model}:streamGenerateContent?alt=sse",
                base.trim_end_matches('/')
            );
        }

        let path = format!(
            "v1/projects/{}/locations/{}/publishers/google/models/{model}:streamGenerateContent?alt=sse",
            self.project_id, self.location
        );
        match &self.base_url {
            Some(base) => format!("{}/{path}", base.trim_end_matches('/')),
            None => format!("https://{}-aiplatform.googleapis.com/{path}", self.location),
        }
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, Error> {
        match &self.auth {
            GeminiAuth::AccessToken(token) => Ok(request.bearer_auth(token)),
            GeminiAuth::ApiKey(key) => Ok(request.header("x-goog-api-key", key)),
            GeminiAuth::ApplicationDefault | GeminiAuth::ServiceAccount(_) => {
                let provider = self
                    .token_provider
                    .as_ref()
                    .ok_or_else(|| Error::auth("token provider not initialized"))?;
                let token = provider
                    .token(&[CLOUD_PLATFORM_SCOPE])
                    .await
                    .map_err(|e| Error::auth(format!("failed to get access token: {e}")))?;
                Ok(request.bearer_auth(token.as_str()))
            }
        }
    }
}

#[async_trait::async_trait]
impl GenerateContentApi for HttpGenerateContentApi {
    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GeminiRequest,
    ) -> Result<GeminiResponseStream, Error> {
        let builder = self.client.post(self.endpoint(model)).json(request);
        let response = self
            .authorize(builder)
            .await?
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(Error::provider(
                PROVIDER,
                format!("API error ({status}): {message}"),
            ));
        }

        let responses = response.bytes_stream().sse_events().filter_map(|event| async move {
            match event {
                Ok(event) => match serde_json::from_str::<GeminiResponse>(&event.data) {
                    Ok(response) => Some(Ok(response)),
                    Err(e) => {
                        tracing::debug!(provider = PROVIDER, error = %e, data = %event.data, "skipping unparseable SSE chunk");
                        None
                    }
                },
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(responses))
    }
}

/// Gemini provider implementation (Vertex AI or Generative Language API).
pub struct GeminiProvider {
    api: Arc<dyn GenerateContentApi>,
    model: String,
    temperature: Option<f32>,
}

impl GeminiProvider {
    /// Create a provider with the given authentication method.
    pub async fn new(
        project_id: String,
        location: String,
        model: String,
        auth: GeminiAuth,
    ) -> Result<Self, Error> {
        let api = HttpGenerateContentApi::new(project_id, location, auth).await?;
        Ok(Self::with_api(Arc::new(api), model))
    }

    /// Create a provider with Application Default Credentials.
    pub async fn with_adc(project_id: String, location: String, model: String) -> Result<Self, Error> {
        Self::new(project_id, location, model, GeminiAuth::ApplicationDefault).await
    }

    /// Create a provider over any implementation of the Gemini streaming API.
    pub fn with_api(api: Arc<dyn GenerateContentApi>, model: String) -> Self {
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

    /// Convert canonical messages and tools to a Gemini request.
    pub fn convert_request(
        &self,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
    ) -> Result<GeminiRequest, Error> {
        let mut contents: Vec<GeminiContent> = Vec::new();
        let mut system_parts = Vec::new();

        // Gemini keys function responses by name, not by call id.
        let call_names: HashMap<&str, &str> = messages
            .iter()
            .flat_map(|m| m.tool_calls.iter())
            .map(|call| (call.id.as_str(), call.function.name.as_str()))
            .collect();

        for message in messages {
            match message.role {
                Role::System => system_parts.push(GeminiPart::Text {
                    text: message.content.clone(),
                }),
                Role::User => contents.push(GeminiContent {
                    role: "user".to_string(),
                    parts: vec![GeminiPart::Text {
                        text: message.content.clone(),
                    }],
                }),
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !message.content.is_empty() {
                        parts.push(GeminiPart::Text {
                            text: message.content.clone(),
                        });
                    }
                    for call in &message.tool_calls {
                        let args = parse_tool_arguments(&call.function.arguments);
                        parts.push(GeminiPart::FunctionCall {
                            function_call: GeminiFunctionCall {
                                name: call.function.name.clone(),
                                args: serde_json::from_value::<IValue>(serde_json::Value::Object(args))?,
                            },
                        });
                    }
                    if !parts.is_empty() {
                        contents.push(GeminiContent {
                            role: "model".to_string(),
                            parts,
                        });
                    }
                }
                Role::Tool => {
                    let call_id = message.tool_call_id.as_deref().unwrap_or_default();
                    let name = call_names.get(call_id).copied().unwrap_or(call_id);
                    let part = GeminiPart::FunctionResponse {
                        function_response: GeminiFunctionResponse {
                            name: name.to_string(),
                            response: serde_json::from_value::<IValue>(
                                serde_json::json!({ "result": message.content }),
                            )?,
                        },
                    };

                    // Parallel tool results go back in a single user turn.
                    match contents.last_mut() {
                        Some(last) if last.role == "user" && is_function_response_turn(last) => {
                            last.parts.push(part)
                        }
                        _ => contents.push(GeminiContent {
                            role: "user".to_string(),
                            parts: vec![part],
                        }),
                    }
                }
            }
        }

        let (tools, tool_config) = match tool_choice {
            _ if tools.is_empty() => (None, None),
            ToolChoice::None => (None, None),
            ToolChoice::Auto => (
                Some(Self::convert_tools(tools)?),
                Some(tool_config(FunctionCallingMode::Auto)),
            ),
            ToolChoice::Required => (
                Some(Self::convert_tools(tools)?),
                Some(tool_config(FunctionCallingMode::Any)),
            ),
        };

        Ok(GeminiRequest {
            contents,
            system_instruction: (!system_parts.is_empty()).then(|| GeminiContent {
                role: "user".to_string(),
                parts: system_parts,
            }),
            generation_config: self.temperature.map(|temperature| GeminiGenerationConfig {
                temperature: Some(temperature),
            }),
            tools,
            tool_config,
        })
    }

    fn convert_tools(tools: &[Tool]) -> Result<Vec<GeminiTool>, Error> {
        let function_declarations = tools
            .iter()
            .map(|tool| {
                Ok(GeminiFunctionDeclaration {
                    name: tool.function.name.clone(),
                    description: tool.function.description.clone(),
                    parameters: to_raw_value(&tool.function.parameters)?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(vec![GeminiTool {
            function_declarations,
        }])
    }

    /// Fragments carried by one response chunk, in the order they must be forwarded.
    fn response_fragments(response: GeminiResponse, usage: &UsageHandle) -> Vec<String> {
        if let Some(metadata) = response.usage_metadata.filter(GeminiUsageMetadata::has_counts) {
            usage.set(metadata.into());
        }

        let mut fragments = Vec::new();
        let Some(candidate) = response.candidates.into_iter().next() else {
            return fragments;
        };

        for part in candidate.content.parts {
            match part {
                GeminiPart::Text { text } => {
                    if !text.is_empty() {
                        fragments.push(text);
                    }
                }
                GeminiPart::FunctionCall { function_call } => {
                    let id = format!("call_{}", Uuid::new_v4().simple());
                    fragments.push(tool_call_start_marker(&id, &function_call.name));
                    match serde_json::to_string(&function_call.args) {
                        Ok(args) => fragments.push(args),
                        Err(e) => {
                            tracing::debug!(provider = PROVIDER, error = %e, "unserializable function call args");
                            fragments.push("{}".to_string());
                        }
                    }
                }
                GeminiPart::FunctionResponse { .. } | GeminiPart::Other(_) => {}
            }
        }

        if let Some(reason) = candidate.finish_reason {
            tracing::debug!(provider = PROVIDER, finish_reason = %reason, "candidate finished");
        }

        fragments
    }

    async fn drain(mut responses: GeminiResponseStream, tx: FragmentSender, usage: UsageHandle) {
        loop {
            let response = match tx.next_event(&mut responses).await {
                None => {
                    tracing::debug!(provider = PROVIDER, "stream cancelled");
                    break;
                }
                Some(None) => break,
                Some(Some(Ok(response))) => response,
                Some(Some(Err(e))) => {
                    tracing::warn!(provider = PROVIDER, error = %e, "stream interrupted");
                    break;
                }
            };

            for fragment in Self::response_fragments(response, &usage) {
                if !tx.send(fragment).await {
                    return;
                }
            }
        }
    }
}

fn tool_config(mode: FunctionCallingMode) -> GeminiToolConfig {
    GeminiToolConfig {
        function_calling_config: GeminiFunctionCallingConfig { mode },
    }
}

fn is_function_response_turn(content: &GeminiContent) -> bool {
    content
        .parts
        .iter()
        .all(|part| matches!(part, GeminiPart::FunctionResponse { .. }))
}

#[async_trait::async_trait]
impl ChatProvider for GeminiProvider {
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

        let responses = start_stream(
            PROVIDER,
            cancel,
            self.api.stream_generate_content(&self.model, &request),
        )
        .await?;

        let (tx, stream) = fragment_channel(cancel);
        let usage = UsageHandle::new();
        tokio::spawn(Self::drain(responses, tx, usage.clone()));

        Ok(StreamResult::new(stream, usage))
    }
}

use ijson::{IObject, IValue};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::types::UsageMetadata;

/// Gemini `streamGenerateContent` request.
#[derive(Debug, Clone, Serialize)]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GeminiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<GeminiToolConfig>,
}

/// Gemini content (one conversation turn).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub role: String, // "user", "model"
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

/// Part of a Gemini content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    /// Any other part kind (`inlineData`, `executableCode`, ...). Must stay last.
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiFunctionCall {
    pub name: String,
    #[serde(default = "empty_args")]
    pub args: IValue,
}

fn empty_args() -> IValue {
    IObject::new().into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiFunctionResponse {
    pub name: String,
    pub response: IValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeminiTool {
    pub function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeminiFunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Box<RawValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeminiToolConfig {
    pub function_calling_config: GeminiFunctionCallingConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeminiFunctionCallingConfig {
    pub mode: FunctionCallingMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionCallingMode {
    Auto,
    Any,
}

/// One streamed `GenerateContentResponse`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default, rename = "usageMetadata")]
    pub usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: GeminiContent,
    #[serde(default, rename = "finishReason")]
    pub finish_reason: Option<String>,
}

/// Gemini usage metadata. Counts are cumulative across chunks.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount")]
    pub prompt_token_count: Option<i32>,
    #[serde(rename = "candidatesTokenCount")]
    pub candidates_token_count: Option<i32>,
    #[serde(rename = "totalTokenCount")]
    pub total_token_count: Option<i32>,
}

impl GeminiUsageMetadata {
    /// Whether any token count was reported (Vertex also sends bare `trafficType` objects).
    pub fn has_counts(&self) -> bool {
        self.prompt_token_count.is_some()
            || self.candidates_token_count.is_some()
            || self.total_token_count.is_some()
    }
}

impl From<GeminiUsageMetadata> for UsageMetadata {
    fn from(metadata: GeminiUsageMetadata) -> Self {
        let prompt = metadata.prompt_token_count.unwrap_or(0);
        let candidates = metadata.candidates_token_count.unwrap_or(0);
        UsageMetadata::new(
            prompt,
            candidates,
            metadata.total_token_count.unwrap_or(prompt + candidates),
        )
    }
}

/// Gemini error response body.
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiError {
    pub error: GeminiErrorDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiErrorDetails {
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

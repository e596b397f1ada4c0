use std::collections::HashMap;

use aws_sdk_bedrockruntime::types::{
    InferenceConfiguration, Message as BedrockMessage, SystemContentBlock, ToolConfiguration,
};
use aws_smithy_types::{Document, Number};

use crate::types::UsageMetadata;

/// Inputs of one `ConverseStream` call.
#[derive(Debug, Clone)]
pub struct ConverseStreamRequest {
    pub model_id: String,
    pub system: Vec<SystemContentBlock>,
    pub messages: Vec<BedrockMessage>,
    pub inference_config: Option<InferenceConfiguration>,
    pub tool_config: Option<ToolConfiguration>,
}

/// The subset of `ConverseStream` events the adapter reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ConverseEvent {
    /// A tool-use content block opened.
    ToolUseStart { tool_use_id: String, name: String },
    TextDelta(String),
    /// A piece of a tool call's JSON input.
    ToolUseDelta(String),
    Metadata(UsageMetadata),
    MessageStop,
}

/// Static credentials that bypass the default AWS provider chain.
#[derive(Debug, Clone)]
pub struct BedrockCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// Convert a JSON value into a Smithy document.
pub fn value_to_document(value: &serde_json::Value) -> Document {
    match value {
        serde_json::Value::Null => Document::Null,
        serde_json::Value::Bool(b) => Document::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Document::Number(Number::PosInt(u))
            } else if let Some(i) = n.as_i64() {
                Document::Number(Number::NegInt(i))
            } else {
                n.as_f64()
                    .map_or(Document::Null, |f| Document::Number(Number::Float(f)))
            }
        }
        serde_json::Value::String(s) => Document::String(s.clone()),
        serde_json::Value::Array(items) => {
            Document::Array(items.iter().map(value_to_document).collect())
        }
        serde_json::Value::Object(map) => Document::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_document(v)))
                .collect::<HashMap<_, _>>(),
        ),
    }
}

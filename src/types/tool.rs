use serde::{Deserialize, Serialize};

/// Tool definition for function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub r#type: ToolType,
    pub function: Function,
}

impl Tool {
    /// Declare a function tool.
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Tool {
            r#type: ToolType::Function,
            function: Function {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Type of tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Function,
}

/// Function definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value, // JSON Schema
}

/// Controls whether and how the model must invoke a declared tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// The model decides.
    #[default]
    Auto,
    /// No tool configuration is sent to the vendor.
    None,
    /// The model must call one of the declared tools.
    Required,
}

/// Decode tool-call arguments into a JSON object.
///
/// Anything that is not a JSON object decodes to `{}` instead of failing the call.
pub fn parse_tool_arguments(arguments: &str) -> serde_json::Map<String, serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(arguments) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => {
            tracing::debug!(kind = json_kind(&other), "tool arguments are not an object, using {{}}");
            serde_json::Map::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "malformed tool arguments, using {{}}");
            serde_json::Map::new()
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tool_arguments() {
        let args = parse_tool_arguments(r#"{"location":"Boston","days":3}"#);
        assert_eq!(args.get("location"), Some(&json!("Boston")));
        assert_eq!(args.get("days"), Some(&json!(3)));

        assert!(parse_tool_arguments("{not json").is_empty());
        assert!(parse_tool_arguments("").is_empty());
        assert!(parse_tool_arguments("[1,2]").is_empty());
    }

    #[test]
    fn test_tool_choice_default_is_auto() {
        assert_eq!(ToolChoice::default(), ToolChoice::Auto);
        assert_eq!(serde_json::to_value(ToolChoice::Required).unwrap(), json!("required"));
    }
}

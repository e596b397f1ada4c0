pub mod gemini;
pub mod openai;

use llm_chat_stream::{ChatProvider, Tool, ToolCall};
use wiremock::MockServer;

pub const SYSTEM_PROMPT: &str =
    "You have access to weather data. Use the get_weather function when asked about weather.";
pub const USER_PROMPT: &str = "What's the weather like in Paris?";
pub const FUNCTION_RESULT: &str =
    "The weather in Paris is sunny with a temperature of 22°C (72°F). Perfect weather for sightseeing!";

/// Create a weather function tool for testing
pub fn create_weather_tool() -> Tool {
    Tool::function(
        "get_weather",
        "Get the current weather for a location",
        serde_json::from_str(
            r#"{
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "The city and state, e.g. San Francisco, CA"
                    }
                },
                "required": ["location"]
            }"#,
        )
        .unwrap(),
    )
}

/// Load test fixture from file
pub fn load_fixture(filename: &str) -> String {
    std::fs::read_to_string(filename)
        .unwrap_or_else(|_| panic!("Failed to load test fixture: {filename}"))
}

/// Split a fragment sequence into assistant text and the tool calls it announced.
pub fn split_fragments(fragments: &[String]) -> (String, Vec<ToolCall>) {
    let mut text = String::new();
    let mut calls: Vec<ToolCall> = Vec::new();

    for fragment in fragments {
        let marker = serde_json::from_str::<serde_json::Value>(fragment)
            .ok()
            .filter(|value| value["type"] == "tool_call_start");

        match (marker, calls.last_mut()) {
            (Some(marker), _) => calls.push(ToolCall::function(
                marker["id"].as_str().unwrap(),
                marker["function"]["name"].as_str().unwrap(),
                "",
            )),
            (None, Some(call)) => call.function.arguments.push_str(fragment),
            (None, None) => text.push_str(fragment),
        }
    }

    (text, calls)
}

/// Trait for provider-specific test setup
#[async_trait::async_trait]
pub trait ProviderTestSetup {
    const NAME: &'static str;

    /// Create the provider instance against the mock server
    async fn create_provider(base_url: &str) -> Box<dyn ChatProvider>;

    /// Mount the required mocks for function calling test on the provided mock server
    async fn mount_function_calling_mocks(mock_server: &MockServer);
}

use super::{
    create_weather_tool, load_fixture, ProviderTestSetup, FUNCTION_RESULT, SYSTEM_PROMPT,
    USER_PROMPT,
};
use llm_chat_stream::{ChatProvider, ProviderConfig, ProviderFactory};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct OpenAITestSetup;

#[async_trait::async_trait]
impl ProviderTestSetup for OpenAITestSetup {
    const NAME: &'static str = "OpenAI";

    async fn create_provider(base_url: &str) -> Box<dyn ChatProvider> {
        let config = ProviderConfig::openai("test-api-key".to_string(), "gpt-4o-mini".to_string())
            .with_base_url(base_url.to_string())
            .with_temperature(Some(0.7));
        ProviderFactory::create(&config)
            .await
            .expect("Failed to create OpenAI provider")
    }

    async fn mount_function_calling_mocks(mock_server: &MockServer) {
        let weather_tool = create_weather_tool();
        let initial_request_payload = json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": USER_PROMPT}
            ],
            "stream": true,
            "temperature": 0.7,
            "tools": [
                {
                    "type": "function",
                    "function": {
                        "name": weather_tool.function.name,
                        "description": weather_tool.function.description,
                        "parameters": weather_tool.function.parameters
                    }
                }
            ],
            "tool_choice": "auto",
            "stream_options": {"include_usage": true}
        });

        let followup_request_payload = json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": USER_PROMPT},
                {
                    "role": "assistant",
                    "content": "I'll help you get the weather for Paris.",
                    "tool_calls": [{
                        "id": "call_abc123def456",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"location\":\"Paris\"}"}
                    }]
                },
                {"role": "tool", "content": FUNCTION_RESULT, "tool_call_id": "call_abc123def456"}
            ],
            "stream": true,
            "temperature": 0.7,
            "stream_options": {"include_usage": true}
        });

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-api-key"))
            .and(body_json(initial_request_payload))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(load_fixture(
                        "tests/cross_provider/fixtures/openai/function_call_response.sse",
                    ))
                    .insert_header("content-type", "text/event-stream")
                    .insert_header("cache-control", "no-cache"),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_json(followup_request_payload))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(load_fixture(
                        "tests/cross_provider/fixtures/openai/followup_response.sse",
                    ))
                    .insert_header("content-type", "text/event-stream")
                    .insert_header("cache-control", "no-cache"),
            )
            .expect(1)
            .mount(mock_server)
            .await;
    }
}

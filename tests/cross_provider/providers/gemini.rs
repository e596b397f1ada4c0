use super::{
    create_weather_tool, load_fixture, ProviderTestSetup, FUNCTION_RESULT, SYSTEM_PROMPT,
    USER_PROMPT,
};
use llm_chat_stream::providers::gemini::GeminiAuth;
use llm_chat_stream::{ChatProvider, ProviderConfig, ProviderFactory};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct GeminiTestSetup;

const ENDPOINT: &str = "/v1/projects/test-project/locations/europe-west1/publishers/google/models/gemini-1.5-pro:streamGenerateContent";

#[async_trait::async_trait]
impl ProviderTestSetup for GeminiTestSetup {
    const NAME: &'static str = "Gemini";

    async fn create_provider(base_url: &str) -> Box<dyn ChatProvider> {
        let config = ProviderConfig::gemini(
            "test-project".to_string(),
            "europe-west1".to_string(),
            "gemini-1.5-pro".to_string(),
        )
        .with_gemini_auth(GeminiAuth::AccessToken("test-access-token".to_string()))
        .with_base_url(base_url.to_string())
        .with_temperature(Some(0.7));
        ProviderFactory::create(&config)
            .await
            .expect("Failed to create Gemini provider")
    }

    async fn mount_function_calling_mocks(mock_server: &MockServer) {
        let weather_tool = create_weather_tool();
        let system_instruction = json!({
            "role": "user",
            "parts": [{"text": SYSTEM_PROMPT}]
        });

        let initial_request_payload = json!({
            "contents": [
                {"role": "user", "parts": [{"text": USER_PROMPT}]}
            ],
            "system_instruction": system_instruction,
            "generation_config": {"temperature": 0.7},
            "tools": [{
                "function_declarations": [{
                    "name": weather_tool.function.name,
                    "description": weather_tool.function.description,
                    "parameters": weather_tool.function.parameters
                }]
            }],
            "tool_config": {"function_calling_config": {"mode": "AUTO"}}
        });

        let followup_request_payload = json!({
            "contents": [
                {"role": "user", "parts": [{"text": USER_PROMPT}]},
                {
                    "role": "model",
                    "parts": [
                        {"text": "I'll help you get the weather for Paris."},
                        {"functionCall": {"name": "get_weather", "args": {"location": "Paris"}}}
                    ]
                },
                {
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": "get_weather",
                            "response": {"result": FUNCTION_RESULT}
                        }
                    }]
                }
            ],
            "system_instruction": system_instruction,
            "generation_config": {"temperature": 0.7}
        });

        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .and(query_param("alt", "sse"))
            .and(header("authorization", "Bearer test-access-token"))
            .and(body_json(initial_request_payload))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(load_fixture(
                        "tests/cross_provider/fixtures/gemini/function_call_response.sse",
                    ))
                    .insert_header("content-type", "text/event-stream")
                    .insert_header("cache-control", "no-cache"),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .and(query_param("alt", "sse"))
            .and(body_json(followup_request_payload))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(load_fixture(
                        "tests/cross_provider/fixtures/gemini/followup_response.sse",
                    ))
                    .insert_header("content-type", "text/event-stream")
                    .insert_header("cache-control", "no-cache"),
            )
            .expect(1)
            .mount(mock_server)
            .await;
    }
}

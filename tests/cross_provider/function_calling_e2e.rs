use llm_chat_stream::{ChatProvider, Message, ToolChoice};
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

use super::providers::{
    create_weather_tool, gemini::GeminiTestSetup, openai::OpenAITestSetup, split_fragments,
    ProviderTestSetup, FUNCTION_RESULT, SYSTEM_PROMPT, USER_PROMPT,
};

/// Run the function calling round trip for a specific provider
async fn run_function_calling_test<T: ProviderTestSetup>() {
    let mock_server = MockServer::start().await;
    T::mount_function_calling_mocks(&mock_server).await;

    let provider = T::create_provider(&mock_server.uri()).await;
    let cancel = CancellationToken::new();

    let mut conversation = vec![Message::system(SYSTEM_PROMPT), Message::user(USER_PROMPT)];

    // The first mock only matches the exact payload with the tool declared.
    let result = provider
        .chat_stream_with_tools_and_usage(
            &cancel,
            &conversation,
            &[create_weather_tool()],
            ToolChoice::Auto,
        )
        .await
        .unwrap_or_else(|e| panic!("{}: initial request failed: {e}", T::NAME));

    let (stream, usage) = result.into_parts();
    let fragments: Vec<String> = futures_util::StreamExt::collect(stream).await;
    let (text, calls) = split_fragments(&fragments);

    assert_eq!(text, "I'll help you get the weather for Paris.", "{}", T::NAME);
    assert_eq!(calls.len(), 1, "{}: expected one tool call", T::NAME);
    assert_eq!(calls[0].function.name, "get_weather");
    let args: serde_json::Value = serde_json::from_str(&calls[0].function.arguments).unwrap();
    assert_eq!(args["location"], "Paris", "{}", T::NAME);

    let usage = usage.get().unwrap_or_else(|| panic!("{}: usage missing", T::NAME));
    assert!(usage.prompt_token_count > 0);
    assert_eq!(
        usage.total_token_count,
        usage.prompt_token_count + usage.candidates_token_count
    );

    // Answer the tool call and ask again without tools.
    let call_id = calls[0].id.clone();
    conversation.push(Message::assistant_with_tool_calls(text, calls));
    conversation.push(Message::tool(call_id, FUNCTION_RESULT));

    let followup = provider
        .chat_stream(&cancel, &conversation)
        .await
        .unwrap_or_else(|e| panic!("{}: follow-up request failed: {e}", T::NAME));

    assert_eq!(followup.collect_text().await, "It's sunny in Paris, 22°C.", "{}", T::NAME);
}

#[tokio::test]
async fn test_openai_function_calling_e2e() {
    run_function_calling_test::<OpenAITestSetup>().await;
}

#[tokio::test]
async fn test_gemini_function_calling_e2e() {
    run_function_calling_test::<GeminiTestSetup>().await;
}

//! Function calling round trip with any configured provider.
//!
//! ```bash
//! export LLM_PROVIDER=gemini GEMINI_PROJECT_ID=... GEMINI_LOCATION=us-central1 GEMINI_MODEL=gemini-1.5-flash
//! cargo run --example tool_calling
//! ```

use futures_util::StreamExt;
use llm_chat_stream::{ChatProvider, Message, ProviderFactory, Tool, ToolCall, ToolChoice};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Rebuild text and tool calls from the fragment sequence.
fn split_fragments(fragments: &[String]) -> (String, Vec<ToolCall>) {
    let mut text = String::new();
    let mut calls: Vec<ToolCall> = Vec::new();

    for fragment in fragments {
        let marker = serde_json::from_str::<serde_json::Value>(fragment)
            .ok()
            .filter(|value| value["type"] == "tool_call_start");

        match (marker, calls.last_mut()) {
            (Some(marker), _) => calls.push(ToolCall::function(
                marker["id"].as_str().unwrap_or_default(),
                marker["function"]["name"].as_str().unwrap_or_default(),
                "",
            )),
            (None, Some(call)) => call.function.arguments.push_str(fragment),
            (None, None) => text.push_str(fragment),
        }
    }

    (text, calls)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let provider = ProviderFactory::from_env().await?;
    let cancel = CancellationToken::new();

    let weather_tool = Tool::function(
        "get_weather",
        "Get the current weather for a location",
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and state, e.g. San Francisco, CA"
                }
            },
            "required": ["location"]
        }),
    );

    println!("=== Function Calling Example ({}) ===", provider.name());
    let mut conversation = vec![
        Message::system("You have access to weather data. Use the get_weather function when asked about weather."),
        Message::user("What's the weather like in Paris?"),
    ];

    let stream = provider
        .chat_stream_with_tools(&cancel, &conversation, &[weather_tool], ToolChoice::Required)
        .await?;
    let fragments: Vec<String> = stream.collect().await;
    let (text, calls) = split_fragments(&fragments);

    println!("AI response: {text}");
    if calls.is_empty() {
        println!("No function call was made.");
        return Ok(());
    }

    conversation.push(Message::assistant_with_tool_calls(text, calls.clone()));
    for call in &calls {
        println!("[Function call: {} with args: {}]", call.function.name, call.function.arguments);
        let result = if call.function.name == "get_weather" {
            "The weather in Paris is 22°C and partly cloudy."
        } else {
            "Function result not available."
        };
        conversation.push(Message::tool(call.id.clone(), result));
    }

    let result = provider.chat_stream_with_usage(&cancel, &conversation).await?;
    let (stream, usage) = result.into_parts();
    println!("Final AI response: {}", stream.collect_text().await);
    if let Some(usage) = usage.get() {
        println!(
            "Usage: {} prompt + {} completion = {} tokens",
            usage.prompt_token_count, usage.candidates_token_count, usage.total_token_count
        );
    }

    Ok(())
}

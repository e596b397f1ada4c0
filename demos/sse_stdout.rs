//! Stream a chat completion to stdout in the framed SSE wire format.
//!
//! The provider is picked from the environment (see the crate docs):
//!
//! ```bash
//! export LLM_PROVIDER=openai OPENAI_API_KEY=... OPENAI_MODEL=gpt-4o-mini
//! RUST_LOG=llm_chat_stream=debug cargo run --example sse_stdout -- "Tell me a joke"
//! ```
//!
//! The request is abandoned after two minutes.

use std::time::Duration;

use llm_chat_stream::{cancel_after, ChatProvider, Message, ProviderFactory, SseTranscoder};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Say something".to_string());

    let provider = ProviderFactory::from_env().await?;
    eprintln!("Using {} provider", provider.name());

    let root = CancellationToken::new();
    let cancel = cancel_after(&root, Duration::from_secs(120));

    let ctrl_c = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let messages = [
        Message::system("You are a helpful assistant that responds concisely."),
        Message::user(question),
    ];
    let result = provider.chat_stream_with_usage(&cancel, &messages).await?;
    let (stream, usage) = result.into_parts();

    let mut stdout = tokio::io::stdout();
    let outcome = SseTranscoder::new()
        .run(&cancel, &mut stdout, stream, Some(&usage))
        .await?;

    eprintln!("Finished: {outcome:?}, usage: {:?}", usage.get());
    Ok(())
}

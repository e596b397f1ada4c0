//! Provider-agnostic streaming chat adapters with an SSE wire transcoder.
//!
//! One [`ChatProvider`] contract covers OpenAI, Google Gemini (Vertex AI or the
//! Generative Language API) and AWS Bedrock. Each adapter turns canonical
//! [`Message`]s and [`Tool`]s into the vendor request, drains the vendor stream
//! on its own task and forwards text and tool-call fragments, in order, through
//! a [`FragmentStream`]. Token usage arrives separately through a [`UsageHandle`].
//!
//! [`SseTranscoder`] frames a fragment stream for the browser:
//!
//! ```no_run
//! use llm_chat_stream::{ChatProvider, Message, ProviderFactory, SseTranscoder};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), llm_chat_stream::Error> {
//! let provider = ProviderFactory::from_env().await?;
//! let cancel = CancellationToken::new();
//! let result = provider
//!     .chat_stream_with_usage(&cancel, &[Message::user("Say something")])
//!     .await?;
//!
//! let (stream, usage) = result.into_parts();
//! let mut stdout = tokio::io::stdout();
//! SseTranscoder::new()
//!     .run(&cancel, &mut stdout, stream, Some(&usage))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Environment variables read by [`ProviderConfig::from_env`]:
//!
//! | Vendor | Variables |
//! | --- | --- |
//! | all | `LLM_PROVIDER` (`openai`, `gemini`, `bedrock`), `TEMPERATURE` |
//! | OpenAI | `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_BASE_URL` |
//! | Gemini | `GEMINI_MODEL`, `GEMINI_PROJECT_ID`, `GEMINI_LOCATION`, `GEMINI_ACCESS_TOKEN`, `GEMINI_CREDENTIALS_JSON`, `GEMINI_API_KEY` |
//! | Bedrock | `BEDROCK_MODEL`, `AWS_REGION` (default `us-east-1`) |

pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod sse_stream;
pub mod streaming;
pub mod transcoder;
pub mod types;

pub use error::Error;
pub use factory::{ProviderConfig, ProviderFactory, ProviderType};
pub use provider::ChatProvider;
pub use providers::{BedrockProvider, GeminiProvider, OpenAIProvider};
pub use sse_stream::SseEvent;
pub use streaming::{cancel_after, tool_call_start_marker, FragmentStream, StreamResult};
pub use transcoder::{sse_headers, SseTranscoder, TranscodeOutcome};
pub use types::*;

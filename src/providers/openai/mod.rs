//! OpenAI Chat Completions adapter.

pub mod client;
pub mod types;

pub use client::{ChatCompletionsApi, ChunkStream, HttpChatCompletionsApi, OpenAIProvider};

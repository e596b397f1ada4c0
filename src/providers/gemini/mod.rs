//! Google Gemini adapter (Vertex AI and Generative Language API).

pub mod client;
pub mod types;

pub use client::{
    GeminiAuth, GeminiProvider, GeminiResponseStream, GenerateContentApi, HttpGenerateContentApi,
};

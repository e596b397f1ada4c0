//! AWS Bedrock adapter built on the Converse streaming API.

pub mod client;
pub mod types;

pub use client::{BedrockProvider, ConverseEventStream, ConverseStreamApi, SdkConverseApi, DEFAULT_REGION};
pub use types::{BedrockCredentials, ConverseEvent, ConverseStreamRequest};

//! Language-model integration
//!
//! The pipeline consumes a single call-and-response capability: submit a
//! bounded-size prompt, receive either a completion or a typed failure.
//! Retry and backoff policy belongs to the content generator; providers
//! only classify what went wrong.

mod client;
mod prompt;
mod providers;

pub use client::{LlmClient, LlmFailure};
pub use prompt::build_section_prompt;
pub use providers::{create_client, AnthropicClient, OpenAiClient, StubClient};

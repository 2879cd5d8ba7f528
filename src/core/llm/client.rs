use thiserror::Error;

/// Typed failure signalled by an LLM provider.
///
/// Providers classify; the caller owns the retry policy.
#[derive(Debug, Clone, Error)]
pub enum LlmFailure {
    #[error("rate limited by provider")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("provider server error: {0}")]
    ServerError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl LlmFailure {
    /// Whether a retry with backoff has any chance of succeeding
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Timeout | Self::ServerError(_)
        )
    }
}

/// Trait for LLM providers the content generator can dispatch to
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Submit one prompt and await its completion text
    async fn complete(&self, prompt: &str) -> std::result::Result<String, LlmFailure>;

    /// Get the provider name (e.g. "OpenAI", "Anthropic")
    fn provider_name(&self) -> &str;

    /// Get the model name being used
    fn model_name(&self) -> &str;
}

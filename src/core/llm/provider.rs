use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::RetryConfig;

/// The closed set of supported LLM services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic Messages API
    Claude,

    /// Google Generative Language API
    Gemini,

    /// OpenAI Chat Completions API
    #[value(name = "openai")]
    OpenAi,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Claude, ProviderKind::Gemini, ProviderKind::OpenAi];

    /// Environment variable holding this provider's API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "ANTHROPIC_API_KEY",
            ProviderKind::Gemini => "GOOGLE_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "Anthropic Claude",
            ProviderKind::Gemini => "Google Gemini",
            ProviderKind::OpenAi => "OpenAI",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Claude => write!(f, "claude"),
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

/// Token counts reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Raw response of one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Response text, treated as opaque
    pub text: String,

    /// Usage as reported by the API, when present
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("authentication failed ({status}): {body}")]
    Authentication { status: u16, body: String },

    #[error("rate limit still exceeded after {attempts} attempt(s): {body}")]
    RateLimited { attempts: u32, body: String },

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

impl ProviderError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ProviderError::Authentication { status, body },
            429 => ProviderError::RateLimited { attempts: 1, body },
            _ => ProviderError::Api { status, body },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network(_) | ProviderError::RateLimited { .. } => true,
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::Authentication { .. } | ProviderError::MalformedResponse(_) => false,
        }
    }
}

/// Uniform capability every provider exposes to the pipeline
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send one prompt and return the response text
    async fn invoke(&self, prompt: &str) -> Result<Completion, ProviderError>;

    fn kind(&self) -> ProviderKind;

    fn model_name(&self) -> &str;
}

/// Exponential backoff for transient provider failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, kind: ProviderKind, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        kind, attempt, self.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(ProviderError::RateLimited { body, .. }) => {
                    return Err(ProviderError::RateLimited { attempts: attempt, body });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{LlmConfig, ProviderConfig};
use super::provider::{
    Completion, LlmProvider, ProviderError, ProviderKind, RetryPolicy, TokenUsage,
};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Build the provider for `kind` from its config section and resolved API key
pub fn create_provider(kind: ProviderKind, config: &LlmConfig, api_key: String) -> Box<dyn LlmProvider> {
    let settings = config.provider(kind).clone();
    let retry = RetryPolicy::from(&config.retry);

    match kind {
        ProviderKind::Claude => Box::new(ClaudeProvider::new(settings, api_key, retry)),
        ProviderKind::Gemini => Box::new(GeminiProvider::new(settings, api_key, retry)),
        ProviderKind::OpenAi => Box::new(OpenAiProvider::new(settings, api_key, retry)),
    }
}

/// POST `body` as JSON and return the decoded response, mapping HTTP failures
async fn post_json(request: reqwest::RequestBuilder, body: &Value) -> Result<Value, ProviderError> {
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status.as_u16(), error_text));
    }

    Ok(response.json().await?)
}

fn base_url<'a>(settings: &'a ProviderConfig, default: &'a str) -> &'a str {
    settings
        .base_url
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
}

/// Anthropic Messages API
pub struct ClaudeProvider {
    client: reqwest::Client,
    settings: ProviderConfig,
    api_key: String,
    retry: RetryPolicy,
}

impl ClaudeProvider {
    pub fn new(settings: ProviderConfig, api_key: String, retry: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            api_key,
            retry,
        }
    }

    fn build_request_body(settings: &ProviderConfig, prompt: &str) -> Value {
        let mut body = json!({
            "model": settings.model,
            "max_tokens": settings.max_tokens,
            "temperature": settings.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        if let Some(system) = &settings.system_prompt {
            body["system"] = json!(system);
        }

        body
    }

    fn parse_response(response: &Value) -> Result<Completion, ProviderError> {
        let text = response["content"][0]["text"]
            .as_str()
            .ok_or_else(|| ProviderError::MalformedResponse("missing content[0].text".into()))?
            .to_string();

        let usage = response.get("usage").map(|u| TokenUsage {
            prompt_tokens: u["input_tokens"].as_u64().unwrap_or(0),
            completion_tokens: u["output_tokens"].as_u64().unwrap_or(0),
        });

        Ok(Completion { text, usage })
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    async fn invoke(&self, prompt: &str) -> Result<Completion, ProviderError> {
        let url = format!("{}/messages", base_url(&self.settings, ANTHROPIC_BASE_URL));
        let body = Self::build_request_body(&self.settings, prompt);

        debug!("Claude request to {} (model={})", url, self.settings.model);

        let response = self
            .retry
            .run(ProviderKind::Claude, || {
                let request = self
                    .client
                    .post(url.as_str())
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION);
                post_json(request, &body)
            })
            .await?;

        Self::parse_response(&response)
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

/// Google Generative Language API
pub struct GeminiProvider {
    client: reqwest::Client,
    settings: ProviderConfig,
    api_key: String,
    retry: RetryPolicy,
}

impl GeminiProvider {
    pub fn new(settings: ProviderConfig, api_key: String, retry: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            api_key,
            retry,
        }
    }

    fn build_request_body(settings: &ProviderConfig, prompt: &str) -> Value {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": settings.temperature,
                "maxOutputTokens": settings.max_tokens,
            },
        });

        if let Some(system) = &settings.system_prompt {
            body["system_instruction"] = json!({ "parts": [{ "text": system }] });
        }

        body
    }

    fn parse_response(response: &Value) -> Result<Completion, ProviderError> {
        let parts = response["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| {
                ProviderError::MalformedResponse("missing candidates[0].content.parts".into())
            })?;

        let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();

        let usage = response.get("usageMetadata").map(|u| TokenUsage {
            prompt_tokens: u["promptTokenCount"].as_u64().unwrap_or(0),
            completion_tokens: u["candidatesTokenCount"].as_u64().unwrap_or(0),
        });

        Ok(Completion { text, usage })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn invoke(&self, prompt: &str) -> Result<Completion, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            base_url(&self.settings, GEMINI_BASE_URL),
            self.settings.model
        );
        let body = Self::build_request_body(&self.settings, prompt);

        debug!("Gemini request to model={}", self.settings.model);

        let response = self
            .retry
            .run(ProviderKind::Gemini, || {
                let request = self.client.post(url.as_str()).header("x-goog-api-key", &self.api_key);
                post_json(request, &body)
            })
            .await?;

        Self::parse_response(&response)
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

/// OpenAI Chat Completions API
pub struct OpenAiProvider {
    client: reqwest::Client,
    settings: ProviderConfig,
    api_key: String,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    pub fn new(settings: ProviderConfig, api_key: String, retry: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            api_key,
            retry,
        }
    }

    fn build_request_body(settings: &ProviderConfig, prompt: &str) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &settings.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        json!({
            "model": settings.model,
            "messages": messages,
            "max_tokens": settings.max_tokens,
            "temperature": settings.temperature,
        })
    }

    fn parse_response(response: &Value) -> Result<Completion, ProviderError> {
        let text = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ProviderError::MalformedResponse("missing choices[0].message.content".into())
            })?
            .to_string();

        let usage = response.get("usage").map(|u| TokenUsage {
            prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
        });

        Ok(Completion { text, usage })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn invoke(&self, prompt: &str) -> Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", base_url(&self.settings, OPENAI_BASE_URL));
        let body = Self::build_request_body(&self.settings, prompt);

        debug!("OpenAI request to {} (model={})", url, self.settings.model);

        let response = self
            .retry
            .run(ProviderKind::OpenAi, || {
                let request = self.client.post(url.as_str()).bearer_auth(&self.api_key);
                post_json(request, &body)
            })
            .await?;

        Self::parse_response(&response)
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

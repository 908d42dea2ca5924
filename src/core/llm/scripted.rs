use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::provider::{Completion, LlmProvider, ProviderError, ProviderKind, TokenUsage};

/// Test double that replays canned responses and records every prompt
pub struct ScriptedProvider {
    kind: ProviderKind,
    responses: Mutex<VecDeque<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(kind: ProviderKind, responses: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            kind,
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(responses: &[&str]) -> Self {
        Self::new(
            ProviderKind::OpenAi,
            responses.iter().map(|r| Ok(r.to_string())).collect(),
        )
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn invoke(&self, prompt: &str) -> Result<Completion, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::MalformedResponse("script exhausted".into())));

        next.map(|text| Completion {
            usage: Some(TokenUsage {
                prompt_tokens: 100,
                completion_tokens: text.len() as u64,
            }),
            text,
        })
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

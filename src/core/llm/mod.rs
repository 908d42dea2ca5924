//! LLM invocation layer
//!
//! Each supported service implements [`LlmProvider`], so the pipeline only
//! ever sees a uniform `invoke(prompt)` capability. Transient failures are
//! retried inside the provider; everything else surfaces as a
//! [`ProviderError`].

mod provider;
mod providers;
#[cfg(test)]
pub(crate) mod scripted;

pub use provider::{LlmProvider, ProviderError, ProviderKind, TokenUsage};
pub use providers::create_provider;

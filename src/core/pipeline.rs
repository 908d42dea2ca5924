//! Sequential split → invoke → aggregate pipeline shared by both documenters.

use regex::Regex;
use std::fmt;
use tracing::{debug, error, info};

use crate::config::ProviderConfig;
use crate::error::{DocscribeError, Result};
use super::aggregator::{AggregatedDocument, Aggregator};
use super::chunker::{Chunk, ChunkSplitter};
use super::llm::{LlmProvider, TokenUsage};
use super::prompt::{PromptBuilder, PromptContext, PromptKind};
use super::tokens::TokenCounter;
use super::usage::UsageLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Splitting,
    PerChunkProcessing(usize),
    Aggregating,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    fn can_move_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        match (*self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Idle, Splitting) => true,
            (Splitting, PerChunkProcessing(0)) => true,
            (PerChunkProcessing(i), PerChunkProcessing(j)) => j == i + 1,
            (PerChunkProcessing(_), Aggregating) => true,
            (Aggregating, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Splitting => write!(f, "Splitting"),
            PipelineState::PerChunkProcessing(i) => write!(f, "PerChunkProcessing({})", i),
            PipelineState::Aggregating => write!(f, "Aggregating"),
            PipelineState::Done => write!(f, "Done"),
            PipelineState::Failed => write!(f, "Failed"),
        }
    }
}

/// Tracks the pipeline's state and rejects illegal transitions
#[derive(Debug)]
pub struct StateMachine {
    state: PipelineState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self { state: PipelineState::Idle }
    }
}

impl StateMachine {
    #[cfg(test)]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        if !self.state.can_move_to(next) {
            return Err(DocscribeError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!("Pipeline {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Move to `Failed` and hand back the error that caused it
    fn fail(&mut self, err: DocscribeError) -> DocscribeError {
        if !self.state.is_terminal() {
            debug!("Pipeline {} -> Failed", self.state);
            self.state = PipelineState::Failed;
        }
        err
    }
}

/// Removes one Markdown code fence wrapped around a whole response
pub struct FenceStripper {
    pattern: Regex,
}

impl FenceStripper {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r"(?s)\A\s*```[\w+#.-]*[ \t]*\r?\n(.*?)\r?\n?```\s*\z")?,
        })
    }

    pub fn strip(&self, response: &str) -> String {
        match self.pattern.captures(response) {
            Some(caps) => {
                let mut body = caps[1].to_string();
                if !body.is_empty() && !body.ends_with('\n') {
                    body.push('\n');
                }
                body
            }
            None => response.to_string(),
        }
    }
}

/// One source unit ready for documentation
#[derive(Debug, Clone, Copy)]
pub struct SourceUnit<'a> {
    pub identifier: &'a str,
    pub content: &'a str,
    pub language: &'a str,
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub document: AggregatedDocument,

    pub chunk_count: usize,

    /// Usage of this run alone
    pub usage: UsageLedger,
}

/// Drives one source unit through split → invoke → aggregate
pub struct DocumentPipeline<'p> {
    pub provider: &'p dyn LlmProvider,
    pub prompts: &'p PromptBuilder,
    pub pricing: &'p ProviderConfig,
    pub tokens: &'p TokenCounter,
    pub splitter: ChunkSplitter,
    pub prompt_kind: PromptKind,
    /// Applied to every response before aggregation
    pub fence_stripper: Option<&'p FenceStripper>,
    pub separator: &'p str,
}

impl DocumentPipeline<'_> {
    fn clean(&self, response: String) -> String {
        match self.fence_stripper {
            Some(stripper) => stripper.strip(&response),
            None => response,
        }
    }

    /// Run the pipeline. `ledger` accumulates usage across runs of the process.
    pub async fn run(&self, source: &SourceUnit<'_>, ledger: &mut UsageLedger) -> Result<PipelineOutput> {
        let mut machine = StateMachine::default();
        machine.advance(PipelineState::Splitting)?;

        // Split fully first: an oversized line fails the run before any provider call.
        let chunks: Vec<Chunk<'_>> = self
            .splitter
            .split(source.content)
            .collect::<Result<_>>()
            .map_err(|e| machine.fail(e))?;
        let total = chunks.len();

        info!(
            "Split {} into {} chunk(s) (limit {} chars, {} boundaries)",
            source.identifier,
            total,
            self.splitter.limit(),
            self.splitter.boundary()
        );

        let mut aggregator = Aggregator::new(total).with_separator(self.separator);
        let mut run_usage = UsageLedger::new();

        for chunk in &chunks {
            machine.advance(PipelineState::PerChunkProcessing(chunk.index))?;
            info!("Processing chunk {} of {}...", chunk.index + 1, total);

            let prompt = self
                .prompts
                .render(
                    self.prompt_kind,
                    &PromptContext {
                        identifier: source.identifier,
                        code: chunk.content,
                        part: chunk.index + 1,
                        total_parts: total,
                        language: source.language,
                    },
                )
                .map_err(|e| machine.fail(e))?;

            let completion = match self.provider.invoke(&prompt).await {
                Ok(completion) => completion,
                Err(source_err) => {
                    error!(
                        "{} failed on chunk {} of {}: {}",
                        self.provider.kind(),
                        chunk.index + 1,
                        total,
                        source_err
                    );
                    return Err(machine.fail(DocscribeError::Provider {
                        provider: self.provider.kind(),
                        chunk: chunk.index,
                        source: source_err,
                    }));
                }
            };

            let usage = completion.usage.unwrap_or_else(|| TokenUsage {
                prompt_tokens: self.tokens.count(&prompt) as u64,
                completion_tokens: self.tokens.count(&completion.text) as u64,
            });
            let cost = ledger.record(usage, self.pricing);
            run_usage.record(usage, self.pricing);
            info!(
                "Chunk {} used {} tokens (~${:.4}) on {}",
                chunk.index + 1,
                usage.total(),
                cost,
                self.provider.model_name()
            );

            aggregator
                .record(chunk.index, self.clean(completion.text))
                .map_err(|e| machine.fail(e))?;
        }

        machine.advance(PipelineState::Aggregating)?;
        let document = aggregator.finish().map_err(|e| machine.fail(e))?;
        machine.advance(PipelineState::Done)?;

        Ok(PipelineOutput {
            document,
            chunk_count: total,
            usage: run_usage,
        })
    }
}

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{ProviderConfig, RepoDocConfig};
use crate::error::{DocscribeError, Result};
use super::chunker::{Boundary, ChunkSplitter};
use super::ingest::RepositoryIngester;
use super::llm::LlmProvider;
use super::pipeline::{DocumentPipeline, SourceUnit};
use super::prompt::{PromptBuilder, PromptKind};
use super::tokens::{estimate_tokens, TokenCounter};
use super::usage::{content_hash, UsageLedger};

/// Markdown documentation for one repository
#[derive(Debug, Clone)]
pub struct RepoDocumentation {
    pub markdown: String,
    pub chunk_count: usize,
    pub file_count: usize,
    /// Size of the serialized repository in bytes
    pub source_bytes: usize,
    /// SHA-256 of the serialized repository
    pub content_hash: String,
    pub total_tokens: u64,
    pub estimated_cost: f64,
}

/// Per-run overrides of the configured chunking
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkingOverrides {
    pub chunk_size: Option<usize>,
    pub boundary: Option<Boundary>,
}

pub struct RepoDocumenter {
    settings: RepoDocConfig,
    ingester: RepositoryIngester,
    prompts: PromptBuilder,
    tokens: TokenCounter,
}

impl RepoDocumenter {
    pub fn new(settings: &RepoDocConfig, tokens: TokenCounter) -> Result<Self> {
        Ok(Self {
            settings: settings.clone(),
            ingester: RepositoryIngester::new(&settings.extensions),
            prompts: PromptBuilder::new(None, settings.template.as_deref())?,
            tokens,
        })
    }

    /// Where the document lands when no output path is given
    pub fn default_output(&self, root: &Path) -> PathBuf {
        root.join(&self.settings.output_name)
    }

    pub async fn document(
        &self,
        root: &Path,
        provider: &dyn LlmProvider,
        pricing: &ProviderConfig,
        overrides: ChunkingOverrides,
        ledger: &mut UsageLedger,
    ) -> Result<RepoDocumentation> {
        let dump = self.ingester.ingest(root)?;
        if dump.files.is_empty() {
            return Err(DocscribeError::Ingestion(format!(
                "No files with extensions [{}] found in {}",
                self.settings.extensions.join(", "),
                root.display()
            )));
        }

        let limit = overrides.chunk_size.unwrap_or(pricing.chunk_size);
        let boundary = overrides.boundary.unwrap_or(self.settings.boundary);
        let identifier = root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| root.display().to_string());

        let chars = dump.char_len();
        info!(
            "Documenting {} ({} files, {} chars, ~{} tokens) with {}",
            identifier,
            dump.files.len(),
            chars,
            estimate_tokens(chars),
            provider.kind().display_name()
        );

        let pipeline = DocumentPipeline {
            provider,
            prompts: &self.prompts,
            pricing,
            tokens: &self.tokens,
            splitter: ChunkSplitter::new(limit, boundary)?,
            prompt_kind: PromptKind::Repository,
            fence_stripper: None,
            separator: "\n\n",
        };

        let source = SourceUnit {
            identifier: &identifier,
            content: &dump.content,
            language: "mixed",
        };
        let output = pipeline.run(&source, ledger).await?;

        let markdown = if output.chunk_count > 1 {
            warn!(
                "Repository documented in {} parts; sections may repeat across parts",
                output.chunk_count
            );
            format!(
                "Note: This documentation was generated in {} parts due to the size of the codebase.\n\n{}",
                output.chunk_count, output.document.text
            )
        } else {
            output.document.text
        };

        Ok(RepoDocumentation {
            markdown,
            chunk_count: output.chunk_count,
            file_count: dump.files.len(),
            source_bytes: dump.content.len(),
            content_hash: content_hash(&dump.content),
            total_tokens: output.usage.total_tokens(),
            estimated_cost: output.usage.estimated_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::core::llm::scripted::ScriptedProvider;
    use assert_fs::prelude::*;

    fn documenter() -> RepoDocumenter {
        RepoDocumenter::new(&RepoDocConfig::default(), TokenCounter::new().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_single_chunk_repository() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("index.ts").write_str("export {};").unwrap();

        let provider = ScriptedProvider::replying(&["# Docs"]);
        let mut ledger = UsageLedger::new();
        let doc = documenter()
            .document(
                temp.path(),
                &provider,
                &LlmConfig::default().claude,
                ChunkingOverrides::default(),
                &mut ledger,
            )
            .await
            .unwrap();

        assert_eq!(doc.markdown, "# Docs");
        assert_eq!(doc.chunk_count, 1);
        assert_eq!(doc.file_count, 1);
        assert!(provider.prompts()[0].contains("=== index.ts ===\nexport {};"));
    }

    #[tokio::test]
    async fn test_multi_chunk_repository_gets_note_and_separators() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.ts").write_str(&"a".repeat(150)).unwrap();

        let provider = ScriptedProvider::replying(&["part A", "part B"]);
        let mut ledger = UsageLedger::new();
        let overrides = ChunkingOverrides {
            chunk_size: Some(100),
            boundary: Some(Boundary::Exact),
        };
        let doc = documenter()
            .document(temp.path(), &provider, &LlmConfig::default().claude, overrides, &mut ledger)
            .await
            .unwrap();

        assert_eq!(doc.chunk_count, 2);
        assert_eq!(
            doc.markdown,
            "Note: This documentation was generated in 2 parts due to the size of the codebase.\n\npart A\n\npart B"
        );
        assert_eq!(ledger.calls, 2);
    }

    #[tokio::test]
    async fn test_empty_repository_is_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("notes.txt").write_str("nothing to see").unwrap();

        let provider = ScriptedProvider::replying(&[]);
        let mut ledger = UsageLedger::new();
        let result = documenter()
            .document(
                temp.path(),
                &provider,
                &LlmConfig::default().claude,
                ChunkingOverrides::default(),
                &mut ledger,
            )
            .await;

        assert!(matches!(result, Err(DocscribeError::Ingestion(_))));
        assert!(provider.prompts().is_empty());
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            documenter().default_output(Path::new("/work/repo")),
            PathBuf::from("/work/repo/repo_doc.md")
        );
    }
}

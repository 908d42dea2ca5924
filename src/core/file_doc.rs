use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{FileDocConfig, ProviderConfig};
use crate::error::{DocscribeError, Result};
use super::chunker::ChunkSplitter;
use super::llm::LlmProvider;
use super::pipeline::{DocumentPipeline, FenceStripper, SourceUnit};
use super::prompt::{PromptBuilder, PromptKind};
use super::tokens::TokenCounter;
use super::usage::UsageLedger;

/// Annotated source returned to the caller for review
#[derive(Debug, Clone, Serialize)]
pub struct FileDocumentation {
    pub source_file: String,
    pub original_code: String,
    pub documented_code: String,
    /// Prompt plus response tokens over every chunk
    pub token_count: u64,
    pub estimated_cost: f64,
    pub chunk_count: usize,
}

/// Human-readable language name for a file extension
pub fn language_for(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "ts" | "tsx" => "TypeScript",
        "js" | "jsx" | "mjs" | "cjs" => "JavaScript",
        "py" => "Python",
        "rs" => "Rust",
        "java" => "Java",
        "cs" => "C#",
        "go" => "Go",
        _ => "source",
    }
}

/// `dir/name.ext` becomes `dir/name_documented.ext`
pub fn documented_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_documented.{}", stem, ext.to_string_lossy()),
        None => format!("{}_documented", stem),
    };
    path.with_file_name(name)
}

/// Single-file documenter shared by the CLI and the web form
pub struct FileDocumenter {
    settings: FileDocConfig,
    prompts: PromptBuilder,
    tokens: TokenCounter,
    fences: FenceStripper,
}

impl FileDocumenter {
    pub fn new(settings: &FileDocConfig, tokens: TokenCounter) -> Result<Self> {
        Ok(Self {
            settings: settings.clone(),
            prompts: PromptBuilder::new(settings.template.as_deref(), None)?,
            tokens,
            fences: FenceStripper::new()?,
        })
    }

    /// Validate the file name's extension and return its language
    pub fn check_file_name(&self, file_name: &str) -> Result<&'static str> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        let accepted = self
            .settings
            .accepted_extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(extension));

        if !accepted {
            return Err(DocscribeError::UnsupportedFile(format!(
                "{} (accepted extensions: {})",
                file_name,
                self.settings.accepted_extensions.join(", ")
            )));
        }

        Ok(language_for(extension))
    }

    pub async fn document(
        &self,
        file_name: &str,
        code: &str,
        provider: &dyn LlmProvider,
        pricing: &ProviderConfig,
        ledger: &mut UsageLedger,
    ) -> Result<FileDocumentation> {
        let language = self.check_file_name(file_name)?;

        let pipeline = DocumentPipeline {
            provider,
            prompts: &self.prompts,
            pricing,
            tokens: &self.tokens,
            splitter: ChunkSplitter::new(self.settings.chunk_size, self.settings.boundary)?,
            prompt_kind: PromptKind::File,
            fence_stripper: Some(&self.fences),
            separator: "",
        };

        let source = SourceUnit {
            identifier: file_name,
            content: code,
            language,
        };
        let output = pipeline.run(&source, ledger).await?;

        info!(
            "Documented {} with {} ({} chunk(s), {} tokens)",
            file_name,
            provider.model_name(),
            output.chunk_count,
            output.usage.total_tokens()
        );

        Ok(FileDocumentation {
            source_file: file_name.to_string(),
            original_code: code.to_string(),
            documented_code: output.document.text,
            token_count: output.usage.total_tokens(),
            estimated_cost: output.usage.estimated_cost,
            chunk_count: output.chunk_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::core::chunker::Boundary;
    use crate::core::llm::scripted::ScriptedProvider;

    fn documenter(chunk_size: usize) -> FileDocumenter {
        let settings = FileDocConfig {
            chunk_size,
            boundary: Boundary::Line,
            ..FileDocConfig::default()
        };
        FileDocumenter::new(&settings, TokenCounter::new().unwrap()).unwrap()
    }

    #[test]
    fn test_documented_path() {
        assert_eq!(
            documented_path(Path::new("src/user.ts")),
            PathBuf::from("src/user_documented.ts")
        );
        assert_eq!(documented_path(Path::new("Makefile")), PathBuf::from("Makefile_documented"));
    }

    #[test]
    fn test_rejects_unsupported_extension() {
        let documenter = documenter(1_000);
        assert_eq!(documenter.check_file_name("a.tsx").unwrap(), "TypeScript");
        assert!(matches!(
            documenter.check_file_name("main.py"),
            Err(DocscribeError::UnsupportedFile(_))
        ));
    }

    #[tokio::test]
    async fn test_documents_file_and_strips_fences() {
        let documenter = documenter(1_000);
        let provider = ScriptedProvider::replying(&["```typescript\n/** Adds. */\nexport const add = 1;\n```"]);
        let pricing = LlmConfig::default().openai;
        let mut ledger = UsageLedger::new();

        let doc = documenter
            .document("add.ts", "export const add = 1;\n", &provider, &pricing, &mut ledger)
            .await
            .unwrap();

        assert_eq!(doc.documented_code, "/** Adds. */\nexport const add = 1;\n");
        assert_eq!(doc.original_code, "export const add = 1;\n");
        assert_eq!(doc.chunk_count, 1);
        assert!(doc.token_count > 0);
        assert!(provider.prompts()[0].contains("TypeScript documentation expert"));
    }

    #[tokio::test]
    async fn test_large_file_split_on_lines() {
        let documenter = documenter(20);
        let provider = ScriptedProvider::replying(&["// one\nconst a = 1;\n", "// two\nconst b = 2;\n"]);
        let pricing = LlmConfig::default().openai;
        let mut ledger = UsageLedger::new();

        let code = "const a = 1;\nconst b = 2;\n";
        let doc = documenter
            .document("ab.ts", code, &provider, &pricing, &mut ledger)
            .await
            .unwrap();

        assert_eq!(doc.chunk_count, 2);
        assert_eq!(doc.documented_code, "// one\nconst a = 1;\n// two\nconst b = 2;\n");
        assert!(provider.prompts()[1].contains("part 2 of 2 of the file"));
    }

    #[tokio::test]
    async fn test_unsupported_file_makes_no_call() {
        let documenter = documenter(1_000);
        let provider = ScriptedProvider::replying(&["unused"]);
        let pricing = LlmConfig::default().openai;
        let mut ledger = UsageLedger::new();

        let result = documenter
            .document("notes.txt", "hello", &provider, &pricing, &mut ledger)
            .await;
        assert!(result.is_err());
        assert!(provider.prompts().is_empty());
    }
}

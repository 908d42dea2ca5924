// src/core/batch_processor.rs
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::config::ProviderConfig;
use crate::error::{DocscribeError, Result};
use super::llm::LlmProvider;
use super::repo_doc::{ChunkingOverrides, RepoDocumentation, RepoDocumenter};
use super::usage::UsageLedger;

/// Outcome of one archive in a batch
#[derive(Debug)]
pub struct BatchOutcome {
    pub archive: PathBuf,
    pub output: PathBuf,
    pub result: std::result::Result<RepoDocumentation, String>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// `.zip` files directly inside `dir`, sorted by name
pub fn list_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DocscribeError::Ingestion(format!(
            "Archive directory does not exist: {}",
            dir.display()
        )));
    }

    let mut archives = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| DocscribeError::Ingestion(e.to_string()))?;
        let is_zip = entry
            .path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
        if entry.file_type().is_file() && is_zip {
            archives.push(entry.into_path());
        }
    }
    archives.sort();
    Ok(archives)
}

/// `<output_dir>/<archive stem>_doc.md`
pub fn output_path_for(archive: &Path, output_dir: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repository".to_string());
    output_dir.join(format!("{}_doc.md", stem))
}

/// Extract `archive` into `dest`. Entries escaping `dest` are rejected by `zip`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;
    std::fs::create_dir_all(dest)?;
    zip.extract(dest)?;
    Ok(())
}

/// Documents every zipped repository in a directory, one at a time
pub struct BatchProcessor<'a> {
    documenter: &'a RepoDocumenter,
    overrides: ChunkingOverrides,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(documenter: &'a RepoDocumenter, overrides: ChunkingOverrides) -> Self {
        Self { documenter, overrides }
    }

    /// Process every archive. A failing archive is logged and skipped.
    pub async fn process_directory(
        &self,
        zip_dir: &Path,
        output_dir: &Path,
        provider: &dyn LlmProvider,
        pricing: &ProviderConfig,
        ledger: &mut UsageLedger,
    ) -> Result<Vec<BatchOutcome>> {
        std::fs::create_dir_all(output_dir)?;
        let archives = list_archives(zip_dir)?;
        info!("Found {} archive(s) in {}", archives.len(), zip_dir.display());

        let mut outcomes = Vec::with_capacity(archives.len());
        for archive in archives {
            let output = output_path_for(&archive, output_dir);
            info!("Processing {}...", archive.display());
            info!("Documentation will be saved to: {}", output.display());

            let result = self
                .process_archive(&archive, &output, provider, pricing, ledger)
                .await
                .map_err(|e| {
                    error!("Error processing {}: {}", archive.display(), e);
                    e.to_string()
                });

            if result.is_ok() {
                info!("Successfully documented {}", archive.display());
            }
            outcomes.push(BatchOutcome { archive, output, result });
        }

        Ok(outcomes)
    }

    async fn process_archive(
        &self,
        archive: &Path,
        output: &Path,
        provider: &dyn LlmProvider,
        pricing: &ProviderConfig,
        ledger: &mut UsageLedger,
    ) -> Result<RepoDocumentation> {
        let scratch = tempfile::tempdir()?;
        let stem = archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let repo_path = scratch.path().join(format!("repo_{}", stem));

        extract_archive(archive, &repo_path)?;

        let doc = self
            .documenter
            .document(&repo_path, provider, pricing, self.overrides, ledger)
            .await?;
        std::fs::write(output, &doc.markdown)?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmConfig, RepoDocConfig};
    use crate::core::llm::scripted::ScriptedProvider;
    use crate::core::tokens::TokenCounter;
    use assert_fs::prelude::*;
    use predicates::prelude::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_list_archives_only_zips() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("b.zip").touch().unwrap();
        temp.child("a.ZIP").touch().unwrap();
        temp.child("notes.txt").touch().unwrap();
        temp.child("nested/c.zip").write_str("").unwrap();

        let archives = list_archives(temp.path()).unwrap();
        let names: Vec<_> = archives
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.ZIP", "b.zip"]);
    }

    #[test]
    fn test_output_path_for() {
        assert_eq!(
            output_path_for(Path::new("/in/shop-api.zip"), Path::new("/out")),
            PathBuf::from("/out/shop-api_doc.md")
        );
    }

    #[tokio::test]
    async fn test_batch_continues_after_failure() {
        let input = assert_fs::TempDir::new().unwrap();
        let output = assert_fs::TempDir::new().unwrap();

        write_zip(&input.child("good.zip").path(), &[("src/index.ts", "export const x = 1;")]);
        input.child("broken.zip").write_str("not a zip archive").unwrap();

        let documenter = RepoDocumenter::new(&RepoDocConfig::default(), TokenCounter::new().unwrap()).unwrap();
        let processor = BatchProcessor::new(&documenter, ChunkingOverrides::default());
        let provider = ScriptedProvider::replying(&["# Good docs"]);
        let mut ledger = UsageLedger::new();

        let outcomes = processor
            .process_directory(
                input.path(),
                output.path(),
                &provider,
                &LlmConfig::default().claude,
                &mut ledger,
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].is_success()); // broken.zip sorts first
        assert!(outcomes[1].is_success());

        output.child("good_doc.md").assert(predicate::str::contains("# Good docs"));
        output.child("broken_doc.md").assert(predicate::path::missing());
        assert!(provider.prompts()[0].contains("=== src/index.ts ==="));
    }
}

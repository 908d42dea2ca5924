// src/core/ingest.rs
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{DocscribeError, Result};

/// Serialized text dump of a repository
#[derive(Debug, Clone)]
pub struct RepositoryDump {
    /// Relative paths of the included files, sorted
    pub files: Vec<PathBuf>,

    /// `=== path ===` headed file contents
    pub content: String,
}

impl RepositoryDump {
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Gathers repository files into one text representation
pub struct RepositoryIngester {
    extensions: Vec<String>,
}

impl RepositoryIngester {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    fn is_relevant(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    /// Walk `root` (respecting .gitignore) and serialize every relevant file
    pub fn ingest<P: AsRef<Path>>(&self, root: P) -> Result<RepositoryDump> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(DocscribeError::Ingestion(format!(
                "Directory does not exist: {}",
                root.display()
            )));
        }

        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .require_git(false)
            .filter_entry(|entry| entry.file_name() != ".git")
            .build();

        let mut paths = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file && self.is_relevant(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        paths.sort();

        let mut parts = Vec::with_capacity(paths.len());
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    parts.push(format!("\n=== {} ===\n{}", relative.display(), content));
                    files.push(relative);
                }
                Err(e) => warn!("Could not read {}: {}", relative.display(), e),
            }
        }

        debug!("Ingested {} file(s) from {}", files.len(), root.display());

        Ok(RepositoryDump {
            files,
            content: parts.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn ingester() -> RepositoryIngester {
        RepositoryIngester::new(&["ts".to_string(), ".md".to_string()])
    }

    #[test]
    fn test_ingest_filters_and_orders_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/b.ts").write_str("export const b = 2;").unwrap();
        temp.child("src/a.ts").write_str("export const a = 1;").unwrap();
        temp.child("README.md").write_str("# Demo").unwrap();
        temp.child("image.png").write_binary(&[0x89, 0x50]).unwrap();

        let dump = ingester().ingest(temp.path()).unwrap();

        assert_eq!(
            dump.files,
            vec![
                PathBuf::from("README.md"),
                PathBuf::from("src/a.ts"),
                PathBuf::from("src/b.ts"),
            ]
        );
        assert!(dump.content.starts_with("\n=== README.md ===\n# Demo"));
        assert!(dump.content.contains("\n=== src/a.ts ===\nexport const a = 1;"));
        assert!(!dump.content.contains("image.png"));
    }

    #[test]
    fn test_ingest_respects_gitignore() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(".gitignore").write_str("dist/\n").unwrap();
        temp.child("dist/bundle.ts").write_str("generated").unwrap();
        temp.child("index.ts").write_str("main()").unwrap();

        let dump = ingester().ingest(temp.path()).unwrap();
        assert_eq!(dump.files, vec![PathBuf::from("index.ts")]);
    }

    #[test]
    fn test_non_utf8_file_is_skipped() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("bad.ts").write_binary(&[0xff, 0xfe, 0x00]).unwrap();
        temp.child("good.ts").write_str("ok").unwrap();

        let dump = ingester().ingest(temp.path()).unwrap();
        assert_eq!(dump.files, vec![PathBuf::from("good.ts")]);
    }

    #[test]
    fn test_missing_directory_is_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let result = ingester().ingest(temp.path().join("nope"));
        assert!(matches!(result, Err(DocscribeError::Ingestion(_))));
    }
}

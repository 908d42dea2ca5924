use serde::Serialize;
use std::path::Path;
use tera::{Context, Tera};

use crate::error::Result;

const FILE_TEMPLATE: &str = "file_doc";
const REPO_TEMPLATE: &str = "repo_doc";

/// Which pipeline a prompt is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    File,
    Repository,
}

impl PromptKind {
    fn template_name(&self) -> &'static str {
        match self {
            PromptKind::File => FILE_TEMPLATE,
            PromptKind::Repository => REPO_TEMPLATE,
        }
    }
}

/// Values available to every prompt template
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext<'a> {
    /// File path or repository name
    pub identifier: &'a str,

    /// Chunk content
    pub code: &'a str,

    /// 1-based part number
    pub part: usize,

    pub total_parts: usize,

    /// Human-readable language name
    pub language: &'a str,
}

/// Renders the documentation prompts, built-in or overridden from disk
pub struct PromptBuilder {
    tera: Tera,
}

impl PromptBuilder {
    pub fn new(file_template: Option<&Path>, repo_template: Option<&Path>) -> Result<Self> {
        let mut tera = Tera::default();

        let file_source = match file_template {
            Some(path) => std::fs::read_to_string(path)?,
            None => include_str!("templates/file_doc.tera").to_string(),
        };
        let repo_source = match repo_template {
            Some(path) => std::fs::read_to_string(path)?,
            None => include_str!("templates/repo_doc.tera").to_string(),
        };

        tera.add_raw_template(FILE_TEMPLATE, &file_source)?;
        tera.add_raw_template(REPO_TEMPLATE, &repo_source)?;

        Ok(Self { tera })
    }

    pub fn render(&self, kind: PromptKind, context: &PromptContext<'_>) -> Result<String> {
        let context = Context::from_serialize(context)?;
        Ok(self.tera.render(kind.template_name(), &context)?)
    }
}

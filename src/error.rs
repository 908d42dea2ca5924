use thiserror::Error;

use crate::core::llm::{ProviderError, ProviderKind};

/// Main error type for Docscribe operations
#[derive(Error, Debug)]
pub enum DocscribeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Line {line} is {length} characters long and cannot fit a chunk of {limit} characters")]
    InputTooLarge {
        line: usize,
        length: usize,
        limit: usize,
    },

    #[error("{provider} failed on chunk {}: {source}", .chunk + 1)]
    Provider {
        provider: ProviderKind,
        /// 0-based chunk index
        chunk: usize,
        #[source]
        source: ProviderError,
    },

    #[error("Aggregation incomplete: no response for chunk(s) {missing:?}")]
    IncompleteAggregation { missing: Vec<usize> },

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Usage log error: {0}")]
    UsageLog(#[from] rusqlite::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

pub type Result<T> = std::result::Result<T, DocscribeError>;

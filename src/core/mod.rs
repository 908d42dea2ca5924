// src/core/mod.rs
mod engine;
mod chunker;
mod tokens;
mod aggregator;
mod prompt;
mod pipeline;
mod ingest;
mod usage;
pub mod llm;

// Documentation pipelines
mod file_doc;
mod repo_doc;
mod batch_processor;

pub use chunker::Boundary;
pub use tokens::TokenCounter;
pub use usage::{OperationKind, UsageLedger, UsageLog, UsageRecord, UsageReport};

pub use file_doc::{documented_path, FileDocumenter};
pub use repo_doc::{ChunkingOverrides, RepoDocumenter};
pub use batch_processor::BatchProcessor;

// Export the main engine
pub use engine::Engine;

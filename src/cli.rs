use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use crate::core::llm::ProviderKind;
use crate::core::{Boundary, ChunkingOverrides, Engine};

#[derive(Parser)]
#[command(name = "docscribe")]
#[command(about = "LLM-backed documentation for source files and whole repositories")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate Markdown documentation for a repository
    Repo {
        /// Repository directory
        path: PathBuf,

        /// Output file (defaults to <PATH>/repo_doc.md)
        output: Option<PathBuf>,

        /// LLM provider
        #[arg(value_enum, default_value_t = ProviderKind::Claude)]
        provider: ProviderKind,

        /// Chunk size in characters (defaults to the provider's setting)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Where chunks may be cut
        #[arg(long, value_enum)]
        boundary: Option<Boundary>,
    },

    /// Add documentation comments to a single source file
    File {
        /// Source file
        path: PathBuf,

        /// Output file (defaults to <name>_documented.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// LLM provider
        #[arg(short, long, value_enum, default_value_t = ProviderKind::OpenAi)]
        provider: ProviderKind,
    },

    /// Document every zipped repository in a directory
    Batch {
        /// Directory containing .zip archives
        zip_dir: PathBuf,

        /// Directory for the generated <name>_doc.md files
        output_dir: PathBuf,

        /// LLM provider
        #[arg(value_enum, default_value_t = ProviderKind::Claude)]
        provider: ProviderKind,
    },

    /// Serve the upload form
    Serve {
        /// Listen address (defaults to server.addr from the config)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Print the usage log report
    Usage,

    /// Write the active configuration to a file
    Init {
        /// Target file (defaults to ./docscribe.toml)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        match self.command {
            Commands::Repo { path, output, provider, chunk_size, boundary } => {
                let overrides = ChunkingOverrides { chunk_size, boundary };
                engine.document_repo(path, output, provider, overrides).await
            }
            Commands::File { path, output, provider } => {
                engine.document_file(path, output, provider).await
            }
            Commands::Batch { zip_dir, output_dir, provider } => {
                engine.batch(zip_dir, output_dir, provider).await
            }
            Commands::Serve { addr } => {
                engine.serve(addr).await
            }
            Commands::Usage => {
                engine.usage_report().await
            }
            Commands::Init { path, force } => {
                engine.init(path, force).await
            }
        }
    }
}

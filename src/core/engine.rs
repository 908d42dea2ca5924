// src/core/engine.rs
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::{resolve_api_key, Config};
use crate::server::{self, AppState};
use super::llm::{create_provider, LlmProvider, ProviderKind};
use super::{
    documented_path, BatchProcessor, ChunkingOverrides, FileDocumenter, OperationKind,
    RepoDocumenter, TokenCounter, UsageLedger, UsageLog, UsageRecord, UsageReport,
};

/// Main orchestration engine for docscribe
pub struct Engine {
    config: Config,
    file_documenter: FileDocumenter,
    repo_documenter: RepoDocumenter,
}

impl Engine {
    /// Create a new engine from the config file (or defaults)
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        debug!("Loaded configuration: {:?}", config);

        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let tokens = TokenCounter::new()?;
        let file_documenter = FileDocumenter::new(&config.file, tokens.clone())?;
        let repo_documenter = RepoDocumenter::new(&config.repo, tokens)?;

        Ok(Self {
            config,
            file_documenter,
            repo_documenter,
        })
    }

    /// Open the usage log; only commands that record or report usage call this
    fn open_usage_log(&self) -> Result<UsageLog> {
        let path = &self.config.usage.db_path;
        let log = UsageLog::open(path)
            .with_context(|| format!("Failed to open usage log {}", path.display()))?;
        Ok(log)
    }

    /// Resolve the API key and build the provider before any input is touched
    fn provider(&self, kind: ProviderKind) -> Result<Box<dyn LlmProvider>> {
        let api_key = resolve_api_key(kind)?;
        let provider = create_provider(kind, &self.config.llm, api_key);
        info!("Using {} ({})", kind.display_name(), provider.model_name());
        Ok(provider)
    }

    fn log_usage(&self, record: &UsageRecord) {
        let result = self
            .open_usage_log()
            .and_then(|log| log.log_operation(record).map_err(Into::into));
        if let Err(e) = result {
            warn!("Failed to record usage for {}: {:#}", record.source_file, e);
        }
    }

    fn report_ledger(&self, ledger: &UsageLedger) {
        info!(
            "📊 {} call(s), {} prompt + {} completion tokens, estimated cost ${:.4}",
            ledger.calls,
            ledger.prompt_tokens,
            ledger.completion_tokens,
            ledger.estimated_cost
        );
    }

    /// Document a single source file
    pub async fn document_file(
        &self,
        path: PathBuf,
        output: Option<PathBuf>,
        kind: ProviderKind,
    ) -> Result<()> {
        let provider = self.provider(kind)?;
        let pricing = self.config.llm.provider(kind);

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("Not a file path: {}", path.display()))?;
        self.file_documenter.check_file_name(&file_name)?;

        let code = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        info!("📝 Documenting {}...", path.display());
        let mut ledger = UsageLedger::new();
        let doc = self
            .file_documenter
            .document(&file_name, &code, provider.as_ref(), pricing, &mut ledger)
            .await?;

        let output = output.unwrap_or_else(|| documented_path(&path));
        std::fs::write(&output, &doc.documented_code)
            .with_context(|| format!("Failed to write {}", output.display()))?;

        self.log_usage(&UsageRecord::new(
            path.display().to_string(),
            OperationKind::FileDoc,
            &code,
            doc.token_count,
            doc.estimated_cost,
        ));

        info!("✅ Documentation saved to {}", output.display());
        self.report_ledger(&ledger);
        Ok(())
    }

    /// Document a whole repository directory
    pub async fn document_repo(
        &self,
        path: PathBuf,
        output: Option<PathBuf>,
        kind: ProviderKind,
        overrides: ChunkingOverrides,
    ) -> Result<()> {
        let provider = self.provider(kind)?;
        let pricing = self.config.llm.provider(kind);

        info!("🔍 Documenting repository {}...", path.display());
        let mut ledger = UsageLedger::new();
        let doc = self
            .repo_documenter
            .document(&path, provider.as_ref(), pricing, overrides, &mut ledger)
            .await?;

        let output = output.unwrap_or_else(|| self.repo_documenter.default_output(&path));
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&output, &doc.markdown)
            .with_context(|| format!("Failed to write {}", output.display()))?;

        self.log_usage(&UsageRecord::from_parts(
            path.display().to_string(),
            OperationKind::RepoDoc,
            doc.source_bytes as u64,
            doc.content_hash.clone(),
            doc.total_tokens,
            doc.estimated_cost,
        ));

        info!(
            "✅ Documentation for {} files ({} chunk(s)) saved to {}",
            doc.file_count,
            doc.chunk_count,
            output.display()
        );
        self.report_ledger(&ledger);
        Ok(())
    }

    /// Document every zipped repository in `zip_dir`
    pub async fn batch(&self, zip_dir: PathBuf, output_dir: PathBuf, kind: ProviderKind) -> Result<()> {
        let provider = self.provider(kind)?;
        let pricing = self.config.llm.provider(kind);

        let processor = BatchProcessor::new(&self.repo_documenter, ChunkingOverrides::default());
        let mut ledger = UsageLedger::new();
        let outcomes = processor
            .process_directory(&zip_dir, &output_dir, provider.as_ref(), pricing, &mut ledger)
            .await?;

        for outcome in &outcomes {
            if let Ok(doc) = &outcome.result {
                debug!("{} -> {}", outcome.archive.display(), outcome.output.display());
                self.log_usage(&UsageRecord::from_parts(
                    outcome.archive.display().to_string(),
                    OperationKind::RepoDoc,
                    doc.source_bytes as u64,
                    doc.content_hash.clone(),
                    doc.total_tokens,
                    doc.estimated_cost,
                ));
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        if succeeded < outcomes.len() {
            warn!("⚠️ {} of {} archive(s) failed", outcomes.len() - succeeded, outcomes.len());
        }
        info!("🎉 Batch complete: {}/{} archive(s) documented", succeeded, outcomes.len());
        self.report_ledger(&ledger);
        Ok(())
    }

    /// Write the active configuration (defaults when no file was loaded)
    pub async fn init(&self, path: Option<PathBuf>, force: bool) -> Result<()> {
        let path = path.unwrap_or_else(|| PathBuf::from("docscribe.toml"));
        if path.exists() && !force {
            anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
        }

        self.config.save(&path)?;
        info!("✅ Configuration written to {}", path.display());
        Ok(())
    }

    /// Print the usage log report and summary
    pub async fn usage_report(&self) -> Result<()> {
        let usage_log = self.open_usage_log()?;
        let records = usage_log.records()?;
        let summary = usage_log.summary()?;
        print!("{}", UsageReport { records: &records, summary: &summary });
        Ok(())
    }

    /// Serve the web form until the process is stopped
    pub async fn serve(self, addr: Option<String>) -> Result<()> {
        let kind = self.config.server.provider;
        let provider = self.provider(kind)?;
        let addr = addr.unwrap_or_else(|| self.config.server.addr.clone());
        let usage_log = self.open_usage_log()?;

        let state = AppState::new(
            provider,
            self.config.llm.provider(kind).clone(),
            self.file_documenter,
            usage_log,
            self.config.server.max_upload_bytes,
        );

        server::serve(&addr, state).await?;
        Ok(())
    }
}

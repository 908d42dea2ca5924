//! Token/cost accounting and the SQLite usage log.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{DocscribeError, Result};
use super::llm::TokenUsage;

/// Process-scoped accumulator of token usage and estimated cost
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageLedger {
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub estimated_cost: f64,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one call's usage, priced with the provider's rates
    pub fn record(&mut self, usage: TokenUsage, pricing: &ProviderConfig) -> f64 {
        let cost = estimate_cost(usage, pricing);
        self.calls += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.estimated_cost += cost;
        cost
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

pub fn estimate_cost(usage: TokenUsage, pricing: &ProviderConfig) -> f64 {
    (usage.prompt_tokens as f64 / 1000.0) * pricing.input_cost_per_1k
        + (usage.completion_tokens as f64 / 1000.0) * pricing.output_cost_per_1k
}

/// SHA-256 hex digest of documented content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    FileDoc,
    RepoDoc,
}

impl OperationKind {
    fn as_str(&self) -> &'static str {
        match self {
            OperationKind::FileDoc => "file",
            OperationKind::RepoDoc => "repo",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "file" => Ok(OperationKind::FileDoc),
            "repo" => Ok(OperationKind::RepoDoc),
            other => Err(DocscribeError::Config(format!("Unknown operation type in usage log: {}", other))),
        }
    }
}

/// One row of the usage log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub id: Option<i64>,
    pub source_file: String,
    pub operation: OperationKind,
    pub timestamp: DateTime<Utc>,
    pub file_size: u64,
    pub token_count: u64,
    pub estimated_cost: f64,
    pub content_hash: String,
    pub user_feedback: Option<String>,
    pub was_edited: bool,
}

impl UsageRecord {
    pub fn new(
        source_file: impl Into<String>,
        operation: OperationKind,
        content: &str,
        token_count: u64,
        estimated_cost: f64,
    ) -> Self {
        Self::from_parts(
            source_file,
            operation,
            content.len() as u64,
            content_hash(content),
            token_count,
            estimated_cost,
        )
    }

    pub fn from_parts(
        source_file: impl Into<String>,
        operation: OperationKind,
        file_size: u64,
        content_hash: String,
        token_count: u64,
        estimated_cost: f64,
    ) -> Self {
        Self {
            id: None,
            source_file: source_file.into(),
            operation,
            timestamp: Utc::now(),
            file_size,
            token_count,
            estimated_cost,
            content_hash,
            user_feedback: None,
            was_edited: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    pub total_operations: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub edited_count: u64,
}

pub struct UsageLog {
    conn: Connection,
}

impl UsageLog {
    /// Open (or create) the usage log at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let log = Self {
            conn: Connection::open(path)?,
        };
        log.init_schema()?;
        debug!("Usage log opened at {}", path.display());
        Ok(log)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let log = Self {
            conn: Connection::open_in_memory()?,
        };
        log.init_schema()?;
        Ok(log)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS file_operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_file TEXT NOT NULL,
                operation_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                token_count INTEGER NOT NULL,
                estimated_cost REAL NOT NULL,
                content_hash TEXT NOT NULL,
                user_feedback TEXT,
                was_edited BOOLEAN NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_file_operations_source
                ON file_operations(source_file);
            "#,
        )?;
        Ok(())
    }

    /// Append a record and return its row id
    pub fn log_operation(&self, record: &UsageRecord) -> Result<i64> {
        let was_edited = record
            .user_feedback
            .as_deref()
            .is_some_and(|f| !f.trim().is_empty());

        self.conn.execute(
            "INSERT INTO file_operations
             (source_file, operation_type, timestamp, file_size, token_count,
              estimated_cost, content_hash, user_feedback, was_edited)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.source_file,
                record.operation.as_str(),
                record.timestamp.to_rfc3339(),
                record.file_size as i64,
                record.token_count as i64,
                record.estimated_cost,
                record.content_hash,
                record.user_feedback,
                was_edited,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Attach reviewer feedback to the latest record of `source_file`.
    /// Returns false when the file has never been logged.
    pub fn attach_feedback(&self, source_file: &str, feedback: &str) -> Result<bool> {
        let latest: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM file_operations WHERE source_file = ?1
                 ORDER BY timestamp DESC, id DESC LIMIT 1",
                params![source_file],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = latest else {
            return Ok(false);
        };

        self.conn.execute(
            "UPDATE file_operations SET user_feedback = ?1, was_edited = ?2 WHERE id = ?3",
            params![feedback, !feedback.trim().is_empty(), id],
        )?;
        Ok(true)
    }

    /// All records, newest first
    pub fn records(&self) -> Result<Vec<UsageRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_file, operation_type, timestamp, file_size, token_count,
                    estimated_cost, content_hash, user_feedback, was_edited
             FROM file_operations
             ORDER BY timestamp DESC, id DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, bool>(9)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, source_file, operation, timestamp, size, tokens, cost, hash, feedback, edited) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| DocscribeError::Config(format!("Bad timestamp in usage log: {}", e)))?
                .with_timezone(&Utc);

            records.push(UsageRecord {
                id: Some(id),
                source_file,
                operation: OperationKind::parse(&operation)?,
                timestamp,
                file_size: size as u64,
                token_count: tokens as u64,
                estimated_cost: cost,
                content_hash: hash,
                user_feedback: feedback,
                was_edited: edited,
            });
        }

        Ok(records)
    }

    pub fn summary(&self) -> Result<UsageSummary> {
        let summary = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(token_count), 0),
                    COALESCE(SUM(estimated_cost), 0.0),
                    COALESCE(SUM(CASE WHEN was_edited THEN 1 ELSE 0 END), 0)
             FROM file_operations",
            [],
            |row| {
                Ok(UsageSummary {
                    total_operations: row.get::<_, i64>(0)? as u64,
                    total_tokens: row.get::<_, i64>(1)? as u64,
                    total_cost: row.get(2)?,
                    edited_count: row.get::<_, i64>(3)? as u64,
                })
            },
        )?;
        Ok(summary)
    }
}

/// Plain-text analytics report, as printed by `docscribe usage`
pub struct UsageReport<'a> {
    pub records: &'a [UsageRecord],
    pub summary: &'a UsageSummary,
}

impl fmt::Display for UsageReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.records.is_empty() {
            return writeln!(f, "No analytics data found");
        }

        writeln!(f, "\n=== Analytics Report ===")?;
        for record in self.records {
            writeln!(f, "\nFile: {}", record.source_file)?;
            writeln!(f, "Operation: {}", record.operation.as_str())?;
            writeln!(f, "Time: {}", record.timestamp.to_rfc3339())?;
            writeln!(f, "Size: {} bytes", record.file_size)?;
            writeln!(f, "Tokens: {}", record.token_count)?;
            writeln!(f, "Cost: ${:.4}", record.estimated_cost)?;
            if record.was_edited {
                if let Some(feedback) = &record.user_feedback {
                    writeln!(f, "Feedback: {}", feedback)?;
                }
            }
            writeln!(f, "{}", "-".repeat(40))?;
        }

        writeln!(f, "\n=== Summary ===")?;
        writeln!(f, "Total operations: {}", self.summary.total_operations)?;
        writeln!(f, "Total tokens used: {}", self.summary.total_tokens)?;
        writeln!(f, "Total cost: ${:.4}", self.summary.total_cost)?;
        writeln!(f, "Files edited: {}", self.summary.edited_count)
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::Boundary;
use crate::core::llm::ProviderKind;
use crate::error::{DocscribeError, Result};

/// Environment variable overriding the usage log location
pub const USAGE_DB_ENV: &str = "DOCSCRIBE_USAGE_DB";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Per-provider LLM settings
    pub llm: LlmConfig,

    /// Single-file documenter settings
    pub file: FileDocConfig,

    /// Repository documenter settings
    pub repo: RepoDocConfig,

    /// Web form settings
    pub server: ServerConfig,

    /// Usage log settings
    pub usage: UsageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "LlmConfigFile")]
pub struct LlmConfig {
    pub claude: ProviderConfig,
    pub gemini: ProviderConfig,
    pub openai: ProviderConfig,

    /// Retry policy shared by every provider
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Model name (e.g., "gpt-4-turbo-preview", "claude-3-sonnet-20240229")
    pub model: String,

    /// Repository chunk size in characters
    pub chunk_size: usize,

    /// Maximum tokens for LLM responses
    pub max_tokens: u32,

    /// Temperature for LLM responses (0.0 to 1.0)
    pub temperature: f32,

    /// Optional system prompt sent ahead of the user prompt
    pub system_prompt: Option<String>,

    /// Base URL override (proxies, test servers)
    pub base_url: Option<String>,

    /// USD per 1K prompt tokens
    pub input_cost_per_1k: f64,

    /// USD per 1K completion tokens
    pub output_cost_per_1k: f64,
}

/// `[llm]` as written on disk. Provider sections may be partial and are
/// merged over the built-in defaults for that provider.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LlmConfigFile {
    claude: ProviderOverrides,
    gemini: ProviderOverrides,
    openai: ProviderOverrides,
    retry: RetryConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProviderOverrides {
    model: Option<String>,
    chunk_size: Option<usize>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    system_prompt: Option<String>,
    base_url: Option<String>,
    input_cost_per_1k: Option<f64>,
    output_cost_per_1k: Option<f64>,
}

impl ProviderOverrides {
    fn apply(self, base: ProviderConfig) -> ProviderConfig {
        ProviderConfig {
            model: self.model.unwrap_or(base.model),
            chunk_size: self.chunk_size.unwrap_or(base.chunk_size),
            max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
            temperature: self.temperature.unwrap_or(base.temperature),
            // An empty prompt switches the default system prompt off
            system_prompt: match self.system_prompt {
                Some(prompt) if prompt.trim().is_empty() => None,
                Some(prompt) => Some(prompt),
                None => base.system_prompt,
            },
            base_url: self.base_url.or(base.base_url),
            input_cost_per_1k: self.input_cost_per_1k.unwrap_or(base.input_cost_per_1k),
            output_cost_per_1k: self.output_cost_per_1k.unwrap_or(base.output_cost_per_1k),
        }
    }
}

impl From<LlmConfigFile> for LlmConfig {
    fn from(file: LlmConfigFile) -> Self {
        let defaults = LlmConfig::default();
        Self {
            claude: file.claude.apply(defaults.claude),
            gemini: file.gemini.apply(defaults.gemini),
            openai: file.openai.apply(defaults.openai),
            retry: file.retry,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the first retry, doubled on each further retry
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileDocConfig {
    /// Extensions accepted for upload/CLI documentation
    pub accepted_extensions: Vec<String>,

    /// Chunk size in characters for a single file
    pub chunk_size: usize,

    /// Boundary placement for single files
    pub boundary: Boundary,

    /// Custom prompt template file
    pub template: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoDocConfig {
    /// File extensions included in the repository dump
    pub extensions: Vec<String>,

    /// Boundary placement for repository dumps
    pub boundary: Boundary,

    /// Output file name used when no output path is given
    pub output_name: String,

    /// Custom prompt template file
    pub template: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,

    /// Provider used for uploads
    pub provider: ProviderKind,

    /// Maximum upload size in bytes
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// SQLite database path
    pub db_path: PathBuf,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            claude: ProviderConfig {
                model: "claude-3-sonnet-20240229".to_string(),
                chunk_size: 400_000, // ~100K tokens
                max_tokens: 4096,
                temperature: 0.3,
                system_prompt: None,
                base_url: None,
                input_cost_per_1k: 0.003,
                output_cost_per_1k: 0.015,
            },
            gemini: ProviderConfig {
                model: "gemini-2.0-flash".to_string(),
                chunk_size: 800_000, // ~200K tokens
                max_tokens: 8192,
                temperature: 0.3,
                system_prompt: None,
                base_url: None,
                input_cost_per_1k: 0.0001,
                output_cost_per_1k: 0.0004,
            },
            openai: ProviderConfig {
                model: "gpt-4-turbo-preview".to_string(),
                chunk_size: 200_000, // ~50K tokens
                max_tokens: 4000,
                temperature: 0.3,
                system_prompt: Some(
                    "You are a documentation expert who writes clear, helpful documentation for junior developers with 1-4 years experience."
                        .to_string(),
                ),
                base_url: None,
                input_cost_per_1k: 0.01,
                output_cost_per_1k: 0.03,
            },
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

impl Default for FileDocConfig {
    fn default() -> Self {
        Self {
            accepted_extensions: vec!["ts".to_string(), "tsx".to_string()],
            chunk_size: 24_000,
            boundary: Boundary::Line,
            template: None,
        }
    }
}

impl Default for RepoDocConfig {
    fn default() -> Self {
        Self {
            extensions: ["js", "ts", "tsx", "jsx", "json", "yaml", "yml", "md", "py"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            boundary: Boundary::Exact,
            output_name: "repo_doc.md".to_string(),
            template: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            provider: ProviderKind::OpenAi,
            max_upload_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("analytics.db"),
        }
    }
}

impl LlmConfig {
    pub fn provider(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::Claude => &self.claude,
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::OpenAi => &self.openai,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| DocscribeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DocscribeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default, then apply environment overrides
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)?
                } else {
                    return Err(DocscribeError::Config(format!(
                        "Config file not found: {}",
                        p.as_ref().display()
                    )));
                }
            }
            None => {
                // Try common config file locations
                let candidates = ["docscribe.toml", "Docscribe.toml", ".docscribe.toml"];

                match candidates.iter().find(|c| Path::new(c).exists()) {
                    Some(candidate) => Self::load(candidate)?,
                    None => Self::default(),
                }
            }
        };

        if let Ok(db_path) = std::env::var(USAGE_DB_ENV) {
            if !db_path.trim().is_empty() {
                config.usage.db_path = PathBuf::from(db_path);
            }
        }

        Ok(config)
    }

    /// Reject settings that would make the pipeline unusable
    pub fn validate(&self) -> Result<()> {
        for kind in ProviderKind::ALL {
            let provider = self.llm.provider(kind);
            if provider.chunk_size == 0 {
                return Err(DocscribeError::Config(format!(
                    "llm.{}.chunk_size must be greater than zero",
                    kind
                )));
            }
            if provider.model.trim().is_empty() {
                return Err(DocscribeError::Config(format!("llm.{}.model is empty", kind)));
            }
        }

        if self.file.chunk_size == 0 {
            return Err(DocscribeError::Config(
                "file.chunk_size must be greater than zero".to_string(),
            ));
        }

        if self.llm.retry.max_attempts == 0 {
            return Err(DocscribeError::Config(
                "llm.retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Read the API key for `kind` from its environment variable
pub fn resolve_api_key(kind: ProviderKind) -> Result<String> {
    match std::env::var(kind.api_key_env()) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(DocscribeError::Config(format!(
            "{} environment variable not set",
            kind.api_key_env()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_partial_provider_section_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[llm.claude]
model = "claude-3-5-sonnet-latest"

[llm.openai]
system_prompt = ""
"#,
        )
        .unwrap();

        let claude = config.llm.provider(ProviderKind::Claude);
        assert_eq!(claude.model, "claude-3-5-sonnet-latest");
        assert_eq!(claude.chunk_size, 400_000);
        assert_eq!(claude.max_tokens, 4096);
        assert_eq!(claude.input_cost_per_1k, 0.003);

        let gemini = config.llm.provider(ProviderKind::Gemini);
        assert_eq!(gemini.model, "gemini-2.0-flash");
        assert_eq!(gemini.chunk_size, 800_000);

        let openai = config.llm.provider(ProviderKind::OpenAi);
        assert_eq!(openai.model, "gpt-4-turbo-preview");
        assert!(openai.system_prompt.is_none());
        assert_eq!(config.llm.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_or_unset_api_key_is_a_config_error() {
        let var = ProviderKind::Gemini.api_key_env();

        std::env::set_var(var, "   ");
        assert!(matches!(resolve_api_key(ProviderKind::Gemini), Err(DocscribeError::Config(_))));

        std::env::remove_var(var);
        match resolve_api_key(ProviderKind::Gemini) {
            Err(DocscribeError::Config(msg)) => assert!(msg.contains("GOOGLE_API_KEY")),
            other => panic!("expected Config error, got {:?}", other),
        }

        std::env::set_var(var, "test-key");
        assert_eq!(resolve_api_key(ProviderKind::Gemini).unwrap(), "test-key");
        std::env::remove_var(var);
    }

    #[test]
    fn test_default_chunk_sizes_per_provider() {
        let config = Config::default();
        assert_eq!(config.llm.provider(ProviderKind::Claude).chunk_size, 400_000);
        assert_eq!(config.llm.provider(ProviderKind::Gemini).chunk_size, 800_000);
        assert_eq!(config.llm.provider(ProviderKind::OpenAi).chunk_size, 200_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("docscribe.toml");
        file.write_str(
            r#"
[repo]
boundary = "line"

[usage]
db_path = "/tmp/usage.db"
"#,
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.repo.boundary, Boundary::Line);
        assert_eq!(config.repo.output_name, "repo_doc.md");
        assert_eq!(config.usage.db_path, PathBuf::from("/tmp/usage.db"));
        assert_eq!(config.llm.claude.model, "claude-3-sonnet-20240229");
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = Config::default();
        config.llm.gemini.chunk_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("llm.gemini.chunk_size"));
    }

    #[test]
    fn test_save_then_load() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("out.toml");

        let mut config = Config::default();
        config.server.addr = "127.0.0.1:9000".to_string();
        config.save(file.path()).unwrap();

        file.assert(predicates::str::contains("127.0.0.1:9000"));
        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.server.addr, "127.0.0.1:9000");
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let missing = temp.child("nope.toml");
        let result = Config::load_or_default(Some(missing.path()));
        assert!(matches!(result, Err(DocscribeError::Config(_))));
    }
}

//! TOML-backed application configuration.
//!
//! Every section and field has a default, so a partial (or empty) file is
//! valid. `load_or_create_config` writes the defaults out on first run so the
//! user has something to edit.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the default config location.
pub const CONFIG_ENV: &str = "DOCBATCH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "docbatch.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub discovery: DiscoveryConfig,
    pub extract: ExtractConfig,
    pub batch: BatchConfig,
    pub analysis: AnalysisConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Accepted extensions, compared case-insensitively; a leading dot is optional.
    pub extensions: Vec<String>,
    /// Name prefix office applications use for lock files.
    pub lock_prefix: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            extensions: ["txt", "doc", "docx", "xls", "xlsx", "pdf"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            lock_prefix: "~$".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Per-file processing budget in milliseconds.
    pub time_budget_ms: u64,
    /// Plain-text read size between deadline checkpoints.
    pub chunk_size: usize,
    pub cell_delimiter: String,
    pub line_delimiter: String,
    /// Converter binary used for legacy `.doc` files off Windows.
    pub legacy_word_converter: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: 120_000,
            chunk_size: 4096,
            cell_delimiter: " ".into(),
            line_delimiter: "\n".into(),
            legacy_word_converter: "antiword".into(),
        }
    }
}

impl ExtractConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub source_dir: Option<String>,
    pub target_dir: Option<String>,
    /// Fixed worker count; `None` means twice the available parallelism.
    pub workers: Option<usize>,
    /// Subdirectory of the target that receives per-file artifacts.
    pub output_dir: String,
    pub combined_filename: String,
    pub error_filename: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            target_dir: None,
            workers: None,
            output_dir: "summaries".into(),
            combined_filename: "!summary_overview.txt".into(),
            error_filename: "!failed_files.txt".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub keywords_limit: usize,
    pub summary_sentences: usize,
    /// Pass English keywords/summaries through the configured translator.
    pub translate: bool,
    /// Longest input handed to the translator, in characters.
    pub translation_max_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            keywords_limit: 10,
            summary_sentences: 5,
            translate: false,
            translation_max_chars: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub json: bool,
    /// Optional log file; stdout logging stays on either way.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            file: None,
        }
    }
}

/// Resolve the config path: explicit argument, then `DOCBATCH_CONFIG`, then
/// `docbatch.toml` in the working directory.
pub fn resolve_config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Parse a config from TOML text.
pub fn parse_config(text: &str) -> Result<AppConfig> {
    toml::from_str(text).context("invalid configuration")
}

/// Load the config at `path` (see [`resolve_config_path`]), writing the
/// defaults there first if the file does not exist yet.
pub fn load_or_create_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = resolve_config_path(path);
    if path.exists() {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        return parse_config(&text).with_context(|| format!("in {}", path.display()));
    }

    let cfg = AppConfig::default();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let text = toml::to_string_pretty(&cfg).context("failed to serialize default config")?;
    std::fs::write(&path, text)
        .with_context(|| format!("failed to write default config {}", path.display()))?;
    Ok(cfg)
}

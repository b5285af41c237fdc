use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// One sync root per line; blank lines ignored.
    #[serde(default = "default_list_file")]
    pub list_file: PathBuf,
    /// Overwritten each run with the paths queued for upload.
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            list_file: default_list_file(),
            audit_log: default_audit_log(),
        }
    }
}

fn default_list_file() -> PathBuf {
    PathBuf::from("sync_paths.txt")
}
fn default_audit_log() -> PathBuf {
    PathBuf::from("files_to_upload.log")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub compact_on_finish: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            compact_on_finish: true,
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("file_modifications.txt")
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct FiltersConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            excludes: default_excludes(),
            follow_symlinks: false,
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec![".md".to_string(), ".pdf".to_string()]
}
fn default_excludes() -> Vec<String> {
    [".obsidian/", ".trash/", "plugins/", "Template/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_field_name")]
    pub field_name: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_secs")]
    pub batch_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            field_name: default_field_name(),
            batch_size: default_batch_size(),
            batch_delay_secs: default_batch_delay_secs(),
            timeout_secs: default_timeout_secs(),
            token_env: default_token_env(),
        }
    }
}

fn default_url() -> String {
    "http://127.0.0.1:42110/api/content?client=web".to_string()
}
fn default_field_name() -> String {
    "files".to_string()
}
fn default_batch_size() -> usize {
    10
}
fn default_batch_delay_secs() -> u64 {
    10
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_token_env() -> String {
    "INDEX_SYNC_TOKEN".to_string()
}

impl Config {
    /// Check invariants and drop blank filter entries.
    ///
    /// An empty exclusion substring would match every path, so it never survives.
    pub fn validate(mut self) -> Result<Self> {
        self.filters.extensions = clean_list(&self.filters.extensions);
        self.filters.excludes = clean_list(&self.filters.excludes);

        if self.filters.extensions.is_empty() {
            anyhow::bail!("filters.extensions must list at least one extension");
        }
        if self.upload.batch_size == 0 {
            anyhow::bail!("upload.batch_size must be > 0");
        }
        if self.upload.field_name.trim().is_empty() {
            anyhow::bail!("upload.field_name must not be empty");
        }
        let url = self.upload.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!(
                "upload.url must be an http:// or https:// URL, got '{}'",
                self.upload.url
            );
        }
        Ok(self)
    }
}

/// Trim entries and drop empty ones. Also splits comma-joined values so
/// `--ext .md,.pdf` behaves like two flags.
pub fn clean_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .flat_map(|item| item.split(','))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.validate()
}

/// Load `path` if it exists, otherwise fall back to built-in defaults.
///
/// Only used for the default config location; an explicit `--config` that
/// does not exist goes through [`load_config`] and fails.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Config::default().validate()
    }
}

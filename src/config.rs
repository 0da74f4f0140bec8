use anyhow::{Context, Result};
use metastream_core::SortOrder;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub aws: AwsConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub phrases: PhrasesConfig,
    #[serde(default)]
    pub visibility: VisibilityConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AwsConfig {
    pub region: String,
    pub bucket: String,
    pub table: String,
    /// Override for S3-compatible stores (MinIO, LocalStack).
    #[serde(default)]
    pub s3_endpoint_url: Option<String>,
    #[serde(default)]
    pub dynamodb_endpoint_url: Option<String>,
    #[serde(default)]
    pub comprehend_endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            max_file_size_mb: default_max_file_size_mb(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl UploadConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

fn default_prefix() -> String {
    metastream_core::normalize::UPLOAD_PREFIX.to_string()
}
fn default_max_file_size_mb() -> u64 {
    100
}
fn default_allowed_extensions() -> Vec<String> {
    ["csv", "tsv", "xlsx", "txt", "json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_poll_page_size")]
    pub page_size: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
            page_size: default_poll_page_size(),
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_max_attempts() -> u32 {
    10
}
fn default_interval_ms() -> u64 {
    3000
}
fn default_poll_page_size() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default = "default_dashboard_page_size")]
    pub page_size: usize,
    #[serde(default = "default_sort")]
    pub sort: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            page_size: default_dashboard_page_size(),
            sort: default_sort(),
        }
    }
}

impl DashboardConfig {
    pub fn sort_order(&self) -> Result<SortOrder> {
        self.sort.parse()
    }
}

fn default_dashboard_page_size() -> usize {
    100
}
fn default_sort() -> String {
    "upload_time".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PhrasesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,
}

impl Default for PhrasesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: default_language(),
            max_input_bytes: default_max_input_bytes(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_language() -> String {
    "en".to_string()
}
fn default_max_input_bytes() -> usize {
    metastream_core::phrases::DEFAULT_MAX_INPUT_BYTES
}

#[derive(Debug, Deserialize, Clone)]
pub struct VisibilityConfig {
    #[serde(default = "default_visibility_dir")]
    pub dir: PathBuf,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            dir: default_visibility_dir(),
        }
    }
}

fn default_visibility_dir() -> PathBuf {
    PathBuf::from("./data/local-storage")
}

/// Text analysis rejects inputs over 5000 bytes.
const MAX_DETECTOR_INPUT_BYTES: usize = 5000;

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate aws
    if config.aws.region.trim().is_empty() {
        anyhow::bail!("aws.region must not be empty");
    }
    if config.aws.bucket.trim().is_empty() {
        anyhow::bail!("aws.bucket must not be empty");
    }
    if config.aws.table.trim().is_empty() {
        anyhow::bail!("aws.table must not be empty");
    }

    // Validate upload
    if config.upload.allowed_extensions.is_empty() {
        anyhow::bail!("upload.allowed_extensions must list at least one extension");
    }
    if config.upload.max_file_size_mb == 0 {
        anyhow::bail!("upload.max_file_size_mb must be > 0");
    }

    // Validate poll
    if config.poll.max_attempts < 1 {
        anyhow::bail!("poll.max_attempts must be >= 1");
    }
    if config.poll.page_size < 1 {
        anyhow::bail!("poll.page_size must be >= 1");
    }

    // Validate dashboard
    if config.dashboard.page_size < 1 {
        anyhow::bail!("dashboard.page_size must be >= 1");
    }
    if config.dashboard.sort_order().is_err() {
        anyhow::bail!(
            "Unknown dashboard.sort: '{}'. Must be upload_time or filename.",
            config.dashboard.sort
        );
    }

    // Validate phrases
    if !(1..=MAX_DETECTOR_INPUT_BYTES).contains(&config.phrases.max_input_bytes) {
        anyhow::bail!(
            "phrases.max_input_bytes must be in [1, {}]",
            MAX_DETECTOR_INPUT_BYTES
        );
    }

    Ok(config)
}

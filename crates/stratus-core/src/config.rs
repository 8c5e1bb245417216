//! Configuration types for Stratus jobs.
//!
//! A job is described by a TOML file (`~/.config/stratus/job.toml` by
//! default). A handful of keys can be overridden from the environment so the
//! same file works across deployments:
//!
//! defaults -> job file -> environment variables -> CLI args

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::commit::RetryPolicy;
use crate::error::AppError;
use crate::filter::RecordFilter;
use crate::models::{KeySpec, MAX_BATCH_OPS};
use crate::upsert::UpsertConfig;

/// Database connection pool configuration.
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

impl DbConfig {
    /// Reads `DB_MAX_CONNECTIONS`, falling back to the default.
    pub fn from_env() -> Self {
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::default().max_connections);
        Self { max_connections }
    }
}

// =============================================================================
// Job Configuration (job.toml)
// =============================================================================

fn default_environment() -> String {
    "dev".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_concurrency() -> usize {
    10
}

fn default_database() -> String {
    "default".to_string()
}

fn default_max_batch_size() -> usize {
    MAX_BATCH_OPS
}

fn default_max_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_join_field() -> String {
    "project_id".to_string()
}

/// Target store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Logical database the collection lives in.
    #[serde(default = "default_database")]
    pub database: String,

    /// Collection records are written to.
    #[serde(default)]
    pub collection: String,

    /// Records per atomic batch (1..=500).
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Total commit attempts per batch.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Merge into existing documents instead of replacing them.
    #[serde(default = "default_true")]
    pub merge: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            collection: String::new(),
            max_batch_size: default_max_batch_size(),
            max_retries: default_max_retries(),
            merge: true,
        }
    }
}

impl StoreConfig {
    pub fn upsert_config(&self) -> UpsertConfig {
        UpsertConfig::new(self.collection.clone())
            .with_max_batch_size(self.max_batch_size)
            .with_merge(self.merge)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_retries(self.max_retries)
    }
}

/// Side-table enrichment settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Database holding the side table. Defaults to the store database.
    pub database: Option<String>,

    /// Collection holding the side table.
    pub collection: Option<String>,

    /// Field joining records to side-table rows.
    #[serde(default = "default_join_field")]
    pub join_field: String,

    /// Fields copied from the side table onto records.
    #[serde(default)]
    pub fields: Vec<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            database: None,
            collection: None,
            join_field: default_join_field(),
            fields: Vec::new(),
        }
    }
}

impl EnrichmentConfig {
    pub fn is_enabled(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// Post-write steps of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Write a `{collection}_metadata/latest` document after the run.
    #[serde(default = "default_true")]
    pub write_metadata: bool,

    /// Delete documents not produced by this run.
    #[serde(default)]
    pub prune_stale: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            write_metadata: true,
            prune_stale: false,
        }
    }
}

/// Where records are read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// A `.jsonl` file or a directory of them.
    pub path: Option<PathBuf>,
}

/// Root configuration structure for a job file.
///
/// # Example
///
/// ```toml
/// environment = "prod"
///
/// [store]
/// database = "cost-db"
/// collection = "cost_anomalies"
///
/// [key]
/// fields = ["anomaly_id"]
///
/// [enrichment]
/// collection = "projects"
/// fields = ["appcode", "lob"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Deployment environment, recorded in run metadata.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level for the CLI subscriber.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Units processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub store: StoreConfig,

    pub key: KeySpec,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    #[serde(default)]
    pub filter: RecordFilter,

    #[serde(default)]
    pub run: RunOptions,

    #[serde(default)]
    pub source: SourceConfig,
}

impl JobConfig {
    /// Parses a job file's contents.
    pub fn from_toml_str(content: &str) -> Result<Self, AppError> {
        toml::from_str(content).map_err(|e| AppError::ConfigError(format!("Invalid TOML: {}", e)))
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), AppError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`, keyed by environment variable name.
    ///
    /// Recognized: `ENVIRONMENT`, `LOG_LEVEL`, `INGEST_CONCURRENCY`,
    /// `STORE_DATABASE`, `STORE_COLLECTION`, `MAX_BATCH_SIZE`, `MAX_RETRIES`,
    /// `ENRICHMENT_DATABASE`, `ENRICHMENT_COLLECTION`,
    /// `ENRICHMENT_JOIN_FIELD`, `ENRICHMENT_FIELDS` (comma separated).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ENVIRONMENT") {
            self.environment = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = lookup("INGEST_CONCURRENCY") {
            self.concurrency = parse_var("INGEST_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("STORE_DATABASE") {
            self.store.database = v;
        }
        if let Some(v) = lookup("STORE_COLLECTION") {
            self.store.collection = v;
        }
        if let Some(v) = lookup("MAX_BATCH_SIZE") {
            self.store.max_batch_size = parse_var("MAX_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("MAX_RETRIES") {
            self.store.max_retries = parse_var("MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("ENRICHMENT_DATABASE") {
            self.enrichment.database = Some(v);
        }
        if let Some(v) = lookup("ENRICHMENT_COLLECTION") {
            self.enrichment.collection = Some(v);
        }
        if let Some(v) = lookup("ENRICHMENT_JOIN_FIELD") {
            self.enrichment.join_field = v;
        }
        if let Some(v) = lookup("ENRICHMENT_FIELDS") {
            self.enrichment.fields = v
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }

    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.store.collection.trim().is_empty() {
            return Err(AppError::ConfigError(
                "store.collection must be set (or STORE_COLLECTION)".to_string(),
            ));
        }
        if self.key.fields.is_empty() {
            return Err(AppError::ConfigError(
                "key.fields must name at least one field".to_string(),
            ));
        }
        if !(1..=MAX_BATCH_OPS).contains(&self.store.max_batch_size) {
            return Err(AppError::ConfigError(format!(
                "store.max_batch_size must be between 1 and {}, got {}",
                MAX_BATCH_OPS, self.store.max_batch_size
            )));
        }
        if self.store.max_retries == 0 {
            return Err(AppError::ConfigError(
                "store.max_retries must be at least 1".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(AppError::ConfigError(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.enrichment.is_enabled() && self.enrichment.collection.is_none() {
            return Err(AppError::ConfigError(
                "enrichment.collection is required when enrichment.fields is set".to_string(),
            ));
        }
        Ok(())
    }

    /// Database holding the enrichment side table.
    pub fn enrichment_database(&self) -> &str {
        self.enrichment
            .database
            .as_deref()
            .unwrap_or(&self.store.database)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, AppError> {
    value.trim().parse().map_err(|_| {
        AppError::ConfigError(format!("{} has an invalid value: '{}'", name, value))
    })
}

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "job.toml";

/// Returns the default configuration directory path.
///
/// Uses XDG Base Directory specification: `~/.config/stratus/`
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("stratus"))
}

/// Returns the default configuration file path.
///
/// Path: `~/.config/stratus/job.toml`
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

/// Template written when no job file exists at the default path.
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Stratus job configuration
#
# Usage:
#   stratus ingest --input anomalies.jsonl
#   stratus ingest --config ~/jobs/invoices.toml --input exports/
#
# Environment variables (STORE_COLLECTION, MAX_BATCH_SIZE, ENRICHMENT_FIELDS, ...)
# override the values below.

environment = "dev"
log_level = "info"
concurrency = 10

[store]
database = "cost-db"
collection = "cost_anomalies"
max_batch_size = 500
max_retries = 3

[key]
fields = ["anomaly_id"]

# [enrichment]
# collection = "projects"
# join_field = "project_id"
# fields = ["appcode", "lob"]

# [filter.min_magnitude]
# field = "cost_impact"
# threshold = 100.0

[run]
write_metadata = true
prune_stale = false
"#;

/// Load a job configuration from a TOML file.
///
/// # Arguments
/// * `path` - Optional custom path. If `None`, uses default XDG path.
///
/// # Behavior
/// If no file exists at the default path, a template is created and loaded.
/// A custom path that does not exist is an error.
pub fn load_job_config(path: Option<PathBuf>) -> Result<JobConfig, AppError> {
    let using_default_path = path.is_none();
    let config_path = match path {
        Some(p) => p,
        None => default_config_path().ok_or_else(|| {
            AppError::ConfigError("Cannot determine the configuration directory".to_string())
        })?,
    };

    if !config_path.exists() {
        if using_default_path {
            create_default_config(&config_path).map_err(|e| {
                AppError::ConfigError(format!(
                    "Could not create default job file '{}': {}",
                    config_path.display(),
                    e
                ))
            })?;
            tracing::info!(
                "Job file created at {}. Edit it to describe your job.",
                config_path.display()
            );
        } else {
            return Err(AppError::ConfigError(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        AppError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    toml::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!(
            "Invalid TOML in '{}': {}",
            config_path.display(),
            e
        ))
    })
}

fn create_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
}

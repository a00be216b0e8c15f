//! Configuration management for cdx-export.
//!
//! The configuration is a flat TOML record holding the bucket, region,
//! canonical storage locations and the manifest of the last export. It is
//! passed to the orchestrator by value and handed back updated; only the CLI
//! reads and writes the file.

use crate::error::{CdxError, Result};
use crate::export::ExportManifest;
use crate::query::PollSettings;
use crate::schema::{validate_identifier, PartitionKey};
use crate::storage::S3Location;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for cdx-export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Bucket holding the allow-list, exports and engine scratch output.
    pub bucket: String,

    /// AWS region of the bucket and the engine.
    #[serde(default = "default_region")]
    pub region: String,

    /// Prefix holding the allow-list CSV.
    pub domains_location: String,

    /// Prefix under which each export gets its own directory.
    pub results_location: String,

    /// Scratch output for engine result files.
    pub athena_results_location: String,

    /// Engine workgroup.
    #[serde(default = "default_workgroup")]
    pub workgroup: String,

    /// Catalog database for the tables and views.
    #[serde(default = "default_database")]
    pub database: String,

    /// Poll timing.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Manifest of the last successful export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_export: Option<ExportManifest>,
}

/// Poll timing as stored in the config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollingConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_workgroup() -> String {
    "primary".to_string()
}

fn default_database() -> String {
    "default".to_string()
}

fn default_interval_secs() -> u64 {
    crate::query::DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_max_wait_secs() -> u64 {
    crate::query::DEFAULT_MAX_WAIT.as_secs()
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl From<PollingConfig> for PollSettings {
    fn from(config: PollingConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            max_wait: Duration::from_secs(config.max_wait_secs),
        }
    }
}

impl Config {
    /// Builds a configuration with the canonical locations inside `bucket`.
    pub fn for_bucket(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        let bucket = bucket.into();
        Self {
            domains_location: format!("s3://{bucket}/domains/"),
            results_location: format!("s3://{bucket}/results/"),
            athena_results_location: format!("s3://{bucket}/athena-results/"),
            bucket,
            region: region.into(),
            workgroup: default_workgroup(),
            database: default_database(),
            polling: PollingConfig::default(),
            last_export: None,
        }
    }

    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cdx-export")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CdxError::config(format!(
                "Config file {} not found. Run `cdx-export init` first",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| CdxError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            CdxError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as TOML, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CdxError::config(format!("Could not create {}: {e}", parent.display()))
            })?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CdxError::config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)
            .map_err(|e| CdxError::config(format!("Failed to write {}: {e}", path.display())))
    }

    /// Checks locations and identifiers before any query is built from them.
    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(CdxError::config("bucket must not be empty"));
        }
        for (name, location) in [
            ("domains_location", &self.domains_location),
            ("results_location", &self.results_location),
            ("athena_results_location", &self.athena_results_location),
        ] {
            S3Location::parse(location)
                .map_err(|e| CdxError::config(format!("{name}: {e}")))?;
        }
        validate_identifier(&self.database)?;
        if self.polling.interval_secs == 0 {
            return Err(CdxError::config("polling.interval_secs must be positive"));
        }
        Ok(())
    }

    /// Poll timing for the query runner.
    pub fn poll_settings(&self) -> PollSettings {
        self.polling.into()
    }

    /// Domains prefix, always ending in `/`.
    pub fn domains_prefix(&self) -> String {
        with_trailing_slash(&self.domains_location)
    }

    /// Output prefix for one partition's export.
    ///
    /// Distinct partitions get distinct prefixes, so concurrent runs for
    /// different targets never share an output directory.
    pub fn export_prefix(&self, key: &PartitionKey) -> String {
        let results = with_trailing_slash(&self.results_location);
        if key.subset == crate::export::DEFAULT_SUBSET {
            format!("{results}{}-cdx-json/", key.crawl_id)
        } else {
            format!("{results}{}-{}-cdx-json/", key.crawl_id, key.subset)
        }
    }

    /// Returns a copy recording `manifest` as the last export.
    pub fn with_last_export(&self, manifest: ExportManifest) -> Self {
        Self {
            last_export: Some(manifest),
            ..self.clone()
        }
    }

    /// Writes this configuration to `path` with `manifest` as the last export.
    ///
    /// Callers treat a failure as bookkeeping only: the export it records has
    /// already completed.
    pub fn persist_last_export(&self, path: &Path, manifest: ExportManifest) -> Result<()> {
        self.with_last_export(manifest).save_to_file(path)
    }

    /// Loads AWS SDK configuration for this region.
    pub async fn aws_sdk_config(&self) -> SdkConfig {
        aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .load()
            .await
    }
}

fn with_trailing_slash(location: &str) -> String {
    format!("{}/", location.trim_end_matches('/'))
}

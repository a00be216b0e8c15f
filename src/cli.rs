//! Command-line argument parsing for cdx-export.

use cdx_export::config::Config;
use cdx_export::error::Result;
use cdx_export::export::{DEFAULT_CRAWL_ID, DEFAULT_SUBSET};
use cdx_export::schema::PartitionKey;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Deduplicated Common Crawl index exports through Athena.
#[derive(Parser, Debug)]
#[command(name = "cdx-export")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true, env = "CDX_EXPORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a configuration for a bucket
    Init {
        /// Bucket for the allow-list, exports and engine output
        #[arg(long, env = "CDX_EXPORT_BUCKET")]
        bucket: String,

        /// AWS region
        #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
        region: String,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Upload the allow-list CSV (single `domain` column with a header)
    Upload {
        #[arg(value_name = "CSV")]
        path: PathBuf,
    },

    /// Export the latest HTML capture per digest for one crawl
    Export(ExportArgs),

    /// List the files of the last export
    Results,

    /// Print the first lines of the last export
    Preview {
        /// Number of lines to print
        #[arg(short = 'n', long, default_value_t = 5)]
        lines: usize,
    },
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Crawl identifier
    #[arg(long, value_name = "CRAWL_ID", default_value = DEFAULT_CRAWL_ID)]
    pub crawl: String,

    /// Index subset
    #[arg(long, default_value = DEFAULT_SUBSET)]
    pub subset: String,

    /// Give up waiting for a query after this many minutes
    #[arg(long, value_name = "MINUTES")]
    pub max_wait_mins: Option<u64>,

    /// Seconds between status checks
    #[arg(long, value_name = "SECONDS")]
    pub poll_interval_secs: Option<u64>,

    /// Run against the in-memory engine and store (nothing leaves the process)
    #[arg(long)]
    pub mock_engine: bool,

    /// JSON Lines file of index rows for the in-memory engine
    #[arg(long, value_name = "PATH", requires = "mock_engine")]
    pub seed: Option<PathBuf>,

    /// Allow-list CSV for the in-memory engine
    #[arg(long, value_name = "PATH", requires = "mock_engine")]
    pub domains: Option<PathBuf>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path, using the default if not specified.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }
}

impl ExportArgs {
    /// Validated crawl/subset pair.
    pub fn partition_key(&self) -> Result<PartitionKey> {
        PartitionKey::new(&self.crawl, &self.subset)
    }

    /// Applies command-line poll timing on top of `config`.
    pub fn apply_overrides(&self, mut config: Config) -> Config {
        if let Some(mins) = self.max_wait_mins {
            config.polling.max_wait_secs = mins * 60;
        }
        if let Some(secs) = self.poll_interval_secs {
            config.polling.interval_secs = secs;
        }
        config
    }
}

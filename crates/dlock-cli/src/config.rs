//! Configuration for the dlock binary
//!
//! Settings are layered: built-in defaults, then `conf/dlock.yml` (optional),
//! then `DLOCK_*` environment variables, then command line flags.

use std::path::PathBuf;

use clap::Parser;
use config::{Config, Environment, File};
use dlock_core::LockConfig;
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "conf/dlock.yml";
const ENV_PREFIX: &str = "DLOCK";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "dlock", version, about = "Drive contending workers through a distributed lock")]
pub struct Cli {
    /// Settings file
    #[arg(short = 'c', long = "config", env = "DLOCK_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
    /// Lock path contended for
    #[arg(short = 'p', long = "lock-path")]
    pub lock_path: Option<String>,
    /// Concurrent workers, each with its own session
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<u64>,
    /// Acquisitions per worker
    #[arg(short = 'r', long = "rounds")]
    pub rounds: Option<u64>,
    /// How long each acquisition holds the lock
    #[arg(long = "hold-ms")]
    pub hold_ms: Option<u64>,
    /// Per-acquisition timeout
    #[arg(long = "acquire-timeout-ms")]
    pub acquire_timeout_ms: Option<u64>,
    /// Emit sequence numbers without zero padding
    #[arg(long = "unpadded")]
    pub unpadded: bool,
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
    #[arg(long = "log-dir")]
    pub log_dir: Option<PathBuf>,
    /// Print the report as JSON
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub console: bool,
    /// Directory for the rolling log file; console only when absent
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: true,
            dir: None,
        }
    }
}

/// Resolved settings for one run
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    #[serde(default = "default_lock_path")]
    pub lock_path: String,
    #[serde(default = "default_workers")]
    pub workers: u64,
    #[serde(default = "default_rounds")]
    pub rounds: u64,
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
    #[serde(default)]
    pub unpadded: bool,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::from(cli.config.as_path()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = &cli.lock_path {
            builder = builder.set_override("lock_path", v.as_str())?;
        }
        if let Some(v) = cli.workers {
            builder = builder.set_override("workers", v)?;
        }
        if let Some(v) = cli.rounds {
            builder = builder.set_override("rounds", v)?;
        }
        if let Some(v) = cli.hold_ms {
            builder = builder.set_override("hold_ms", v)?;
        }
        if let Some(v) = cli.acquire_timeout_ms {
            builder = builder.set_override("lock.acquire_timeout_ms", v)?;
        }
        if cli.unpadded {
            builder = builder.set_override("unpadded", true)?;
        }
        if let Some(v) = &cli.log_level {
            builder = builder.set_override("logging.level", v.as_str())?;
        }
        if let Some(v) = &cli.log_dir {
            builder = builder.set_override("logging.dir", v.to_string_lossy().into_owned())?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.workers > 0, "workers must be at least 1");
        anyhow::ensure!(
            self.lock_path.starts_with('/') && self.lock_path.len() > 1,
            "lock_path must be an absolute path below the root, got '{}'",
            self.lock_path
        );
        Ok(())
    }
}

fn default_lock_path() -> String {
    "/locks/dlock".to_string()
}

fn default_workers() -> u64 {
    4
}

fn default_rounds() -> u64 {
    5
}

fn default_hold_ms() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

//! # hydrograph
//!
//! Captures the CEHQ station graph, publishes web-ready derivatives and
//! stamps the last published graph once it goes stale.
//!
//! ## Configuration
//!
//! Every flag falls back to an environment variable:
//!
//! - `STATION_NUMBER` / `GRAPH_URL` - graph page (URL wins when both are set)
//! - `LAST_SUCCESS_FILE` - canonical status record
//! - `OUTPUT_DIR` - published artifacts and the public status mirror
//! - `BACKUP_DIR`, `BACKUP_SCRIPT` - one-time web root backup
//! - `FETCH_RETRY_COUNT`, `FETCH_RETRY_DELAY_SECONDS` - retry policy
//! - `TZ` - timezone recorded with each success
//! - `HYDROGRAPH_CONFIG` - optional TOML file with the remaining settings

#![forbid(unsafe_code)]

use clap::Parser;
use hydrograph_core::types::{Config, ConfigError, DEFAULT_STATION_NUMBER, Settings, StationNumber};
use std::path::PathBuf;
use tracing::warn;

/// Hydrometric graph capture.
#[derive(Debug, Parser)]
#[command(name = "hydrograph")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Station number used to build the graph URL.
    #[arg(long, env = "STATION_NUMBER", default_value = DEFAULT_STATION_NUMBER)]
    pub station_number: String,

    /// Explicit graph URL, overriding the station number.
    #[arg(long, env = "GRAPH_URL")]
    pub graph_url: Option<String>,

    /// Only check staleness and stamp the published graph if needed.
    #[arg(long)]
    pub check_stale: bool,

    /// Canonical status record.
    #[arg(
        long,
        env = "LAST_SUCCESS_FILE",
        default_value = "/opt/graph_automation/last_success.json"
    )]
    pub status_file: PathBuf,

    /// Directory the artifacts are published to.
    #[arg(long, env = "OUTPUT_DIR", default_value = "/usr/share/nginx/html/graphs")]
    pub output_dir: PathBuf,

    /// Backup volume; the backup is skipped when it is absent.
    #[arg(long, env = "BACKUP_DIR", default_value = "/backup")]
    pub backup_dir: PathBuf,

    /// Script creating the initial web root backup.
    #[arg(long, env = "BACKUP_SCRIPT", default_value = "/app/backup_web_root.sh")]
    pub backup_script: PathBuf,

    /// Capture attempts before falling back to the staleness check.
    #[arg(long, env = "FETCH_RETRY_COUNT")]
    pub retry_count: Option<u32>,

    /// Seconds between attempts.
    #[arg(long, env = "FETCH_RETRY_DELAY_SECONDS")]
    pub retry_delay_secs: Option<u64>,

    /// IANA timezone recorded with each success.
    #[arg(long, env = "TZ", default_value = "America/Montreal")]
    pub timezone: String,

    /// TOML settings file. Missing files mean defaults.
    #[arg(long, env = "HYDROGRAPH_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Builds the runtime configuration. Flags win over the settings file.
    pub fn config(&self) -> Result<Config, ConfigError> {
        let graph_url = match self.graph_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => StationNumber::try_new(self.station_number.clone())?.graph_url(),
        };

        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        if let Some(retry_count) = self.retry_count {
            settings.capture.retry_count = retry_count;
        }
        if let Some(retry_delay_secs) = self.retry_delay_secs {
            settings.capture.retry_delay_secs = retry_delay_secs;
        }
        let problems = settings.validate();
        if !problems.is_empty() {
            warn!(?problems, "Invalid settings replaced with defaults");
            settings = settings.with_defaults_for_invalid();
        }

        Ok(Config {
            graph_url,
            output_dir: self.output_dir.clone(),
            status_file: self.status_file.clone(),
            backup_dir: self.backup_dir.clone(),
            backup_script: self.backup_script.clone(),
            timezone: Config::parse_timezone(&self.timezone)?,
            settings,
        })
    }
}

#[cfg(test)]
mod tests;

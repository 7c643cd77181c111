use super::{Settings, SettingsError};
use crate::types::StationNumberError;
use chrono_tz::Tz;
use std::path::PathBuf;
use thiserror::Error;

pub const MASTER_FILE: &str = "latest_graph_cropped.png";
pub const COMPRESSED_FILE: &str = "latest_graph_compressed.png";
pub const JPEG_FILE: &str = "latest_graph.jpg";
pub const POINTER_FILE: &str = "latest_graph.png";
pub const PUBLIC_STATUS_FILE: &str = "last_success.json";

/// Runtime configuration, built once at startup and passed down.
#[derive(Clone, Debug)]
pub struct Config {
    pub graph_url: String,
    pub output_dir: PathBuf,
    /// Canonical status record; the public mirror lives in `output_dir`.
    pub status_file: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_script: PathBuf,
    pub timezone: Tz,
    pub settings: Settings,
}

impl Config {
    /// Resolves an IANA zone name such as `America/Montreal`.
    pub fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
        name.trim()
            .parse()
            .map_err(|_| ConfigError::Timezone(name.to_string()))
    }

    pub fn public_status_file(&self) -> PathBuf {
        self.output_dir.join(PUBLIC_STATUS_FILE)
    }

    pub fn master_path(&self) -> PathBuf {
        self.output_dir.join(MASTER_FILE)
    }

    pub fn compressed_path(&self) -> PathBuf {
        self.output_dir.join(COMPRESSED_FILE)
    }

    pub fn jpeg_path(&self) -> PathBuf {
        self.output_dir.join(JPEG_FILE)
    }

    pub fn pointer_path(&self) -> PathBuf {
        self.output_dir.join(POINTER_FILE)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid station number: {0}")]
    Station(#[from] StationNumberError),

    #[error("Unknown timezone: {0}")]
    Timezone(String),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timezone() {
        assert_eq!(
            Config::parse_timezone(" America/Montreal ").unwrap(),
            chrono_tz::America::Montreal
        );
        assert!(matches!(
            Config::parse_timezone("Eastern"),
            Err(ConfigError::Timezone(_))
        ));
    }

    #[test]
    fn test_artifact_paths() {
        let config = Config {
            graph_url: String::new(),
            output_dir: PathBuf::from("/srv/graphs"),
            status_file: PathBuf::from("/opt/state/last_success.json"),
            backup_dir: PathBuf::from("/backup"),
            backup_script: PathBuf::from("/app/backup_web_root.sh"),
            timezone: chrono_tz::UTC,
            settings: Settings::default(),
        };

        assert_eq!(config.master_path(), PathBuf::from("/srv/graphs/latest_graph_cropped.png"));
        assert_eq!(config.pointer_path(), PathBuf::from("/srv/graphs/latest_graph.png"));
        assert_eq!(
            config.public_status_file(),
            PathBuf::from("/srv/graphs/last_success.json")
        );
    }
}

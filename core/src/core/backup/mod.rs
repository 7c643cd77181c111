use std::path::PathBuf;
use tracing::{debug, info, warn};

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum BackupError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("backup script exited with {0}")]
        ScriptFailed(std::process::ExitStatus),
    }
}

use error::BackupError;

#[derive(Debug, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The backup volume is not mounted.
    NoBackupDir,
    /// A previous backup of the graphs already exists.
    AlreadyPresent,
    /// No script to run.
    NoScript,
    /// The script ran successfully.
    Created,
}

/// One-time disaster-recovery backup of the web root, run after a successful
/// capture when no backup exists yet.
pub struct BackupTrigger {
    pub backup_dir: PathBuf,
    pub script: PathBuf,
}

impl BackupTrigger {
    pub fn new(backup_dir: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            script: script.into(),
        }
    }

    /// Runs the backup script unless a backup is already present.
    pub async fn ensure_backup(&self) -> Result<BackupOutcome, BackupError> {
        if !self.backup_dir.is_dir() {
            debug!(dir = %self.backup_dir.display(), "Backup directory absent");
            return Ok(BackupOutcome::NoBackupDir);
        }

        let graphs = self.backup_dir.join("graphs");
        if graphs.is_dir() && std::fs::read_dir(&graphs)?.next().is_some() {
            return Ok(BackupOutcome::AlreadyPresent);
        }

        if !self.script.is_file() {
            warn!(script = %self.script.display(), "Backup script not found");
            return Ok(BackupOutcome::NoScript);
        }

        let status = tokio::process::Command::new(&self.script).status().await?;
        if !status.success() {
            return Err(BackupError::ScriptFailed(status));
        }
        info!("Initial backup completed");
        Ok(BackupOutcome::Created)
    }
}

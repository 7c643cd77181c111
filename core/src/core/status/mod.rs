//! Freshness record persisted as two mirrored JSON files.

use crate::core::fs;
use crate::core::overlay::Overlay;
use crate::types::StatusRecord;
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum PersistenceError {
        #[error("IO error on {path}: {source}")]
        Io {
            path: std::path::PathBuf,
            #[source]
            source: std::io::Error,
        },

        #[error("JSON error: {0}")]
        Json(#[from] serde_json::Error),
    }
}

use error::PersistenceError;

/// Result of a staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleOutcome {
    /// No successful capture was ever recorded.
    NoRecord,
    /// The overlay was already stamped during this outage.
    AlreadyApplied,
    /// The last success is within the threshold.
    Fresh { elapsed: TimeDelta },
    /// The master was stamped and the record flagged.
    Stamped { elapsed: TimeDelta },
}

pub struct StatusStore {
    /// Authoritative copy.
    pub canonical: PathBuf,
    /// Publicly served copy, kept byte-identical to the canonical one.
    pub public: PathBuf,
    pub timezone: Tz,
}

impl StatusStore {
    pub fn new(canonical: impl Into<PathBuf>, public: impl Into<PathBuf>, timezone: Tz) -> Self {
        Self {
            canonical: canonical.into(),
            public: public.into(),
            timezone,
        }
    }

    /// Reads the canonical record. An unreadable or malformed file counts as
    /// "no prior success".
    pub fn load(&self) -> Result<Option<StatusRecord>, PersistenceError> {
        let bytes = match std::fs::read(&self.canonical) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.canonical.clone(),
                    source,
                });
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                error!(path = %self.canonical.display(), error = %e, "Error reading status file");
                Ok(None)
            }
        }
    }

    /// Overwrites both mirrors with a fresh record. Always clears `stale_applied`.
    pub fn record_success(&self, now: DateTime<Utc>) -> Result<StatusRecord, PersistenceError> {
        let record = StatusRecord::success_at(now, self.timezone);
        self.publish(&record)?;
        info!(at = %record.last_successful_run, "Success timestamp updated");
        Ok(record)
    }

    /// Flags the current outage as stamped. No-op without a prior success.
    pub fn mark_stale_applied(&self) -> Result<bool, PersistenceError> {
        let Some(mut record) = self.load()? else {
            return Ok(false);
        };
        record.stale_applied = true;
        self.publish(&record)?;
        Ok(true)
    }

    /// Stamps `master` once per outage when the last success is older than
    /// `threshold`. Safe to call after every failed attempt.
    pub fn check_staleness_and_maybe_overlay(
        &self,
        now: DateTime<Utc>,
        threshold: TimeDelta,
        master: &Path,
        overlay: &Overlay,
        text: &str,
    ) -> Result<StaleOutcome, PersistenceError> {
        let Some(record) = self.load()? else {
            return Ok(StaleOutcome::NoRecord);
        };
        if record.stale_applied {
            info!("Stale overlay already applied. Skipping");
            return Ok(StaleOutcome::AlreadyApplied);
        }

        let elapsed = record.elapsed_since_success(now);
        if !record.is_stale(now, threshold) {
            return Ok(StaleOutcome::Fresh { elapsed });
        }

        warn!(
            elapsed_minutes = elapsed.num_minutes(),
            threshold_hours = threshold.num_hours(),
            "Data is stale, overlaying published image"
        );
        overlay.apply(master, text);
        self.mark_stale_applied()?;
        Ok(StaleOutcome::Stamped { elapsed })
    }

    /// Writes one serialized record to both destinations, canonical first.
    /// Each destination is replaced by rename so readers never see a torn file.
    fn publish(&self, record: &StatusRecord) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec(record)?;
        write_replace(&self.canonical, &bytes)?;
        if let Err(e) = write_replace(&self.public, &bytes) {
            warn!(error = %e, "Public status mirror diverged from canonical record");
            return Err(e);
        }
        Ok(())
    }
}

fn write_replace(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    fs::replace_file(path, bytes).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

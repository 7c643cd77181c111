//! Capture orchestration: export, process, record, and the stale fallback.

use crate::core::acquisition::ChartExporter;
use crate::core::backup::{BackupOutcome, BackupTrigger};
use crate::core::overlay::Overlay;
use crate::core::pipeline::{ArtifactSet, ImagePipeline};
use crate::core::status::{StaleOutcome, StatusStore};
use crate::types::Config;
use chrono::{DateTime, Utc};
use error::CaptureError;
use tracing::{error, info, warn};

pub mod acquisition;
pub mod backup;
pub(crate) mod fs;
pub mod overlay;
pub mod pipeline;
pub mod status;

pub mod error {
    use crate::core::acquisition::error::AcquisitionError;
    use crate::core::pipeline::error::ImageProcessingError;
    use thiserror::Error;

    /// Failure of a single capture attempt. Every variant is retried.
    #[derive(Debug, Error)]
    pub enum CaptureError {
        #[error("Acquisition error: {0}")]
        Acquisition(#[from] AcquisitionError),

        #[error("Image processing error: {0}")]
        ImageProcessing(#[from] ImageProcessingError),
    }
}

/// How a run ended. Neither variant is a process failure.
#[derive(Debug)]
pub enum RunOutcome {
    Captured {
        attempts: u32,
        artifacts: ArtifactSet,
    },
    /// Every attempt failed; `stale` is `None` when the check itself failed.
    Exhausted {
        attempts: u32,
        stale: Option<StaleOutcome>,
    },
}

pub struct GraphCapture<E: ChartExporter> {
    config: Config,
    exporter: E,
    pipeline: ImagePipeline,
    status: StatusStore,
    overlay: Overlay,
    backup: BackupTrigger,
}

impl<E: ChartExporter> GraphCapture<E> {
    pub fn new(config: Config, exporter: E) -> Self {
        let pipeline = ImagePipeline::new(&config.output_dir, config.settings.image.clone());
        let status = StatusStore::new(
            &config.status_file,
            config.public_status_file(),
            config.timezone,
        );
        let overlay = Overlay::new(config.settings.overlay.clone());
        let backup = BackupTrigger::new(&config.backup_dir, &config.backup_script);
        Self {
            config,
            exporter,
            pipeline,
            status,
            overlay,
            backup,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> &StatusStore {
        &self.status
    }

    /// Attempts the capture up to `retry_count` times, sleeping `retry_delay`
    /// between attempts. Falls back to the staleness check once exhausted.
    pub async fn run(&self) -> RunOutcome {
        let capture = &self.config.settings.capture;
        let max_attempts = capture.retry_count.max(1);

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, url = %self.config.graph_url, "Capture attempt");
            match self.attempt().await {
                Ok(artifacts) => {
                    info!(attempt, "Capture succeeded");
                    self.on_success().await;
                    return RunOutcome::Captured {
                        attempts: attempt,
                        artifacts,
                    };
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "Capture attempt failed");
                    if attempt < max_attempts {
                        tokio::time::sleep(capture.retry_delay()).await;
                    }
                }
            }
        }

        error!(max_attempts, "All capture attempts failed, checking staleness");
        RunOutcome::Exhausted {
            attempts: max_attempts,
            stale: self.check_stale(),
        }
    }

    /// Staleness check alone, without any acquisition.
    pub fn check_stale(&self) -> Option<StaleOutcome> {
        self.check_stale_at(Utc::now())
    }

    pub fn check_stale_at(&self, now: DateTime<Utc>) -> Option<StaleOutcome> {
        let result = self.status.check_staleness_and_maybe_overlay(
            now,
            self.config.settings.capture.stale_threshold(),
            &self.config.master_path(),
            &self.overlay,
            &self.config.settings.overlay.warning_text,
        );
        match result {
            Ok(outcome) => {
                match &outcome {
                    StaleOutcome::NoRecord => {
                        warn!("No successful capture recorded, staleness unknown");
                    }
                    StaleOutcome::Fresh { elapsed } => {
                        info!(elapsed_minutes = elapsed.num_minutes(), "Data is fresh");
                    }
                    StaleOutcome::AlreadyApplied | StaleOutcome::Stamped { .. } => {}
                }
                Some(outcome)
            }
            Err(e) => {
                error!(error = %e, "Staleness check failed");
                None
            }
        }
    }

    async fn attempt(&self) -> Result<ArtifactSet, CaptureError> {
        let bytes = self.exporter.export(&self.config.graph_url).await?;
        info!(bytes = bytes.len(), "Chart exported");
        Ok(self.pipeline.process(&bytes)?)
    }

    /// Status and backup failures are logged only; the artifacts are already
    /// published at this point.
    async fn on_success(&self) {
        if let Err(e) = self.status.record_success(Utc::now()) {
            error!(error = %e, "Failed to record successful capture");
        }
        match self.backup.ensure_backup().await {
            Ok(BackupOutcome::Created) => info!("Initial web root backup created"),
            Ok(outcome) => info!(?outcome, "Backup not needed"),
            Err(e) => error!(error = %e, "Backup failed"),
        }
    }
}

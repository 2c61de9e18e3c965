//! Per-device backup workflow.
//!
//! Drives one device through connect, identify, create, transfer and cleanup.
//! Only connection and identity failures end a device early; everything after
//! that is recorded per artifact so a broken export never costs the snapshot.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::commands::RemoteCommand;
use super::error::BackupError;
use super::models::{
    ArtifactKind, BackupJob, DeviceEndpoint, DeviceReport, FailureReason, RemoteArtifact,
};
use super::parser::OutputParser;
use super::retry::{FailedAttempt, RetryExecutor, RetryPolicy};
use super::transport::DeviceTransport;

/// Default pause between issuing the create commands and listing files.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Connecting,
    Identifying,
    CreatingArtifacts,
    Transferring,
    CleaningUp,
    Done,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::CreatingArtifacts => "creating_artifacts",
            Self::Transferring => "transferring",
            Self::CleaningUp => "cleaning_up",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub backup_directory: PathBuf,
    pub retry: RetryPolicy,
    pub settle_delay: Duration,
}

pub struct DeviceWorkflow {
    transport: Arc<dyn DeviceTransport>,
    parser: Arc<dyn OutputParser>,
    retry: RetryExecutor,
    backup_directory: PathBuf,
    settle_delay: Duration,
}

impl DeviceWorkflow {
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        parser: Arc<dyn OutputParser>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            transport,
            parser,
            retry: RetryExecutor::new(settings.retry),
            backup_directory: settings.backup_directory,
            settle_delay: settings.settle_delay,
        }
    }

    /// Back up one device. Never fails outright; the report carries the verdict.
    pub async fn run(&self, endpoint: &DeviceEndpoint) -> DeviceReport {
        let span = info_span!("device", address = %endpoint.host);
        self.run_inner(endpoint).instrument(span).await
    }

    /// Connect and resolve the device identity without creating anything.
    pub async fn connect_and_identify(
        &self,
        endpoint: &DeviceEndpoint,
    ) -> Result<String, FailureReason> {
        transition(WorkflowState::Connecting);
        info!("Connecting to device");
        if let Err(e) = self.transport.probe(endpoint).await {
            error!(step = "connect", error = %e, "SSH connection failed");
            return Err(FailureReason::ConnectionFailed(e.to_string()));
        }

        transition(WorkflowState::Identifying);
        match self.identify(endpoint).await {
            Ok(identity) => {
                info!(identity = %identity, "Connection established");
                Ok(identity)
            }
            Err(e) => {
                error!(step = "identify", error = %e, "Failed to fetch system identity");
                Err(FailureReason::IdentityUnavailable(e.to_string()))
            }
        }
    }

    async fn run_inner(&self, endpoint: &DeviceEndpoint) -> DeviceReport {
        let address = endpoint.host.as_str();

        let identity = match self.connect_and_identify(endpoint).await {
            Ok(identity) => identity,
            Err(reason) => return DeviceReport::failed(address, reason),
        };

        let mut job = BackupJob::new(address, &identity, Local::now().naive_local());

        transition(WorkflowState::CreatingArtifacts);
        self.create_artifact(endpoint, &mut job, ArtifactKind::Snapshot).await;
        self.create_artifact(endpoint, &mut job, ArtifactKind::Export).await;

        if job.snapshot.created || job.export.created {
            debug!(
                delay_ms = self.settle_delay.as_millis() as u64,
                "Waiting for device to register files"
            );
            sleep(self.settle_delay).await;

            for kind in [ArtifactKind::Snapshot, ArtifactKind::Export] {
                if job.artifact(kind).created {
                    self.handle_artifact(endpoint, &mut job, kind).await;
                }
            }
        }

        let outcome = job.conclude();
        transition(WorkflowState::Done);

        DeviceReport {
            address: address.to_string(),
            outcome,
            job: Some(job),
        }
    }

    async fn identify(&self, endpoint: &DeviceEndpoint) -> Result<String, BackupError> {
        let output = self
            .transport
            .execute(endpoint, &RemoteCommand::IdentityPrint.render())
            .await?;
        self.parser.parse_identity(&output)
    }

    async fn locate(
        &self,
        endpoint: &DeviceEndpoint,
        filename: &str,
    ) -> Result<RemoteArtifact, BackupError> {
        let listing = self
            .transport
            .execute(endpoint, &RemoteCommand::FilePrintDetail.render())
            .await?;
        self.parser.locate_file(&listing, filename)
    }

    async fn create_artifact(
        &self,
        endpoint: &DeviceEndpoint,
        job: &mut BackupJob,
        kind: ArtifactKind,
    ) {
        let filename = job.artifact(kind).filename.clone();
        let command = match kind {
            ArtifactKind::Snapshot => RemoteCommand::BackupSave {
                name: filename.clone(),
            },
            ArtifactKind::Export => RemoteCommand::Export {
                file: filename.clone(),
            },
        }
        .render();

        let result = self
            .retry
            .run(
                || self.transport.execute(endpoint, &command),
                |failed| report_retry("create", kind, failed),
            )
            .await;

        let artifact = job.artifact_mut(kind);
        match result {
            Ok(_) => {
                info!(artifact = %kind, file = %filename, "Artifact created");
                artifact.created = true;
            }
            Err(e) => {
                error!(step = "create", artifact = %kind, error = %e, "Failed to create artifact");
                artifact.error = Some(format!("failed to create {}: {}", filename, e));
            }
        }
    }

    /// Locate, download and remove one created artifact.
    async fn handle_artifact(
        &self,
        endpoint: &DeviceEndpoint,
        job: &mut BackupJob,
        kind: ArtifactKind,
    ) {
        transition(WorkflowState::Transferring);
        let filename = job.artifact(kind).filename.clone();

        let located = self
            .retry
            .run(
                || self.locate(endpoint, &filename),
                |failed| report_retry("locate", kind, failed),
            )
            .await;

        let remote = match located {
            Ok(remote) => remote,
            Err(e) => {
                error!(step = "locate", artifact = %kind, error = %e, "Failed to locate file");
                job.artifact_mut(kind).error =
                    Some(format!("failed to locate file {}: {}", filename, e));
                return;
            }
        };
        job.artifact_mut(kind).remote_path = Some(remote.remote_path.clone());

        let destination = self.backup_directory.join(&remote.filename);
        info!(
            artifact = %kind,
            remote_path = %remote.remote_path,
            destination = %destination.display(),
            "Downloading file"
        );

        let downloaded = self
            .retry
            .run(
                || self.transport.download(endpoint, &remote.remote_path, &destination),
                |failed| report_retry("download", kind, failed),
            )
            .await;

        match downloaded {
            Ok(bytes) => {
                info!(artifact = %kind, bytes, "Successfully downloaded");
                let artifact = job.artifact_mut(kind);
                artifact.downloaded = true;
                artifact.bytes = bytes;
            }
            Err(e) => {
                error!(step = "download", artifact = %kind, error = %e, "Failed to download file");
                job.artifact_mut(kind).error =
                    Some(format!("failed to download file {}: {}", filename, e));
                return;
            }
        }

        transition(WorkflowState::CleaningUp);
        let command = RemoteCommand::FileRemove {
            name: filename.clone(),
        }
        .render();

        let removed = self
            .retry
            .run(
                || self.transport.execute(endpoint, &command),
                |failed| report_retry("delete", kind, failed),
            )
            .await;

        match removed {
            Ok(_) => {
                info!(artifact = %kind, file = %filename, "Deleted file from device");
                job.artifact_mut(kind).deleted = true;
            }
            Err(e) => {
                error!(step = "delete", artifact = %kind, error = %e, "Failed to delete file");
                job.artifact_mut(kind).error =
                    Some(format!("failed to delete file {}: {}", filename, e));
            }
        }
    }
}

fn transition(state: WorkflowState) {
    debug!(state = %state, "Workflow state");
}

fn report_retry(step: &'static str, kind: ArtifactKind, failed: FailedAttempt<'_>) {
    match failed.next_delay {
        Some(delay) => warn!(
            step,
            artifact = %kind,
            attempt = failed.attempt,
            max_attempts = failed.max_attempts,
            retry_in_secs = delay.as_secs(),
            error = %failed.error,
            "Attempt failed, retrying"
        ),
        None => warn!(
            step,
            artifact = %kind,
            attempt = failed.attempt,
            max_attempts = failed.max_attempts,
            error = %failed.error,
            "Final attempt failed"
        ),
    }
}

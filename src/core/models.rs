use std::fmt;

use chrono::NaiveDateTime;

/// Timestamp layout embedded in artifact filenames.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Username and password used for every connection to a device.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A device in the inventory. Identified by its address.
#[derive(Debug, Clone)]
pub struct DeviceEndpoint {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
}

impl DeviceEndpoint {
    pub fn new(host: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Binary, device-native full configuration backup.
    Snapshot,
    /// Human-readable, re-playable script export.
    Export,
}

impl ArtifactKind {
    pub fn filename(&self, address: &str, identity: &str, timestamp: &str) -> String {
        match self {
            Self::Snapshot => format!("Backup_{}_{}_{}.backup", address, identity, timestamp),
            Self::Export => format!("Export_{}_{}_{}.rsc", address, identity, timestamp),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Export => "export",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filename resolved to its absolute location on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArtifact {
    pub filename: String,
    pub remote_path: String,
}

/// Progress of one artifact through create, locate, download and delete.
#[derive(Debug, Clone)]
pub struct ArtifactState {
    pub kind: ArtifactKind,
    pub filename: String,
    pub created: bool,
    pub remote_path: Option<String>,
    pub downloaded: bool,
    pub bytes: u64,
    pub deleted: bool,
    pub error: Option<String>,
}

impl ArtifactState {
    fn new(kind: ArtifactKind, filename: String) -> Self {
        Self {
            kind,
            filename,
            created: false,
            remote_path: None,
            downloaded: false,
            bytes: 0,
            deleted: false,
            error: None,
        }
    }

    /// Created, downloaded and removed from the device.
    pub fn is_complete(&self) -> bool {
        self.created && self.downloaded && self.deleted
    }
}

/// Why a device produced no backup at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    ConnectionFailed(String),
    IdentityUnavailable(String),
    BothCreationsFailed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed(e) => write!(f, "SSH connection failed: {}", e),
            Self::IdentityUnavailable(e) => write!(f, "failed to fetch system identity: {}", e),
            Self::BothCreationsFailed => f.write_str("both artifact creations failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Both artifacts created, downloaded and removed.
    Success,
    /// At least one artifact was created but something else went wrong.
    Partial { warnings: Vec<String> },
    Failure(FailureReason),
}

impl JobOutcome {
    /// Device-level verdict. Partial outcomes count as success.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }
}

/// Per-device state for one run. Never persisted.
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub address: String,
    pub identity: String,
    pub generated_at: NaiveDateTime,
    pub snapshot: ArtifactState,
    pub export: ArtifactState,
    pub outcome: Option<JobOutcome>,
}

impl BackupJob {
    pub fn new(address: &str, identity: &str, generated_at: NaiveDateTime) -> Self {
        let timestamp = generated_at.format(TIMESTAMP_FORMAT).to_string();
        let safe_identity = sanitize_identity(identity);

        Self {
            address: address.to_string(),
            identity: identity.to_string(),
            generated_at,
            snapshot: ArtifactState::new(
                ArtifactKind::Snapshot,
                ArtifactKind::Snapshot.filename(address, &safe_identity, &timestamp),
            ),
            export: ArtifactState::new(
                ArtifactKind::Export,
                ArtifactKind::Export.filename(address, &safe_identity, &timestamp),
            ),
            outcome: None,
        }
    }

    pub fn artifact(&self, kind: ArtifactKind) -> &ArtifactState {
        match kind {
            ArtifactKind::Snapshot => &self.snapshot,
            ArtifactKind::Export => &self.export,
        }
    }

    pub fn artifact_mut(&mut self, kind: ArtifactKind) -> &mut ArtifactState {
        match kind {
            ArtifactKind::Snapshot => &mut self.snapshot,
            ArtifactKind::Export => &mut self.export,
        }
    }

    pub fn artifacts(&self) -> [&ArtifactState; 2] {
        [&self.snapshot, &self.export]
    }

    /// Decide the terminal outcome from the recorded artifact states.
    ///
    /// Creation alone decides pass/fail: a created artifact that later failed
    /// to download still leaves the device a (partial) success.
    pub fn conclude(&mut self) -> JobOutcome {
        let outcome = if !self.snapshot.created && !self.export.created {
            JobOutcome::Failure(FailureReason::BothCreationsFailed)
        } else {
            let warnings: Vec<String> = self
                .artifacts()
                .iter()
                .filter_map(|a| a.error.as_ref().map(|e| format!("{}: {}", a.kind, e)))
                .collect();

            if warnings.is_empty() && self.snapshot.is_complete() && self.export.is_complete() {
                JobOutcome::Success
            } else {
                JobOutcome::Partial { warnings }
            }
        };

        self.outcome = Some(outcome.clone());
        outcome
    }
}

/// Result of running the workflow against one device.
#[derive(Debug, Clone)]
pub struct DeviceReport {
    pub address: String,
    pub outcome: JobOutcome,
    /// Absent when the device failed before its identity was known.
    pub job: Option<BackupJob>,
}

impl DeviceReport {
    pub fn failed(address: &str, reason: FailureReason) -> Self {
        Self {
            address: address.to_string(),
            outcome: JobOutcome::Failure(reason),
            job: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Keep identities usable as a single token in remote commands and filenames.
pub fn sanitize_identity(identity: &str) -> String {
    identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn generated_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(9, 26, 53)
            .unwrap()
    }

    #[test]
    fn test_job_derives_both_filenames() {
        let job = BackupJob::new("192.168.88.1", "core-sw", generated_at());

        assert_eq!(
            job.snapshot.filename,
            "Backup_192.168.88.1_core-sw_20250314_092653.backup"
        );
        assert_eq!(
            job.export.filename,
            "Export_192.168.88.1_core-sw_20250314_092653.rsc"
        );
    }

    #[test]
    fn test_identity_with_spaces_is_sanitized_in_filenames() {
        let job = BackupJob::new("10.0.0.1", "Main Office/GW", generated_at());
        assert_eq!(job.identity, "Main Office/GW");
        assert!(job.snapshot.filename.contains("Main_Office_GW"));
    }

    #[test]
    fn test_conclude_without_creations_is_failure() {
        let mut job = BackupJob::new("10.0.0.1", "edge", generated_at());
        job.snapshot.error = Some("creation failed".into());

        let outcome = job.conclude();
        assert_eq!(outcome, JobOutcome::Failure(FailureReason::BothCreationsFailed));
        assert!(!outcome.is_success());
        assert_eq!(job.outcome, Some(outcome));
    }

    #[test]
    fn test_conclude_all_complete_is_success() {
        let mut job = BackupJob::new("10.0.0.1", "edge", generated_at());
        for kind in [ArtifactKind::Snapshot, ArtifactKind::Export] {
            let a = job.artifact_mut(kind);
            a.created = true;
            a.downloaded = true;
            a.deleted = true;
        }
        assert_eq!(job.conclude(), JobOutcome::Success);
    }

    #[test]
    fn test_conclude_with_download_error_is_partial_success() {
        let mut job = BackupJob::new("10.0.0.1", "edge", generated_at());
        job.snapshot.created = true;
        job.snapshot.error = Some("download failed".into());

        let outcome = job.conclude();
        assert!(outcome.is_success());
        match outcome {
            JobOutcome::Partial { warnings } => {
                assert_eq!(warnings, vec!["snapshot: download failed".to_string()]);
            }
            other => panic!("expected Partial, got {other:?}"),
        }
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials {
            username: "admin".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }
}

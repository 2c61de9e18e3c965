//! Transport seams used by the device workflow.
//!
//! Two independent channels reach a device: a command channel (one SSH exec
//! session per call) and a file channel (one SFTP session per download). The
//! traits keep the workflow ignorant of which implementation is in use.

use std::path::Path;

use async_trait::async_trait;

use super::error::BackupError;
use super::models::DeviceEndpoint;

#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Open and authenticate a connection, then close it again.
    async fn probe(&self, endpoint: &DeviceEndpoint) -> Result<(), BackupError>;

    /// Run one command on a fresh connection and return combined stdout and stderr.
    async fn execute(
        &self,
        endpoint: &DeviceEndpoint,
        command: &str,
    ) -> Result<String, BackupError>;
}

#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Stream `remote_path` into `destination`, creating or truncating it.
    /// Returns the number of bytes written.
    async fn download(
        &self,
        endpoint: &DeviceEndpoint,
        remote_path: &str,
        destination: &Path,
    ) -> Result<u64, BackupError>;
}

/// Everything the workflow needs from a device.
pub trait DeviceTransport: RemoteShell + FileTransfer {}

impl<T: RemoteShell + FileTransfer> DeviceTransport for T {}

//! SSH command and SFTP download channels built on russh.
//!
//! Every call opens its own authenticated connection and tears it down before
//! returning, on success and on error alike. Nothing is pooled.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::core::error::BackupError;
use crate::core::models::{Credentials, DeviceEndpoint};
use crate::core::transport::{FileTransfer, RemoteShell};
use crate::logging::LogThrottle;

const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Accepts any host key. No known-hosts store is consulted.
struct TrustAnyHostKey;

#[async_trait]
impl client::Handler for TrustAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct SshTransport {
    config: Arc<client::Config>,
    connect_timeout: Duration,
}

impl SshTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        let config = client::Config {
            inactivity_timeout: None,
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
            connect_timeout,
        }
    }

    /// Handshake and password authentication, bounded by the connect timeout.
    async fn connect(
        &self,
        endpoint: &DeviceEndpoint,
    ) -> Result<Handle<TrustAnyHostKey>, BackupError> {
        let host = endpoint.host.as_str();
        let connecting = authenticate(self.config.clone(), endpoint, &endpoint.credentials);

        match tokio::time::timeout(self.connect_timeout, connecting).await {
            Ok(result) => result,
            Err(_) => Err(BackupError::connection(
                host,
                format!("timed out after {}s", self.connect_timeout.as_secs()),
            )),
        }
    }

    async fn run_command(
        handle: &Handle<TrustAnyHostKey>,
        command: &str,
    ) -> Result<String, BackupError> {
        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| BackupError::Session(format!("failed to create session: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| BackupError::command(command, e))?;

        let mut reply = ExecReply::default();
        while let Some(msg) = channel.wait().await {
            reply.absorb(msg);
        }

        reply.finish(command)
    }

    async fn copy_file(
        handle: &Handle<TrustAnyHostKey>,
        remote_path: &str,
        destination: &Path,
    ) -> Result<u64, BackupError> {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| BackupError::Session(format!("failed to open SFTP channel: {}", e)))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| BackupError::Session(format!("failed to request SFTP subsystem: {}", e)))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| BackupError::Session(format!("failed to create SFTP client: {}", e)))?;

        let result = stream_to_file(&sftp, remote_path, destination).await;

        if let Err(e) = sftp.close().await {
            debug!(error = %e, "SFTP session close failed");
        }

        result
    }

    async fn disconnect(handle: Handle<TrustAnyHostKey>) {
        if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "English").await {
            debug!(error = %e, "Disconnect failed");
        }
    }
}

/// What the server sent back on an exec channel.
///
/// The request must be confirmed and the command must report an exit status.
/// A refused request or a channel that closes without a status is a failure.
#[derive(Debug, Default)]
struct ExecReply {
    output: Vec<u8>,
    exit_status: Option<u32>,
    rejected: bool,
}

impl ExecReply {
    fn absorb(&mut self, msg: ChannelMsg) {
        match msg {
            ChannelMsg::Data { ref data } => self.output.extend_from_slice(data),
            ChannelMsg::ExtendedData { ref data, .. } => self.output.extend_from_slice(data),
            ChannelMsg::ExitStatus { exit_status } => self.exit_status = Some(exit_status),
            ChannelMsg::Failure => self.rejected = true,
            _ => {}
        }
    }

    fn finish(self, command: &str) -> Result<String, BackupError> {
        if self.rejected {
            return Err(BackupError::command(command, "exec request rejected"));
        }

        let output = String::from_utf8_lossy(&self.output).into_owned();
        match self.exit_status {
            Some(0) => Ok(output),
            Some(code) => Err(BackupError::command(
                command,
                format!("exited with status {}: {}", code, output.trim()),
            )),
            None => Err(BackupError::command(command, "channel closed without an exit status")),
        }
    }
}

async fn authenticate(
    config: Arc<client::Config>,
    endpoint: &DeviceEndpoint,
    credentials: &Credentials,
) -> Result<Handle<TrustAnyHostKey>, BackupError> {
    let host = endpoint.host.as_str();

    let mut handle = client::connect(config, (host, endpoint.port), TrustAnyHostKey)
        .await
        .map_err(|e| BackupError::connection(host, e))?;

    let accepted = handle
        .authenticate_password(credentials.username.as_str(), credentials.password.as_str())
        .await
        .map_err(|e| BackupError::connection(host, e))?;

    if !accepted {
        return Err(BackupError::connection(
            host,
            format!("password authentication rejected for {}", credentials.username),
        ));
    }

    Ok(handle)
}

async fn stream_to_file(
    sftp: &SftpSession,
    remote_path: &str,
    destination: &Path,
) -> Result<u64, BackupError> {
    let transfer_error = |reason: String| BackupError::Transfer {
        remote_path: remote_path.to_string(),
        reason,
    };
    let local_error = |source: std::io::Error| BackupError::LocalIo {
        path: destination.to_path_buf(),
        source,
    };

    let mut local = File::create(destination).await.map_err(local_error)?;

    let mut remote = match sftp.open(remote_path).await {
        Ok(file) => file,
        Err(e) => {
            drop(local);
            discard_partial(destination).await;
            return Err(transfer_error(format!("failed to open remote file: {}", e)));
        }
    };

    let throttle = LogThrottle::new(Duration::from_secs(1));
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied: u64 = 0;

    let copy_result: Result<(), BackupError> = async {
        loop {
            let n = remote
                .read(&mut buffer)
                .await
                .map_err(|e| transfer_error(e.to_string()))?;
            if n == 0 {
                break;
            }
            local.write_all(&buffer[..n]).await.map_err(local_error)?;
            copied += n as u64;

            if throttle.should_log() {
                debug!(remote_path, bytes_copied = copied, "Transfer progress");
            }
        }
        local.flush().await.map_err(local_error)?;
        Ok(())
    }
    .await;

    drop(remote);
    drop(local);

    match copy_result {
        Ok(()) => Ok(copied),
        Err(e) => {
            discard_partial(destination).await;
            Err(e)
        }
    }
}

async fn discard_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove partial download");
    }
}

#[async_trait]
impl RemoteShell for SshTransport {
    async fn probe(&self, endpoint: &DeviceEndpoint) -> Result<(), BackupError> {
        let handle = self.connect(endpoint).await?;
        Self::disconnect(handle).await;
        Ok(())
    }

    async fn execute(
        &self,
        endpoint: &DeviceEndpoint,
        command: &str,
    ) -> Result<String, BackupError> {
        let handle = self.connect(endpoint).await?;
        debug!(command, "Executing remote command");
        let result = Self::run_command(&handle, command).await;
        Self::disconnect(handle).await;
        result
    }
}

#[async_trait]
impl FileTransfer for SshTransport {
    async fn download(
        &self,
        endpoint: &DeviceEndpoint,
        remote_path: &str,
        destination: &Path,
    ) -> Result<u64, BackupError> {
        let handle = self.connect(endpoint).await?;
        let result = Self::copy_file(&handle, remote_path, destination).await;
        Self::disconnect(handle).await;
        result
    }
}

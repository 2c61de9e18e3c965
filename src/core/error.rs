use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by remote and local backup operations.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Transport or authentication failure while opening a connection.
    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    /// The connection was up but a command or SFTP channel could not be set up.
    #[error("session setup failed: {0}")]
    Session(String),

    /// The remote command ran but reported failure.
    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("system identity not found in command output")]
    IdentityNotFound,

    #[error("file not found on device: {0}")]
    FileNotFound(String),

    /// Reading the remote file stream failed part-way.
    #[error("transfer of {remote_path} failed: {reason}")]
    Transfer { remote_path: String, reason: String },

    #[error("local I/O error on {}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("after {attempts} attempts, last error: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<BackupError>,
    },
}

impl BackupError {
    pub fn connection(host: &str, reason: impl ToString) -> Self {
        Self::Connection {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn command(command: &str, reason: impl ToString) -> Self {
        Self::Command {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

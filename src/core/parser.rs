//! Parsing of device command output.
//!
//! The workflow only talks to [`OutputParser`], so the line scanning used
//! here can be swapped for a structured query later without touching it.

use super::error::BackupError;
use super::models::RemoteArtifact;

pub trait OutputParser: Send + Sync {
    /// Extract the device identity from `/system identity print` output.
    fn parse_identity(&self, output: &str) -> Result<String, BackupError>;

    /// Resolve `filename` to an absolute path using `/file print detail` output.
    fn locate_file(&self, listing: &str, filename: &str) -> Result<RemoteArtifact, BackupError>;
}

/// Line-by-line substring scanner for RouterOS text output.
#[derive(Debug, Clone)]
pub struct LineScanner {
    partitions: Vec<String>,
}

impl LineScanner {
    /// `partitions` are secondary storage roots such as `flash`.
    pub fn new(partitions: Vec<String>) -> Self {
        Self { partitions }
    }
}

impl Default for LineScanner {
    fn default() -> Self {
        Self::new(vec!["flash".to_string()])
    }
}

impl OutputParser for LineScanner {
    fn parse_identity(&self, output: &str) -> Result<String, BackupError> {
        output
            .lines()
            .filter(|line| line.contains("name:"))
            .filter_map(|line| line.split_once(':'))
            .map(|(_, value)| value.trim())
            .find(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or(BackupError::IdentityNotFound)
    }

    fn locate_file(&self, listing: &str, filename: &str) -> Result<RemoteArtifact, BackupError> {
        let line = listing
            .lines()
            .find(|line| line.contains(filename))
            .ok_or_else(|| BackupError::FileNotFound(filename.to_string()))?;

        let partition = self
            .partitions
            .iter()
            .find(|p| line.contains(&format!("{}/", p)));

        let remote_path = match partition {
            Some(p) => format!("/{}/{}", p, filename),
            None => format!("/{}", filename),
        };

        Ok(RemoteArtifact {
            filename: filename.to_string(),
            remote_path,
        })
    }
}

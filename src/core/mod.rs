pub mod commands;
pub mod error;
pub mod fleet;
pub mod models;
pub mod notifications;
pub mod parser;
pub mod retry;
pub mod transport;
pub mod workflow;

pub use error::BackupError;
pub use fleet::{FleetRunner, FleetSummary, ProbeResult};
pub use models::{
    ArtifactKind, ArtifactState, BackupJob, Credentials, DeviceEndpoint, DeviceReport,
    FailureReason, JobOutcome, RemoteArtifact,
};
pub use parser::{LineScanner, OutputParser};
pub use retry::{RetryExecutor, RetryPolicy};
pub use transport::{DeviceTransport, FileTransfer, RemoteShell};
pub use workflow::{DeviceWorkflow, WorkflowSettings, WorkflowState};

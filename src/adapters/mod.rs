use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::core::transport::DeviceTransport;

mod simulated;
mod ssh;

pub use simulated::{ALWAYS, DeviceScript, SimEvent, SimulatedFleet};
pub use ssh::SshTransport;

/// Pick the transport for this run: real SSH, or a healthy simulated fleet
/// built from the configured inventory.
pub fn get_transport(config: &AppConfig) -> Arc<dyn DeviceTransport> {
    if config.simulation {
        info!(devices = config.devices.len(), "Using simulated device fleet");
        let fleet = SimulatedFleet::healthy(config.devices.iter().map(String::as_str));
        return Arc::new(fleet);
    }

    Arc::new(SshTransport::new(config.connect_timeout()))
}

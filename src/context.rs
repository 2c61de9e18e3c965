use std::sync::Arc;

use crate::adapters;
use crate::config::AppConfig;
use crate::core::notifications::{NotificationChannel, create_notifier};
use crate::core::transport::DeviceTransport;

/// Shared state for one process run.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub transport: Arc<dyn DeviceTransport>,
    pub notifier: Option<Arc<dyn NotificationChannel>>,
}

impl AppContext {
    /// Wire up the transport and notifier the configuration asks for.
    pub fn new(config: AppConfig) -> Self {
        let transport = adapters::get_transport(&config);
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: AppConfig, transport: Arc<dyn DeviceTransport>) -> Self {
        let notifier = create_notifier(&config.notifications);
        Self {
            config: Arc::new(config),
            transport,
            notifier,
        }
    }
}

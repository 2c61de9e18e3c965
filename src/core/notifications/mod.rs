mod slack;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{NotificationChannelType, NotificationConfig};

pub use slack::SlackNotifier;

/// Events sent to an operator channel during a fleet run.
#[derive(Debug, Clone)]
pub enum FleetEvent {
    DeviceFailed {
        run_id: String,
        address: String,
        reason: String,
    },
    RunCompleted {
        run_id: String,
        succeeded: usize,
        failed: usize,
        duration_secs: u64,
    },
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, event: FleetEvent) -> Result<()>;
}

/// Build the configured notifier, if any.
pub fn create_notifier(config: &NotificationConfig) -> Option<Arc<dyn NotificationChannel>> {
    match &config.channel {
        NotificationChannelType::None => None,
        NotificationChannelType::Slack => {
            let webhook = config.slack_webhook.as_ref()?;
            if webhook.is_empty() {
                return None;
            }
            Some(Arc::new(SlackNotifier::new(webhook.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_channel_configured() {
        assert!(create_notifier(&NotificationConfig::default()).is_none());
    }

    #[test]
    fn test_slack_without_webhook_is_disabled() {
        let config = NotificationConfig {
            channel: NotificationChannelType::Slack,
            slack_webhook: Some(String::new()),
        };
        assert!(create_notifier(&config).is_none());
    }

    #[test]
    fn test_slack_with_webhook() {
        let config = NotificationConfig {
            channel: NotificationChannelType::Slack,
            slack_webhook: Some("https://hooks.slack.test/x".into()),
        };
        assert!(create_notifier(&config).is_some());
    }
}

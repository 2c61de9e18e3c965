use super::{FleetEvent, NotificationChannel};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

pub struct SlackNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    fn format_message(&self, event: &FleetEvent) -> serde_json::Value {
        match event {
            FleetEvent::DeviceFailed {
                run_id,
                address,
                reason,
            } => {
                let short_id = &run_id[..8.min(run_id.len())];
                json!({
                    "blocks": [
                        {
                            "type": "header",
                            "text": {
                                "type": "plain_text",
                                "text": "Device Backup Failed",
                                "emoji": true
                            }
                        },
                        {
                            "type": "section",
                            "fields": [
                                {
                                    "type": "mrkdwn",
                                    "text": format!("*Device:*\n`{}`", address)
                                },
                                {
                                    "type": "mrkdwn",
                                    "text": format!("*Run:*\n`{}`", short_id)
                                }
                            ]
                        },
                        {
                            "type": "section",
                            "text": {
                                "type": "mrkdwn",
                                "text": format!("*Error:*\n```{}```", reason)
                            }
                        }
                    ]
                })
            }
            FleetEvent::RunCompleted {
                run_id,
                succeeded,
                failed,
                duration_secs,
            } => {
                let short_id = &run_id[..8.min(run_id.len())];
                let title = if *failed == 0 {
                    "Fleet Backup Complete"
                } else {
                    "Fleet Backup Finished With Failures"
                };
                let devices = format!("*Devices:*\n{} ok / {} failed", succeeded, failed);
                json!({
                    "blocks": [
                        {
                            "type": "header",
                            "text": {
                                "type": "plain_text",
                                "text": title,
                                "emoji": true
                            }
                        },
                        {
                            "type": "section",
                            "fields": [
                                {
                                    "type": "mrkdwn",
                                    "text": format!("*Run:*\n`{}`", short_id)
                                },
                                {
                                    "type": "mrkdwn",
                                    "text": devices
                                },
                                {
                                    "type": "mrkdwn",
                                    "text": format!("*Duration:*\n{}s", duration_secs)
                                }
                            ]
                        }
                    ]
                })
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for SlackNotifier {
    async fn notify(&self, event: FleetEvent) -> Result<()> {
        let payload = self.format_message(&event);
        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("Failed to reach Slack webhook")?
            .error_for_status()
            .context("Slack webhook rejected the message")?;
        Ok(())
    }
}

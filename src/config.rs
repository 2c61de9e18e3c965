use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::core::models::{Credentials, DeviceEndpoint};
use crate::core::retry::RetryPolicy;
use crate::core::workflow::WorkflowSettings;

pub const CONFIG_PATH: &str = "/etc/cfgsnap/config.toml";
const ENV_PREFIX: &str = "CFGSNAP_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannelType {
    #[default]
    None,
    Slack,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub channel: NotificationChannelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_webhook: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub backup_directory: PathBuf,
    /// Device addresses, processed in this order.
    pub devices: Vec<String>,
    pub username: String,
    pub password: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub settle_delay_secs: u64,
    /// Secondary storage roots that prefix file paths in listings.
    pub storage_partitions: Vec<String>,
    pub simulation: bool,
    pub verbose: bool,
    pub json_logs: bool,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backup_directory: PathBuf::from("backups"),
            devices: Vec::new(),
            username: "admin".to_string(),
            password: String::new(),
            port: 2006,
            connect_timeout_secs: 5,
            retry_attempts: 5,
            retry_delay_secs: 5,
            settle_delay_secs: 2,
            storage_partitions: vec!["flash".to_string()],
            simulation: false,
            verbose: false,
            json_logs: false,
            notifications: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then the TOML file, then `CFGSNAP_*`
    /// environment variables, then any CLI overrides.
    pub fn new<T: Serialize>(config_file: Option<&Path>, cli_args: Option<&T>) -> Result<Self> {
        let file = config_file.unwrap_or(Path::new(CONFIG_PATH));

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(args) = cli_args {
            figment = figment.merge(Serialized::defaults(args));
        }

        let config: AppConfig = figment
            .extract()
            .with_context(|| format!("Failed to load configuration (file: {})", file.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry_attempts == 0 {
            bail!("retry_attempts must be at least 1");
        }
        if self.port == 0 {
            bail!("port must be non-zero");
        }
        if self.devices.iter().any(|d| d.trim().is_empty()) {
            bail!("device list contains an empty address");
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn endpoints(&self) -> Vec<DeviceEndpoint> {
        let credentials = self.credentials();
        self.devices
            .iter()
            .map(|host| DeviceEndpoint::new(host.trim(), self.port, credentials.clone()))
            .collect()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_secs(self.retry_delay_secs))
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            backup_directory: self.backup_directory.clone(),
            retry: self.retry_policy(),
            settle_delay: Duration::from_secs(self.settle_delay_secs),
        }
    }

    /// Write this configuration as TOML, refusing to clobber an existing file.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if path.exists() {
            bail!("{} already exists, refusing to overwrite", path.display());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[derive(Serialize)]
    struct Overrides {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_attempts: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        simulation: Option<bool>,
    }

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|jail| {
            let missing = jail.directory().join("missing.toml");
            let config = AppConfig::new(Some(&missing), None::<&Overrides>).unwrap();
            assert_eq!(config.port, 2006);
            assert_eq!(config.retry_attempts, 5);
            assert_eq!(config.storage_partitions, vec!["flash"]);
            assert!(config.devices.is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_file_env_and_cli_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "cfgsnap.toml",
                r#"
                devices = ["192.168.88.1", "192.168.88.2"]
                password = "from-file"
                retry_attempts = 3

                [notifications]
                channel = "slack"
                slack_webhook = "https://hooks.slack.test/abc"
                "#,
            )?;
            jail.set_env("CFGSNAP_PASSWORD", "from-env");

            let overrides = Overrides {
                retry_attempts: Some(7),
                simulation: Some(true),
            };
            let path = jail.directory().join("cfgsnap.toml");
            let config = AppConfig::new(Some(&path), Some(&overrides)).unwrap();

            assert_eq!(config.devices, vec!["192.168.88.1", "192.168.88.2"]);
            assert_eq!(config.password, "from-env");
            assert_eq!(config.retry_attempts, 7);
            assert!(config.simulation);
            assert_eq!(config.notifications.channel, NotificationChannelType::Slack);
            Ok(())
        });
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let config = AppConfig {
            retry_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoints_share_port_and_credentials() {
        let config = AppConfig {
            devices: vec!["10.0.0.1".into(), " 10.0.0.2 ".into()],
            password: "pw".into(),
            ..Default::default()
        };
        let endpoints = config.endpoints();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[1].host, "10.0.0.2");
        assert!(endpoints.iter().all(|e| e.port == 2006));
        assert_eq!(endpoints[0].credentials.password, "pw");
    }

    #[test]
    fn test_write_to_round_trips_and_refuses_overwrite() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("etc").join("cfgsnap.toml");
        let config = AppConfig {
            devices: vec!["10.0.0.1".into()],
            ..Default::default()
        };

        config.write_to(&path).unwrap();
        let loaded = AppConfig::new(Some(&path), None::<&Overrides>).unwrap();
        assert_eq!(loaded.devices, config.devices);

        assert!(config.write_to(&path).is_err());
    }
}

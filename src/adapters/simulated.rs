//! In-memory RouterOS devices.
//!
//! Understands the handful of commands the backup workflow issues, keeps a
//! per-device file table, and can be scripted to fail individual steps a
//! fixed number of times. Backs `--simulation` runs and the test suite.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::core::error::BackupError;
use crate::core::models::DeviceEndpoint;
use crate::core::transport::{FileTransfer, RemoteShell};

/// Fail every time.
pub const ALWAYS: u32 = u32::MAX;

/// Behaviour of one simulated device.
#[derive(Debug, Clone)]
pub struct DeviceScript {
    pub reachable: bool,
    /// `None` makes the identity report omit its `name:` line.
    pub identity: Option<String>,
    /// Storage partition new files land on, e.g. `flash`.
    pub partition: Option<String>,
    pub fail_snapshot: u32,
    pub fail_export: u32,
    pub fail_listing: u32,
    pub fail_download: u32,
    pub fail_delete: u32,
}

impl DeviceScript {
    pub fn healthy(identity: &str) -> Self {
        Self {
            reachable: true,
            identity: Some(identity.to_string()),
            partition: None,
            fail_snapshot: 0,
            fail_export: 0,
            fail_listing: 0,
            fail_download: 0,
            fail_delete: 0,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::healthy("unreachable")
        }
    }

    pub fn on_partition(mut self, partition: &str) -> Self {
        self.partition = Some(partition.to_string());
        self
    }

    pub fn without_identity(mut self) -> Self {
        self.identity = None;
        self
    }

    pub fn fail_snapshot(mut self, times: u32) -> Self {
        self.fail_snapshot = times;
        self
    }

    pub fn fail_export(mut self, times: u32) -> Self {
        self.fail_export = times;
        self
    }

    pub fn fail_listing(mut self, times: u32) -> Self {
        self.fail_listing = times;
        self
    }

    pub fn fail_download(mut self, times: u32) -> Self {
        self.fail_download = times;
        self
    }

    pub fn fail_delete(mut self, times: u32) -> Self {
        self.fail_delete = times;
        self
    }
}

/// Something a simulated device was asked to do, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Probe { host: String },
    Command { host: String, command: String },
    Download { host: String, remote_path: String },
}

impl SimEvent {
    pub fn host(&self) -> &str {
        match self {
            Self::Probe { host } | Self::Command { host, .. } | Self::Download { host, .. } => host,
        }
    }
}

#[derive(Debug)]
struct SimulatedDevice {
    script: DeviceScript,
    files: BTreeMap<String, Vec<u8>>,
}

impl SimulatedDevice {
    fn new(script: DeviceScript) -> Self {
        Self {
            script,
            files: BTreeMap::new(),
        }
    }

    fn identity_report(&self) -> String {
        match &self.script.identity {
            Some(name) => format!("  name: {}\r\n", name),
            None => "  Flags: X - disabled\r\n".to_string(),
        }
    }

    fn stored_path(&self, name: &str) -> String {
        match &self.script.partition {
            Some(p) => format!("{}/{}", p, name),
            None => name.to_string(),
        }
    }

    fn listing(&self) -> String {
        let mut out = String::from("Flags: X - disabled\r\n");
        for (i, (name, content)) in self.files.iter().enumerate() {
            let file_type = if name.ends_with(".rsc") { "script" } else { "backup" };
            out.push_str(&format!(
                " {} name=\"{}\" type=\"{}\" size={} creation-time=jan/01/2025 00:00:00\r\n",
                i,
                self.stored_path(name),
                file_type,
                content.len()
            ));
        }
        out
    }

    fn execute(&mut self, command: &str) -> Result<String, BackupError> {
        let command_failed = |reason: &str| Err(BackupError::command(command, reason));

        if command == "/system identity print" {
            return Ok(self.identity_report());
        }

        if command == "/file print detail" {
            if consume(&mut self.script.fail_listing) {
                return command_failed("action timed out");
            }
            return Ok(self.listing());
        }

        if let Some(name) = command.strip_prefix("/system backup save name=") {
            if consume(&mut self.script.fail_snapshot) {
                return command_failed("failure: not enough space");
            }
            let mut content = vec![0x88, 0xAC, 0xA1, 0xB1];
            content.extend_from_slice(self.script.identity.as_deref().unwrap_or("").as_bytes());
            self.files.insert(name.to_string(), content);
            return Ok(String::new());
        }

        if let Some(file) = command.strip_prefix("/export file=") {
            if consume(&mut self.script.fail_export) {
                return command_failed("failure: export interrupted");
            }
            let content = format!(
                "# software id = SIM\r\n/system identity\r\nset name={}\r\n",
                self.script.identity.as_deref().unwrap_or("")
            );
            self.files.insert(file.to_string(), content.into_bytes());
            return Ok(String::new());
        }

        if let Some(quoted) = command.strip_prefix("/file remove ") {
            if consume(&mut self.script.fail_delete) {
                return command_failed("failure: device busy");
            }
            let name = quoted.trim_matches('"');
            return match self.files.remove(name) {
                Some(_) => Ok(String::new()),
                None => command_failed("no such item"),
            };
        }

        command_failed("bad command name")
    }

    fn read(&mut self, remote_path: &str) -> Result<Vec<u8>, BackupError> {
        if consume(&mut self.script.fail_download) {
            return Err(BackupError::Transfer {
                remote_path: remote_path.to_string(),
                reason: "connection reset by peer".to_string(),
            });
        }

        self.files
            .iter()
            .find(|(name, _)| format!("/{}", self.stored_path(name)) == remote_path)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| BackupError::Transfer {
                remote_path: remote_path.to_string(),
                reason: "failed to open remote file: no such file".to_string(),
            })
    }
}

/// Count down a scripted failure budget. Returns true if this call should fail.
fn consume(remaining: &mut u32) -> bool {
    match *remaining {
        0 => false,
        ALWAYS => true,
        _ => {
            *remaining -= 1;
            true
        }
    }
}

/// A set of simulated devices keyed by address. Clones share state.
#[derive(Clone, Default)]
pub struct SimulatedFleet {
    devices: Arc<Mutex<HashMap<String, SimulatedDevice>>>,
    events: Arc<Mutex<Vec<(Instant, SimEvent)>>>,
}

impl SimulatedFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A healthy device for every address, named after it.
    pub fn healthy<'a>(addresses: impl IntoIterator<Item = &'a str>) -> Self {
        let fleet = Self::new();
        for address in addresses {
            let identity = format!("sim-{}", address.replace(['.', ':'], "-"));
            fleet.add_device(address, DeviceScript::healthy(&identity).on_partition("flash"));
        }
        fleet
    }

    pub fn add_device(&self, address: &str, script: DeviceScript) {
        lock(&self.devices).insert(address.to_string(), SimulatedDevice::new(script));
    }

    /// Everything the fleet was asked to do so far.
    pub fn events(&self) -> Vec<SimEvent> {
        lock(&self.events).iter().map(|(_, e)| e.clone()).collect()
    }

    /// Like [`events`](Self::events), with the tokio clock reading at each call.
    pub fn timed_events(&self) -> Vec<(Instant, SimEvent)> {
        lock(&self.events).clone()
    }

    pub fn events_for(&self, address: &str) -> Vec<SimEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.host() == address)
            .collect()
    }

    /// Files still present on a device.
    pub fn remote_files(&self, address: &str) -> Vec<String> {
        lock(&self.devices)
            .get(address)
            .map(|d| d.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, event: SimEvent) {
        lock(&self.events).push((Instant::now(), event));
    }

    fn with_device<T>(
        &self,
        endpoint: &DeviceEndpoint,
        f: impl FnOnce(&mut SimulatedDevice) -> Result<T, BackupError>,
    ) -> Result<T, BackupError> {
        let mut devices = lock(&self.devices);
        match devices.get_mut(&endpoint.host) {
            Some(device) if device.script.reachable => f(device),
            _ => Err(BackupError::connection(&endpoint.host, "dial tcp: i/o timeout")),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RemoteShell for SimulatedFleet {
    async fn probe(&self, endpoint: &DeviceEndpoint) -> Result<(), BackupError> {
        self.record(SimEvent::Probe {
            host: endpoint.host.clone(),
        });
        self.with_device(endpoint, |_| Ok(()))
    }

    async fn execute(
        &self,
        endpoint: &DeviceEndpoint,
        command: &str,
    ) -> Result<String, BackupError> {
        self.record(SimEvent::Command {
            host: endpoint.host.clone(),
            command: command.to_string(),
        });
        self.with_device(endpoint, |device| device.execute(command))
    }
}

#[async_trait]
impl FileTransfer for SimulatedFleet {
    async fn download(
        &self,
        endpoint: &DeviceEndpoint,
        remote_path: &str,
        destination: &Path,
    ) -> Result<u64, BackupError> {
        self.record(SimEvent::Download {
            host: endpoint.host.clone(),
            remote_path: remote_path.to_string(),
        });
        let content = self.with_device(endpoint, |device| device.read(remote_path))?;

        tokio::fs::write(destination, &content)
            .await
            .map_err(|source| BackupError::LocalIo {
                path: destination.to_path_buf(),
                source,
            })?;

        Ok(content.len() as u64)
    }
}

use std::sync::Arc;

use cfgsnap::adapters::{DeviceScript, SimEvent, SimulatedFleet};
use cfgsnap::config::AppConfig;
use cfgsnap::context::AppContext;
use cfgsnap::core::{FailureReason, FleetRunner, JobOutcome};
use tempfile::tempdir;

fn config(backup_directory: &std::path::Path, devices: &[&str]) -> AppConfig {
    AppConfig {
        backup_directory: backup_directory.to_path_buf(),
        devices: devices.iter().map(|d| d.to_string()).collect(),
        password: "secret".to_string(),
        retry_attempts: 2,
        retry_delay_secs: 0,
        settle_delay_secs: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_failed_device_does_not_stop_the_fleet() {
    let temp = tempdir().unwrap();
    let fleet = SimulatedFleet::new();
    fleet.add_device("10.0.0.1", DeviceScript::healthy("edge-1").on_partition("flash"));
    fleet.add_device("10.0.0.2", DeviceScript::unreachable());
    fleet.add_device("10.0.0.3", DeviceScript::healthy("edge-3"));

    let cfg = config(temp.path(), &["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    let ctx = AppContext::with_transport(cfg, Arc::new(fleet.clone()));
    let summary = FleetRunner::new(ctx).run().await.unwrap();

    let addresses: Vec<&str> = summary.reports.iter().map(|r| r.address.as_str()).collect();
    assert_eq!(addresses, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 1);
    assert!(matches!(
        summary.reports[1].outcome,
        JobOutcome::Failure(FailureReason::ConnectionFailed(_))
    ));
    assert_eq!(
        fleet.events_for("10.0.0.2"),
        vec![SimEvent::Probe {
            host: "10.0.0.2".to_string()
        }]
    );
    assert!(!fleet.events_for("10.0.0.3").is_empty());

    let rendered = summary.render();
    assert!(rendered.contains("OK       10.0.0.1"));
    assert!(rendered.contains("FAILED   10.0.0.2"));
    assert!(rendered.contains("2 succeeded, 1 failed"));
}

#[tokio::test]
async fn test_devices_are_processed_sequentially_in_order() {
    let temp = tempdir().unwrap();
    let fleet = SimulatedFleet::new();
    for (address, name) in [("10.0.0.9", "c"), ("10.0.0.1", "a"), ("10.0.0.5", "b")] {
        fleet.add_device(address, DeviceScript::healthy(name));
    }

    let cfg = config(temp.path(), &["10.0.0.9", "10.0.0.1", "10.0.0.5"]);
    let ctx = AppContext::with_transport(cfg, Arc::new(fleet.clone()));
    FleetRunner::new(ctx).run().await.unwrap();

    // Each device's events form one contiguous block.
    let mut hosts: Vec<String> = fleet.events().iter().map(|e| e.host().to_string()).collect();
    hosts.dedup();
    assert_eq!(hosts, vec!["10.0.0.9", "10.0.0.1", "10.0.0.5"]);
}

#[tokio::test]
async fn test_backup_directory_is_created() {
    let temp = tempdir().unwrap();
    let backup_dir = temp.path().join("nested").join("backups");
    let fleet = SimulatedFleet::new();
    fleet.add_device("10.0.0.1", DeviceScript::healthy("edge"));

    let cfg = config(&backup_dir, &["10.0.0.1"]);
    let ctx = AppContext::with_transport(cfg, Arc::new(fleet));
    let summary = FleetRunner::new(ctx).run().await.unwrap();

    assert!(backup_dir.is_dir());
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(std::fs::read_dir(&backup_dir).unwrap().count(), 2);
}

#[tokio::test]
async fn test_probe_reports_identity_without_creating_files() {
    let temp = tempdir().unwrap();
    let fleet = SimulatedFleet::new();
    fleet.add_device("10.0.0.1", DeviceScript::healthy("edge"));
    fleet.add_device("10.0.0.2", DeviceScript::healthy("edge").without_identity());

    let cfg = config(temp.path(), &["10.0.0.1", "10.0.0.2"]);
    let ctx = AppContext::with_transport(cfg, Arc::new(fleet.clone()));
    let results = FleetRunner::new(ctx).probe().await;

    assert_eq!(results[0].identity, Ok("edge".to_string()));
    assert!(matches!(
        results[1].identity,
        Err(FailureReason::IdentityUnavailable(_))
    ));
    assert!(fleet.events().iter().all(|e| match e {
        SimEvent::Command { command, .. } => command == "/system identity print",
        _ => true,
    }));
}

#[tokio::test]
async fn test_simulation_mode_backs_up_configured_inventory() {
    let temp = tempdir().unwrap();
    let cfg = AppConfig {
        simulation: true,
        ..config(temp.path(), &["192.168.1.10", "192.168.1.11"])
    };

    let summary = FleetRunner::new(AppContext::new(cfg)).run().await.unwrap();

    assert_eq!(summary.succeeded(), 2);
    for report in &summary.reports {
        assert_eq!(report.outcome, JobOutcome::Success);
        let job = report.job.as_ref().unwrap();
        assert!(job.identity.starts_with("sim-192-168-1-"));
        assert!(
            job.snapshot
                .remote_path
                .as_deref()
                .unwrap()
                .starts_with("/flash/")
        );
    }
}

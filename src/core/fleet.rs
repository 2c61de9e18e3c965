//! Sequential fleet loop.
//!
//! Devices are processed one at a time in inventory order. A failing device
//! is reported and skipped; it never stops the loop.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::context::AppContext;

use super::models::{DeviceEndpoint, DeviceReport, FailureReason, JobOutcome};
use super::notifications::FleetEvent;
use super::parser::LineScanner;
use super::workflow::DeviceWorkflow;

const SEPARATOR: &str = "==========================================================";

/// Results of one pass over the inventory.
#[derive(Debug)]
pub struct FleetSummary {
    pub run_id: String,
    pub reports: Vec<DeviceReport>,
    pub duration: Duration,
}

impl FleetSummary {
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }

    /// One line per device followed by totals.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Backup summary (run {})", self.run_id);
        for report in &self.reports {
            let _ = match &report.outcome {
                JobOutcome::Success => writeln!(out, "  OK       {}", report.address),
                JobOutcome::Partial { warnings } => writeln!(
                    out,
                    "  PARTIAL  {} ({} warning{})",
                    report.address,
                    warnings.len(),
                    if warnings.len() == 1 { "" } else { "s" }
                ),
                JobOutcome::Failure(reason) => {
                    writeln!(out, "  FAILED   {}: {}", report.address, reason)
                }
            };
        }
        let _ = write!(
            out,
            "{} succeeded, {} failed in {}s",
            self.succeeded(),
            self.failed(),
            self.duration.as_secs()
        );
        out
    }
}

/// Outcome of probing one device.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub address: String,
    pub identity: Result<String, FailureReason>,
}

pub struct FleetRunner {
    ctx: AppContext,
    workflow: DeviceWorkflow,
}

impl FleetRunner {
    pub fn new(ctx: AppContext) -> Self {
        let parser = Arc::new(LineScanner::new(ctx.config.storage_partitions.clone()));
        let workflow = DeviceWorkflow::new(
            ctx.transport.clone(),
            parser,
            ctx.config.workflow_settings(),
        );
        Self { ctx, workflow }
    }

    /// Back up every configured device.
    pub async fn run(&self) -> Result<FleetSummary> {
        let endpoints = self.ctx.config.endpoints();
        self.run_devices(&endpoints).await
    }

    pub async fn run_devices(&self, endpoints: &[DeviceEndpoint]) -> Result<FleetSummary> {
        let backup_directory = &self.ctx.config.backup_directory;
        std::fs::create_dir_all(backup_directory).with_context(|| {
            format!(
                "Failed to create backup directory {}",
                backup_directory.display()
            )
        })?;

        let run_id = Uuid::now_v7().to_string();
        let started = Instant::now();
        info!(
            run_id = %run_id,
            devices = endpoints.len(),
            backup_directory = %backup_directory.display(),
            "Starting fleet backup"
        );

        let mut reports = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let report = self.workflow.run(endpoint).await;
            print_verdict(&report);

            if let JobOutcome::Failure(reason) = &report.outcome {
                self.notify(FleetEvent::DeviceFailed {
                    run_id: run_id.clone(),
                    address: report.address.clone(),
                    reason: reason.to_string(),
                })
                .await;
            }
            reports.push(report);
        }

        let summary = FleetSummary {
            run_id,
            reports,
            duration: started.elapsed(),
        };

        info!(
            run_id = %summary.run_id,
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Fleet backup finished"
        );
        self.notify(FleetEvent::RunCompleted {
            run_id: summary.run_id.clone(),
            succeeded: summary.succeeded(),
            failed: summary.failed(),
            duration_secs: summary.duration.as_secs(),
        })
        .await;

        Ok(summary)
    }

    /// Connect to and identify every device without creating any files.
    pub async fn probe(&self) -> Vec<ProbeResult> {
        let mut results = Vec::new();
        for endpoint in self.ctx.config.endpoints() {
            let span = info_span!("device", address = %endpoint.host);
            let identity = self
                .workflow
                .connect_and_identify(&endpoint)
                .instrument(span)
                .await;
            results.push(ProbeResult {
                address: endpoint.host,
                identity,
            });
        }
        results
    }

    async fn notify(&self, event: FleetEvent) {
        if let Some(notifier) = &self.ctx.notifier {
            if let Err(e) = notifier.notify(event).await {
                warn!(error = %e, "Failed to send notification");
            }
        }
    }
}

fn print_verdict(report: &DeviceReport) {
    match &report.outcome {
        JobOutcome::Failure(reason) => {
            println!("Error processing {}: {}", report.address, reason);
        }
        JobOutcome::Partial { warnings } => {
            println!("Backup completed with warnings for {}", report.address);
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
        JobOutcome::Success => {
            println!("Backup completed successfully for {}", report.address);
        }
    }
    println!("{}", SEPARATOR);
}

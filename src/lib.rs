//! netmig application shell.
//!
//! Installs the `tracing` subscriber, wires Ctrl-C to the abort flag and runs
//! one operation from a configuration file and an inventory snapshot.

pub use netmig_core as core;

use netmig_core::config::{LoggingConfig, MigrationConfig};
use netmig_core::error::{NetmigError, NetmigResult};
use netmig_core::fabric::Fabric;
use netmig_core::report::{OperationOutput, OperationReport};
use netmig_core::service::{MigrationService, Operation};
use netmig_core::simulated::{FabricSnapshot, SimulatedFabric};

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over `cfg.filter`.
pub fn init_logging(cfg: &LoggingConfig) -> NetmigResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.filter))
        .map_err(|e| NetmigError::config(format!("Invalid log filter '{}': {e}", cfg.filter)))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if cfg.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| NetmigError::config(format!("Cannot install logger: {e}")))
}

/// Run `op` against the given fabric. Ctrl-C stops the batch after the
/// current item; the partial report is still returned.
pub async fn run_operation(
    fabric: Arc<dyn Fabric>,
    config: MigrationConfig,
    op: Operation,
) -> NetmigResult<OperationReport> {
    let mut service = MigrationService::new(fabric, config);
    let interrupt = service.abort_handle().abort_on_ctrl_c();
    let result = service.run(op).await;
    interrupt.abort();
    let report = result?;
    log_summary(&report);
    Ok(report)
}

/// Load a config and a snapshot from disk and rehearse `op` against the
/// simulated fabric. Returns the report and the inventory after the run.
pub async fn run_from_files(
    config_path: impl AsRef<Path>,
    snapshot_path: impl AsRef<Path>,
    op: Operation,
) -> NetmigResult<(OperationReport, FabricSnapshot)> {
    let config = MigrationConfig::load(config_path)?;
    let snapshot = FabricSnapshot::load(snapshot_path)?;
    let fabric = Arc::new(SimulatedFabric::new(snapshot));
    let report = run_operation(fabric.clone(), config, op).await?;
    Ok((report, fabric.snapshot().await))
}

/// Pretty JSON rendering of a report.
pub fn report_json(report: &OperationReport) -> NetmigResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn log_summary(report: &OperationReport) {
    let elapsed = report.finished_at - report.started_at;
    match &report.output {
        OperationOutput::CreateSwitch(r) => {
            info!(switch = %r.switch_name, created = r.created.len(), failed = r.failures.len(), "vSwitch creation summary");
            for f in &r.failures {
                warn!(host = %f.host, "{}", f.reason);
            }
        }
        OperationOutput::CreatePortGroups(r) => {
            info!(planned = r.planned.len(), created = r.created, failed = r.failures.len(), "Port group summary");
        }
        OperationOutput::Migration(r) => {
            let failed = r.failed_vms();
            info!(
                direction = ?r.direction,
                attempted = r.outcomes.len(),
                failed = failed.len(),
                interrupted = r.interrupted,
                "Migration summary"
            );
            if !failed.is_empty() {
                warn!("These VMs failed to migrate: {:?}", failed);
            }
        }
        OperationOutput::Audit(records) => {
            for rec in records {
                info!(
                    vm = %rec.vm_name,
                    cluster = %rec.cluster,
                    host = %rec.host,
                    network = %rec.attachment.display_name,
                    vlan = %rec.attachment.vlan_id,
                    vswitch = %rec.attachment.vswitch_name,
                    "VM network"
                );
            }
        }
    }
    info!(elapsed_ms = elapsed.num_milliseconds(), "Done");
}

//! Per-entity outcomes and batch reports.

use crate::error::{NetmigError, NetmigErrorKind};
use crate::types::{PortGroupSpec, VmNetworkRecord};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Migrated,
    Skipped,
    Failed,
}

/// Result of migrating one VM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub vm_name: String,
    pub status: MigrationStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

impl MigrationOutcome {
    pub fn migrated(vm_name: impl Into<String>) -> Self {
        Self {
            vm_name: vm_name.into(),
            status: MigrationStatus::Migrated,
            reason: None,
        }
    }

    pub fn skipped(vm_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            vm_name: vm_name.into(),
            status: MigrationStatus::Skipped,
            reason: Some(reason.into()),
        }
    }

    pub fn failed(vm_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            vm_name: vm_name.into(),
            status: MigrationStatus::Failed,
            reason: Some(reason.into()),
        }
    }
}

/// Which way a migration batch moved VMs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MigrationDirection {
    ToStandard,
    ToDistributed,
}

/// Outcomes of a migration batch, in processing order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub direction: MigrationDirection,
    pub outcomes: Vec<MigrationOutcome>,
    /// Set when the operator aborted the run before every VM was attempted
    #[serde(default)]
    pub interrupted: bool,
}

impl MigrationReport {
    pub fn new(direction: MigrationDirection) -> Self {
        Self {
            direction,
            outcomes: Vec::new(),
            interrupted: false,
        }
    }

    pub fn push(&mut self, outcome: MigrationOutcome) {
        self.outcomes.push(outcome);
    }

    /// Names of the VMs that failed, each listed once, in processing order.
    pub fn failed_vms(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for o in &self.outcomes {
            if o.status == MigrationStatus::Failed && !names.contains(&o.vm_name.as_str()) {
                names.push(&o.vm_name);
            }
        }
        names
    }

    pub fn count(&self, status: MigrationStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn outcome(&self, vm_name: &str) -> Option<&MigrationOutcome> {
        self.outcomes.iter().find(|o| o.vm_name == vm_name)
    }
}

/// A mutation that failed on one host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostFailure {
    pub host: String,
    /// Port group or switch the request was for
    pub target: String,
    pub reason: String,
    /// The host already had an object with that name
    #[serde(default)]
    pub duplicate: bool,
}

impl HostFailure {
    pub fn new(host: impl Into<String>, target: impl Into<String>, err: NetmigError) -> Self {
        Self {
            host: host.into(),
            target: target.into(),
            duplicate: err.kind == NetmigErrorKind::AlreadyExists,
            reason: err.message,
        }
    }
}

/// Result of creating planned port groups on every host.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub planned: Vec<PortGroupSpec>,
    pub created: usize,
    pub failures: Vec<HostFailure>,
    #[serde(default)]
    pub interrupted: bool,
}

/// Result of creating a standard switch on every host.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionReport {
    pub switch_name: String,
    pub created: Vec<String>,
    pub failures: Vec<HostFailure>,
    #[serde(default)]
    pub interrupted: bool,
}

/// What an operation produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "operation", content = "result")]
pub enum OperationOutput {
    CreateSwitch(ProvisionReport),
    CreatePortGroups(ApplyReport),
    Migration(MigrationReport),
    Audit(Vec<VmNetworkRecord>),
}

/// Operation output stamped with its run window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperationReport {
    pub cluster: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub output: OperationOutput,
}

impl OperationReport {
    /// Failed VM names of a migration; empty for every other operation.
    pub fn failed_vms(&self) -> Vec<&str> {
        match &self.output {
            OperationOutput::Migration(report) => report.failed_vms(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_names_are_unique_and_ordered() {
        let mut report = MigrationReport::new(MigrationDirection::ToStandard);
        report.push(MigrationOutcome::failed("b", "x"));
        report.push(MigrationOutcome::migrated("a"));
        report.push(MigrationOutcome::failed("c", "y"));
        report.push(MigrationOutcome::failed("b", "z"));

        assert_eq!(report.failed_vms(), vec!["b", "c"]);
        assert_eq!(report.count(MigrationStatus::Failed), 3);
        assert_eq!(report.count(MigrationStatus::Migrated), 1);
    }

    #[test]
    fn operation_output_is_tagged() {
        let out = OperationOutput::Migration(MigrationReport::new(MigrationDirection::ToDistributed));
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["operation"], "migration");
        assert_eq!(json["result"]["direction"], "toDistributed");
    }
}

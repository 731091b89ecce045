//! Aggregate service façade for the migration crate.
//!
//! `MigrationService` owns the fabric client, the run configuration and
//! the inventory gathered at startup, and dispatches the five operations.

use crate::abort::AbortSignal;
use crate::catalog::NetworkCatalog;
use crate::config::MigrationConfig;
use crate::error::{NetmigError, NetmigResult};
use crate::fabric::Fabric;
use crate::migration::MigrationEngine;
use crate::planner::PortGroupPlanner;
use crate::report::{OperationOutput, OperationReport};
use crate::resolver::IdentityResolver;
use crate::switch::SwitchProvisioner;
use crate::task::TaskWaiter;
use crate::types::*;

use chrono::Utc;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// One unit of work, named the way operators type it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `createvswitch`
    CreateSwitch,
    /// `createportgroups`
    CreatePortGroups,
    /// `migratetovswitch`
    MigrateToStandard,
    /// `migratetodvs`
    MigrateToDistributed,
    /// `audit`
    Audit,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::CreateSwitch,
        Operation::CreatePortGroups,
        Operation::MigrateToStandard,
        Operation::MigrateToDistributed,
        Operation::Audit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateSwitch => "createvswitch",
            Self::CreatePortGroups => "createportgroups",
            Self::MigrateToStandard => "migratetovswitch",
            Self::MigrateToDistributed => "migratetodvs",
            Self::Audit => "audit",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = NetmigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(Operation::as_str).collect();
                NetmigError::config(format!(
                    "Unknown operation '{s}', expected one of: {}",
                    known.join(", ")
                ))
            })
    }
}

/// Hosts, VMs and network catalog read once at startup.
#[derive(Debug, Clone)]
pub struct Inventory {
    pub hosts: Vec<HostRef>,
    pub vms: Vec<VmRef>,
    pub catalog: NetworkCatalog,
}

/// Top-level service tying configuration, fabric and engines together.
pub struct MigrationService {
    fabric: Arc<dyn Fabric>,
    config: MigrationConfig,
    abort: AbortSignal,
    inventory: Option<Inventory>,
}

impl MigrationService {
    pub fn new(fabric: Arc<dyn Fabric>, config: MigrationConfig) -> Self {
        Self {
            fabric,
            config,
            abort: AbortSignal::new(),
            inventory: None,
        }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Flag shared with every batch this service runs.
    pub fn abort_handle(&self) -> AbortSignal {
        self.abort.clone()
    }

    fn waiter(&self) -> TaskWaiter {
        TaskWaiter::new(self.config.wait.policy())
    }

    /// List the cluster's hosts and VMs and build the network catalog.
    /// Runs once; later calls return the cached inventory.
    pub async fn prepare(&mut self) -> NetmigResult<&Inventory> {
        let inventory = match self.inventory.take() {
            Some(inv) => inv,
            None => self.collect_inventory().await?,
        };
        Ok(self.inventory.insert(inventory))
    }

    async fn collect_inventory(&self) -> NetmigResult<Inventory> {
        let cluster = &self.config.cluster;
        let hosts = self.fabric.list_hosts(cluster).await?;
        if hosts.is_empty() {
            return Err(NetmigError::not_found(format!("Cluster {cluster} has no hosts")));
        }
        let vms = self.fabric.list_vms(cluster).await?;
        let catalog = NetworkCatalog::build(self.fabric.as_ref(), &hosts).await?;
        info!(cluster = %cluster, hosts = hosts.len(), vms = vms.len(), "Inventory collected");
        Ok(Inventory { hosts, vms, catalog })
    }

    /// Run one operation and stamp its report with the run window.
    pub async fn run(&mut self, op: Operation) -> NetmigResult<OperationReport> {
        let started_at = Utc::now();
        info!(operation = %op, cluster = %self.config.cluster, "Starting operation");
        self.prepare().await?;
        let output = self.dispatch(op).await?;
        let report = OperationReport {
            cluster: self.config.cluster.clone(),
            started_at,
            finished_at: Utc::now(),
            output,
        };
        info!(operation = %op, "Operation finished");
        Ok(report)
    }

    async fn dispatch(&self, op: Operation) -> NetmigResult<OperationOutput> {
        let inv = self
            .inventory
            .as_ref()
            .ok_or_else(|| NetmigError::config("prepare() must run before dispatch"))?;
        let fabric = self.fabric.as_ref();
        let waiter = self.waiter();

        Ok(match op {
            Operation::CreateSwitch => {
                let name = self.config.require_vswitch()?;
                let report = SwitchProvisioner::new(fabric, waiter)
                    .with_abort(self.abort.clone())
                    .add_hosts_switch(&inv.hosts, name, &self.config.uplinks)
                    .await;
                OperationOutput::CreateSwitch(report)
            }
            Operation::CreatePortGroups => {
                let name = self.config.require_vswitch()?;
                let planner = PortGroupPlanner::new(fabric, waiter).with_abort(self.abort.clone());
                let resolver = IdentityResolver::new(fabric, &inv.catalog);
                let plan = planner.plan(&inv.vms, &resolver).await;
                OperationOutput::CreatePortGroups(planner.apply(&inv.hosts, name, &plan).await)
            }
            Operation::MigrateToStandard => {
                let engine = MigrationEngine::new(fabric, &inv.catalog, waiter)
                    .with_abort(self.abort.clone());
                OperationOutput::Migration(engine.migrate_to_standard(&inv.vms).await)
            }
            Operation::MigrateToDistributed => {
                let engine = MigrationEngine::new(fabric, &inv.catalog, waiter)
                    .with_abort(self.abort.clone());
                let report = engine
                    .migrate_to_distributed(&inv.vms, self.config.unmatched_policy)
                    .await?;
                OperationOutput::Migration(report)
            }
            Operation::Audit => {
                let resolver = IdentityResolver::new(fabric, &inv.catalog);
                let mut records = Vec::with_capacity(inv.vms.len());
                for vm in &inv.vms {
                    if let Some(record) = resolver.record(vm).await? {
                        records.push(record);
                    }
                }
                OperationOutput::Audit(records)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetmigErrorKind;
    use crate::simulated::{FabricSnapshot, SimulatedFabric};

    const SNAPSHOT: &str = r#"
hosts:
  - { id: host-1, name: esx01, cluster: prod, vswitches: [vSwitch0] }
  - { id: host-2, name: esx02, cluster: prod, vswitches: [vSwitch0] }
distributedSwitches:
  - uuid: u1
    name: dvs1
    portGroups:
      - { key: dvpg-web, name: "dvs1|uplink|web", vlan: { type: access, value: 10 } }
vms:
  - id: vm-1
    name: web01
    host: host-1
    devices:
      - kind: ethernet
        key: 4000
        backing: { type: distributedPort, portGroupKey: dvpg-web, switchUuid: u1 }
"#;

    fn service(config: MigrationConfig) -> MigrationService {
        let fabric = SimulatedFabric::new(FabricSnapshot::from_yaml_str(SNAPSHOT).unwrap());
        MigrationService::new(Arc::new(fabric), config)
    }

    fn config() -> MigrationConfig {
        let mut cfg = MigrationConfig::from_yaml_str("cluster: prod\nvswitch: vSwitch1\n").unwrap();
        cfg.wait.poll_interval_ms = 1;
        cfg
    }

    #[test]
    fn operation_words_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.to_string().parse::<Operation>().unwrap(), op);
        }
        assert_eq!("MigrateToDVS".parse::<Operation>().unwrap(), Operation::MigrateToDistributed);
        assert_eq!(
            "rollback".parse::<Operation>().unwrap_err().kind,
            NetmigErrorKind::ConfigError
        );
    }

    #[tokio::test]
    async fn full_cycle_through_the_service() {
        let mut svc = service(config());

        let out = svc.run(Operation::CreateSwitch).await.unwrap();
        match out.output {
            OperationOutput::CreateSwitch(r) => assert_eq!(r.created.len(), 2),
            other => panic!("unexpected output {other:?}"),
        }

        let out = svc.run(Operation::CreatePortGroups).await.unwrap();
        match out.output {
            OperationOutput::CreatePortGroups(r) => {
                assert_eq!(r.planned.len(), 1);
                assert_eq!(r.created, 2);
            }
            other => panic!("unexpected output {other:?}"),
        }

        let out = svc.run(Operation::MigrateToStandard).await.unwrap();
        assert!(out.failed_vms().is_empty());
        assert!(out.finished_at >= out.started_at);
        assert_eq!(out.cluster, "prod");
    }

    #[tokio::test]
    async fn create_requires_a_switch_name() {
        let mut cfg = config();
        cfg.vswitch = None;
        let mut svc = service(cfg);
        let err = svc.run(Operation::CreatePortGroups).await.unwrap_err();
        assert_eq!(err.kind, NetmigErrorKind::ConfigError);
    }

    #[tokio::test]
    async fn unknown_cluster_fails_prepare() {
        let mut cfg = config();
        cfg.cluster = "staging".into();
        let mut svc = service(cfg);
        assert_eq!(svc.prepare().await.unwrap_err().kind, NetmigErrorKind::NotFound);
    }

    #[tokio::test]
    async fn audit_lists_every_vm_with_a_nic() {
        let mut svc = service(config());
        let out = svc.run(Operation::Audit).await.unwrap();
        let OperationOutput::Audit(records) = out.output else {
            panic!("expected audit output");
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].host, "esx01");
        assert_eq!(records[0].attachment.display_name, "dvs1|uplink|web");
    }
}

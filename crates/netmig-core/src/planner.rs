//! Planning and creation of the standard port groups a migration needs.

use crate::abort::AbortSignal;
use crate::error::{NetmigError, NetmigResult};
use crate::fabric::Fabric;
use crate::report::{ApplyReport, HostFailure};
use crate::resolver::IdentityResolver;
use crate::task::TaskWaiter;
use crate::types::*;

use indexmap::IndexSet;
use tracing::{debug, info, warn};

/// Ports per created port group.
pub const PORT_GROUP_NUM_PORTS: u32 = 1024;

/// MTU of created port groups.
pub const PORT_GROUP_MTU: u32 = 1500;

/// Security policy of created port groups: promiscuous mode accepted, MAC
/// address changes and forged transmits rejected.
pub const PORT_GROUP_SECURITY: SecurityPolicy = SecurityPolicy {
    allow_promiscuous: true,
    mac_changes: false,
    forged_transmits: false,
};

/// Computes and creates the port groups that must exist on every host.
pub struct PortGroupPlanner<'a> {
    fabric: &'a dyn Fabric,
    waiter: TaskWaiter,
    abort: AbortSignal,
}

impl<'a> PortGroupPlanner<'a> {
    pub fn new(fabric: &'a dyn Fabric, waiter: TaskWaiter) -> Self {
        Self {
            fabric,
            waiter,
            abort: AbortSignal::new(),
        }
    }

    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.waiter = self.waiter.with_abort(abort.clone());
        self.abort = abort;
        self
    }

    /// Deduplicated set of port groups for every VM currently on a
    /// distributed backing.
    ///
    /// The set is keyed by name and keeps insertion order: when two VMs map
    /// to the same name with different VLANs, the first one seen wins. VMs
    /// whose display name has fewer than three `|` segments are not
    /// candidates and are skipped.
    pub async fn plan(
        &self,
        vms: &[VmRef],
        resolver: &IdentityResolver<'_>,
    ) -> IndexSet<PortGroupSpec> {
        info!(vms = vms.len(), "Compiling list of port groups to create");
        let mut plan: IndexSet<PortGroupSpec> = IndexSet::new();
        for vm in vms {
            let attachment = match resolver.resolve(vm).await {
                Ok(Some(att)) => att,
                Ok(None) => continue,
                Err(e) => {
                    warn!(vm = %vm.name, "cannot read adapters, skipping: {}", e);
                    continue;
                }
            };
            if attachment.on_standard_switch() {
                continue;
            }
            let Some(name) = attachment.logical_name() else {
                debug!(vm = %vm.name, display_name = %attachment.display_name, "not a planning candidate");
                continue;
            };
            let spec = PortGroupSpec {
                name: name.to_string(),
                vlan_id: attachment.vlan_id.clone(),
            };
            if let Some(existing) = plan.get(&spec) {
                if existing.vlan_id != spec.vlan_id {
                    warn!(
                        port_group = %spec.name,
                        kept = %existing.vlan_id,
                        dropped = %spec.vlan_id,
                        "same port group name seen with different VLANs"
                    );
                }
                continue;
            }
            plan.insert(spec);
        }
        info!(count = plan.len(), "Port groups planned");
        plan
    }

    /// Create every planned port group on every host's `vswitch_name`.
    ///
    /// A failure (name collision, unreachable host, VLAN that is not a
    /// single id) is recorded for that host/port-group pair and the batch
    /// moves on.
    pub async fn apply(
        &self,
        hosts: &[HostRef],
        vswitch_name: &str,
        plan: &IndexSet<PortGroupSpec>,
    ) -> ApplyReport {
        info!(port_groups = plan.len(), hosts = hosts.len(), "Creating port groups");
        let mut report = ApplyReport {
            planned: plan.iter().cloned().collect(),
            ..ApplyReport::default()
        };

        for pg in plan {
            let vlan_id = match pg.vlan_id.parse::<u16>() {
                Ok(id) => id,
                Err(_) => {
                    warn!(port_group = %pg.name, vlan = %pg.vlan_id, "VLAN is not a single id");
                    for host in hosts {
                        let err = NetmigError::config(format!("invalid VLAN id '{}'", pg.vlan_id));
                        report.failures.push(HostFailure::new(&host.name, &pg.name, err));
                    }
                    continue;
                }
            };
            let spec = HostPortGroupSpec {
                name: pg.name.clone(),
                vswitch_name: vswitch_name.to_string(),
                vlan_id,
                num_ports: PORT_GROUP_NUM_PORTS,
                mtu: PORT_GROUP_MTU,
                security: PORT_GROUP_SECURITY,
            };

            for host in hosts {
                if self.abort.is_aborted() {
                    warn!("Port group creation interrupted");
                    report.interrupted = true;
                    return report;
                }
                match self.add_one(host, &spec).await {
                    Ok(()) => {
                        debug!(host = %host.name, port_group = %spec.name, "port group created");
                        report.created += 1;
                    }
                    Err(e) => {
                        warn!(host = %host.name, port_group = %spec.name, "port group creation failed: {}", e);
                        let fatal = e.is_batch_fatal();
                        report.failures.push(HostFailure::new(&host.name, &spec.name, e));
                        if fatal {
                            report.interrupted = true;
                            return report;
                        }
                    }
                }
            }
        }
        info!(
            created = report.created,
            failed = report.failures.len(),
            "Port group creation finished"
        );
        report
    }

    async fn add_one(&self, host: &HostRef, spec: &HostPortGroupSpec) -> NetmigResult<()> {
        let task = self.fabric.add_port_group(host, spec).await?;
        self.waiter.wait(self.fabric, &task).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NetworkCatalog;
    use crate::simulated::{FabricSnapshot, SimulatedFabric};
    use crate::task::WaitPolicy;
    use std::time::Duration;

    const SNAPSHOT: &str = r#"
hosts:
  - { id: host-1, name: esx01, cluster: prod, vswitches: [vSwitch0, vSwitch1] }
  - { id: host-2, name: esx02, cluster: prod, vswitches: [vSwitch0, vSwitch1] }
distributedSwitches:
  - uuid: u1
    name: dvs1
    portGroups:
      - { key: pg-a10, name: "dvs1|up|A", vlan: { type: access, value: 10 } }
      - { key: pg-a20, name: "dvs2|up|A", vlan: { type: access, value: 20 } }
      - { key: pg-b, name: "dvs1|up|B", vlan: { type: access, value: 30 } }
      - { key: pg-flat, name: "flat" }
      - { key: pg-trunk, name: "dvs1|up|T", vlan: { type: trunk, value: [[0, 4094]] } }
vms:
  - id: vm-1
    name: a-first
    host: host-1
    devices:
      - { kind: ethernet, key: 4000, backing: { type: distributedPort, portGroupKey: pg-a10, switchUuid: u1 } }
  - id: vm-2
    name: a-second
    host: host-2
    devices:
      - { kind: ethernet, key: 4000, backing: { type: distributedPort, portGroupKey: pg-a20, switchUuid: u1 } }
  - id: vm-3
    name: b
    host: host-1
    devices:
      - { kind: ethernet, key: 4000, backing: { type: distributedPort, portGroupKey: pg-b, switchUuid: u1 } }
  - id: vm-4
    name: simple
    host: host-1
    devices:
      - { kind: ethernet, key: 4000, backing: { type: distributedPort, portGroupKey: pg-flat, switchUuid: u1 } }
  - id: vm-5
    name: lost
    host: host-1
    devices:
      - { kind: ethernet, key: 4000, backing: { type: distributedPort, portGroupKey: pg-a10, switchUuid: nope } }
"#;

    fn waiter() -> TaskWaiter {
        TaskWaiter::new(WaitPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: None,
        })
    }

    async fn setup(fabric: &SimulatedFabric) -> (Vec<HostRef>, Vec<VmRef>, NetworkCatalog) {
        let hosts = fabric.list_hosts("prod").await.unwrap();
        let vms = fabric.list_vms("prod").await.unwrap();
        let catalog = NetworkCatalog::build(fabric, &hosts).await.unwrap();
        (hosts, vms, catalog)
    }

    #[tokio::test]
    async fn plan_dedups_by_name_first_vlan_wins() {
        let fabric = SimulatedFabric::new(FabricSnapshot::from_yaml_str(SNAPSHOT).unwrap());
        let (_, vms, catalog) = setup(&fabric).await;
        let resolver = IdentityResolver::new(&fabric, &catalog);

        let plan = PortGroupPlanner::new(&fabric, waiter()).plan(&vms, &resolver).await;

        let entries: Vec<(&str, &str)> = plan
            .iter()
            .map(|s| (s.name.as_str(), s.vlan_id.as_str()))
            .collect();
        assert_eq!(entries, vec![("A", "10"), ("B", "30")]);
    }

    #[tokio::test]
    async fn apply_creates_on_every_host() {
        let fabric = SimulatedFabric::new(FabricSnapshot::from_yaml_str(SNAPSHOT).unwrap());
        let (hosts, vms, catalog) = setup(&fabric).await;
        let resolver = IdentityResolver::new(&fabric, &catalog);
        let planner = PortGroupPlanner::new(&fabric, waiter());
        let plan = planner.plan(&vms, &resolver).await;

        let report = planner.apply(&hosts, "vSwitch1", &plan).await;
        assert_eq!(report.created, 4);
        assert!(report.failures.is_empty());

        let snap = fabric.snapshot().await;
        for host in &snap.hosts {
            let pg = host.port_groups.iter().find(|p| p.name == "A").unwrap();
            assert_eq!(pg.vlan_id, 10);
            assert_eq!(pg.vswitch_name, "vSwitch1");
        }
    }

    #[tokio::test]
    async fn second_apply_reports_collisions_without_crashing() {
        let fabric = SimulatedFabric::new(FabricSnapshot::from_yaml_str(SNAPSHOT).unwrap());
        let (hosts, vms, catalog) = setup(&fabric).await;
        let resolver = IdentityResolver::new(&fabric, &catalog);
        let planner = PortGroupPlanner::new(&fabric, waiter());
        let plan = planner.plan(&vms, &resolver).await;

        planner.apply(&hosts, "vSwitch1", &plan).await;
        let again = planner.apply(&hosts, "vSwitch1", &plan).await;

        assert_eq!(again.created, 0);
        assert_eq!(again.failures.len(), 4);
        assert!(again.failures.iter().all(|f| f.duplicate));
        assert!(again.failures.iter().all(|f| f.reason.contains("already exists")));
    }

    #[tokio::test]
    async fn failing_host_does_not_stop_others() {
        let fabric = SimulatedFabric::new(FabricSnapshot::from_yaml_str(SNAPSHOT).unwrap())
            .with_failing_host("esx01");
        let (hosts, vms, catalog) = setup(&fabric).await;
        let resolver = IdentityResolver::new(&fabric, &catalog);
        let planner = PortGroupPlanner::new(&fabric, waiter());
        let plan = planner.plan(&vms, &resolver).await;

        let report = planner.apply(&hosts, "vSwitch1", &plan).await;
        assert_eq!(report.created, 2);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.host == "esx01"));
    }

    #[tokio::test]
    async fn non_numeric_vlan_fails_that_spec_only() {
        let fabric = SimulatedFabric::new(FabricSnapshot::from_yaml_str(SNAPSHOT).unwrap());
        let (hosts, _, _) = setup(&fabric).await;
        let planner = PortGroupPlanner::new(&fabric, waiter());
        let mut plan = IndexSet::new();
        plan.insert(PortGroupSpec { name: "T".into(), vlan_id: "0-4094".into() });
        plan.insert(PortGroupSpec { name: "B".into(), vlan_id: "30".into() });

        let report = planner.apply(&hosts, "vSwitch1", &plan).await;
        assert_eq!(report.created, 2);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.target == "T"));
    }

    #[tokio::test]
    async fn abort_stops_before_next_host() {
        let fabric = SimulatedFabric::new(FabricSnapshot::from_yaml_str(SNAPSHOT).unwrap());
        let (hosts, _, _) = setup(&fabric).await;
        let abort = AbortSignal::new();
        abort.abort();
        let planner = PortGroupPlanner::new(&fabric, waiter()).with_abort(abort);
        let mut plan = IndexSet::new();
        plan.insert(PortGroupSpec { name: "B".into(), vlan_id: "30".into() });

        let report = planner.apply(&hosts, "vSwitch1", &plan).await;
        assert!(report.interrupted);
        assert_eq!(report.created, 0);
    }
    #[tokio::test]
    async fn abort_during_a_stuck_task_stops_the_batch() {
        let fabric = SimulatedFabric::new(FabricSnapshot::from_yaml_str(SNAPSHOT).unwrap())
            .with_polls_until_done(u32::MAX);
        let (hosts, _, _) = setup(&fabric).await;
        let abort = AbortSignal::new();
        let planner = PortGroupPlanner::new(&fabric, waiter()).with_abort(abort.clone());
        let mut plan = IndexSet::new();
        plan.insert(PortGroupSpec { name: "B".into(), vlan_id: "30".into() });
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            abort.abort();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(1),
            planner.apply(&hosts, "vSwitch1", &plan),
        )
        .await
        .expect("abort should end the wait");

        assert!(report.interrupted);
        assert_eq!(report.created, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].host, "esx01");
    }
}

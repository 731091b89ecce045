//! Standard switch provisioning across a cluster's hosts.

use crate::abort::AbortSignal;
use crate::error::NetmigResult;
use crate::fabric::Fabric;
use crate::report::{HostFailure, ProvisionReport};
use crate::task::TaskWaiter;
use crate::types::*;

use tracing::{debug, info, warn};

/// Ports per created standard switch.
pub const SWITCH_NUM_PORTS: u32 = 1024;

/// MTU of created standard switches.
pub const SWITCH_MTU: u32 = 1500;

/// Creates the same standard switch on every host.
pub struct SwitchProvisioner<'a> {
    fabric: &'a dyn Fabric,
    waiter: TaskWaiter,
    abort: AbortSignal,
}

impl<'a> SwitchProvisioner<'a> {
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

    /// Add `name` to every host, bonding `uplinks` as its physical NICs.
    /// A host that rejects the request is recorded and skipped.
    pub async fn add_hosts_switch(
        &self,
        hosts: &[HostRef],
        name: &str,
        uplinks: &[String],
    ) -> ProvisionReport {
        info!(switch = name, hosts = hosts.len(), "Creating standard vSwitch on hosts");
        let spec = VirtualSwitchSpec {
            num_ports: SWITCH_NUM_PORTS,
            mtu: SWITCH_MTU,
            bridge_nics: uplinks.to_vec(),
        };
        let mut report = ProvisionReport {
            switch_name: name.to_string(),
            ..ProvisionReport::default()
        };

        for host in hosts {
            if self.abort.is_aborted() {
                warn!("Switch creation interrupted");
                report.interrupted = true;
                break;
            }
            match self.add_one(host, name, &spec).await {
                Ok(()) => {
                    debug!(host = %host.name, switch = name, "vSwitch created");
                    report.created.push(host.name.clone());
                }
                Err(e) => {
                    warn!(host = %host.name, switch = name, "vSwitch creation failed: {}", e);
                    let fatal = e.is_batch_fatal();
                    report.failures.push(HostFailure::new(&host.name, name, e));
                    if fatal {
                        report.interrupted = true;
                        break;
                    }
                }
            }
        }
        report
    }

    async fn add_one(&self, host: &HostRef, name: &str, spec: &VirtualSwitchSpec) -> NetmigResult<()> {
        let task = self.fabric.add_virtual_switch(host, name, spec).await?;
        self.waiter.wait(self.fabric, &task).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{FabricSnapshot, SimulatedFabric};
    use crate::task::WaitPolicy;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const SNAPSHOT: &str = r#"
hosts:
  - { id: host-1, name: esx01, cluster: prod, vswitches: [vSwitch0] }
  - { id: host-2, name: esx02, cluster: prod, vswitches: [vSwitch0, vSwitch1] }
  - { id: host-3, name: esx03, cluster: prod }
"#;

    fn waiter() -> TaskWaiter {
        TaskWaiter::new(WaitPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: None,
        })
    }

    #[tokio::test]
    async fn existing_switch_fails_only_that_host() {
        let fabric = SimulatedFabric::new(FabricSnapshot::from_yaml_str(SNAPSHOT).unwrap())
            .with_failing_host("esx03");
        let hosts = fabric.list_hosts("prod").await.unwrap();
        let uplinks = vec!["vmnic7".to_string()];

        let report = SwitchProvisioner::new(&fabric, waiter())
            .add_hosts_switch(&hosts, "vSwitch1", &uplinks)
            .await;

        assert_eq!(report.created, vec!["esx01".to_string()]);
        let failed: Vec<&str> = report.failures.iter().map(|f| f.host.as_str()).collect();
        assert_eq!(failed, vec!["esx02", "esx03"]);
        assert!(report.failures[0].duplicate);
        assert!(!report.failures[1].duplicate);

        let snap = fabric.snapshot().await;
        assert!(snap.hosts[0].vswitches.contains(&"vSwitch1".to_string()));
    }

    #[tokio::test]
    async fn abort_stops_before_next_host() {
        let fabric = SimulatedFabric::new(FabricSnapshot::from_yaml_str(SNAPSHOT).unwrap());
        let hosts = fabric.list_hosts("prod").await.unwrap();
        let abort = AbortSignal::new();
        abort.abort();

        let report = SwitchProvisioner::new(&fabric, waiter())
            .with_abort(abort)
            .add_hosts_switch(&hosts, "vSwitch9", &[])
            .await;

        assert!(report.interrupted);
        assert!(report.created.is_empty());
    }

    #[tokio::test]
    async fn abort_during_a_stuck_task_keeps_the_partial_report() {
        let fabric = SimulatedFabric::new(FabricSnapshot::from_yaml_str(SNAPSHOT).unwrap())
            .with_polls_until_done(u32::MAX);
        let hosts = fabric.list_hosts("prod").await.unwrap();
        let abort = AbortSignal::new();
        let trigger = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.abort();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(1),
            SwitchProvisioner::new(&fabric, waiter())
                .with_abort(abort)
                .add_hosts_switch(&hosts, "vSwitch9", &[]),
        )
        .await
        .expect("abort should end the wait");

        assert!(report.interrupted);
        assert!(report.created.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].host, "esx01");
    }
}

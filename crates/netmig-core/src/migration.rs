//! VM network migration between standard and distributed switches.
//!
//! Both directions share one primitive, [`MigrationEngine::rewire_adapter`],
//! which rewrites every Ethernet adapter of a VM in a single reconfiguration
//! task and waits for it before returning. VMs are processed strictly one
//! after the other.

use crate::abort::AbortSignal;
use crate::catalog::{DistributedIndex, NetworkCatalog};
use crate::error::{NetmigError, NetmigResult};
use crate::fabric::Fabric;
use crate::report::{MigrationDirection, MigrationOutcome, MigrationReport};
use crate::resolver::IdentityResolver;
use crate::task::TaskWaiter;
use crate::types::*;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Failure reason recorded for names without three `|` segments.
pub const MALFORMED_NAME_REASON: &str = "malformed port group name";

/// Failure reason recorded when no distributed port group matches.
pub const UNMATCHED_REASON: &str = "no matching distributed port group";

/// What to do when a VM has no matching distributed port group during a
/// to-distributed migration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UnmatchedPolicy {
    /// Stop the whole run with an `UnmatchedPortGroup` error
    #[default]
    Abort,
    /// Record the VM as failed and continue with the next one
    Skip,
}

/// Network an adapter should be moved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewireTarget {
    /// Standard network, by name
    Standard(String),
    /// Distributed port group, by full name
    Distributed(String),
}

impl RewireTarget {
    pub fn name(&self) -> &str {
        match self {
            Self::Standard(name) | Self::Distributed(name) => name,
        }
    }
}

/// Build the edit operations that move every Ethernet adapter in `devices`
/// onto `backing`. Wake-on-LAN is enabled and the adapter is marked
/// connected, connected at power-on, and guest-controllable.
pub fn build_device_changes(devices: &[VirtualDevice], backing: &NicBacking) -> VmConfigSpec {
    let device_change = devices
        .iter()
        .filter_map(VirtualDevice::as_ethernet)
        .map(|card| {
            let mut device = card.clone();
            device.wake_on_lan_enabled = true;
            device.backing = backing.clone();
            device.connectable = ConnectInfo::all_enabled();
            DeviceChange {
                operation: DeviceOperation::Edit,
                device,
            }
        })
        .collect();
    VmConfigSpec { device_change }
}

/// Drives per-VM reconfiguration in either direction.
pub struct MigrationEngine<'a> {
    fabric: &'a dyn Fabric,
    catalog: &'a NetworkCatalog,
    waiter: TaskWaiter,
    abort: AbortSignal,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(fabric: &'a dyn Fabric, catalog: &'a NetworkCatalog, waiter: TaskWaiter) -> Self {
        Self {
            fabric,
            catalog,
            waiter,
            abort: AbortSignal::new(),
        }
    }

    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.waiter = self.waiter.with_abort(abort.clone());
        self.abort = abort;
        self
    }

    fn resolver(&self) -> IdentityResolver<'a> {
        IdentityResolver::new(self.fabric, self.catalog)
    }

    /// Resolve a VM for migration. `Err` carries the outcome to record when
    /// the VM is not eligible.
    async fn eligible(&self, vm: &VmRef) -> Result<NetworkAttachment, MigrationOutcome> {
        match self.resolver().resolve(vm).await {
            Ok(Some(att)) if att.on_default_network() => {
                Err(MigrationOutcome::skipped(&vm.name, "attached to the default network"))
            }
            Ok(Some(att)) => Ok(att),
            Ok(None) => Err(MigrationOutcome::skipped(&vm.name, "no Ethernet adapter")),
            Err(e) => Err(MigrationOutcome::failed(&vm.name, e.message)),
        }
    }

    // ── Distributed → standard ──────────────────────────────────────

    /// Move every eligible VM onto the standard network named by the third
    /// segment of its current port group. Never stops early except on
    /// operator abort; every failure is recorded in the report.
    pub async fn migrate_to_standard(&self, vms: &[VmRef]) -> MigrationReport {
        info!(vms = vms.len(), "Migrating VMs from distributed switch to standard vSwitch");
        let mut report = MigrationReport::new(MigrationDirection::ToStandard);

        for vm in vms {
            if self.abort.is_aborted() {
                report.interrupted = true;
                break;
            }
            let attachment = match self.eligible(vm).await {
                Ok(att) => att,
                Err(outcome) => {
                    report.push(outcome);
                    continue;
                }
            };
            let Some(target) = attachment.logical_name() else {
                warn!(vm = %vm.name, display_name = %attachment.display_name, "{}", MALFORMED_NAME_REASON);
                report.push(MigrationOutcome::failed(&vm.name, MALFORMED_NAME_REASON));
                continue;
            };
            let target = RewireTarget::Standard(target.to_string());
            if !self.rewire_into(&mut report, vm, &target).await {
                break;
            }
        }

        let failed = report.failed_vms();
        if failed.is_empty() {
            info!("All VMs migrated to standard vSwitch");
        } else {
            warn!("These VMs failed to migrate: {:?}", failed);
        }
        report
    }

    // ── Standard → distributed ──────────────────────────────────────

    /// Move every eligible VM onto the distributed port group whose third
    /// name segment equals its current network name.
    ///
    /// The distributed port groups are re-read from the fabric first, since
    /// port groups may have been created after the catalog was built. With
    /// [`UnmatchedPolicy::Abort`] a VM without a match stops the run.
    pub async fn migrate_to_distributed(
        &self,
        vms: &[VmRef],
        policy: UnmatchedPolicy,
    ) -> NetmigResult<MigrationReport> {
        let index = DistributedIndex::build(self.fabric).await?;
        info!(
            vms = vms.len(),
            port_groups = index.len(),
            "Migrating VMs from standard vSwitch to distributed switch"
        );
        let mut report = MigrationReport::new(MigrationDirection::ToDistributed);

        for vm in vms {
            if self.abort.is_aborted() {
                report.interrupted = true;
                break;
            }
            let attachment = match self.eligible(vm).await {
                Ok(att) => att,
                Err(outcome) => {
                    report.push(outcome);
                    continue;
                }
            };
            let Some(pg) = index.find_by_logical_name(&attachment.display_name) else {
                match policy {
                    UnmatchedPolicy::Abort => {
                        error!(
                            vm = %vm.name,
                            network = %attachment.display_name,
                            processed = report.outcomes.len(),
                            "no matching distributed port group, stopping"
                        );
                        return Err(NetmigError::unmatched(format!(
                            "No distributed port group matches '{}' (VM {})",
                            attachment.display_name, vm.name
                        )));
                    }
                    UnmatchedPolicy::Skip => {
                        warn!(vm = %vm.name, network = %attachment.display_name, "{}", UNMATCHED_REASON);
                        report.push(MigrationOutcome::failed(&vm.name, UNMATCHED_REASON));
                        continue;
                    }
                }
            };
            let target = RewireTarget::Distributed(pg.name.clone());
            if !self.rewire_into(&mut report, vm, &target).await {
                break;
            }
        }
        Ok(report)
    }

    /// Rewire one VM and record its outcome. Returns `false` when the batch
    /// must stop, leaving `report` marked interrupted.
    async fn rewire_into(
        &self,
        report: &mut MigrationReport,
        vm: &VmRef,
        target: &RewireTarget,
    ) -> bool {
        match self.rewire_adapter(vm, target).await {
            Ok(_) => {
                report.push(MigrationOutcome::migrated(&vm.name));
                true
            }
            Err(e) => {
                warn!(vm = %vm.name, target = target.name(), "rewire failed: {}", e);
                let fatal = e.is_batch_fatal();
                report.push(MigrationOutcome::failed(&vm.name, e.message));
                if fatal {
                    report.interrupted = true;
                }
                !fatal
            }
        }
    }

    // ── Reconfiguration primitive ───────────────────────────────────

    /// Point every Ethernet adapter of `vm` at `target` in one
    /// reconfiguration task and wait for it. Returns the number of adapters
    /// rewired; a VM without adapters is left untouched.
    pub async fn rewire_adapter(&self, vm: &VmRef, target: &RewireTarget) -> NetmigResult<usize> {
        let backing = self.backing_for(target).await?;
        let devices = self.fabric.vm_devices(vm).await?;
        let spec = build_device_changes(&devices, &backing);
        if spec.device_change.is_empty() {
            debug!(vm = %vm.name, "no Ethernet adapters to rewire");
            return Ok(0);
        }

        let count = spec.device_change.len();
        debug!(vm = %vm.name, adapters = count, target = target.name(), "submitting reconfiguration");
        let task = self.fabric.reconfigure_vm(vm, &spec).await?;
        self.waiter.wait(self.fabric, &task).await?;
        info!(vm = %vm.name, target = target.name(), "VM rewired");
        Ok(count)
    }

    async fn backing_for(&self, target: &RewireTarget) -> NetmigResult<NicBacking> {
        match target {
            RewireTarget::Standard(name) => {
                let network = self
                    .fabric
                    .find_network(name)
                    .await?
                    .ok_or_else(|| NetmigError::not_found(format!("Network {name} not found")))?;
                Ok(NicBacking::Network {
                    device_name: name.clone(),
                    network: Some(network.id),
                })
            }
            RewireTarget::Distributed(name) => {
                let pg = self.fabric.find_dv_port_group(name).await?.ok_or_else(|| {
                    NetmigError::not_found(format!("Distributed port group {name} not found"))
                })?;
                Ok(NicBacking::DistributedPort {
                    port_group_key: pg.key,
                    switch_uuid: pg.switch_uuid,
                })
            }
        }
    }
}

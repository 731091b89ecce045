//! Fabric client abstraction.
//!
//! Everything that talks to the management API (inventory listing, reading
//! backing and port-group configuration, submitting mutating tasks) goes
//! through the `Fabric` trait. Session handling and the wire protocol live
//! in the implementation; the migration logic only sees these calls.

use crate::error::NetmigResult;
use crate::types::*;

/// Management-plane operations consumed by the migration core.
///
/// Implementations must be `Send + Sync` so a single client can be shared
/// behind an `Arc` for the whole run.
#[async_trait::async_trait]
pub trait Fabric: Send + Sync {
    // ── Inventory ───────────────────────────────────────────────────

    /// List hosts whose parent cluster is `cluster`.
    async fn list_hosts(&self, cluster: &str) -> NetmigResult<Vec<HostRef>>;

    /// List VMs currently running on a host of `cluster`.
    async fn list_vms(&self, cluster: &str) -> NetmigResult<Vec<VmRef>>;

    /// List every distributed switch with the port groups it owns.
    async fn list_distributed_switches(&self) -> NetmigResult<Vec<DistributedSwitch>>;

    // ── Read accessors ──────────────────────────────────────────────

    /// Port groups configured locally on a host.
    async fn host_port_groups(&self, host: &HostRef) -> NetmigResult<Vec<HostPortGroup>>;

    /// A VM's hardware device list.
    async fn vm_devices(&self, vm: &VmRef) -> NetmigResult<Vec<VirtualDevice>>;

    /// Look up a host by ID.
    async fn get_host(&self, host_id: &str) -> NetmigResult<Option<HostRef>>;

    /// Query a distributed switch by UUID. `Ok(None)` when no switch has it.
    async fn query_dvs_by_uuid(&self, uuid: &str) -> NetmigResult<Option<DistributedSwitch>>;

    /// Look up a port group by key within a distributed switch, with its
    /// default VLAN populated.
    async fn lookup_dv_port_group(
        &self,
        switch: &DistributedSwitch,
        port_group_key: &str,
    ) -> NetmigResult<Option<DistributedPortGroup>>;

    /// Find a distributed port group by its full name.
    async fn find_dv_port_group(&self, name: &str) -> NetmigResult<Option<DistributedPortGroup>>;

    /// Find a standard network by name.
    async fn find_network(&self, name: &str) -> NetmigResult<Option<NetworkRef>>;

    // ── Mutations (asynchronous) ────────────────────────────────────

    /// Create a standard switch on a host.
    async fn add_virtual_switch(
        &self,
        host: &HostRef,
        name: &str,
        spec: &VirtualSwitchSpec,
    ) -> NetmigResult<TaskHandle>;

    /// Create a port group on a host's standard switch.
    async fn add_port_group(
        &self,
        host: &HostRef,
        spec: &HostPortGroupSpec,
    ) -> NetmigResult<TaskHandle>;

    /// Submit a VM reconfiguration.
    async fn reconfigure_vm(&self, vm: &VmRef, spec: &VmConfigSpec) -> NetmigResult<TaskHandle>;

    /// Poll the current state of a task.
    async fn task_info(&self, task: &TaskHandle) -> NetmigResult<TaskInfo>;
}

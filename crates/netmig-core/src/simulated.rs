//! In-memory fabric backed by an inventory snapshot.
//!
//! `SimulatedFabric` answers every `Fabric` call from a `FabricSnapshot`
//! (hosts, distributed switches, VMs) and applies mutations to it, so a
//! migration can be rehearsed offline against a captured inventory and the
//! whole workflow can be exercised in tests. Tasks stay `running` for a
//! configurable number of polls before reaching their terminal state.

use crate::error::{NetmigError, NetmigResult};
use crate::fabric::Fabric;
use crate::types::*;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A host with its standard switches and local port groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostSnapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub vswitches: Vec<String>,
    #[serde(default)]
    pub port_groups: Vec<HostPortGroup>,
}

impl HostSnapshot {
    fn to_ref(&self) -> HostRef {
        HostRef {
            id: self.id.clone(),
            name: self.name.clone(),
            cluster: self.cluster.clone(),
        }
    }
}

/// A VM with its device list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VmSnapshot {
    pub id: String,
    pub name: String,
    /// ID of the host running the VM
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub devices: Vec<VirtualDevice>,
}

/// Point-in-time inventory of a fabric.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FabricSnapshot {
    #[serde(default)]
    pub hosts: Vec<HostSnapshot>,
    #[serde(default)]
    pub distributed_switches: Vec<DistributedSwitch>,
    /// Standard networks not implied by any host port group
    #[serde(default)]
    pub networks: Vec<NetworkRef>,
    #[serde(default)]
    pub vms: Vec<VmSnapshot>,
}

impl FabricSnapshot {
    pub fn from_json_str(text: &str) -> NetmigResult<Self> {
        let snap: Self = serde_json::from_str(text)?;
        Ok(snap.normalized())
    }

    pub fn from_yaml_str(text: &str) -> NetmigResult<Self> {
        let snap: Self = serde_yaml::from_str(text)?;
        Ok(snap.normalized())
    }

    /// Load a snapshot from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: impl AsRef<Path>) -> NetmigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            other => Err(NetmigError::config(format!(
                "Unsupported snapshot format {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    /// Fill in the fields a hand-written snapshot may leave out: host port
    /// group keys and the owning switch of each distributed port group.
    fn normalized(mut self) -> Self {
        for host in &mut self.hosts {
            for pg in &mut host.port_groups {
                if pg.key.is_empty() {
                    pg.key = host_port_group_key(&pg.name);
                }
                if !host.vswitches.contains(&pg.vswitch_name) {
                    host.vswitches.push(pg.vswitch_name.clone());
                }
            }
        }
        for dvs in &mut self.distributed_switches {
            for pg in &mut dvs.port_groups {
                if pg.switch_name.is_empty() {
                    pg.switch_name = dvs.name.clone();
                }
                if pg.switch_uuid.is_empty() {
                    pg.switch_uuid = dvs.uuid.clone();
                }
            }
        }
        self
    }

    fn host(&self, id: &str) -> Option<&HostSnapshot> {
        self.hosts.iter().find(|h| h.id == id)
    }

    fn vm(&self, id: &str) -> Option<&VmSnapshot> {
        self.vms.iter().find(|v| v.id == id)
    }

    fn dvs(&self, uuid: &str) -> Option<&DistributedSwitch> {
        self.distributed_switches.iter().find(|d| d.uuid == uuid)
    }

    fn network(&self, name: &str) -> Option<NetworkRef> {
        if let Some(net) = self.networks.iter().find(|n| n.name == name) {
            return Some(net.clone());
        }
        self.hosts
            .iter()
            .flat_map(|h| h.port_groups.iter())
            .find(|pg| pg.name == name)
            .map(|pg| NetworkRef {
                id: format!("network-{}", pg.name),
                name: pg.name.clone(),
            })
    }
}

/// Key the fabric assigns to a host port group.
pub fn host_port_group_key(name: &str) -> String {
    format!("key-vim.host.PortGroup-{name}")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Simulated fabric
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct SimTask {
    outcome: Result<Option<serde_json::Value>, String>,
    remaining: u32,
    polls: u32,
}

/// A fully in-memory fabric useful for unit tests and dry runs.
pub struct SimulatedFabric {
    state: Mutex<FabricSnapshot>,
    tasks: Mutex<HashMap<TaskHandle, SimTask>>,
    reconfigurations: Mutex<HashMap<String, usize>>,
    next_task: AtomicU64,
    polls_until_done: u32,
    failing_vms: HashSet<String>,
    failing_hosts: HashSet<String>,
}

impl SimulatedFabric {
    pub fn new(snapshot: FabricSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
            tasks: Mutex::new(HashMap::new()),
            reconfigurations: Mutex::new(HashMap::new()),
            next_task: AtomicU64::new(1),
            polls_until_done: 0,
            failing_vms: HashSet::new(),
            failing_hosts: HashSet::new(),
        }
    }

    /// Number of polls a task reports `running` before its terminal state.
    pub fn with_polls_until_done(mut self, polls: u32) -> Self {
        self.polls_until_done = polls;
        self
    }

    /// Make every reconfiguration of the named VM fail.
    pub fn with_failing_vm(mut self, vm_name: impl Into<String>) -> Self {
        self.failing_vms.insert(vm_name.into());
        self
    }

    /// Make every mutation on the named host fail.
    pub fn with_failing_host(mut self, host_name: impl Into<String>) -> Self {
        self.failing_hosts.insert(host_name.into());
        self
    }

    /// Copy of the current inventory (for assertions).
    pub async fn snapshot(&self) -> FabricSnapshot {
        self.state.lock().await.clone()
    }

    /// Number of polls a task has received so far.
    pub async fn poll_count(&self, task: &TaskHandle) -> u32 {
        self.tasks
            .lock()
            .await
            .get(task)
            .map(|t| t.polls)
            .unwrap_or(0)
    }

    /// Number of reconfiguration tasks submitted for a VM.
    pub async fn reconfigure_count(&self, vm_name: &str) -> usize {
        self.reconfigurations
            .lock()
            .await
            .get(vm_name)
            .copied()
            .unwrap_or(0)
    }

    async fn submit(&self, outcome: Result<Option<serde_json::Value>, String>) -> TaskHandle {
        let id = self.next_task.fetch_add(1, Ordering::SeqCst);
        let handle = TaskHandle(format!("task-{id}"));
        self.tasks.lock().await.insert(
            handle.clone(),
            SimTask {
                outcome,
                remaining: self.polls_until_done,
                polls: 0,
            },
        );
        handle
    }

    fn host_fault(&self, host: &HostSnapshot) -> Option<String> {
        self.failing_hosts
            .contains(&host.name)
            .then(|| format!("Host {} is not responding", host.name))
    }
}

/// Validate a new backing against the inventory.
fn check_backing(state: &FabricSnapshot, backing: &NicBacking) -> Result<(), String> {
    match backing {
        NicBacking::Network { device_name, .. } => state
            .network(device_name)
            .map(|_| ())
            .ok_or_else(|| format!("Network {device_name} does not exist")),
        NicBacking::DistributedPort {
            port_group_key,
            switch_uuid,
        } => {
            let dvs = state
                .dvs(switch_uuid)
                .ok_or_else(|| format!("Distributed switch {switch_uuid} does not exist"))?;
            dvs.port_groups
                .iter()
                .any(|pg| &pg.key == port_group_key)
                .then_some(())
                .ok_or_else(|| {
                    format!("Port group {port_group_key} does not exist on {}", dvs.name)
                })
        }
    }
}

#[async_trait::async_trait]
impl Fabric for SimulatedFabric {
    async fn list_hosts(&self, cluster: &str) -> NetmigResult<Vec<HostRef>> {
        let state = self.state.lock().await;
        Ok(state
            .hosts
            .iter()
            .filter(|h| h.cluster == cluster)
            .map(HostSnapshot::to_ref)
            .collect())
    }

    async fn list_vms(&self, cluster: &str) -> NetmigResult<Vec<VmRef>> {
        let state = self.state.lock().await;
        Ok(state
            .vms
            .iter()
            .filter_map(|vm| {
                let host = state.host(vm.host.as_deref()?)?;
                (host.cluster == cluster).then(|| VmRef {
                    id: vm.id.clone(),
                    name: vm.name.clone(),
                    cluster: host.cluster.clone(),
                    host: Some(host.id.clone()),
                })
            })
            .collect())
    }

    async fn list_distributed_switches(&self) -> NetmigResult<Vec<DistributedSwitch>> {
        Ok(self.state.lock().await.distributed_switches.clone())
    }

    async fn host_port_groups(&self, host: &HostRef) -> NetmigResult<Vec<HostPortGroup>> {
        let state = self.state.lock().await;
        state
            .host(&host.id)
            .map(|h| h.port_groups.clone())
            .ok_or_else(|| NetmigError::not_found(format!("Host {} not found", host.id)))
    }

    async fn vm_devices(&self, vm: &VmRef) -> NetmigResult<Vec<VirtualDevice>> {
        let state = self.state.lock().await;
        state
            .vm(&vm.id)
            .map(|v| v.devices.clone())
            .ok_or_else(|| NetmigError::not_found(format!("VM {} not found", vm.id)))
    }

    async fn get_host(&self, host_id: &str) -> NetmigResult<Option<HostRef>> {
        Ok(self.state.lock().await.host(host_id).map(HostSnapshot::to_ref))
    }

    async fn query_dvs_by_uuid(&self, uuid: &str) -> NetmigResult<Option<DistributedSwitch>> {
        Ok(self.state.lock().await.dvs(uuid).cloned())
    }

    async fn lookup_dv_port_group(
        &self,
        switch: &DistributedSwitch,
        port_group_key: &str,
    ) -> NetmigResult<Option<DistributedPortGroup>> {
        let state = self.state.lock().await;
        Ok(state.dvs(&switch.uuid).and_then(|dvs| {
            dvs.port_groups
                .iter()
                .find(|pg| pg.key == port_group_key)
                .cloned()
        }))
    }

    async fn find_dv_port_group(&self, name: &str) -> NetmigResult<Option<DistributedPortGroup>> {
        let state = self.state.lock().await;
        Ok(state
            .distributed_switches
            .iter()
            .flat_map(|dvs| dvs.port_groups.iter())
            .find(|pg| pg.name == name)
            .cloned())
    }

    async fn find_network(&self, name: &str) -> NetmigResult<Option<NetworkRef>> {
        Ok(self.state.lock().await.network(name))
    }

    async fn add_virtual_switch(
        &self,
        host: &HostRef,
        name: &str,
        _spec: &VirtualSwitchSpec,
    ) -> NetmigResult<TaskHandle> {
        let outcome = {
            let mut state = self.state.lock().await;
            let snap = state
                .hosts
                .iter_mut()
                .find(|h| h.id == host.id)
                .ok_or_else(|| NetmigError::not_found(format!("Host {} not found", host.id)))?;
            if let Some(fault) = self.host_fault(snap) {
                Err(fault)
            } else if snap.vswitches.iter().any(|v| v == name) {
                Err(format!(
                    "The specified key, name, or identifier '{name}' already exists."
                ))
            } else {
                snap.vswitches.push(name.to_string());
                Ok(None)
            }
        };
        Ok(self.submit(outcome).await)
    }

    async fn add_port_group(
        &self,
        host: &HostRef,
        spec: &HostPortGroupSpec,
    ) -> NetmigResult<TaskHandle> {
        let outcome = {
            let mut state = self.state.lock().await;
            let snap = state
                .hosts
                .iter_mut()
                .find(|h| h.id == host.id)
                .ok_or_else(|| NetmigError::not_found(format!("Host {} not found", host.id)))?;
            if let Some(fault) = self.host_fault(snap) {
                Err(fault)
            } else if !snap.vswitches.contains(&spec.vswitch_name) {
                Err(format!(
                    "Virtual switch {} not found on {}",
                    spec.vswitch_name, snap.name
                ))
            } else if snap.port_groups.iter().any(|pg| pg.name == spec.name) {
                Err(format!("Port group {} already exists", spec.name))
            } else {
                snap.port_groups.push(HostPortGroup {
                    key: host_port_group_key(&spec.name),
                    name: spec.name.clone(),
                    vlan_id: spec.vlan_id,
                    vswitch_name: spec.vswitch_name.clone(),
                });
                Ok(None)
            }
        };
        Ok(self.submit(outcome).await)
    }

    async fn reconfigure_vm(&self, vm: &VmRef, spec: &VmConfigSpec) -> NetmigResult<TaskHandle> {
        *self
            .reconfigurations
            .lock()
            .await
            .entry(vm.name.clone())
            .or_insert(0) += 1;

        let outcome = {
            let mut state = self.state.lock().await;
            let checked: Result<(), String> = spec
                .device_change
                .iter()
                .try_for_each(|change| check_backing(&state, &change.device.backing));
            let snap = state
                .vms
                .iter_mut()
                .find(|v| v.id == vm.id)
                .ok_or_else(|| NetmigError::not_found(format!("VM {} not found", vm.id)))?;

            if self.failing_vms.contains(&snap.name) {
                Err(format!("Reconfiguration of {} was rejected", snap.name))
            } else if let Err(msg) = checked {
                Err(msg)
            } else {
                for change in &spec.device_change {
                    let slot = snap.devices.iter().position(|d| {
                        d.as_ethernet()
                            .map(|c| c.key == change.device.key)
                            .unwrap_or(false)
                    });
                    match (change.operation, slot) {
                        (DeviceOperation::Edit, Some(idx)) => {
                            snap.devices[idx] = VirtualDevice::Ethernet(change.device.clone());
                        }
                        (DeviceOperation::Add, None) => {
                            snap.devices.push(VirtualDevice::Ethernet(change.device.clone()));
                        }
                        (DeviceOperation::Remove, Some(idx)) => {
                            snap.devices.remove(idx);
                        }
                        _ => {}
                    }
                }
                Ok(None)
            }
        };
        Ok(self.submit(outcome).await)
    }

    async fn task_info(&self, task: &TaskHandle) -> NetmigResult<TaskInfo> {
        let mut tasks = self.tasks.lock().await;
        let t = tasks
            .get_mut(task)
            .ok_or_else(|| NetmigError::not_found(format!("Task {task} not found")))?;
        t.polls = t.polls.saturating_add(1);
        if t.remaining > 0 {
            t.remaining -= 1;
            return Ok(TaskInfo {
                state: TaskState::Running,
                result: None,
                error: None,
            });
        }
        Ok(match &t.outcome {
            Ok(result) => TaskInfo {
                state: TaskState::Success,
                result: result.clone(),
                error: None,
            },
            Err(msg) => TaskInfo {
                state: TaskState::Error,
                result: None,
                error: Some(msg.clone()),
            },
        })
    }
}

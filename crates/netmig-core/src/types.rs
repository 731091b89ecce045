//! Shared types for network identity resolution and migration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Naming conventions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sentinel for an attachment field that could not be resolved.
pub const NOT_AVAILABLE: &str = "NA";

/// Display name recorded when a distributed backing names an unknown switch.
pub const DVS_NOT_FOUND: &str = "** Error: DVS not found **";

/// Display name recorded when the switch exists but the port group key does not.
pub const PORT_GROUP_NOT_FOUND: &str = "** Error: port group not found **";

/// VMs attached to the default network are never migrated.
pub const DEFAULT_NETWORK_MARKER: &str = "VM Network";

/// Substring identifying a host-local standard switch name.
pub const STANDARD_SWITCH_MARKER: &str = "vSwitch";

/// Separator of legacy distributed port-group names (`switch|uplink|name`).
pub const NAME_SEPARATOR: char = '|';

/// Extract the logical port-group name, the third `|`-delimited segment of a
/// legacy distributed port-group name. `None` when there are fewer than
/// three segments.
pub fn logical_segment(display_name: &str) -> Option<&str> {
    display_name.split(NAME_SEPARATOR).nth(2)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Inventory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handle to an ESXi host as returned by the fabric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct HostRef {
    /// Managed-object ID (e.g. "host-12")
    pub id: String,
    pub name: String,
    /// Name of the cluster the host belongs to
    #[serde(default)]
    pub cluster: String,
}

/// A port group configured locally on one host's standard switch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostPortGroup {
    /// Fabric key; legacy keys embed the name (e.g. "key-vim.host.PortGroup-prod-web")
    #[serde(default)]
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub vlan_id: u16,
    pub vswitch_name: String,
}

/// VLAN configuration of a distributed port group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum VlanSetting {
    /// Single access VLAN
    Access(u16),
    /// Trunked VLAN ranges (inclusive)
    Trunk(Vec<(u16, u16)>),
}

impl fmt::Display for VlanSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access(id) => write!(f, "{id}"),
            Self::Trunk(ranges) => {
                let parts: Vec<String> = ranges
                    .iter()
                    .map(|(start, end)| {
                        if start == end {
                            start.to_string()
                        } else {
                            format!("{start}-{end}")
                        }
                    })
                    .collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

/// A port group owned by a distributed switch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DistributedPortGroup {
    /// Fabric key (e.g. "dvportgroup-101")
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub switch_name: String,
    #[serde(default)]
    pub switch_uuid: String,
    /// Default port VLAN; not every listing carries it
    #[serde(default)]
    pub vlan: Option<VlanSetting>,
}

/// A distributed switch and the port groups it owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DistributedSwitch {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub port_groups: Vec<DistributedPortGroup>,
}

/// A standard network object visible to VMs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRef {
    pub id: String,
    pub name: String,
}

/// Handle to a virtual machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VmRef {
    /// Managed-object ID (e.g. "vm-42")
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cluster: String,
    /// ID of the host currently running the VM
    #[serde(default)]
    pub host: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Virtual devices
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection state flags of a virtual device.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectInfo {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub start_connected: bool,
    #[serde(default)]
    pub allow_guest_control: bool,
}

impl ConnectInfo {
    /// Connected now, on power-on, and toggleable by the guest.
    pub fn all_enabled() -> Self {
        Self {
            connected: true,
            start_connected: true,
            allow_guest_control: true,
        }
    }
}

/// What an Ethernet adapter is wired to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum NicBacking {
    /// Standard network backing, addressed by network name
    #[serde(rename_all = "camelCase")]
    Network {
        device_name: String,
        #[serde(default)]
        network: Option<String>,
    },
    /// Distributed port backing
    #[serde(rename_all = "camelCase")]
    DistributedPort {
        port_group_key: String,
        switch_uuid: String,
    },
}

impl NicBacking {
    pub fn is_distributed(&self) -> bool {
        matches!(self, Self::DistributedPort { .. })
    }
}

/// A virtual Ethernet adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EthernetCard {
    pub key: i32,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub adapter_type: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub wake_on_lan_enabled: bool,
    #[serde(default)]
    pub connectable: ConnectInfo,
    pub backing: NicBacking,
}

/// Any device in a VM's hardware list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum VirtualDevice {
    Ethernet(EthernetCard),
    #[serde(rename_all = "camelCase")]
    Other {
        key: i32,
        #[serde(default)]
        label: String,
    },
}

impl VirtualDevice {
    pub fn as_ethernet(&self) -> Option<&EthernetCard> {
        match self {
            Self::Ethernet(card) => Some(card),
            Self::Other { .. } => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Mutation specs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceOperation {
    Add,
    Edit,
    Remove,
}

/// One entry of a VM reconfiguration's device-change list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceChange {
    pub operation: DeviceOperation,
    pub device: EthernetCard,
}

/// VM reconfiguration request; submitted as a single task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VmConfigSpec {
    pub device_change: Vec<DeviceChange>,
}

/// Standard switch creation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualSwitchSpec {
    pub num_ports: u32,
    pub mtu: u32,
    /// Physical NICs bonded as uplinks
    pub bridge_nics: Vec<String>,
}

/// Layer-2 security policy of a host port group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    pub allow_promiscuous: bool,
    pub mac_changes: bool,
    pub forged_transmits: bool,
}

/// Host port group creation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostPortGroupSpec {
    pub name: String,
    pub vswitch_name: String,
    pub vlan_id: u16,
    pub num_ports: u32,
    pub mtu: u32,
    pub security: SecurityPolicy,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Opaque handle of an asynchronous fabric operation (e.g. "task-318").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TaskHandle(pub String);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Polled state of a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub state: TaskState,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Human-readable fault message when `state == Error`
    #[serde(default)]
    pub error: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Resolution / planning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolved network identity of one VM adapter. Every field holds either a
/// real value or [`NOT_AVAILABLE`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAttachment {
    pub display_name: String,
    pub vlan_id: String,
    pub vswitch_name: String,
    pub is_distributed: bool,
}

impl NetworkAttachment {
    /// Build an attachment, normalizing unset or empty fields to `"NA"`.
    pub fn new(
        display_name: Option<String>,
        vlan_id: Option<String>,
        vswitch_name: Option<String>,
        is_distributed: bool,
    ) -> Self {
        fn or_na(value: Option<String>) -> String {
            value
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        }
        Self {
            display_name: or_na(display_name),
            vlan_id: or_na(vlan_id),
            vswitch_name: or_na(vswitch_name),
            is_distributed,
        }
    }

    /// Whether the adapter sits on a host-local standard switch.
    pub fn on_standard_switch(&self) -> bool {
        self.vswitch_name.contains(STANDARD_SWITCH_MARKER)
    }

    /// Whether the adapter sits on the default network and must be left alone.
    pub fn on_default_network(&self) -> bool {
        self.display_name.contains(DEFAULT_NETWORK_MARKER)
    }

    pub fn logical_name(&self) -> Option<&str> {
        logical_segment(&self.display_name)
    }
}

/// One VM's network identity, as listed by the audit operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VmNetworkRecord {
    pub vm_name: String,
    pub cluster: String,
    pub host: String,
    pub attachment: NetworkAttachment,
}

/// A port group to create on every host's standard switch.
///
/// Equality and hashing look at `name` only: two specs with the same name and
/// different VLANs are the same entry, and the first one inserted wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortGroupSpec {
    pub name: String,
    pub vlan_id: String,
}

impl PartialEq for PortGroupSpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for PortGroupSpec {}

impl Hash for PortGroupSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

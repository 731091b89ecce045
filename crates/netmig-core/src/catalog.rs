//! Point-in-time index of host and distributed port groups.
//!
//! The catalog is built once per run, before any VM is resolved, so that
//! per-VM lookups never go back to the fabric for host port groups. It is
//! never updated afterwards; changes made on the fabric during the run are
//! not reflected until the next run.

use crate::error::NetmigResult;
use crate::fabric::Fabric;
use crate::types::*;

use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, info};

/// Flattened, name-keyed view of every distributed port group.
#[derive(Debug, Clone, Default)]
pub struct DistributedIndex {
    port_groups: IndexMap<String, DistributedPortGroup>,
}

impl DistributedIndex {
    /// Enumerate every distributed switch and every port group it owns.
    ///
    /// No VLAN join is done here; VLANs are read per adapter during
    /// resolution.
    pub async fn build(fabric: &dyn Fabric) -> NetmigResult<Self> {
        info!("Collecting distributed port groups");
        let mut port_groups = IndexMap::new();
        for dvs in fabric.list_distributed_switches().await? {
            debug!(switch = %dvs.name, count = dvs.port_groups.len(), "distributed switch");
            for mut pg in dvs.port_groups {
                if pg.switch_name.is_empty() {
                    pg.switch_name = dvs.name.clone();
                }
                if pg.switch_uuid.is_empty() {
                    pg.switch_uuid = dvs.uuid.clone();
                }
                port_groups.entry(pg.name.clone()).or_insert(pg);
            }
        }
        Ok(Self { port_groups })
    }

    pub fn len(&self) -> usize {
        self.port_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.port_groups.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DistributedPortGroup> {
        self.port_groups.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.port_groups.keys().map(String::as_str)
    }

    /// First port group whose logical segment equals `logical_name`.
    /// Names with fewer than three segments never match.
    pub fn find_by_logical_name(&self, logical_name: &str) -> Option<&DistributedPortGroup> {
        self.port_groups
            .values()
            .find(|pg| logical_segment(&pg.name) == Some(logical_name))
    }
}

/// Host port groups keyed by host ID, plus the distributed index.
#[derive(Debug, Clone, Default)]
pub struct NetworkCatalog {
    host_port_groups: HashMap<String, Vec<HostPortGroup>>,
    distributed: DistributedIndex,
}

impl NetworkCatalog {
    /// Copy every host's local port group list verbatim and index the
    /// distributed port groups.
    ///
    /// Cost is linear in hosts x port groups; this is the slow step on large
    /// clusters.
    pub async fn build(fabric: &dyn Fabric, hosts: &[HostRef]) -> NetmigResult<Self> {
        info!(hosts = hosts.len(), "Collecting port groups on all hosts. This may take a while.");
        let mut host_port_groups = HashMap::with_capacity(hosts.len());
        for host in hosts {
            let pgs = fabric.host_port_groups(host).await?;
            debug!(host = %host.name, count = pgs.len(), "host port groups");
            host_port_groups.insert(host.id.clone(), pgs);
        }
        let distributed = DistributedIndex::build(fabric).await?;
        info!(
            hosts = host_port_groups.len(),
            distributed = distributed.len(),
            "Port group collection complete"
        );
        Ok(Self {
            host_port_groups,
            distributed,
        })
    }

    /// Port groups of a host, in fabric order. `None` for unknown hosts.
    pub fn host_port_groups(&self, host_id: &str) -> Option<&[HostPortGroup]> {
        self.host_port_groups.get(host_id).map(Vec::as_slice)
    }

    /// First port group on `host_id` whose key contains `network_name`.
    ///
    /// Legacy keys embed the logical name inside a longer string, hence the
    /// substring match. An empty name matches nothing.
    pub fn find_host_port_group(&self, host_id: &str, network_name: &str) -> Option<&HostPortGroup> {
        if network_name.is_empty() {
            return None;
        }
        self.host_port_groups(host_id)?
            .iter()
            .find(|pg| pg.key.contains(network_name))
    }

    pub fn host_count(&self) -> usize {
        self.host_port_groups.len()
    }

    pub fn distributed(&self) -> &DistributedIndex {
        &self.distributed
    }
}

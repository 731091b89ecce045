//! Network identity resolution for VM adapters.

use crate::catalog::NetworkCatalog;
use crate::error::NetmigResult;
use crate::fabric::Fabric;
use crate::types::*;

use tracing::{debug, warn};

/// Resolves which port group, VLAN and switch a VM adapter is wired to.
pub struct IdentityResolver<'a> {
    fabric: &'a dyn Fabric,
    catalog: &'a NetworkCatalog,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(fabric: &'a dyn Fabric, catalog: &'a NetworkCatalog) -> Self {
        Self { fabric, catalog }
    }

    /// Resolve a VM's network attachment from its current device list.
    ///
    /// `Ok(None)` when the VM has no Ethernet adapter. Only the first
    /// adapter is considered.
    pub async fn resolve(&self, vm: &VmRef) -> NetmigResult<Option<NetworkAttachment>> {
        let devices = self.fabric.vm_devices(vm).await?;
        Ok(self.resolve_devices(vm, &devices).await)
    }

    /// Resolve from an already-fetched device list.
    pub async fn resolve_devices(
        &self,
        vm: &VmRef,
        devices: &[VirtualDevice],
    ) -> Option<NetworkAttachment> {
        let card = devices.iter().find_map(VirtualDevice::as_ethernet)?;
        Some(self.resolve_card(vm, card).await)
    }

    /// Resolve a single adapter. Never fails: anything that cannot be
    /// determined ends up as the `"NA"` sentinel or an error display name.
    pub async fn resolve_card(&self, vm: &VmRef, card: &EthernetCard) -> NetworkAttachment {
        match &card.backing {
            NicBacking::DistributedPort {
                port_group_key,
                switch_uuid,
            } => self.resolve_distributed(vm, port_group_key, switch_uuid).await,
            NicBacking::Network { device_name, .. } => self.resolve_standard(vm, device_name),
        }
    }

    async fn resolve_distributed(
        &self,
        vm: &VmRef,
        port_group_key: &str,
        switch_uuid: &str,
    ) -> NetworkAttachment {
        let dvs = match self.fabric.query_dvs_by_uuid(switch_uuid).await {
            Ok(Some(dvs)) => dvs,
            Ok(None) => {
                warn!(vm = %vm.name, switch_uuid, "distributed switch not found");
                return NetworkAttachment::new(Some(DVS_NOT_FOUND.into()), None, None, true);
            }
            Err(e) => {
                warn!(vm = %vm.name, switch_uuid, "distributed switch lookup failed: {}", e);
                return NetworkAttachment::new(Some(DVS_NOT_FOUND.into()), None, None, true);
            }
        };

        match self.fabric.lookup_dv_port_group(&dvs, port_group_key).await {
            Ok(Some(pg)) => NetworkAttachment::new(
                Some(pg.name),
                pg.vlan.map(|v| v.to_string()),
                Some(dvs.name),
                true,
            ),
            Ok(None) | Err(_) => {
                warn!(
                    vm = %vm.name,
                    switch = %dvs.name,
                    port_group_key,
                    "distributed port group not found"
                );
                NetworkAttachment::new(Some(PORT_GROUP_NOT_FOUND.into()), None, Some(dvs.name), true)
            }
        }
    }

    fn resolve_standard(&self, vm: &VmRef, network_name: &str) -> NetworkAttachment {
        if network_name.is_empty() {
            debug!(vm = %vm.name, "standard backing without a network name");
            return NetworkAttachment::new(None, None, None, false);
        }
        let local = vm
            .host
            .as_deref()
            .and_then(|host| self.catalog.find_host_port_group(host, network_name));
        if local.is_none() {
            debug!(vm = %vm.name, network = network_name, "no matching host port group");
        }
        NetworkAttachment::new(
            Some(network_name.to_string()),
            local.map(|pg| pg.vlan_id.to_string()),
            local.map(|pg| pg.vswitch_name.clone()),
            false,
        )
    }

    /// Audit record for a VM: its attachment plus where it runs.
    pub async fn record(&self, vm: &VmRef) -> NetmigResult<Option<VmNetworkRecord>> {
        let Some(attachment) = self.resolve(vm).await? else {
            return Ok(None);
        };
        let host = match vm.host.as_deref() {
            Some(id) => self
                .fabric
                .get_host(id)
                .await?
                .map(|h| h.name)
                .unwrap_or_else(|| id.to_string()),
            None => NOT_AVAILABLE.to_string(),
        };
        Ok(Some(VmNetworkRecord {
            vm_name: vm.name.clone(),
            cluster: vm.cluster.clone(),
            host,
            attachment,
        }))
    }
}

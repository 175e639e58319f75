use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const RESOURCES_API_VERSION: &str = "2021-04-01";
pub const NETWORK_API_VERSION: &str = "2023-09-01";
pub const COMPUTE_API_VERSION: &str = "2024-03-01";

/// Azure Resource Manager paths, rooted at a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    subscription_id: String,
    resource_group: String,
}

impl ResourceId {
    pub fn new(subscription_id: impl Into<String>, resource_group: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
        }
    }

    pub fn resource_group(&self) -> String {
        format!(
            "/subscriptions/{}/resourcegroups/{}",
            self.subscription_id, self.resource_group
        )
    }

    fn provider(&self, namespace: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}",
            self.subscription_id, self.resource_group, namespace
        )
    }

    pub fn virtual_network(&self, vnet: &str) -> String {
        format!("{}/virtualNetworks/{}", self.provider("Microsoft.Network"), vnet)
    }

    pub fn subnet(&self, vnet: &str, subnet: &str) -> String {
        format!("{}/subnets/{}", self.virtual_network(vnet), subnet)
    }

    pub fn public_ip(&self, name: &str) -> String {
        format!("{}/publicIPAddresses/{}", self.provider("Microsoft.Network"), name)
    }

    pub fn network_interface(&self, name: &str) -> String {
        format!("{}/networkInterfaces/{}", self.provider("Microsoft.Network"), name)
    }

    pub fn virtual_machine(&self, name: &str) -> String {
        format!("{}/virtualMachines/{}", self.provider("Microsoft.Compute"), name)
    }
}

/// Reference to another resource by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResource {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroupParams {
    pub location: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSpace {
    pub address_prefixes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkProperties {
    pub address_space: AddressSpace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualNetworkParams {
    pub location: String,
    pub properties: VirtualNetworkProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetProperties {
    pub address_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetParams {
    pub properties: SubnetProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sku {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpProperties {
    #[serde(rename = "publicIPAllocationMethod")]
    pub public_ip_allocation_method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicIpParams {
    pub location: String,
    pub sku: Sku,
    pub properties: PublicIpProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpConfigurationProperties {
    pub subnet: SubResource,
    #[serde(rename = "publicIPAddress")]
    pub public_ip_address: SubResource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpConfiguration {
    pub name: String,
    pub properties: IpConfigurationProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceProperties {
    pub ip_configurations: Vec<IpConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterfaceParams {
    pub location: String,
    pub properties: NetworkInterfaceProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshPublicKey {
    pub path: String,
    pub key_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConfiguration {
    pub public_keys: Vec<SshPublicKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinuxConfiguration {
    pub disable_password_authentication: bool,
    pub ssh: SshConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsProfile {
    pub computer_name: String,
    pub admin_username: String,
    pub linux_configuration: LinuxConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDiskParams {
    pub storage_account_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    pub name: String,
    pub caching: String,
    pub create_option: String,
    pub managed_disk: ManagedDiskParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    pub image_reference: ImageReference,
    pub os_disk: OsDisk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    pub vm_size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    pub network_interfaces: Vec<SubResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineProperties {
    pub hardware_profile: HardwareProfile,
    pub storage_profile: StorageProfile,
    pub os_profile: OsProfile,
    pub network_profile: NetworkProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineParams {
    pub location: String,
    pub properties: VirtualMachineProperties,
}

/// A resource as returned by ARM. Only the fields the provisioner reads are typed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArmResource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl ArmResource {
    pub fn provisioning_state(&self) -> Option<&str> {
        self.properties
            .get("provisioningState")
            .and_then(|v| v.as_str())
    }

    /// Assigned address of a public IP resource.
    pub fn ip_address(&self) -> Option<&str> {
        self.properties.get("ipAddress").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionReport {
    pub vm_name: String,
    pub admin_username: String,
    pub public_ip: Option<String>,
    pub resource_group_id: String,
    pub subnet_id: String,
    pub public_ip_id: String,
    pub network_interface_id: String,
    pub virtual_machine_id: String,
    pub step_timings: Vec<(String, Duration)>,
}

impl ProvisionReport {
    pub fn ssh_command(&self) -> Option<String> {
        self.public_ip
            .as_ref()
            .map(|ip| format!("ssh {}@{}", self.admin_username, ip))
    }
}

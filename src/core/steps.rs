use crate::config::Deployment;
use crate::domain::model::{
    AddressSpace, ArmResource, HardwareProfile, ImageReference, IpConfiguration,
    IpConfigurationProperties, LinuxConfiguration, ManagedDiskParams, NetworkInterfaceParams,
    NetworkInterfaceProperties, NetworkProfile, OsDisk, OsProfile, PublicIpParams,
    PublicIpProperties, ResourceGroupParams, ResourceId, Sku, SshConfiguration, SshPublicKey,
    StorageProfile, SubResource, SubnetParams, SubnetProperties, VirtualMachineParams,
    VirtualMachineProperties, VirtualNetworkParams, VirtualNetworkProperties,
    COMPUTE_API_VERSION, NETWORK_API_VERSION, RESOURCES_API_VERSION,
};
use crate::domain::ports::ResourceManager;
use crate::utils::error::Result;

pub fn resource_group_params(deployment: &Deployment) -> ResourceGroupParams {
    ResourceGroupParams {
        location: deployment.location.clone(),
        tags: deployment.tags.clone(),
    }
}

pub fn virtual_network_params(deployment: &Deployment) -> VirtualNetworkParams {
    VirtualNetworkParams {
        location: deployment.location.clone(),
        properties: VirtualNetworkProperties {
            address_space: AddressSpace {
                address_prefixes: deployment.network.address_prefixes.clone(),
            },
        },
    }
}

pub fn subnet_params(deployment: &Deployment) -> SubnetParams {
    SubnetParams {
        properties: SubnetProperties {
            address_prefix: deployment.network.subnet_prefix.clone(),
        },
    }
}

pub fn public_ip_params(deployment: &Deployment) -> PublicIpParams {
    PublicIpParams {
        location: deployment.location.clone(),
        sku: Sku {
            name: deployment.public_ip.sku.clone(),
        },
        properties: PublicIpProperties {
            public_ip_allocation_method: deployment.public_ip.allocation_method.clone(),
        },
    }
}

pub fn network_interface_params(
    deployment: &Deployment,
    subnet_id: &str,
    public_ip_id: &str,
) -> NetworkInterfaceParams {
    NetworkInterfaceParams {
        location: deployment.location.clone(),
        properties: NetworkInterfaceProperties {
            ip_configurations: vec![IpConfiguration {
                name: deployment.nic.ip_configuration_name.clone(),
                properties: IpConfigurationProperties {
                    subnet: SubResource {
                        id: subnet_id.to_string(),
                    },
                    public_ip_address: SubResource {
                        id: public_ip_id.to_string(),
                    },
                },
            }],
        },
    }
}

/// Linux profile with password login disabled and a single authorized key.
pub fn define_os_profile(deployment: &Deployment, ssh_public_key: &str) -> OsProfile {
    OsProfile {
        computer_name: deployment.vm.name.clone(),
        admin_username: deployment.vm.admin_username.clone(),
        linux_configuration: LinuxConfiguration {
            disable_password_authentication: true,
            ssh: SshConfiguration {
                public_keys: vec![SshPublicKey {
                    path: deployment.authorized_keys_path(),
                    key_data: ssh_public_key.trim().to_string(),
                }],
            },
        },
    }
}

pub fn virtual_machine_params(
    deployment: &Deployment,
    nic_id: &str,
    os_profile: OsProfile,
) -> VirtualMachineParams {
    let image = &deployment.vm.image;
    VirtualMachineParams {
        location: deployment.location.clone(),
        properties: VirtualMachineProperties {
            hardware_profile: HardwareProfile {
                vm_size: deployment.vm.size.clone(),
            },
            storage_profile: StorageProfile {
                image_reference: ImageReference {
                    publisher: image.publisher.clone(),
                    offer: image.offer.clone(),
                    sku: image.sku.clone(),
                    version: image.version.clone(),
                },
                os_disk: OsDisk {
                    name: deployment.os_disk_name(),
                    caching: deployment.vm.os_disk.caching.clone(),
                    create_option: "FromImage".to_string(),
                    managed_disk: ManagedDiskParams {
                        storage_account_type: deployment.vm.os_disk.storage_account_type.clone(),
                    },
                },
            },
            os_profile,
            network_profile: NetworkProfile {
                network_interfaces: vec![SubResource {
                    id: nic_id.to_string(),
                }],
            },
        },
    }
}

/// One create-or-update call per step, each awaited to completion.
pub struct Provisioner<R: ResourceManager> {
    manager: R,
    ids: ResourceId,
    deployment: Deployment,
}

impl<R: ResourceManager> Provisioner<R> {
    pub fn new(manager: R, subscription_id: &str, deployment: Deployment) -> Self {
        let ids = ResourceId::new(subscription_id, deployment.resource_group.clone());
        Self {
            manager,
            ids,
            deployment,
        }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn ids(&self) -> &ResourceId {
        &self.ids
    }

    pub async fn create_resource_group(&self) -> Result<ArmResource> {
        println!("Creating resource group...");
        let params = serde_json::to_value(resource_group_params(&self.deployment))?;
        let group = self
            .manager
            .put(&self.ids.resource_group(), RESOURCES_API_VERSION, params)
            .await?;

        println!("Resource group created: {}", group.name);
        Ok(group)
    }

    /// Virtual network first, then its subnet.
    pub async fn setup_network(&self) -> Result<(ArmResource, ArmResource)> {
        println!("Configuring virtual network and subnet...");
        let network = &self.deployment.network;

        let vnet = self
            .manager
            .put(
                &self.ids.virtual_network(&network.vnet_name),
                NETWORK_API_VERSION,
                serde_json::to_value(virtual_network_params(&self.deployment))?,
            )
            .await?;
        tracing::debug!("Virtual network ready: {}", vnet.id);

        let subnet = self
            .manager
            .put(
                &self.ids.subnet(&network.vnet_name, &network.subnet_name),
                NETWORK_API_VERSION,
                serde_json::to_value(subnet_params(&self.deployment))?,
            )
            .await?;
        tracing::debug!("Subnet ready: {}", subnet.id);

        Ok((vnet, subnet))
    }

    pub async fn create_public_ip(&self) -> Result<ArmResource> {
        println!("Creating public IP...");
        let ip = self
            .manager
            .put(
                &self.ids.public_ip(&self.deployment.public_ip.name),
                NETWORK_API_VERSION,
                serde_json::to_value(public_ip_params(&self.deployment))?,
            )
            .await?;
        tracing::debug!("Public IP ready: {} ({:?})", ip.id, ip.ip_address());
        Ok(ip)
    }

    pub async fn create_nic(&self, subnet: &ArmResource, public_ip: &ArmResource) -> Result<ArmResource> {
        println!("Creating network interface...");
        let params = network_interface_params(&self.deployment, &subnet.id, &public_ip.id);
        let nic = self
            .manager
            .put(
                &self.ids.network_interface(&self.deployment.nic.name),
                NETWORK_API_VERSION,
                serde_json::to_value(params)?,
            )
            .await?;
        tracing::debug!("Network interface ready: {}", nic.id);
        Ok(nic)
    }

    pub fn define_os_profile(&self, ssh_public_key: &str) -> OsProfile {
        println!("Configuring operating system profile...");
        define_os_profile(&self.deployment, ssh_public_key)
    }

    pub async fn create_vm(&self, nic: &ArmResource, os_profile: OsProfile) -> Result<ArmResource> {
        println!("Starting virtual machine creation...");
        let params = virtual_machine_params(&self.deployment, &nic.id, os_profile);
        self.manager
            .put(
                &self.ids.virtual_machine(&self.deployment.vm.name),
                COMPUTE_API_VERSION,
                serde_json::to_value(params)?,
            )
            .await
    }

    /// Re-reads the public IP, for allocations that only get an address once attached.
    pub async fn refresh_public_ip(&self) -> Result<ArmResource> {
        self.manager
            .get(
                &self.ids.public_ip(&self.deployment.public_ip.name),
                NETWORK_API_VERSION,
            )
            .await
    }

    pub async fn delete_resource_group(&self) -> Result<()> {
        println!("Deleting resource group {}...", self.deployment.resource_group);
        self.manager
            .delete(&self.ids.resource_group(), RESOURCES_API_VERSION)
            .await
    }
}

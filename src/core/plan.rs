use crate::config::ProvisionSettings;
use crate::core::steps::{
    define_os_profile, network_interface_params, public_ip_params, resource_group_params,
    subnet_params, virtual_machine_params, virtual_network_params,
};
use crate::domain::model::{
    ResourceId, COMPUTE_API_VERSION, NETWORK_API_VERSION, RESOURCES_API_VERSION,
};
use crate::utils::error::Result;
use serde::Serialize;

const SSH_KEY_PLACEHOLDER: &str = "<AZURE_SSH_KEY>";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedRequest {
    pub method: &'static str,
    pub path: String,
    pub api_version: &'static str,
    pub body: serde_json::Value,
}

impl PlannedRequest {
    fn put(path: String, api_version: &'static str, body: impl Serialize) -> Result<Self> {
        Ok(Self {
            method: "PUT",
            path,
            api_version,
            body: serde_json::to_value(body)?,
        })
    }
}

/// The requests `up` sends, in order. Ids of dependent resources are the
/// deterministic ARM paths Azure will assign.
pub fn render_plan(settings: &ProvisionSettings) -> Result<Vec<PlannedRequest>> {
    let deployment = &settings.deployment;
    let ids = ResourceId::new(&settings.subscription_id, &deployment.resource_group);
    let network = &deployment.network;
    let ssh_key = settings
        .ssh_public_key
        .as_deref()
        .unwrap_or(SSH_KEY_PLACEHOLDER);

    let subnet_id = ids.subnet(&network.vnet_name, &network.subnet_name);
    let public_ip_id = ids.public_ip(&deployment.public_ip.name);
    let nic_id = ids.network_interface(&deployment.nic.name);

    Ok(vec![
        PlannedRequest::put(
            ids.resource_group(),
            RESOURCES_API_VERSION,
            resource_group_params(deployment),
        )?,
        PlannedRequest::put(
            ids.virtual_network(&network.vnet_name),
            NETWORK_API_VERSION,
            virtual_network_params(deployment),
        )?,
        PlannedRequest::put(subnet_id.clone(), NETWORK_API_VERSION, subnet_params(deployment))?,
        PlannedRequest::put(
            public_ip_id.clone(),
            NETWORK_API_VERSION,
            public_ip_params(deployment),
        )?,
        PlannedRequest::put(
            nic_id.clone(),
            NETWORK_API_VERSION,
            network_interface_params(deployment, &subnet_id, &public_ip_id),
        )?,
        PlannedRequest::put(
            ids.virtual_machine(&deployment.vm.name),
            COMPUTE_API_VERSION,
            virtual_machine_params(deployment, &nic_id, define_os_profile(deployment, ssh_key)),
        )?,
    ])
}

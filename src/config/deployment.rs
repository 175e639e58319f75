use crate::utils::error::{ProvisionError, Result};
use crate::utils::validation::{
    parse_cidr, validate_max_length, validate_non_empty_string, validate_one_of,
    validate_subnet_within, Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Admin names Azure refuses for Linux VMs.
const RESERVED_ADMIN_USERNAMES: &[&str] = &[
    "administrator", "admin", "user", "user1", "test", "user2", "test1", "user3", "admin1",
    "1", "123", "a", "actuser", "adm", "admin2", "aspnet", "backup", "console", "david",
    "guest", "john", "owner", "root", "server", "sql", "support", "support_388945a0",
    "sys", "test2", "test3", "user4", "user5",
];

/// Everything that describes what gets created. Defaults reproduce the stock
/// single-VM layout; any subset can be overridden from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Deployment {
    pub resource_group: String,
    pub location: String,
    /// Sent as `environment`, not the misspelled `enviroment` key older
    /// deployments carry. Override in TOML to keep matching those.
    pub tags: BTreeMap<String, String>,
    pub network: NetworkSettings,
    pub public_ip: PublicIpSettings,
    pub nic: NicSettings,
    pub vm: VmSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSettings {
    pub vnet_name: String,
    pub address_prefixes: Vec<String>,
    pub subnet_name: String,
    pub subnet_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublicIpSettings {
    pub name: String,
    pub sku: String,
    pub allocation_method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NicSettings {
    pub name: String,
    pub ip_configuration_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmSettings {
    pub name: String,
    pub admin_username: String,
    pub size: String,
    pub image: ImageSettings,
    pub os_disk: OsDiskSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageSettings {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OsDiskSettings {
    /// Defaults to `<vm name>-osdisk`.
    pub name: Option<String>,
    pub caching: String,
    pub storage_account_type: String,
}

impl Default for Deployment {
    fn default() -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("environment".to_string(), "development".to_string());
        tags.insert("project".to_string(), "web_app".to_string());

        Self {
            resource_group: "VM-Azure-group".to_string(),
            location: "eastus".to_string(),
            tags,
            network: NetworkSettings::default(),
            public_ip: PublicIpSettings::default(),
            nic: NicSettings::default(),
            vm: VmSettings::default(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            vnet_name: "miVNet".to_string(),
            address_prefixes: vec!["10.0.0.0/16".to_string()],
            subnet_name: "miSubred".to_string(),
            subnet_prefix: "10.0.0.0/24".to_string(),
        }
    }
}

impl Default for PublicIpSettings {
    fn default() -> Self {
        Self {
            name: "miPublicIP".to_string(),
            sku: "Basic".to_string(),
            allocation_method: "Static".to_string(),
        }
    }
}

impl Default for NicSettings {
    fn default() -> Self {
        Self {
            name: "miNIC".to_string(),
            ip_configuration_name: "miIPconfig".to_string(),
        }
    }
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            name: "Vm-Azure".to_string(),
            admin_username: "StevenSant".to_string(),
            size: "Standard_B1s".to_string(),
            image: ImageSettings::default(),
            os_disk: OsDiskSettings::default(),
        }
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            publisher: "Canonical".to_string(),
            offer: "0001-com-ubuntu-server-jammy".to_string(),
            sku: "22_04-lts".to_string(),
            version: "latest".to_string(),
        }
    }
}

impl Default for OsDiskSettings {
    fn default() -> Self {
        Self {
            name: None,
            caching: "ReadWrite".to_string(),
            storage_account_type: "StandardSSD_LRS".to_string(),
        }
    }
}

impl Deployment {
    pub fn os_disk_name(&self) -> String {
        self.vm
            .os_disk
            .name
            .clone()
            .unwrap_or_else(|| format!("{}-osdisk", self.vm.name))
    }

    pub fn authorized_keys_path(&self) -> String {
        format!("/home/{}/.ssh/authorized_keys", self.vm.admin_username)
    }
}

impl Validate for Deployment {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("resource_group", &self.resource_group)?;
        validate_max_length("resource_group", &self.resource_group, 90)?;
        validate_non_empty_string("location", &self.location)?;

        validate_non_empty_string("network.vnet_name", &self.network.vnet_name)?;
        validate_non_empty_string("network.subnet_name", &self.network.subnet_name)?;
        if self.network.address_prefixes.is_empty() {
            return Err(ProvisionError::MissingConfigError {
                field: "network.address_prefixes".to_string(),
            });
        }
        for prefix in &self.network.address_prefixes {
            parse_cidr("network.address_prefixes", prefix)?;
        }
        validate_subnet_within(
            "network.subnet_prefix",
            &self.network.subnet_prefix,
            &self.network.address_prefixes,
        )?;

        validate_non_empty_string("public_ip.name", &self.public_ip.name)?;
        validate_one_of("public_ip.sku", &self.public_ip.sku, &["Basic", "Standard"])?;
        validate_one_of(
            "public_ip.allocation_method",
            &self.public_ip.allocation_method,
            &["Static", "Dynamic"],
        )?;
        if self.public_ip.sku == "Standard" && self.public_ip.allocation_method != "Static" {
            return Err(ProvisionError::InvalidConfigValueError {
                field: "public_ip.allocation_method".to_string(),
                value: self.public_ip.allocation_method.clone(),
                reason: "Standard SKU public IPs must use Static allocation".to_string(),
            });
        }

        validate_non_empty_string("nic.name", &self.nic.name)?;
        validate_non_empty_string("nic.ip_configuration_name", &self.nic.ip_configuration_name)?;

        validate_non_empty_string("vm.name", &self.vm.name)?;
        validate_max_length("vm.name", &self.vm.name, 64)?;
        validate_non_empty_string("vm.size", &self.vm.size)?;
        validate_non_empty_string("vm.admin_username", &self.vm.admin_username)?;
        validate_max_length("vm.admin_username", &self.vm.admin_username, 32)?;
        if RESERVED_ADMIN_USERNAMES.contains(&self.vm.admin_username.to_lowercase().as_str()) {
            return Err(ProvisionError::InvalidConfigValueError {
                field: "vm.admin_username".to_string(),
                value: self.vm.admin_username.clone(),
                reason: "Azure reserves this user name".to_string(),
            });
        }
        validate_one_of(
            "vm.os_disk.caching",
            &self.vm.os_disk.caching,
            &["None", "ReadOnly", "ReadWrite"],
        )?;

        Ok(())
    }
}

pub mod deployment;
pub mod toml_config;

pub use deployment::Deployment;

use crate::utils::error::{ProvisionError, Result};
use crate::utils::validation::{
    validate_guid, validate_range, validate_required_field, validate_ssh_public_key, validate_url,
    Validate,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

/// Stand-in subscription used by `plan` when none is configured.
pub const PLACEHOLDER_SUBSCRIPTION_ID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, Parser)]
#[command(name = "vm-provision")]
#[command(about = "Provision a Linux VM with its network on Azure")]
pub struct CliConfig {
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID", global = true)]
    pub subscription_id: Option<String>,

    #[arg(long, env = "AZURE_SSH_KEY", hide_env_values = true, global = true)]
    pub ssh_key: Option<String>,

    /// Read the SSH public key from a file instead of AZURE_SSH_KEY
    #[arg(long, global = true)]
    pub ssh_key_file: Option<PathBuf>,

    /// Deployment TOML overriding the default layout
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub resource_group: Option<String>,

    #[arg(long, global = true)]
    pub location: Option<String>,

    #[arg(long, global = true)]
    pub vm_name: Option<String>,

    #[arg(long, global = true)]
    pub admin_username: Option<String>,

    #[arg(long, env = "AZURE_ARM_ENDPOINT", default_value = DEFAULT_ARM_ENDPOINT, global = true)]
    pub arm_endpoint: String,

    #[arg(long, default_value = "5", global = true)]
    pub poll_interval_secs: u64,

    /// Give up waiting on a single operation after this many seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[arg(short, long, help = "Enable verbose output", global = true)]
    pub verbose: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[arg(long, help = "Log how long each step took", global = true)]
    pub timings: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Create the resource group, network, public IP, NIC and VM (default)
    Up,
    /// Print the requests `up` would send without calling Azure
    Plan,
    /// Delete the whole resource group
    Down {
        /// Required confirmation, the deletion cannot be undone
        #[arg(long)]
        yes: bool,
    },
}

/// Fully resolved inputs for one run.
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub subscription_id: String,
    pub ssh_public_key: Option<String>,
    pub deployment: Deployment,
    pub arm_endpoint: String,
    pub poll_interval: Duration,
    pub timeout: Option<Duration>,
}

impl CliConfig {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Up)
    }

    /// 合併預設值、TOML 檔案與命令列參數
    pub fn to_settings(&self) -> Result<ProvisionSettings> {
        let mut deployment = match &self.config {
            Some(path) => {
                tracing::info!("📁 Loading deployment from: {}", path.display());
                Deployment::from_file(path)?
            }
            None => Deployment::default(),
        };

        if let Some(resource_group) = &self.resource_group {
            deployment.resource_group = resource_group.clone();
        }
        if let Some(location) = &self.location {
            deployment.location = location.clone();
        }
        if let Some(vm_name) = &self.vm_name {
            deployment.vm.name = vm_name.clone();
        }
        if let Some(admin_username) = &self.admin_username {
            deployment.vm.admin_username = admin_username.clone();
        }

        let subscription_id = match (&self.subscription_id, self.command()) {
            (Some(id), _) => id.trim().to_string(),
            (None, Command::Plan) => PLACEHOLDER_SUBSCRIPTION_ID.to_string(),
            (None, _) => {
                return Err(ProvisionError::MissingConfigError {
                    field: "subscription_id (AZURE_SUBSCRIPTION_ID)".to_string(),
                })
            }
        };

        let ssh_public_key = match &self.ssh_key_file {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
                ProvisionError::config(format!("ssh_key_file {}: {}", path.display(), e))
            })?),
            None => self.ssh_key.clone(),
        }
        .map(|key| key.trim().to_string());

        Ok(ProvisionSettings {
            subscription_id,
            ssh_public_key,
            deployment,
            arm_endpoint: self.arm_endpoint.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            timeout: self.timeout_secs.map(Duration::from_secs),
        })
    }
}

impl ProvisionSettings {
    /// Settings for a run against `arm_endpoint` with the default layout.
    pub fn new(subscription_id: impl Into<String>, arm_endpoint: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            ssh_public_key: None,
            deployment: Deployment::default(),
            arm_endpoint: arm_endpoint.into(),
            poll_interval: Duration::from_secs(5),
            timeout: None,
        }
    }

    pub fn with_ssh_public_key(mut self, key: impl Into<String>) -> Self {
        self.ssh_public_key = Some(key.into().trim().to_string());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn require_ssh_public_key(&self) -> Result<&str> {
        validate_required_field("ssh_key (AZURE_SSH_KEY)", &self.ssh_public_key).map(String::as_str)
    }
}

impl Validate for ProvisionSettings {
    fn validate(&self) -> Result<()> {
        validate_guid("subscription_id", &self.subscription_id)?;
        validate_url("arm_endpoint", &self.arm_endpoint)?;
        if let Some(key) = &self.ssh_public_key {
            validate_ssh_public_key("ssh_key", key)?;
        }
        validate_range("poll_interval_secs", self.poll_interval.as_secs(), 1, 300)?;
        self.deployment.validate()
    }
}

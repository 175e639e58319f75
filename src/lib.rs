pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::arm::ArmClient;
pub use adapters::auth::default_credential;
pub use adapters::poller::PollSettings;
pub use config::{CliConfig, Command, Deployment, ProvisionSettings};
pub use core::{engine::ProvisionEngine, plan::render_plan, steps::Provisioner};
pub use domain::model::ProvisionReport;
pub use utils::error::{ProvisionError, Result};

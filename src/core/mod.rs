pub mod engine;
pub mod plan;
pub mod steps;

pub use crate::domain::model::{ArmResource, ProvisionReport};
pub use crate::domain::ports::{ResourceManager, TokenCredential};
pub use crate::utils::error::Result;

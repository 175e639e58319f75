// Adapters layer: concrete implementations for Azure (credentials, Resource Manager REST, operation polling).

pub mod arm;
pub mod auth;
pub mod poller;

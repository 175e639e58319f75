// Domain layer: ARM payload models and the ports the provisioner talks through.

pub mod model;
pub mod ports;

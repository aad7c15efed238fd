//! Application layer - Ports and the services that implement the use cases

pub mod ports;
pub mod services;

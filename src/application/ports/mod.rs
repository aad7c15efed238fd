//! Ports - Inbound error contract and outbound adapter traits

pub mod inbound;
pub mod outbound;

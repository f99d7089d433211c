//! Domain model: records, value objects and the ports adapters implement.

pub mod enrollment;
pub mod events;
pub mod gateway;
pub mod identity;
pub mod money;
pub mod ports;
pub mod transaction;

//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-crate data structures,
//! identifiers and errors. All business crates may depend on this crate;
//! this crate depends on nothing in the workspace.

mod error;
mod ids;
mod messages;

pub use error::WhiskerError;
pub use ids::{CapabilityName, ClientId, MapId, SensorId, VehicleId};
pub use messages::*;

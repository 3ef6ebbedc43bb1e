//! # Server Task Layer
//!
//! Owns the registry of Maps, Vehicles, Sensors and Capabilities behind a
//! single reader/writer lock, and implements every operation a transport
//! backend's message handlers call into.

mod registry;
mod resource_path;
mod tasks;

pub use resource_path::ResourcePath;
pub use tasks::ServerTasks;

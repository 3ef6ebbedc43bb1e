//! # Concurrency
//!
//! Small, dependency-light concurrency primitives shared by the transport,
//! message log and server crates: a triple-slot overwriting handoff buffer,
//! a single-worker task queue, and a passive sensor clock estimator. None
//! of these know anything about the wire protocol or the server registry.

mod overwriting_buffer;
mod task_queue;
mod time_sync;

pub use overwriting_buffer::OverwritingBuffer;
pub use task_queue::TaskQueue;
pub use time_sync::SensorTimeSync;

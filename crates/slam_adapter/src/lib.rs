//! # SLAM Adapter
//!
//! Single-threaded facade over a SLAM engine. Every operation is enqueued
//! onto its own [`concurrency::TaskQueue`], so calls into the underlying
//! engine never run concurrently with each other even when many callers
//! hold a cloned [`SlamAdapterHandle`].
//!
//! No real SLAM engine is linked into this workspace (its internals are an
//! external collaborator, out of scope here). [`GridEngine`] is a small
//! deterministic occupancy-grid accumulator that implements [`SlamEngine`]
//! well enough to exercise every operation end to end; a real binding
//! would implement the same trait.

mod engine;
mod grid_engine;
mod handle;
mod texture;

pub use engine::SlamEngine;
pub use grid_engine::GridEngine;
pub use handle::SlamAdapterHandle;

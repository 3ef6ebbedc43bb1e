//! # Message Log
//!
//! Compressed, length-prefixed append-only log. Writers queue their work
//! on an internally owned `concurrency::TaskQueue` so callers never block
//! on disk or compression; readers are synchronous and mutually exclusive
//! with any concurrent write to the same handle.

mod error;
mod reader;
mod writer;

pub use error::MessageLogError;
pub use reader::MessageLogReader;
pub use writer::MessageLogWriter;

/// Default 8-byte little-endian magic header: ASCII "wsklog01".
pub const DEFAULT_MAGIC_HEADER: u64 = u64::from_le_bytes(*b"wsklog01");

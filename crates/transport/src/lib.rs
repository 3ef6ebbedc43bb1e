//! # Transport
//!
//! Message Transport component: the `ClientConnection` / `ServerConnection`
//! contract shared by every backend, the wire codec, and two concrete
//! backends — a length-delimited TCP routing broker and an embedded
//! websocket server.

pub mod broker;
pub mod codec;
pub mod error;
pub mod mock;
pub mod traits;
pub mod ws;

pub use codec::{decode_frame, encode_frame};
pub use error::TransportError;
pub use traits::{
    ClientConnection, ClientEventHandlers, ConnectionStateHandler, ServerConnection,
    ServerEventHandlers,
};

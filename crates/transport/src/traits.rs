//! The contract every transport backend implements.

use std::collections::HashMap;

use async_trait::async_trait;
use contracts::{ClientId, WireMessage};

use crate::error::TransportError;

pub type ConnectionStateHandler = Box<dyn Fn(ClientId, bool) + Send + Sync>;
type RawHandler = Box<dyn Fn(ClientId, &[u8]) + Send + Sync>;

/// Handlers a server-side backend dispatches incoming frames to, keyed by
/// the message's ASCII type tag.
#[derive(Default)]
pub struct ClientEventHandlers {
    handlers: HashMap<&'static str, RawHandler>,
    pub connection_state_handler: Option<ConnectionStateHandler>,
}

impl ClientEventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a typed handler for `M`. Payloads that fail to
    /// deserialize are logged and dropped rather than panicking a
    /// connection's read loop.
    pub fn on_message<M, F>(mut self, handler: F) -> Self
    where
        M: WireMessage + 'static,
        F: Fn(ClientId, M) + Send + Sync + 'static,
    {
        self.handlers.insert(
            M::TYPE_NAME,
            Box::new(move |client_id, payload| match serde_json::from_slice::<M>(payload) {
                Ok(message) => handler(client_id, message),
                Err(error) => {
                    tracing::warn!(%error, type_name = M::TYPE_NAME, "dropping malformed message");
                }
            }),
        );
        self
    }

    pub fn with_connection_state_handler(
        mut self,
        handler: impl Fn(ClientId, bool) + Send + Sync + 'static,
    ) -> Self {
        self.connection_state_handler = Some(Box::new(handler));
        self
    }

    pub fn dispatch(&self, client_id: ClientId, type_name: &str, payload: &[u8]) {
        if let Some(handler) = self.handlers.get(type_name) {
            handler(client_id, payload);
        } else {
            tracing::debug!(type_name, "no handler registered for message type");
        }
    }

    pub fn notify_connection_state(&self, client_id: ClientId, connected: bool) {
        if let Some(handler) = &self.connection_state_handler {
            handler(client_id, connected);
        }
    }
}

pub type DisconnectHandler = Box<dyn Fn() + Send + Sync>;

/// Handlers a client-side backend dispatches incoming frames to.
#[derive(Default)]
pub struct ServerEventHandlers {
    handlers: HashMap<&'static str, Box<dyn Fn(&[u8]) + Send + Sync>>,
    pub disconnect_handler: Option<DisconnectHandler>,
}

impl ServerEventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message<M, F>(mut self, handler: F) -> Self
    where
        M: WireMessage + 'static,
        F: Fn(M) + Send + Sync + 'static,
    {
        self.handlers.insert(
            M::TYPE_NAME,
            Box::new(move |payload| match serde_json::from_slice::<M>(payload) {
                Ok(message) => handler(message),
                Err(error) => {
                    tracing::warn!(%error, type_name = M::TYPE_NAME, "dropping malformed message");
                }
            }),
        );
        self
    }

    pub fn with_disconnect_handler(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.disconnect_handler = Some(Box::new(handler));
        self
    }

    pub fn dispatch(&self, type_name: &str, payload: &[u8]) {
        if let Some(handler) = self.handlers.get(type_name) {
            handler(payload);
        } else {
            tracing::debug!(type_name, "no handler registered for message type");
        }
    }
}

/// Server side of a transport backend: addresses many connected clients.
#[async_trait]
pub trait ClientConnection: Send + Sync {
    async fn send(&self, recipient: &ClientId, frame: Vec<u8>) -> Result<(), TransportError>;
    async fn broadcast(&self, frame: Vec<u8>) -> Result<(), TransportError>;
    async fn connected_client_ids(&self) -> Vec<ClientId>;
    async fn stop(&self);
}

/// Client side of a transport backend: talks to exactly one server.
#[async_trait]
pub trait ServerConnection: Send + Sync {
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError>;
    async fn stop(&self);
}

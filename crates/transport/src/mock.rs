//! An in-memory `ClientConnection`/`ServerConnection` pair wired directly
//! together, for exercising handler registration and dispatch without
//! opening a real socket.

use std::sync::Arc;

use async_trait::async_trait;
use contracts::ClientId;
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::traits::{ClientConnection, ClientEventHandlers, ServerConnection, ServerEventHandlers};

/// Server side of an in-memory pair: routes frames straight to the paired
/// [`MockServerConnection`]'s handlers.
pub struct MockClientConnection {
    handlers: ClientEventHandlers,
    peer: Mutex<Option<Arc<ServerEventHandlers>>>,
    sent: Mutex<Vec<(Option<ClientId>, Vec<u8>)>>,
}

impl MockClientConnection {
    pub fn new(handlers: ClientEventHandlers) -> Arc<Self> {
        Arc::new(Self {
            handlers,
            peer: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub async fn connect(self: &Arc<Self>, client_id: ClientId) -> Arc<MockServerConnection> {
        self.handlers.notify_connection_state(client_id.clone(), true);
        Arc::new(MockServerConnection {
            client_id,
            server: self.clone(),
        })
    }

    /// Frames recorded by `send`/`broadcast`, most recent last.
    pub async fn sent_frames(&self) -> Vec<(Option<ClientId>, Vec<u8>)> {
        self.sent.lock().await.clone()
    }

    async fn deliver_from_client(&self, client_id: ClientId, frame: &[u8]) {
        if let Ok((type_name, payload)) = crate::codec::decode_frame(frame) {
            self.handlers.dispatch(client_id, type_name, payload);
        }
    }
}

#[async_trait]
impl ClientConnection for MockClientConnection {
    async fn send(&self, recipient: &ClientId, frame: Vec<u8>) -> Result<(), TransportError> {
        self.sent.lock().await.push((Some(recipient.clone()), frame));
        Ok(())
    }

    async fn broadcast(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.sent.lock().await.push((None, frame));
        Ok(())
    }

    async fn connected_client_ids(&self) -> Vec<ClientId> {
        Vec::new()
    }

    async fn stop(&self) {}
}

/// Client side of an in-memory pair.
pub struct MockServerConnection {
    client_id: ClientId,
    server: Arc<MockClientConnection>,
}

#[async_trait]
impl ServerConnection for MockServerConnection {
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.server.deliver_from_client(self.client_id.clone(), &frame).await;
        Ok(())
    }

    async fn stop(&self) {}
}

/// Builds a `ServerEventHandlers` paired with nothing in particular — kept
/// for symmetry with the real backends' constructors, so tests can assert
/// on an empty handler set if needed.
pub fn empty_server_handlers() -> ServerEventHandlers {
    ServerEventHandlers::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::RequestObservationMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn dispatches_registered_message_type() {
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();
        let handlers = ClientEventHandlers::new()
            .on_message::<RequestObservationMessage, _>(move |_client, _msg| {
                received_clone.fetch_add(1, Ordering::SeqCst);
            });

        let server = MockClientConnection::new(handlers);
        let client = server.connect("sensor-1".into()).await;

        let frame = crate::codec::encode_frame(&RequestObservationMessage).unwrap();
        client.send(frame).await.unwrap();

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_and_broadcast_are_recorded() {
        let server = MockClientConnection::new(ClientEventHandlers::new());
        server
            .send(&"a".into(), b"hi".to_vec())
            .await
            .unwrap();
        server.broadcast(b"all".to_vec()).await.unwrap();

        let frames = server.sent_frames().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].0, Some("a".into()));
        assert_eq!(frames[1].0, None);
    }
}

//! Routing-broker backend: a length-delimited TCP server that routes
//! frames to and from many clients identified by a self-assigned id.
//!
//! The reference implementation used a ZeroMQ ROUTER socket for this; none
//! of this workspace's dependency corpus carries a ZeroMQ binding, so the
//! same router semantics (route-by-id, last-writer-wins on reconnect) are
//! rebuilt on plain framed TCP instead of fabricating that dependency.
//!
//! Wire shape, one extra field ahead of the shared [`crate::codec`] frame:
//! `client_id || '\0' || type_name || '\0' || payload`. The first frame a
//! socket ever sends carries only `client_id` and registers it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use contracts::ClientId;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::AbortHandle;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, instrument, warn};

use crate::error::TransportError;
use crate::traits::{ClientConnection, ClientEventHandlers};

struct ConnectedClient {
    outbox: mpsc::UnboundedSender<Bytes>,
    tasks: AbortHandle,
}

/// Routing-broker [`ClientConnection`] backend.
pub struct RoutingBroker {
    clients: Arc<RwLock<HashMap<ClientId, ConnectedClient>>>,
    handlers: Arc<ClientEventHandlers>,
    accept_task: AbortHandle,
}

impl RoutingBroker {
    #[instrument(skip(handlers), fields(%bind_address))]
    pub async fn bind(
        bind_address: SocketAddr,
        handlers: ClientEventHandlers,
    ) -> Result<Arc<Self>, TransportError> {
        let listener = TcpListener::bind(bind_address).await?;
        let clients = Arc::new(RwLock::new(HashMap::new()));
        let handlers = Arc::new(handlers);

        let accept_clients = clients.clone();
        let accept_handlers = handlers.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, peer)) => {
                        let clients = accept_clients.clone();
                        let handlers = accept_handlers.clone();
                        tokio::spawn(handle_connection(socket, peer, clients, handlers));
                    }
                    Err(error) => {
                        warn!(%error, "routing broker accept failed");
                    }
                }
            }
        })
        .abort_handle();

        Ok(Arc::new(Self {
            clients,
            handlers,
            accept_task,
        }))
    }
}

async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    clients: Arc<RwLock<HashMap<ClientId, ConnectedClient>>>,
    handlers: Arc<ClientEventHandlers>,
) {
    let framed = Framed::new(socket, LengthDelimitedCodec::new());
    let (mut sink, mut stream) = framed.split();

    let client_id: ClientId = match stream.next().await {
        Some(Ok(first)) => String::from_utf8_lossy(&first).into_owned().into(),
        _ => {
            debug!(%peer, "connection closed before sending a client id");
            return;
        }
    };

    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<Bytes>();
    let write_task = tokio::spawn(async move {
        while let Some(frame) = outbox_rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    {
        let mut guard = clients.write().await;
        if let Some(old) = guard.insert(
            client_id.clone(),
            ConnectedClient {
                outbox: outbox_tx,
                tasks: write_task.abort_handle(),
            },
        ) {
            old.tasks.abort();
        }
    }
    info!(%client_id, %peer, "client connected");
    handlers.notify_connection_state(client_id.clone(), true);

    while let Some(Ok(frame)) = stream.next().await {
        match crate::codec::decode_frame(&frame) {
            Ok((type_name, payload)) => handlers.dispatch(client_id.clone(), type_name, payload),
            Err(error) => warn!(%client_id, %error, "dropping malformed frame"),
        }
    }

    let mut guard = clients.write().await;
    if let Some(entry) = guard.get(&client_id) {
        if entry.tasks.is_finished() {
            guard.remove(&client_id);
        }
    }
    drop(guard);
    info!(%client_id, "client disconnected");
    handlers.notify_connection_state(client_id, false);
}

#[async_trait]
impl ClientConnection for RoutingBroker {
    async fn send(&self, recipient: &ClientId, frame: Vec<u8>) -> Result<(), TransportError> {
        let guard = self.clients.read().await;
        let client = guard
            .get(recipient)
            .ok_or_else(|| TransportError::UnknownClient(recipient.to_string()))?;
        client
            .outbox
            .send(Bytes::from(frame))
            .map_err(|_| TransportError::Backend {
                backend: "routing-broker".into(),
                message: format!("client '{recipient}' outbox closed"),
            })
    }

    async fn broadcast(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        let payload = Bytes::from(frame);
        let guard = self.clients.read().await;
        for client in guard.values() {
            let _ = client.outbox.send(payload.clone());
        }
        Ok(())
    }

    async fn connected_client_ids(&self) -> Vec<ClientId> {
        self.clients.read().await.keys().cloned().collect()
    }

    async fn stop(&self) {
        self.accept_task.abort();
        let mut guard = self.clients.write().await;
        for client in guard.values() {
            client.tasks.abort();
        }
        guard.clear();
    }
}

//! Embedded-websocket backend: an axum server exposing `/ws`, carrying the
//! same `client_id || '\0' || type_name || '\0' || payload` framing as the
//! routing broker, inside binary websocket frames.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use contracts::ClientId;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::TransportError;
use crate::traits::{ClientConnection, ClientEventHandlers};

struct ConnectedClient {
    outbox: mpsc::UnboundedSender<Bytes>,
    task: AbortHandle,
}

struct SharedState {
    clients: RwLock<HashMap<ClientId, ConnectedClient>>,
    handlers: ClientEventHandlers,
}

/// Embedded-websocket [`ClientConnection`] backend.
pub struct WebsocketBackend {
    state: Arc<SharedState>,
    server_task: AbortHandle,
}

impl WebsocketBackend {
    /// `root_path`: serve static files from this directory, or pass `None`
    /// to disable file serving (matches the reference implementation's
    /// empty-string-disables convention).
    #[instrument(skip(handlers), fields(bind_port))]
    pub async fn bind(
        bind_port: u16,
        root_path: Option<String>,
        handlers: ClientEventHandlers,
    ) -> Result<Arc<Self>, TransportError> {
        let state = Arc::new(SharedState {
            clients: RwLock::new(HashMap::new()),
            handlers,
        });

        let mut router = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(state.clone());

        if let Some(root) = root_path {
            #[cfg(feature = "static-files")]
            {
                router = router.fallback_service(tower_http::services::ServeDir::new(root));
            }
            #[cfg(not(feature = "static-files"))]
            {
                let _ = root;
            }
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], bind_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        let server_task = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, router).await {
                warn!(%error, "websocket server exited");
            }
        })
        .abort_handle();

        Ok(Arc::new(Self { state, server_task }))
    }
}

async fn ws_handler(State(state): State<Arc<SharedState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<SharedState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let client_id: ClientId = match ws_rx.next().await {
        Some(Ok(Message::Binary(first))) => {
            String::from_utf8_lossy(&first).into_owned().into()
        }
        _ => {
            debug!("websocket closed before sending a client id");
            return;
        }
    };

    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<Bytes>();
    let write_task = tokio::spawn(async move {
        while let Some(frame) = outbox_rx.recv().await {
            if ws_tx.send(Message::Binary(frame.to_vec().into())).await.is_err() {
                break;
            }
        }
    });

    {
        let mut guard = state.clients.write().await;
        if let Some(old) = guard.insert(
            client_id.clone(),
            ConnectedClient {
                outbox: outbox_tx,
                task: write_task.abort_handle(),
            },
        ) {
            old.task.abort();
        }
    }
    info!(%client_id, "websocket client connected");
    state.handlers.notify_connection_state(client_id.clone(), true);

    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Binary(frame) => match crate::codec::decode_frame(&frame) {
                Ok((type_name, payload)) => {
                    state.handlers.dispatch(client_id.clone(), type_name, payload)
                }
                Err(error) => warn!(%client_id, %error, "dropping malformed frame"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    let mut guard = state.clients.write().await;
    if let Some(entry) = guard.get(&client_id) {
        if entry.task.is_finished() {
            guard.remove(&client_id);
        }
    }
    drop(guard);
    info!(%client_id, "websocket client disconnected");
    state.handlers.notify_connection_state(client_id, false);
}

#[async_trait]
impl ClientConnection for WebsocketBackend {
    async fn send(&self, recipient: &ClientId, frame: Vec<u8>) -> Result<(), TransportError> {
        let guard = self.state.clients.read().await;
        let client = guard
            .get(recipient)
            .ok_or_else(|| TransportError::UnknownClient(recipient.to_string()))?;
        client
            .outbox
            .send(Bytes::from(frame))
            .map_err(|_| TransportError::Backend {
                backend: "websocket".into(),
                message: format!("client '{recipient}' outbox closed"),
            })
    }

    async fn broadcast(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        let payload = Bytes::from(frame);
        let guard = self.state.clients.read().await;
        for client in guard.values() {
            let _ = client.outbox.send(payload.clone());
        }
        Ok(())
    }

    async fn connected_client_ids(&self) -> Vec<ClientId> {
        self.state.clients.read().await.keys().cloned().collect()
    }

    async fn stop(&self) {
        self.server_task.abort();
        let mut guard = self.state.clients.write().await;
        for client in guard.values() {
            client.task.abort();
        }
        guard.clear();
    }
}

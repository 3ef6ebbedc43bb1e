//! Wires the configured transport backend(s) to [`server::ServerTasks`],
//! registering every message handler named in the reference server's
//! client and console services.
//!
//! The reference implementation split client traffic (sensors, actuators)
//! and console traffic (map/vehicle administration) across two separate
//! connections with two handler sets. `WhiskerConfig` models a single
//! transport section, so both message families are registered on every
//! backend this process binds.

use std::sync::Arc;

use config_loader::WhiskerConfig;
use contracts::{
    CapabilityClientInitMessage, ClientId, InvokeCapabilityMessage, ObservationMessage,
    RequestAssignVehicleMessage, RequestCreateMapMessage, RequestDeleteMapMessage,
    RequestDeleteVehicleMessage, RequestLoadMapMessage, RequestMapDataMessage,
    RequestObservationMessage, RequestResourceFilesMessage, RequestSaveMapMessage,
    RequestStartObservationLogMessage, RequestStopObservationLogMessage,
    RequestSubmapTexturesMessage, RequestVehiclePosesMessage, ResourceFilesMessage, SensorClientInitMessage,
    SensorId,
};
use server::ServerTasks;
use tokio::runtime::Handle;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use transport::broker::RoutingBroker;
use transport::codec::encode_frame;
use transport::traits::{ClientConnection, ClientEventHandlers};
use transport::ws::WebsocketBackend;

use crate::error::CliError;

/// Every transport backend this process bound. A completed console
/// operation broadcasts the refreshed server state to all of them; a
/// sensor or console client's direct replies are sent to whichever one
/// actually recognizes its client id.
pub struct Backends(Vec<Arc<dyn ClientConnection>>);

impl Backends {
    async fn broadcast_state(&self, tasks: &ServerTasks) {
        let state = tasks.get_server_state().await;
        self.broadcast(&state).await;
    }

    async fn broadcast<M: contracts::WireMessage>(&self, message: &M) {
        let frame = match encode_frame(message) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, type_name = M::TYPE_NAME, "failed to encode broadcast message");
                return;
            }
        };
        for backend in &self.0 {
            if let Err(error) = backend.broadcast(frame.clone()).await {
                warn!(%error, "failed to broadcast message");
            }
        }
    }

    async fn send_to<M: contracts::WireMessage>(&self, client_id: &ClientId, message: &M) {
        let frame = match encode_frame(message) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, type_name = M::TYPE_NAME, "failed to encode message");
                return;
            }
        };
        for backend in &self.0 {
            match backend.send(client_id, frame.clone()).await {
                Ok(()) | Err(transport::error::TransportError::UnknownClient(_)) => {}
                Err(error) => warn!(%error, %client_id, "failed to send message"),
            }
        }
    }

    pub async fn stop(&self) {
        for backend in &self.0 {
            backend.stop().await;
        }
    }
}

/// Registers every handler, binds the configured backend(s), and returns
/// the running [`Backends`] handle alongside the shared [`ServerTasks`].
pub async fn build(config: &WhiskerConfig) -> Result<(Arc<ServerTasks>, Backends), CliError> {
    let tasks = Arc::new(ServerTasks::new(config.resource_dir.clone()));
    let backends_cell: Arc<OnceCell<Backends>> = Arc::new(OnceCell::new());

    let mut bound: Vec<Arc<dyn ClientConnection>> = Vec::new();

    if let Some(routing) = &config.transport.routing_broker {
        let addr = routing.bind_address.parse().map_err(|error| {
            CliError::Other(anyhow::anyhow!("invalid routing_broker.bind_address: {error}"))
        })?;
        let broker = RoutingBroker::bind(addr, build_handlers(tasks.clone(), backends_cell.clone()))
            .await
            .map_err(anyhow::Error::from)?;
        info!(%addr, "routing broker listening");
        bound.push(broker as Arc<dyn ClientConnection>);
    }

    if let Some(ws) = &config.transport.websocket {
        let backend = WebsocketBackend::bind(
            ws.port,
            ws.static_root.clone(),
            build_handlers(tasks.clone(), backends_cell.clone()),
        )
        .await
        .map_err(anyhow::Error::from)?;
        info!(port = ws.port, "websocket backend listening");
        bound.push(backend as Arc<dyn ClientConnection>);
    }

    if bound.is_empty() {
        return Err(CliError::NoTransportBackend);
    }

    backends_cell
        .set(Backends(bound.clone()))
        .map_err(|_| CliError::Other(anyhow::anyhow!("server backends initialized twice")))?;

    Ok((tasks, Backends(bound)))
}

fn build_handlers(tasks: Arc<ServerTasks>, backends: Arc<OnceCell<Backends>>) -> ClientEventHandlers {
    ClientEventHandlers::new()
        .with_connection_state_handler({
            let tasks = tasks.clone();
            let backends = backends.clone();
            move |client_id, connected| {
                if !connected {
                    return;
                }
                let tasks = tasks.clone();
                let backends = backends.clone();
                Handle::current().spawn(async move {
                    if let Some(backends) = backends.get() {
                        let state = tasks.get_server_state().await;
                        backends.send_to(&client_id, &state).await;
                    }
                });
            }
        })
        .on_message::<SensorClientInitMessage, _>({
            let tasks = tasks.clone();
            let backends = backends.clone();
            move |client_id, init| {
                if init.vehicle_id.is_empty() || init.keep_out_radius <= 0.0 {
                    warn!(%client_id, "sensor client init requires a vehicle_id and positive keep_out_radius");
                    return;
                }
                info!(%client_id, vehicle_id = %init.vehicle_id, "sensor client initialized");
                let sensor_id = SensorId::from(client_id.to_string());
                let tasks = tasks.clone();
                let backends = backends.clone();
                let request_client_id = client_id.clone();
                let backends_for_broadcast = backends.clone();
                let request_observation: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
                    let backends = backends.clone();
                    let client_id = request_client_id.clone();
                    Handle::current().spawn(async move {
                        if let Some(backends) = backends.get() {
                            backends.send_to(&client_id, &RequestObservationMessage).await;
                        }
                    });
                });
                Handle::current().spawn(async move {
                    tasks.add_sensor_client(sensor_id, init, request_observation).await;
                    if let Some(backends) = backends_for_broadcast.get() {
                        backends.broadcast_state(&tasks).await;
                    }
                });
            }
        })
        .on_message::<CapabilityClientInitMessage, _>({
            let tasks = tasks.clone();
            let backends = backends.clone();
            move |client_id, init| {
                if init.vehicle_id.is_empty() {
                    warn!(%client_id, "capability client init requires a vehicle_id");
                    return;
                }
                info!(%client_id, vehicle_id = %init.vehicle_id, "capability client initialized");
                let tasks = tasks.clone();
                let backends_for_invoke = backends.clone();
                let invoke_client_id = client_id.clone();
                let invoke: Arc<dyn Fn(serde_json::Value) + Send + Sync> = Arc::new(move |payload| {
                    let backends = backends_for_invoke.clone();
                    let client_id = invoke_client_id.clone();
                    Handle::current().spawn(async move {
                        if let Some(backends) = backends.get() {
                            backends.send_to(&client_id, &InvokeCapabilityReply { payload }).await;
                        }
                    });
                });
                let backends_for_broadcast = backends.clone();
                Handle::current().spawn(async move {
                    tasks.add_capability_client(client_id, init, invoke).await;
                    if let Some(backends) = backends_for_broadcast.get() {
                        backends.broadcast_state(&tasks).await;
                    }
                });
            }
        })
        .on_message::<ObservationMessage, _>({
            let tasks = tasks.clone();
            move |client_id, observation| {
                let sensor_id = SensorId::from(client_id.to_string());
                let tasks = tasks.clone();
                Handle::current().spawn(async move {
                    tasks.submit_observation(sensor_id, observation).await;
                });
            }
        })
        .on_message::<RequestResourceFilesMessage, _>({
            let tasks = tasks.clone();
            let backends = backends.clone();
            move |client_id, _| {
                let backends = backends.clone();
                let handle = Handle::current();
                tasks.get_resource_files(move |files| {
                    let backends = backends.clone();
                    let client_id = client_id.clone();
                    handle.spawn(async move {
                        if let Some(backends) = backends.get() {
                            backends.send_to(&client_id, &ResourceFilesMessage { files }).await;
                        }
                    });
                });
            }
        })
        .on_message::<RequestMapDataMessage, _>({
            let tasks = tasks.clone();
            let backends = backends.clone();
            move |client_id, request| {
                let tasks = tasks.clone();
                let backends = backends.clone();
                Handle::current().spawn(async move {
                    let handle = Handle::current();
                    let backends_cb = backends.clone();
                    let client_id_cb = client_id.clone();
                    tasks
                        .get_map_data(&request.map_id, request.have_version, move |data| {
                            let Some(data) = data else { return };
                            let backends_cb = backends_cb.clone();
                            let client_id_cb = client_id_cb.clone();
                            handle.spawn(async move {
                                if let Some(backends) = backends_cb.get() {
                                    backends.send_to(&client_id_cb, &data).await;
                                }
                            });
                        })
                        .await;
                });
            }
        })
        .on_message::<RequestSubmapTexturesMessage, _>({
            let tasks = tasks.clone();
            let backends = backends.clone();
            move |client_id, request| {
                let tasks = tasks.clone();
                let backends = backends.clone();
                Handle::current().spawn(async move {
                    let handle = Handle::current();
                    let backends_cb = backends.clone();
                    let client_id_cb = client_id.clone();
                    tasks
                        .get_submap_textures(&request.map_id, request.submap_ids, move |texture| {
                            let Some(texture) = texture else { return };
                            let backends_cb = backends_cb.clone();
                            let client_id_cb = client_id_cb.clone();
                            handle.spawn(async move {
                                if let Some(backends) = backends_cb.get() {
                                    backends.send_to(&client_id_cb, &texture).await;
                                }
                            });
                        })
                        .await;
                });
            }
        })
        .on_message::<RequestVehiclePosesMessage, _>({
            let tasks = tasks.clone();
            let backends = backends.clone();
            move |client_id, request| {
                let tasks = tasks.clone();
                let backends = backends.clone();
                Handle::current().spawn(async move {
                    let handle = Handle::current();
                    let backends_cb = backends.clone();
                    let client_id_cb = client_id.clone();
                    tasks
                        .get_vehicle_poses(&request.map_id, move |poses| {
                            let poses = poses.unwrap_or_default();
                            let backends_cb = backends_cb.clone();
                            let client_id_cb = client_id_cb.clone();
                            handle.spawn(async move {
                                if let Some(backends) = backends_cb.get() {
                                    backends.send_to(&client_id_cb, &poses).await;
                                }
                            });
                        })
                        .await;
                });
            }
        })
        .on_message::<InvokeCapabilityMessage, _>({
            let tasks = tasks.clone();
            move |_client_id, request| {
                let tasks = tasks.clone();
                Handle::current().spawn(async move {
                    tasks
                        .invoke_capability(&request.vehicle_id, &request.capability, request.payload)
                        .await;
                });
            }
        })
        .on_message::<RequestCreateMapMessage, _>({
            let tasks = tasks.clone();
            let backends = backends.clone();
            move |client_id, request| {
                info!(%client_id, map_id = %request.map_id, "create map requested");
                broadcast_after(&tasks, &backends, move |tasks| {
                    let tasks = tasks.clone();
                    Box::pin(async move { tasks.create_map(request.map_id).await })
                });
            }
        })
        .on_message::<RequestDeleteMapMessage, _>({
            let tasks = tasks.clone();
            let backends = backends.clone();
            move |client_id, request| {
                info!(%client_id, map_id = %request.map_id, "delete map requested");
                broadcast_after(&tasks, &backends, move |tasks| {
                    let tasks = tasks.clone();
                    Box::pin(async move { tasks.delete_map(&request.map_id).await })
                });
            }
        })
        .on_message::<RequestSaveMapMessage, _>({
            let tasks = tasks.clone();
            move |client_id, request| {
                info!(%client_id, map_id = %request.map_id, "save map requested");
                let tasks = tasks.clone();
                Handle::current().spawn(async move { tasks.save_map(&request.map_id).await });
            }
        })
        .on_message::<RequestLoadMapMessage, _>({
            let tasks = tasks.clone();
            let backends = backends.clone();
            move |client_id, request| {
                info!(%client_id, map_id = %request.map_id, file_name = %request.file_name, "load map requested");
                broadcast_after(&tasks, &backends, move |tasks| {
                    let tasks = tasks.clone();
                    Box::pin(async move {
                        tasks
                            .load_map(request.map_id, &request.file_name, request.is_frozen)
                            .await
                    })
                });
            }
        })
        .on_message::<RequestAssignVehicleMessage, _>({
            let tasks = tasks.clone();
            let backends = backends.clone();
            move |client_id, request| {
                info!(%client_id, vehicle_id = %request.vehicle_id, map_id = %request.map_id, "assign vehicle requested");
                broadcast_after(&tasks, &backends, move |tasks| {
                    let tasks = tasks.clone();
                    Box::pin(async move {
                        tasks
                            .assign_vehicle_to_map(
                                &request.vehicle_id,
                                &request.map_id,
                                request.initial_pose,
                                request.allow_global_localization,
                                request.use_localization_trimmer,
                            )
                            .await
                    })
                });
            }
        })
        .on_message::<RequestDeleteVehicleMessage, _>({
            let tasks = tasks.clone();
            let backends = backends.clone();
            move |client_id, request| {
                info!(%client_id, vehicle_id = %request.vehicle_id, "delete vehicle requested");
                broadcast_after(&tasks, &backends, move |tasks| {
                    let tasks = tasks.clone();
                    Box::pin(async move { tasks.delete_vehicle(&request.vehicle_id).await })
                });
            }
        })
        .on_message::<RequestStartObservationLogMessage, _>({
            let tasks = tasks.clone();
            move |client_id, request| {
                info!(%client_id, vehicle_id = %request.vehicle_id, "start observation log requested");
                let tasks = tasks.clone();
                Handle::current().spawn(async move { tasks.start_observation_log(&request.vehicle_id).await });
            }
        })
        .on_message::<RequestStopObservationLogMessage, _>({
            let tasks = tasks.clone();
            move |client_id, request| {
                info!(%client_id, vehicle_id = %request.vehicle_id, "stop observation log requested");
                let tasks = tasks.clone();
                Handle::current().spawn(async move { tasks.stop_observation_log(&request.vehicle_id).await });
            }
        })
}

/// Runs a mutating console operation against `tasks`, then broadcasts the
/// refreshed server state to every backend, matching the reference
/// `BroadcastConsoleMessage(GetServerState())` pattern.
fn broadcast_after<F>(tasks: &Arc<ServerTasks>, backends: &Arc<OnceCell<Backends>>, op: F)
where
    F: FnOnce(&Arc<ServerTasks>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        + Send
        + 'static,
{
    let tasks = tasks.clone();
    let backends = backends.clone();
    Handle::current().spawn(async move {
        op(&tasks).await;
        if let Some(backends) = backends.get() {
            backends.broadcast_state(&tasks).await;
        }
    });
}

/// The reference invocation functor forwards the whole
/// `InvokeCapabilityMessage` to the capability client; this wraps just the
/// payload, since `CapabilityInvoker` (in `server::registry`) only carries
/// that far.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct InvokeCapabilityReply {
    payload: serde_json::Value,
}
impl contracts::WireMessage for InvokeCapabilityReply {
    const TYPE_NAME: &'static str = "InvokeCapabilityReply";
}

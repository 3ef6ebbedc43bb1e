//! `ServerTasks`: registry of Maps, Vehicles, Sensors and Capabilities,
//! and every operation that mutates or queries it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use concurrency::TaskQueue;
use contracts::{
    CapabilityName, ClientId, MapDataMessage, MapId, ObservationMessage, Pose,
    SensorClientInitMessage, SensorId, SensorIdAndType, ServerStateMessage, SubmapTextureMessage,
    VehicleId, VehiclePosesMessage, VehicleSummary,
};
use slam_adapter::{GridEngine, SlamAdapterHandle};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::registry::{CapabilityInvoker, Map, RequestObservationFn, Sensor, Vehicle};
use crate::resource_path::ResourcePath;

const SAVED_MAP_EXTENSION: &str = "pbstream";
const OBSERVATION_LOG_EXTENSION: &str = "obslog";

struct Registry {
    maps: HashMap<MapId, Arc<Map>>,
    vehicles: HashMap<VehicleId, Arc<Vehicle>>,
    sensors: HashMap<SensorId, Arc<Sensor>>,
}

pub struct ServerTasks {
    registry: RwLock<Registry>,
    resource_path: ResourcePath,
    low_priority_queue: TaskQueue,
}

impl ServerTasks {
    pub fn new(resource_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry: RwLock::new(Registry {
                maps: HashMap::new(),
                vehicles: HashMap::new(),
                sensors: HashMap::new(),
            }),
            resource_path: ResourcePath::new(resource_dir),
            low_priority_queue: TaskQueue::new(),
        }
    }

    // ---- sensor and capability client registration ----

    #[instrument(skip(self, init, request_observation), fields(%sensor_id))]
    pub async fn add_sensor_client(
        &self,
        sensor_id: SensorId,
        init: SensorClientInitMessage,
        request_observation: RequestObservationFn,
    ) {
        let mut registry = self.registry.write().await;
        let vehicle_id = init.vehicle_id.clone();
        let vehicle = add_vehicle(&mut registry.vehicles, vehicle_id);

        let sensor = registry
            .sensors
            .entry(sensor_id.clone())
            .or_insert_with(|| {
                let mut radius = vehicle.keep_out_radius.lock().unwrap();
                *radius = radius.max(init.keep_out_radius);
                drop(radius);

                let sensor = Arc::new(Sensor {
                    sensor_id: sensor_id.clone(),
                    data: Arc::new(init),
                    request_observation,
                    observation_log: std::sync::Mutex::new(None),
                    pending_observation: std::sync::atomic::AtomicBool::new(false),
                    vehicle: vehicle.clone(),
                });
                vehicle.sensors.lock().unwrap().push(Arc::downgrade(&sensor));
                sensor
            })
            .clone();

        let has_map = sensor.vehicle.map.lock().unwrap().is_some();
        if has_map {
            info!(%sensor_id, "vehicle already has a map, resuming observations");
            request_observation_for(&sensor, true);
        }
    }

    #[instrument(skip(self, init, invoke), fields(%client_id))]
    pub async fn add_capability_client(
        &self,
        client_id: ClientId,
        init: contracts::CapabilityClientInitMessage,
        invoke: CapabilityInvoker,
    ) {
        let mut registry = self.registry.write().await;
        let vehicle = add_vehicle(&mut registry.vehicles, init.vehicle_id);
        let mut capabilities = vehicle.capabilities.lock().unwrap();
        for capability in init.capabilities {
            capabilities
                .entry(capability)
                .or_default()
                .entry(client_id.clone())
                .or_insert_with(|| invoke.clone());
        }
    }

    // ---- observation flow ----

    #[instrument(skip(self, observation), fields(%sensor_id))]
    pub async fn submit_observation(&self, sensor_id: SensorId, observation: ObservationMessage) {
        let registry = self.registry.read().await;
        let Some(sensor) = registry.sensors.get(&sensor_id).cloned() else {
            warn!(%sensor_id, "observation from unregistered sensor");
            return;
        };
        sensor.pending_observation.store(false, Ordering::Release);

        let map = sensor.vehicle.map.lock().unwrap().clone();
        if let Some(map) = map {
            let observation = Arc::new(observation);
            map.engine.submit_observation(
                sensor_id.clone(),
                sensor.vehicle.vehicle_id.clone(),
                sensor.data.clone(),
                observation.clone(),
            );
            if let Some(log) = sensor.observation_log.lock().unwrap().clone() {
                log.write((*observation).clone());
            }
            request_observation_for(&sensor, false);
        }
    }

    // ---- state and resource queries ----

    pub async fn get_server_state(&self) -> ServerStateMessage {
        let registry = self.registry.read().await;
        let maps = registry.maps.keys().cloned().collect();
        let vehicles = registry
            .vehicles
            .values()
            .map(|vehicle| VehicleSummary {
                vehicle_id: vehicle.vehicle_id.clone(),
                map_id: vehicle.map.lock().unwrap().as_ref().map(|m| m.map_id.clone()),
                keep_out_radius: *vehicle.keep_out_radius.lock().unwrap(),
                capabilities: vehicle.capabilities.lock().unwrap().keys().cloned().collect(),
            })
            .collect();
        ServerStateMessage { maps, vehicles }
    }

    pub fn get_resource_files(&self, callback: impl FnOnce(Vec<String>) + Send + 'static) {
        let root = self.resource_path.root().to_path_buf();
        self.low_priority_queue.add(move || {
            let files = std::fs::read_dir(&root)
                .into_iter()
                .flatten()
                .filter_map(|entry| entry.ok())
                .filter(|entry| {
                    entry
                        .path()
                        .extension()
                        .is_some_and(|ext| ext == SAVED_MAP_EXTENSION)
                })
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect();
            callback(files);
        });
    }

    pub async fn get_map_data(
        &self,
        map_id: &MapId,
        have_version: u32,
        callback: impl FnOnce(Option<MapDataMessage>) + Send + 'static,
    ) {
        let registry = self.registry.read().await;
        match registry.maps.get(map_id).cloned() {
            Some(map) => map.engine.get_map_data(have_version, move |data| callback(Some(data))),
            None => callback(None),
        }
    }

    pub async fn get_submap_textures(
        &self,
        map_id: &MapId,
        submap_ids: Vec<(i32, i32)>,
        callback: impl Fn(Option<SubmapTextureMessage>) + Send + Sync + 'static,
    ) {
        let registry = self.registry.read().await;
        let Some(map) = registry.maps.get(map_id).cloned() else {
            for _ in &submap_ids {
                callback(None);
            }
            return;
        };
        let callback = Arc::new(callback);
        for (trajectory_id, index) in submap_ids {
            let callback = callback.clone();
            map.engine
                .get_submap_texture(trajectory_id, index, move |texture| callback(texture));
        }
    }

    pub async fn get_vehicle_poses(
        &self,
        map_id: &MapId,
        callback: impl FnOnce(Option<VehiclePosesMessage>) + Send + 'static,
    ) {
        let registry = self.registry.read().await;
        match registry.maps.get(map_id).cloned() {
            Some(map) => map.engine.get_vehicle_poses(move |poses| callback(Some(poses))),
            None => callback(None),
        }
    }

    // ---- capability invocation ----

    pub async fn invoke_capability(
        &self,
        vehicle_id: &VehicleId,
        capability: &CapabilityName,
        payload: serde_json::Value,
    ) {
        let registry = self.registry.read().await;
        let Some(vehicle) = registry.vehicles.get(vehicle_id) else {
            return;
        };
        let capabilities = vehicle.capabilities.lock().unwrap();
        let Some(clients) = capabilities.get(capability) else {
            return;
        };
        for invoker in clients.values() {
            invoker(payload.clone());
        }
    }

    // ---- map lifecycle ----

    #[instrument(skip(self))]
    pub async fn create_map(&self, map_id: MapId) {
        let mut registry = self.registry.write().await;
        if map_id.is_empty() || registry.maps.contains_key(&map_id) {
            warn!(%map_id, "map already exists or id is empty, ignoring create_map");
            return;
        }
        let engine = SlamAdapterHandle::new(map_id.clone(), GridEngine::new());
        registry.maps.insert(
            map_id.clone(),
            Arc::new(Map {
                map_id,
                engine,
            }),
        );
    }

    #[instrument(skip(self))]
    pub async fn delete_map(&self, map_id: &MapId) {
        let mut registry = self.registry.write().await;
        let Some(map) = registry.maps.remove(map_id) else {
            return;
        };
        detach_vehicles_from_map(&mut registry.vehicles, map_id);
        self.low_priority_queue.add(move || drop(map));
    }

    #[instrument(skip(self))]
    pub async fn save_map(&self, map_id: &MapId) {
        let file_name = format!("{map_id}-{}.{SAVED_MAP_EXTENSION}", now_millis());
        let mut registry = self.registry.write().await;
        let Some(map) = registry.maps.get(map_id).cloned() else {
            return;
        };
        let Some(path) = self.resource_path.resolve(&file_name) else {
            return;
        };
        detach_vehicles_from_map(&mut registry.vehicles, map_id);
        drop(registry);
        map.engine.save_state(path, |result| {
            if let Err(error) = result {
                warn!(%error, "failed to save map state");
            }
        });
    }

    #[instrument(skip(self))]
    pub async fn load_map(&self, map_id: MapId, file_name: &str, is_frozen: bool) {
        let valid_extension = std::path::Path::new(file_name)
            .extension()
            .is_some_and(|ext| ext == SAVED_MAP_EXTENSION);
        if !valid_extension {
            warn!(file_name, "load_map rejected: wrong extension");
            return;
        }
        let Some(path) = self.resource_path.resolve(file_name) else {
            return;
        };
        if !path.is_file() {
            warn!(file_name, "load_map rejected: file does not exist");
            return;
        }

        let mut registry = self.registry.write().await;
        if registry.maps.contains_key(&map_id) {
            warn!(%map_id, "map id already exists, not overwriting with loaded state");
            return;
        }
        let engine = SlamAdapterHandle::new(map_id.clone(), GridEngine::new());
        registry.maps.insert(
            map_id.clone(),
            Arc::new(Map {
                map_id,
                engine: engine.clone(),
            }),
        );
        drop(registry);
        engine.load_state(path, is_frozen, |result| {
            if let Err(error) = result {
                warn!(%error, "failed to load map state");
            }
        });
    }

    // ---- vehicle lifecycle ----

    #[instrument(skip(self))]
    pub async fn delete_vehicle(&self, vehicle_id: &VehicleId) {
        let mut registry = self.registry.write().await;
        let Some(vehicle) = registry.vehicles.remove(vehicle_id) else {
            return;
        };
        let sensor_ids: Vec<SensorId> = vehicle
            .sensors
            .lock()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|s| s.sensor_id.clone())
            .collect();
        for sensor_id in sensor_ids {
            if let Some(sensor) = registry.sensors.remove(&sensor_id) {
                self.low_priority_queue.add(move || drop(sensor));
            }
        }
        let map = vehicle.map.lock().unwrap().clone();
        if let Some(map) = map {
            map.engine.remove_vehicle(vehicle_id.clone());
        }
    }

    #[instrument(skip(self, initial_pose))]
    pub async fn assign_vehicle_to_map(
        &self,
        vehicle_id: &VehicleId,
        map_id: &MapId,
        initial_pose: Pose,
        allow_global_localization: bool,
        use_localization_trimmer: bool,
    ) {
        let registry = self.registry.read().await;
        let Some(vehicle) = registry.vehicles.get(vehicle_id).cloned() else {
            return;
        };
        let already_assigned = vehicle
            .map
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|m| &m.map_id == map_id);
        if already_assigned {
            return;
        }

        let old_map = vehicle.map.lock().unwrap().clone();
        if let Some(old_map) = old_map {
            old_map.engine.remove_vehicle(vehicle_id.clone());
        }

        let target_map = registry.maps.get(map_id).cloned();
        drop(registry);

        let sensors: Vec<Arc<Sensor>> = vehicle
            .sensors
            .lock()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        match target_map {
            Some(map) if !sensors.is_empty() => {
                let mut sensor_ids = Vec::with_capacity(sensors.len());
                for sensor in &sensors {
                    request_observation_for(sensor, false);
                    let entry: SensorIdAndType = (sensor.sensor_id.clone(), sensor.data.sensor_type);
                    sensor_ids.push(entry);
                }
                map.engine.add_vehicle(
                    vehicle_id.clone(),
                    sensor_ids,
                    initial_pose,
                    allow_global_localization,
                    use_localization_trimmer,
                );
                *vehicle.map.lock().unwrap() = Some(map);
            }
            _ => {
                if sensors.is_empty() {
                    warn!(%vehicle_id, "assign_vehicle_to_map: vehicle has no sensors");
                }
                *vehicle.map.lock().unwrap() = None;
            }
        }
    }

    // ---- observation logging ----

    #[instrument(skip(self))]
    pub async fn start_observation_log(&self, vehicle_id: &VehicleId) {
        let suffix = format!("-{}.{OBSERVATION_LOG_EXTENSION}", now_millis());
        let registry = self.registry.read().await;
        let Some(vehicle) = registry.vehicles.get(vehicle_id).cloned() else {
            return;
        };
        let sensors: Vec<Arc<Sensor>> = vehicle
            .sensors
            .lock()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        drop(registry);

        for sensor in sensors {
            let already_active = sensor.observation_log.lock().unwrap().is_some();
            if already_active {
                continue;
            }
            let Some(path) = self.resource_path.resolve(&format!("{}{suffix}", sensor.sensor_id))
            else {
                continue;
            };
            match message_log::MessageLogWriter::create(&path) {
                Ok(writer) => {
                    writer.write((*sensor.data).clone());
                    *sensor.observation_log.lock().unwrap() = Some(Arc::new(writer));
                }
                Err(error) => warn!(%error, "failed to start observation log"),
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn stop_observation_log(&self, vehicle_id: &VehicleId) {
        let registry = self.registry.read().await;
        let Some(vehicle) = registry.vehicles.get(vehicle_id).cloned() else {
            return;
        };
        let sensors: Vec<Arc<Sensor>> = vehicle
            .sensors
            .lock()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        drop(registry);

        for sensor in sensors {
            if let Some(log) = sensor.observation_log.lock().unwrap().take() {
                self.low_priority_queue.add(move || drop(log));
            }
        }
    }

    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.resource_path.resolve(name)
    }
}

fn add_vehicle(vehicles: &mut HashMap<VehicleId, Arc<Vehicle>>, vehicle_id: VehicleId) -> Arc<Vehicle> {
    vehicles
        .entry(vehicle_id.clone())
        .or_insert_with(|| Arc::new(Vehicle::new(vehicle_id)))
        .clone()
}

fn detach_vehicles_from_map(vehicles: &mut HashMap<VehicleId, Arc<Vehicle>>, map_id: &MapId) {
    for vehicle in vehicles.values() {
        let mut current = vehicle.map.lock().unwrap();
        if current.as_ref().is_some_and(|m| &m.map_id == map_id) {
            *current = None;
        }
    }
}

fn request_observation_for(sensor: &Sensor, force: bool) {
    let already_pending = sensor.pending_observation.swap(true, Ordering::AcqRel);
    if !already_pending || force {
        (sensor.request_observation)();
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ImuSample, ObservationPayload, SensorType, Vector3};
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    fn zero_pose() -> Pose {
        Pose {
            position: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
            orientation: (0.0, 0.0, 0.0, 1.0),
        }
    }

    fn counting_request_fn(counter: Arc<AtomicUsize>) -> RequestObservationFn {
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn imu_init(vehicle_id: VehicleId, keep_out_radius: f32) -> SensorClientInitMessage {
        SensorClientInitMessage {
            vehicle_id,
            keep_out_radius,
            sensor_type: SensorType::Imu,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            seconds_per_measurement: 0.0,
        }
    }

    #[tokio::test]
    async fn create_map_rejects_empty_and_duplicate_ids() {
        let dir = tempdir().unwrap();
        let tasks = ServerTasks::new(dir.path());

        tasks.create_map(MapId::from("")).await;
        assert!(tasks.get_server_state().await.maps.is_empty());

        let garage: MapId = "garage".into();
        tasks.create_map(garage.clone()).await;
        tasks.create_map(garage).await;
        assert_eq!(tasks.get_server_state().await.maps.len(), 1);
    }

    #[tokio::test]
    async fn add_sensor_client_is_insert_if_absent() {
        let dir = tempdir().unwrap();
        let tasks = ServerTasks::new(dir.path());
        let counter = Arc::new(AtomicUsize::new(0));
        let vehicle_id: VehicleId = "rover-1".into();
        let sensor_id: SensorId = "imu-1".into();

        tasks
            .add_sensor_client(sensor_id.clone(), imu_init(vehicle_id.clone(), 0.5), counting_request_fn(counter.clone()))
            .await;
        tasks
            .add_sensor_client(sensor_id, imu_init(vehicle_id.clone(), 9.0), counting_request_fn(counter))
            .await;

        let state = tasks.get_server_state().await;
        let vehicle = state.vehicles.iter().find(|v| v.vehicle_id == vehicle_id).unwrap();
        assert_eq!(vehicle.keep_out_radius, 0.5);
    }

    #[tokio::test]
    async fn assigning_vehicle_requests_one_observation_per_sensor() {
        let dir = tempdir().unwrap();
        let tasks = ServerTasks::new(dir.path());
        let counter = Arc::new(AtomicUsize::new(0));
        let vehicle_id: VehicleId = "rover-1".into();
        let map_id: MapId = "garage".into();

        tasks.create_map(map_id.clone()).await;
        tasks
            .add_sensor_client("imu-1".into(), imu_init(vehicle_id.clone(), 0.0), counting_request_fn(counter.clone()))
            .await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tasks
            .assign_vehicle_to_map(&vehicle_id, &map_id, zero_pose(), false, false)
            .await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Re-assigning to the same map is a no-op; no extra request is sent.
        tasks
            .assign_vehicle_to_map(&vehicle_id, &map_id, zero_pose(), false, false)
            .await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submitting_observation_requests_the_next_one() {
        let dir = tempdir().unwrap();
        let tasks = ServerTasks::new(dir.path());
        let counter = Arc::new(AtomicUsize::new(0));
        let vehicle_id: VehicleId = "rover-1".into();
        let map_id: MapId = "garage".into();
        let sensor_id: SensorId = "imu-1".into();

        tasks.create_map(map_id.clone()).await;
        tasks
            .add_sensor_client(sensor_id.clone(), imu_init(vehicle_id.clone(), 0.0), counting_request_fn(counter.clone()))
            .await;
        tasks
            .assign_vehicle_to_map(&vehicle_id, &map_id, zero_pose(), false, false)
            .await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tasks
            .submit_observation(
                sensor_id,
                ObservationMessage {
                    sensor_time_ns: 0,
                    payload: ObservationPayload::Imu(ImuSample {
                        accelerometer: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
                        gyroscope: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
                    }),
                },
            )
            .await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn save_map_detaches_vehicles_without_reattaching() {
        let dir = tempdir().unwrap();
        let tasks = ServerTasks::new(dir.path());
        let counter = Arc::new(AtomicUsize::new(0));
        let vehicle_id: VehicleId = "rover-1".into();
        let map_id: MapId = "garage".into();

        tasks.create_map(map_id.clone()).await;
        tasks
            .add_sensor_client("imu-1".into(), imu_init(vehicle_id.clone(), 0.0), counting_request_fn(counter))
            .await;
        tasks
            .assign_vehicle_to_map(&vehicle_id, &map_id, zero_pose(), false, false)
            .await;

        tasks.save_map(&map_id).await;

        let state = tasks.get_server_state().await;
        let vehicle = state.vehicles.iter().find(|v| v.vehicle_id == vehicle_id).unwrap();
        assert!(vehicle.map_id.is_none());
    }

    #[tokio::test]
    async fn load_map_rejects_nonexistent_file() {
        let dir = tempdir().unwrap();
        let tasks = ServerTasks::new(dir.path());

        tasks.load_map("garage".into(), "missing.pbstream", false).await;
        assert!(tasks.get_server_state().await.maps.is_empty());
    }

    #[tokio::test]
    async fn mapless_observation_is_dropped_without_re_request() {
        let dir = tempdir().unwrap();
        let tasks = ServerTasks::new(dir.path());
        let counter = Arc::new(AtomicUsize::new(0));
        let vehicle_id: VehicleId = "rover-1".into();
        let sensor_id: SensorId = "imu-1".into();

        tasks
            .add_sensor_client(sensor_id.clone(), imu_init(vehicle_id, 0.0), counting_request_fn(counter.clone()))
            .await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tasks
            .submit_observation(
                sensor_id,
                ObservationMessage {
                    sensor_time_ns: 0,
                    payload: ObservationPayload::Imu(ImuSample {
                        accelerometer: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
                        gyroscope: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
                    }),
                },
            )
            .await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn delete_vehicle_removes_its_sensors() {
        let dir = tempdir().unwrap();
        let tasks = ServerTasks::new(dir.path());
        let counter = Arc::new(AtomicUsize::new(0));
        let vehicle_id: VehicleId = "rover-1".into();

        tasks
            .add_sensor_client("imu-1".into(), imu_init(vehicle_id.clone(), 0.0), counting_request_fn(counter))
            .await;
        tasks.delete_vehicle(&vehicle_id).await;

        let state = tasks.get_server_state().await;
        assert!(state.vehicles.is_empty());
    }
}

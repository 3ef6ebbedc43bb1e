//! Cheap-clone handle onto a single-threaded SLAM engine instance.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use concurrency::TaskQueue;
use contracts::{
    MapDataMessage, MapId, ObservationMessage, Pose, SensorClientInitMessage, SensorId,
    SensorIdAndType, SubmapTextureMessage, VehicleId, VehiclePosesMessage, WhiskerError,
};
use tracing::instrument;

use crate::engine::SlamEngine;

struct Inner {
    engine: Mutex<Box<dyn SlamEngine>>,
    queue: TaskQueue,
    map_version: AtomicU32,
    cached_map_data: Mutex<Option<MapDataMessage>>,
    map_id: MapId,
}

/// One handle per map; every operation below is enqueued onto the map's
/// own worker thread, so engine calls for the same map never overlap.
#[derive(Clone)]
pub struct SlamAdapterHandle {
    inner: Arc<Inner>,
}

impl SlamAdapterHandle {
    pub fn new(map_id: MapId, engine: impl SlamEngine + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine: Mutex::new(Box::new(engine)),
                queue: TaskQueue::new(),
                map_version: AtomicU32::new(1),
                cached_map_data: Mutex::new(None),
                map_id,
            }),
        }
    }

    #[instrument(skip(self, sensors), fields(map_id = %self.inner.map_id, %vehicle_id))]
    pub fn add_vehicle(
        &self,
        vehicle_id: VehicleId,
        sensors: Vec<SensorIdAndType>,
        initial_pose: Pose,
        allow_global_localization: bool,
        use_localization_trimmer: bool,
    ) {
        let inner = self.inner.clone();
        self.enqueue(move || {
            inner.engine.lock().unwrap().add_vehicle(
                vehicle_id,
                sensors,
                initial_pose,
                allow_global_localization,
                use_localization_trimmer,
            );
        });
    }

    pub fn remove_vehicle(&self, vehicle_id: VehicleId) {
        let inner = self.inner.clone();
        self.enqueue(move || {
            inner.engine.lock().unwrap().remove_vehicle(&vehicle_id);
        });
    }

    pub fn submit_observation(
        &self,
        sensor_id: SensorId,
        vehicle_id: VehicleId,
        sensor_init: Arc<SensorClientInitMessage>,
        observation: Arc<ObservationMessage>,
    ) {
        let inner = self.inner.clone();
        self.enqueue(move || {
            let changed = inner
                .engine
                .lock()
                .unwrap()
                .submit_observation(&sensor_id, &vehicle_id, &sensor_init, &observation);
            if changed {
                inner.map_version.fetch_add(1, Ordering::AcqRel);
                *inner.cached_map_data.lock().unwrap() = None;
            }
        });
    }

    pub fn get_map_data(&self, have_version: u32, callback: impl FnOnce(MapDataMessage) + Send + 'static) {
        let inner = self.inner.clone();
        self.enqueue(move || {
            let current_version = inner.map_version.load(Ordering::Acquire);
            if have_version == current_version {
                if let Some(cached) = inner.cached_map_data.lock().unwrap().clone() {
                    callback(cached);
                    return;
                }
            }
            let mut data = inner.engine.lock().unwrap().map_data(current_version);
            data.map_id = inner.map_id.clone();
            *inner.cached_map_data.lock().unwrap() = Some(data.clone());
            callback(data);
        });
    }

    pub fn get_submap_texture(
        &self,
        trajectory_id: i32,
        index: i32,
        callback: impl FnOnce(Option<SubmapTextureMessage>) + Send + 'static,
    ) {
        let inner = self.inner.clone();
        self.enqueue(move || {
            let texture = inner.engine.lock().unwrap().submap_texture(trajectory_id, index);
            callback(texture);
        });
    }

    pub fn get_vehicle_poses(&self, callback: impl FnOnce(VehiclePosesMessage) + Send + 'static) {
        let inner = self.inner.clone();
        self.enqueue(move || {
            let poses = inner.engine.lock().unwrap().vehicle_poses();
            callback(poses);
        });
    }

    pub fn save_state(&self, path: PathBuf, callback: impl FnOnce(Result<(), WhiskerError>) + Send + 'static) {
        let inner = self.inner.clone();
        self.enqueue(move || {
            let result = inner.engine.lock().unwrap().save_state(&path);
            callback(result);
        });
    }

    pub fn load_state(
        &self,
        path: PathBuf,
        is_frozen: bool,
        callback: impl FnOnce(Result<(), WhiskerError>) + Send + 'static,
    ) {
        let inner = self.inner.clone();
        self.enqueue(move || {
            let result = inner.engine.lock().unwrap().load_state(&path, is_frozen);
            callback(result);
        });
    }

    pub fn map_version(&self) -> u32 {
        self.inner.map_version.load(Ordering::Acquire)
    }

    fn enqueue(&self, task: impl FnOnce() + Send + 'static) {
        self.inner.queue.add(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid_engine::GridEngine;
    use contracts::{ObservationPayload, Vector3};
    use std::sync::mpsc;

    fn zero_pose() -> Pose {
        Pose {
            position: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
            orientation: (0.0, 0.0, 0.0, 1.0),
        }
    }

    fn sensor_init(vehicle_id: VehicleId, sensor_type: contracts::SensorType) -> Arc<SensorClientInitMessage> {
        Arc::new(SensorClientInitMessage {
            vehicle_id,
            keep_out_radius: 0.5,
            sensor_type,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            seconds_per_measurement: 1.0 / 40.0 / 1081.0,
        })
    }

    #[test]
    fn map_version_advances_only_on_grid_change() {
        let handle = SlamAdapterHandle::new("garage".into(), GridEngine::new());
        let vehicle: VehicleId = "rover-1".into();
        handle.add_vehicle(vehicle.clone(), vec![], zero_pose(), false, false);

        // IMU observations never flip a grid cell, so the version should hold.
        let (tx, rx) = mpsc::channel();
        handle.submit_observation(
            "imu-1".into(),
            vehicle.clone(),
            sensor_init(vehicle.clone(), contracts::SensorType::Imu),
            Arc::new(ObservationMessage {
                sensor_time_ns: 0,
                payload: ObservationPayload::Imu(contracts::ImuSample {
                    accelerometer: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
                    gyroscope: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
                }),
            }),
        );
        handle.get_map_data(0, move |data| tx.send(data.version).unwrap());
        let version_after_imu = rx.recv().unwrap();
        assert_eq!(version_after_imu, 1);

        let (tx2, rx2) = mpsc::channel();
        handle.submit_observation(
            "lidar-1".into(),
            vehicle.clone(),
            sensor_init(vehicle, contracts::SensorType::Lidar),
            Arc::new(ObservationMessage {
                sensor_time_ns: 0,
                payload: ObservationPayload::Lidar(vec![1000]),
            }),
        );
        handle.get_map_data(0, move |data| tx2.send(data.version).unwrap());
        let version_after_lidar = rx2.recv().unwrap();
        assert_eq!(version_after_lidar, 2);
    }
}

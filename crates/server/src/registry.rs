//! Internal registry types guarded by `ServerTasks`'s single lock.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Mutex, Weak};

use contracts::{CapabilityName, ClientId, MapId, SensorClientInitMessage, SensorId, VehicleId};
use message_log::MessageLogWriter;
use slam_adapter::SlamAdapterHandle;
use std::sync::Arc;

/// Invoked to fan an `InvokeCapabilityMessage` payload out to one
/// registered capability client.
pub type CapabilityInvoker = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Invoked to ask a sensor client for its next observation.
pub type RequestObservationFn = Arc<dyn Fn() + Send + Sync>;

pub struct Map {
    pub map_id: MapId,
    pub engine: SlamAdapterHandle,
}

pub struct Vehicle {
    pub vehicle_id: VehicleId,
    pub keep_out_radius: Mutex<f32>,
    pub capabilities: Mutex<HashMap<CapabilityName, HashMap<ClientId, CapabilityInvoker>>>,
    pub map: Mutex<Option<Arc<Map>>>,
    pub sensors: Mutex<Vec<Weak<Sensor>>>,
}

impl Vehicle {
    pub fn new(vehicle_id: VehicleId) -> Self {
        Self {
            vehicle_id,
            keep_out_radius: Mutex::new(0.0),
            capabilities: Mutex::new(HashMap::new()),
            map: Mutex::new(None),
            sensors: Mutex::new(Vec::new()),
        }
    }
}

pub struct Sensor {
    pub sensor_id: SensorId,
    pub data: Arc<SensorClientInitMessage>,
    pub request_observation: RequestObservationFn,
    pub observation_log: Mutex<Option<Arc<MessageLogWriter>>>,
    pub pending_observation: AtomicBool,
    pub vehicle: Arc<Vehicle>,
}

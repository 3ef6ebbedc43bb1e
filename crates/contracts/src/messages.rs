//! Wire message types exchanged between clients, consoles and the server.
//!
//! Every message implements [`WireMessage`], which supplies the ASCII type
//! tag used to frame it on the wire (see `transport::codec`). Payloads are
//! encoded with `serde_json`.

use crate::ids::{CapabilityName, ClientId, MapId, SensorId, VehicleId};
use serde::{Deserialize, Serialize};

/// A message that can be framed on the wire under a stable type name.
pub trait WireMessage: Serialize + for<'de> Deserialize<'de> {
    /// Stable ASCII tag identifying this message type in the wire frame.
    const TYPE_NAME: &'static str;
}

macro_rules! wire_message {
    ($name:ident) => {
        impl WireMessage for $name {
            const TYPE_NAME: &'static str = stringify!($name);
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorType {
    Imu,
    Lidar,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vector3,
    /// Quaternion (x, y, z, w).
    pub orientation: (f64, f64, f64, f64),
}

/// Linear acceleration (x/y/z, m/s²) and angular velocity (x/y/z, rad/s) in
/// the sensor's own frame, before the extrinsic rotation applied in
/// `slam_adapter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    pub accelerometer: Vector3,
    pub gyroscope: Vector3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ObservationPayload {
    Imu(ImuSample),
    /// Angular-indexed distances in millimetres, one full scan per message.
    Lidar(Vec<u32>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorClientInitMessage {
    pub vehicle_id: VehicleId,
    pub keep_out_radius: f32,
    pub sensor_type: SensorType,
    /// Sensor mounting orientation relative to the vehicle body frame,
    /// radians. Applied to IMU samples before they reach the SLAM engine.
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    /// Seconds between consecutive points in one lidar scan; unused by IMU
    /// sensors. Used to derive each point's timestamp offset.
    pub seconds_per_measurement: f64,
}
wire_message!(SensorClientInitMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityClientInitMessage {
    pub vehicle_id: VehicleId,
    pub capabilities: Vec<CapabilityName>,
}
wire_message!(CapabilityClientInitMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationMessage {
    pub sensor_time_ns: i64,
    pub payload: ObservationPayload,
}
wire_message!(ObservationMessage);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestObservationMessage;
wire_message!(RequestObservationMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeCapabilityMessage {
    pub vehicle_id: VehicleId,
    pub capability: CapabilityName,
    pub payload: serde_json::Value,
}
wire_message!(InvokeCapabilityMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSummary {
    pub vehicle_id: VehicleId,
    pub map_id: Option<MapId>,
    pub keep_out_radius: f32,
    pub capabilities: Vec<CapabilityName>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerStateMessage {
    pub maps: Vec<MapId>,
    pub vehicles: Vec<VehicleSummary>,
}
wire_message!(ServerStateMessage);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestResourceFilesMessage;
wire_message!(RequestResourceFilesMessage);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceFilesMessage {
    pub files: Vec<String>,
}
wire_message!(ResourceFilesMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMapDataMessage {
    pub map_id: MapId,
    pub have_version: u32,
}
wire_message!(RequestMapDataMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDataMessage {
    pub map_id: MapId,
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub resolution: f32,
    /// Occupancy probability per cell, row-major, 0..=255 (255 = fully occupied).
    pub cells: Vec<u8>,
}
wire_message!(MapDataMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSubmapTexturesMessage {
    pub map_id: MapId,
    pub submap_ids: Vec<(i32, i32)>,
}
wire_message!(RequestSubmapTexturesMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmapTextureMessage {
    pub trajectory_id: i32,
    pub index: i32,
    pub resolution: f32,
    pub width: u32,
    pub height: u32,
    pub slice_pose: Pose,
    pub png_bytes: Vec<u8>,
}
wire_message!(SubmapTextureMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVehiclePosesMessage {
    pub map_id: MapId,
}
wire_message!(RequestVehiclePosesMessage);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehiclePosesMessage {
    pub poses: Vec<(VehicleId, Pose)>,
}
wire_message!(VehiclePosesMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestCreateMapMessage {
    pub map_id: MapId,
    pub use_overlapping_trimmer: bool,
}
wire_message!(RequestCreateMapMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDeleteMapMessage {
    pub map_id: MapId,
}
wire_message!(RequestDeleteMapMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSaveMapMessage {
    pub map_id: MapId,
}
wire_message!(RequestSaveMapMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLoadMapMessage {
    pub map_id: MapId,
    pub file_name: String,
    pub is_frozen: bool,
    pub use_overlapping_trimmer: bool,
}
wire_message!(RequestLoadMapMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestAssignVehicleMessage {
    pub vehicle_id: VehicleId,
    pub map_id: MapId,
    pub initial_pose: Pose,
    pub allow_global_localization: bool,
    pub use_localization_trimmer: bool,
}
wire_message!(RequestAssignVehicleMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDeleteVehicleMessage {
    pub vehicle_id: VehicleId,
}
wire_message!(RequestDeleteVehicleMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStartObservationLogMessage {
    pub vehicle_id: VehicleId,
}
wire_message!(RequestStartObservationLogMessage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStopObservationLogMessage {
    pub vehicle_id: VehicleId,
}
wire_message!(RequestStopObservationLogMessage);

/// Identity a client announces on its first frame of a fresh connection.
pub type ClientHello = ClientId;

/// A sensor id paired with the sensor type, as handed to the SLAM adapter
/// when a vehicle is assigned to a map.
pub type SensorIdAndType = (SensorId, SensorType);

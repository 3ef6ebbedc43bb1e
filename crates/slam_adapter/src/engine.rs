//! The surface a SLAM engine binding must implement.

use std::path::Path;

use contracts::{
    MapDataMessage, Pose, SensorClientInitMessage, SensorId, SensorIdAndType, SubmapTextureMessage,
    VehicleId, VehiclePosesMessage, WhiskerError,
};

/// All calls run on the adapter's dedicated worker thread, so an
/// implementation never needs its own internal synchronization.
pub trait SlamEngine: Send {
    fn add_vehicle(
        &mut self,
        vehicle_id: VehicleId,
        sensors: Vec<SensorIdAndType>,
        initial_pose: Pose,
        allow_global_localization: bool,
        use_localization_trimmer: bool,
    );

    fn remove_vehicle(&mut self, vehicle_id: &VehicleId);

    /// Converts `observation` to engine-native units using `sensor_init`'s
    /// extrinsics and feeds it into the vehicle's trajectory. Returns `true`
    /// if the observation changed the occupancy grid (and the map version
    /// should advance).
    fn submit_observation(
        &mut self,
        sensor_id: &SensorId,
        vehicle_id: &VehicleId,
        sensor_init: &SensorClientInitMessage,
        observation: &contracts::ObservationMessage,
    ) -> bool;

    fn map_data(&self, version: u32) -> MapDataMessage;

    fn submap_texture(&self, trajectory_id: i32, index: i32) -> Option<SubmapTextureMessage>;

    fn vehicle_poses(&self) -> VehiclePosesMessage;

    fn save_state(&self, path: &Path) -> Result<(), WhiskerError>;

    fn load_state(&mut self, path: &Path, is_frozen: bool) -> Result<(), WhiskerError>;
}

//! A deterministic occupancy-grid accumulator standing in for a real SLAM
//! engine binding.

use std::collections::HashMap;
use std::path::Path;

use contracts::{
    MapDataMessage, ObservationMessage, ObservationPayload, Pose, SensorClientInitMessage,
    SensorId, SensorIdAndType, SubmapTextureMessage, Vector3, VehicleId, VehiclePosesMessage,
    WhiskerError,
};
use serde::{Deserialize, Serialize};

use crate::engine::SlamEngine;
use crate::texture::render_submap_png;

const GRID_WIDTH: u32 = 256;
const GRID_HEIGHT: u32 = 256;
const RESOLUTION: f32 = 0.05;

#[derive(Serialize, Deserialize)]
struct VehicleState {
    pose: Pose,
    sensors: Vec<SensorIdAndType>,
}

#[derive(Serialize, Deserialize)]
struct GridState {
    cells: Vec<u8>,
    vehicles: HashMap<VehicleId, VehicleState>,
}

pub struct GridEngine {
    state: GridState,
    is_frozen: bool,
}

impl GridEngine {
    pub fn new() -> Self {
        Self {
            state: GridState {
                cells: vec![127; (GRID_WIDTH * GRID_HEIGHT) as usize],
                vehicles: HashMap::new(),
            },
            is_frozen: false,
        }
    }

    fn cell_for_pose(&self, pose: &Pose) -> Option<(u32, u32)> {
        let origin = (GRID_WIDTH as f32 / 2.0, GRID_HEIGHT as f32 / 2.0);
        let gx = origin.0 + (pose.position.x as f32) / RESOLUTION;
        let gy = origin.1 + (pose.position.y as f32) / RESOLUTION;
        if gx < 0.0 || gy < 0.0 || gx >= GRID_WIDTH as f32 || gy >= GRID_HEIGHT as f32 {
            return None;
        }
        Some((gx as u32, gy as u32))
    }
}

impl Default for GridEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Rotates `v` from the sensor frame into the vehicle body frame by the
/// extrinsic roll (X), pitch (Y), yaw (Z), applied in that order.
fn rotate_extrinsic(v: Vector3, roll: f64, pitch: f64, yaw: f64) -> Vector3 {
    let (sr, cr) = roll.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (sy, cy) = yaw.sin_cos();

    let x1 = v.x;
    let y1 = v.y * cr - v.z * sr;
    let z1 = v.y * sr + v.z * cr;

    let x2 = x1 * cp + z1 * sp;
    let y2 = y1;
    let z2 = -x1 * sp + z1 * cp;

    Vector3 {
        x: x2 * cy - y2 * sy,
        y: x2 * sy + y2 * cy,
        z: z2,
    }
}

impl SlamEngine for GridEngine {
    fn add_vehicle(
        &mut self,
        vehicle_id: VehicleId,
        sensors: Vec<SensorIdAndType>,
        initial_pose: Pose,
        _allow_global_localization: bool,
        _use_localization_trimmer: bool,
    ) {
        self.state.vehicles.insert(
            vehicle_id,
            VehicleState {
                pose: initial_pose,
                sensors,
            },
        );
    }

    fn remove_vehicle(&mut self, vehicle_id: &VehicleId) {
        self.state.vehicles.remove(vehicle_id);
    }

    fn submit_observation(
        &mut self,
        sensor_id: &SensorId,
        vehicle_id: &VehicleId,
        sensor_init: &SensorClientInitMessage,
        observation: &ObservationMessage,
    ) -> bool {
        let Some(vehicle) = self.state.vehicles.get_mut(vehicle_id) else {
            return false;
        };
        if self.is_frozen {
            return false;
        }

        match &observation.payload {
            ObservationPayload::Imu(sample) => {
                // engine-native units: m/s^2 and rad/s, rotated into the
                // vehicle body frame by the sensor's mounting extrinsic
                let accel = rotate_extrinsic(
                    sample.accelerometer,
                    sensor_init.roll,
                    sensor_init.pitch,
                    sensor_init.yaw,
                );
                // dead-reckon a crude position delta from the accelerometer reading
                vehicle.pose.position = Vector3 {
                    x: vehicle.pose.position.x + accel.x * 0.001,
                    y: vehicle.pose.position.y + accel.y * 0.001,
                    z: vehicle.pose.position.z,
                };
                false
            }
            ObservationPayload::Lidar(ranges_mm) => {
                let vehicle_pose = vehicle.pose.clone();
                let Some((cx, cy)) = self.cell_for_pose(&vehicle_pose) else {
                    return false;
                };
                let point_count = ranges_mm.len();
                let mut changed = false;
                for (i, &range_mm) in ranges_mm.iter().enumerate() {
                    // engine-native units: metres, one point per angular step
                    // of a full revolution
                    let range_m = range_mm as f64 / 1000.0;
                    let angle = (i as f64 / point_count.max(1) as f64) * std::f64::consts::TAU;
                    let x = (range_m * angle.cos()) as f32;
                    let y = (range_m * angle.sin()) as f32;

                    let gx = (cx as i64 + (x / RESOLUTION) as i64).clamp(0, GRID_WIDTH as i64 - 1) as u32;
                    let gy = (cy as i64 + (y / RESOLUTION) as i64).clamp(0, GRID_HEIGHT as i64 - 1) as u32;
                    let index = (gy * GRID_WIDTH + gx) as usize;
                    if self.state.cells[index] != 255 {
                        self.state.cells[index] = 255;
                        changed = true;
                    }
                }
                let _ = sensor_id;
                changed
            }
        }
    }

    fn map_data(&self, version: u32) -> MapDataMessage {
        MapDataMessage {
            map_id: Default::default(),
            version,
            width: GRID_WIDTH,
            height: GRID_HEIGHT,
            resolution: RESOLUTION,
            cells: self.state.cells.clone(),
        }
    }

    fn submap_texture(&self, trajectory_id: i32, index: i32) -> Option<SubmapTextureMessage> {
        if trajectory_id < 0 || index < 0 {
            return None;
        }
        let png_bytes = render_submap_png(
            &self.state.cells,
            GRID_WIDTH,
            GRID_HEIGHT,
            GRID_WIDTH as i32 / 2,
            GRID_HEIGHT as i32 / 2,
            64,
            64,
        );
        Some(SubmapTextureMessage {
            trajectory_id,
            index,
            resolution: RESOLUTION,
            width: 64,
            height: 64,
            slice_pose: Pose {
                position: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
                orientation: (0.0, 0.0, 0.0, 1.0),
            },
            png_bytes,
        })
    }

    fn vehicle_poses(&self) -> VehiclePosesMessage {
        VehiclePosesMessage {
            poses: self
                .state
                .vehicles
                .iter()
                .map(|(id, v)| (id.clone(), v.pose))
                .collect(),
        }
    }

    fn save_state(&self, path: &Path) -> Result<(), WhiskerError> {
        let bytes = serde_json::to_vec(&self.state)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn load_state(&mut self, path: &Path, is_frozen: bool) -> Result<(), WhiskerError> {
        let bytes = std::fs::read(path)?;
        self.state = serde_json::from_slice(&bytes)?;
        self.is_frozen = is_frozen;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_pose() -> Pose {
        Pose {
            position: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
            orientation: (0.0, 0.0, 0.0, 1.0),
        }
    }

    fn lidar_init(vehicle_id: VehicleId) -> SensorClientInitMessage {
        SensorClientInitMessage {
            vehicle_id,
            keep_out_radius: 0.5,
            sensor_type: contracts::SensorType::Lidar,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            seconds_per_measurement: 1.0 / 40.0 / 1081.0,
        }
    }

    #[test]
    fn lidar_observation_marks_cells_occupied() {
        let mut engine = GridEngine::new();
        let vehicle: VehicleId = "rover-1".into();
        engine.add_vehicle(vehicle.clone(), vec![], zero_pose(), false, false);

        let observation = ObservationMessage {
            sensor_time_ns: 0,
            payload: ObservationPayload::Lidar(vec![1000]),
        };
        let sensor: SensorId = "lidar-1".into();
        let init = lidar_init(vehicle.clone());
        let changed = engine.submit_observation(&sensor, &vehicle, &init, &observation);
        assert!(changed);
    }

    #[test]
    fn save_and_load_round_trips_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.pbstream");

        let mut engine = GridEngine::new();
        let vehicle: VehicleId = "rover-1".into();
        engine.add_vehicle(vehicle.clone(), vec![], zero_pose(), false, false);
        engine.save_state(&path).unwrap();

        let mut reloaded = GridEngine::new();
        reloaded.load_state(&path, true).unwrap();
        assert_eq!(reloaded.vehicle_poses().poses.len(), 1);
    }
}

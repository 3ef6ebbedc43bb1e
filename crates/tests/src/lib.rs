//! # Integration Tests
//!
//! Cross-crate scenarios that exercise `server`, `slam_adapter` and
//! `transport` together. Unit tests for a single component live alongside
//! that component's module instead.

#[cfg(test)]
mod registry_scenarios {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use contracts::{
        ImuSample, MapId, ObservationMessage, ObservationPayload, Pose, SensorClientInitMessage,
        SensorType, VehicleId, Vector3,
    };
    use server::ServerTasks;
    use tempfile::tempdir;

    fn zero_pose() -> Pose {
        Pose {
            position: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
            orientation: (0.0, 0.0, 0.0, 1.0),
        }
    }

    /// A sensor registers, is assigned to a map, submits an observation
    /// that changes the occupancy grid, and a console-style client can
    /// fetch the resulting map data back out.
    #[tokio::test]
    async fn sensor_to_map_data_round_trip() {
        let dir = tempdir().unwrap();
        let tasks = ServerTasks::new(dir.path());

        let vehicle_id: VehicleId = "rover-1".into();
        let map_id: MapId = "garage".into();
        let requested = Arc::new(AtomicUsize::new(0));

        tasks.create_map(map_id.clone()).await;
        tasks
            .add_sensor_client(
                "lidar-1".into(),
                SensorClientInitMessage {
                    vehicle_id: vehicle_id.clone(),
                    keep_out_radius: 0.5,
                    sensor_type: SensorType::Lidar,
                    roll: 0.0,
                    pitch: 0.0,
                    yaw: 0.0,
                    seconds_per_measurement: 1.0 / 40.0 / 1081.0,
                },
                Arc::new({
                    let requested = requested.clone();
                    move || {
                        requested.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            )
            .await;

        tasks
            .assign_vehicle_to_map(&vehicle_id, &map_id, zero_pose(), false, false)
            .await;
        assert_eq!(requested.load(Ordering::SeqCst), 1, "assignment should request the first observation");

        tasks
            .submit_observation(
                "lidar-1".into(),
                ObservationMessage {
                    sensor_time_ns: 0,
                    payload: ObservationPayload::Lidar(vec![1000]),
                },
            )
            .await;
        assert_eq!(requested.load(Ordering::SeqCst), 2, "submitting should request the next observation");

        let (tx, rx) = tokio::sync::oneshot::channel();
        tasks
            .get_map_data(&map_id, 0, move |data| {
                let _ = tx.send(data);
            })
            .await;
        let data = rx.await.unwrap().expect("map exists");
        assert_eq!(data.map_id, map_id);
        assert!(data.version > 1, "a lidar hit should have advanced the map version");

        let (pose_tx, pose_rx) = tokio::sync::oneshot::channel();
        tasks
            .get_vehicle_poses(&map_id, move |poses| {
                let _ = pose_tx.send(poses);
            })
            .await;
        let poses = pose_rx.await.unwrap().expect("map exists");
        assert!(poses.poses.iter().any(|(id, _)| *id == vehicle_id));
    }

    /// An IMU-only vehicle never flips a grid cell, so a console client
    /// polling with its last-seen version gets nothing back until a lidar
    /// observation actually changes the map.
    #[tokio::test]
    async fn imu_only_observations_do_not_advance_the_map() {
        let dir = tempdir().unwrap();
        let tasks = ServerTasks::new(dir.path());
        let vehicle_id: VehicleId = "rover-2".into();
        let map_id: MapId = "yard".into();

        tasks.create_map(map_id.clone()).await;
        tasks
            .add_sensor_client(
                "imu-1".into(),
                SensorClientInitMessage {
                    vehicle_id: vehicle_id.clone(),
                    keep_out_radius: 0.2,
                    sensor_type: SensorType::Imu,
                    roll: 0.0,
                    pitch: 0.0,
                    yaw: 0.0,
                    seconds_per_measurement: 0.0,
                },
                Arc::new(|| {}),
            )
            .await;
        tasks
            .assign_vehicle_to_map(&vehicle_id, &map_id, zero_pose(), false, false)
            .await;

        tasks
            .submit_observation(
                "imu-1".into(),
                ObservationMessage {
                    sensor_time_ns: 0,
                    payload: ObservationPayload::Imu(ImuSample {
                        accelerometer: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
                        gyroscope: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
                    }),
                },
            )
            .await;

        let (tx, rx) = tokio::sync::oneshot::channel();
        tasks.get_map_data(&map_id, 0, move |data| {
            let _ = tx.send(data);
        }).await;
        let data = rx.await.unwrap().unwrap();
        assert_eq!(data.version, 1);
    }

    /// Deleting a vehicle that still has an active observation log frees
    /// both the sensor and its log without requiring a second round trip.
    #[tokio::test]
    async fn delete_vehicle_after_observation_log_started() {
        let dir = tempdir().unwrap();
        let tasks = ServerTasks::new(dir.path());
        let vehicle_id: VehicleId = "rover-3".into();

        tasks
            .add_sensor_client(
                "imu-2".into(),
                SensorClientInitMessage {
                    vehicle_id: vehicle_id.clone(),
                    keep_out_radius: 0.1,
                    sensor_type: SensorType::Imu,
                    roll: 0.0,
                    pitch: 0.0,
                    yaw: 0.0,
                    seconds_per_measurement: 0.0,
                },
                Arc::new(|| {}),
            )
            .await;
        tasks.start_observation_log(&vehicle_id).await;
        tasks.delete_vehicle(&vehicle_id).await;

        let state = tasks.get_server_state().await;
        assert!(state.vehicles.is_empty());
    }
}

#[cfg(test)]
mod transport_scenarios {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use contracts::{
        ObservationMessage, ObservationPayload, SensorClientInitMessage, SensorType, Vector3,
        WireMessage,
    };
    use server::ServerTasks;
    use tempfile::tempdir;
    use transport::codec::{decode_frame, encode_frame};
    use transport::mock::MockClientConnection;
    use transport::traits::{ClientEventHandlers, ServerConnection};

    /// A minimal handler wiring (a smaller version of the real binary's)
    /// that forwards sensor registration and observations into
    /// `ServerTasks`, exercised entirely over the in-memory mock transport.
    #[tokio::test]
    async fn sensor_client_init_triggers_an_observation_request_over_the_wire() {
        let dir = tempdir().unwrap();
        let tasks = Arc::new(ServerTasks::new(dir.path()));
        let handler_tasks = tasks.clone();

        let handlers = ClientEventHandlers::new().on_message::<SensorClientInitMessage, _>(
            move |client_id, init| {
                let tasks = handler_tasks.clone();
                let sensor_id = client_id.to_string().into();
                let request_client_id = client_id.clone();
                tokio::spawn(async move {
                    tasks
                        .add_sensor_client(
                            sensor_id,
                            init,
                            Arc::new(move || {
                                let _ = request_client_id.clone();
                            }),
                        )
                        .await;
                });
            },
        );

        let server = MockClientConnection::new(handlers);
        let client_id: contracts::ClientId = "sensor-1".into();
        let client = server.connect(client_id.clone()).await;

        let frame = encode_frame(&SensorClientInitMessage {
            vehicle_id: "rover-1".into(),
            keep_out_radius: 0.3,
            sensor_type: SensorType::Imu,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            seconds_per_measurement: 0.0,
        })
        .unwrap();
        client.send(frame).await.unwrap();

        // Let the spawned registration task run before asserting state.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let state = tasks.get_server_state().await;
        assert_eq!(state.vehicles.len(), 1);
    }

    #[tokio::test]
    async fn malformed_observation_payload_is_dropped_not_panicked() {
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();
        let handlers = ClientEventHandlers::new().on_message::<ObservationMessage, _>(move |_client, _msg| {
            received_clone.fetch_add(1, Ordering::SeqCst);
        });

        let server = MockClientConnection::new(handlers);
        let client = server.connect("sensor-2".into()).await;

        // A frame whose type tag is correct but whose payload is not valid
        // JSON for the message body must be dropped, not panic the socket.
        let mut frame = Vec::new();
        frame.extend_from_slice(ObservationMessage::TYPE_NAME.as_bytes());
        frame.push(0);
        frame.extend_from_slice(b"not json");
        client.send(frame).await.unwrap();

        assert_eq!(received.load(Ordering::SeqCst), 0);

        let valid = encode_frame(&ObservationMessage {
            sensor_time_ns: 1,
            payload: ObservationPayload::Imu(contracts::ImuSample {
                accelerometer: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
                gyroscope: Vector3 { x: 0.0, y: 0.0, z: 0.0 },
            }),
        })
        .unwrap();
        let (type_name, _) = decode_frame(&valid).unwrap();
        assert_eq!(type_name, "ObservationMessage");
        client.send(valid).await.unwrap();
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}

#[cfg(test)]
mod config_scenarios {
    use config_loader::{ConfigFormat, ConfigLoader};
    use server::ServerTasks;
    use tempfile::tempdir;

    /// A config loaded from TOML drives `ServerTasks`'s resource directory
    /// end to end: the directory doesn't exist until something resolves a
    /// name against it.
    #[tokio::test]
    async fn loaded_config_drives_server_tasks_resource_dir() {
        let base = tempdir().unwrap();
        let resource_dir = base.path().join("resources");

        let toml = format!(
            "resource_dir = \"{}\"\n\n[transport.routing_broker]\nbind_address = \"0.0.0.0:7878\"\n",
            resource_dir.display()
        );
        let config = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();

        let tasks = ServerTasks::new(config.resource_dir.clone());
        assert!(!resource_dir.exists());
        tasks.get_resource_files(|files| assert!(files.is_empty()));
    }
}

//! Passive online sensor-to-host clock estimator (Olson 2010).
//!
//! Converts a sensor-local timestamp into the host's timeline, correcting
//! for clock drift without any round-trip exchange with the sensor.

/// Default drift ratio used when a sensor doesn't specify one.
pub const DEFAULT_DRIFT_RATIO: f64 = 0.02;

/// Tracks the sensor/host offset for one sensor and adjusts new samples
/// into host time.
pub struct SensorTimeSync {
    drift_ratio: f64,
    anchor: Option<Anchor>,
}

struct Anchor {
    sensor_time_ns: i64,
    offset_ns: i64,
}

impl SensorTimeSync {
    pub fn new(drift_ratio: f64) -> Self {
        Self {
            drift_ratio,
            anchor: None,
        }
    }

    /// Converts `sensor_time_ns` to host time, given the host clock reading
    /// `host_time_ns` taken when the sample was received.
    pub fn adjusted_time(&mut self, sensor_time_ns: i64, host_time_ns: i64) -> i64 {
        let current_offset = sensor_time_ns - host_time_ns;

        let Some(anchor) = &self.anchor else {
            self.anchor = Some(Anchor {
                sensor_time_ns,
                offset_ns: current_offset,
            });
            return host_time_ns;
        };

        let elapsed_sensor_ns = sensor_time_ns - anchor.sensor_time_ns;
        let drift_ns = (elapsed_sensor_ns as f64 * self.drift_ratio) as i64;
        let drift_offset = anchor.offset_ns - drift_ns;

        if current_offset >= drift_offset {
            self.anchor = Some(Anchor {
                sensor_time_ns,
                offset_ns: current_offset,
            });
            host_time_ns
        } else {
            sensor_time_ns - drift_offset
        }
    }
}

impl Default for SensorTimeSync {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_RATIO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_anchors_to_host_time() {
        let mut sync = SensorTimeSync::default();
        assert_eq!(sync.adjusted_time(1_000_000_000, 2_000_000_000), 2_000_000_000);
    }

    #[test]
    fn fresh_sample_matching_real_time_tracks_host_clock() {
        let mut sync = SensorTimeSync::default();
        sync.adjusted_time(0, 1_000_000_000);
        // one second of sensor and host time both elapse together
        let adjusted = sync.adjusted_time(1_000_000_000, 2_000_000_000);
        assert_eq!(adjusted, 2_000_000_000);
    }

    #[test]
    fn lagging_sample_is_extrapolated_from_drift() {
        let mut sync = SensorTimeSync::new(0.0);
        sync.adjusted_time(0, 1_000_000_000);
        // sensor clock reports only 0.5s elapsed while host clock reports 1s:
        // offset has moved backwards, so the adjusted result trails host time.
        let adjusted = sync.adjusted_time(500_000_000, 2_000_000_000);
        assert!(adjusted < 2_000_000_000);
    }
}

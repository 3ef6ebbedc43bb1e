//! Server runtime metrics.
//!
//! Thin wrappers around the `metrics` facade crate, one function per event
//! worth counting: buffer traffic, task queue depth, message log backlog,
//! transport throughput and registry size.

use metrics::{counter, gauge, histogram};

/// Record a write into an [`concurrency::OverwritingBuffer`] slot.
pub fn record_buffer_write(name: &str) {
    counter!("whisker_buffer_writes_total", "buffer" => name.to_string()).increment(1);
}

/// Record a read from an [`concurrency::OverwritingBuffer`] slot, noting
/// whether the read observed a value newer than the reader's last one.
pub fn record_buffer_read(name: &str, advanced: bool) {
    counter!("whisker_buffer_reads_total", "buffer" => name.to_string()).increment(1);
    if !advanced {
        counter!("whisker_buffer_stale_reads_total", "buffer" => name.to_string()).increment(1);
    }
}

/// Record the current number of pending tasks on a [`concurrency::TaskQueue`].
pub fn record_task_queue_depth(queue: &str, depth: usize) {
    gauge!("whisker_task_queue_depth", "queue" => queue.to_string()).set(depth as f64);
}

/// Record a message log write being enqueued, and the writer's current backlog.
pub fn record_message_log_write(log: &str, pending_after: usize) {
    counter!("whisker_message_log_writes_total", "log" => log.to_string()).increment(1);
    gauge!("whisker_message_log_pending", "log" => log.to_string()).set(pending_after as f64);
}

/// Record a frame sent or received on a transport backend.
pub fn record_transport_message(backend: &str, direction: TransportDirection, type_name: &str) {
    counter!(
        "whisker_transport_messages_total",
        "backend" => backend.to_string(),
        "direction" => direction.as_str(),
        "type" => type_name.to_string()
    )
    .increment(1);
}

/// Record a frame dropped by a transport backend (malformed, unknown client, closed socket).
pub fn record_transport_drop(backend: &str, reason: &str) {
    counter!(
        "whisker_transport_dropped_total",
        "backend" => backend.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportDirection {
    Sent,
    Received,
}

impl TransportDirection {
    fn as_str(self) -> &'static str {
        match self {
            TransportDirection::Sent => "sent",
            TransportDirection::Received => "received",
        }
    }
}

/// Record the registry's current population, called after every mutation.
pub fn record_registry_sizes(maps: usize, vehicles: usize, sensors: usize) {
    gauge!("whisker_registry_maps").set(maps as f64);
    gauge!("whisker_registry_vehicles").set(vehicles as f64);
    gauge!("whisker_registry_sensors").set(sensors as f64);
}

/// Record a clock offset produced by [`concurrency::SensorTimeSync`], in milliseconds.
pub fn record_time_sync_offset_ms(sensor_id: &str, offset_ms: f64) {
    histogram!("whisker_time_sync_offset_ms", "sensor_id" => sensor_id.to_string())
        .record(offset_ms);
}

/// Online mean/variance accumulator (Welford's algorithm), used to summarize
/// a long-running series of offsets or latencies without keeping every sample.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Per-sensor clock offset accumulator, reported on demand (e.g. from a
/// console `info` command) without needing to scrape Prometheus.
#[derive(Debug, Clone, Default)]
pub struct TimeSyncStatsAggregator {
    pub offsets: std::collections::HashMap<String, RunningStats>,
}

impl TimeSyncStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sensor_id: &str, offset_ms: f64) {
        self.offsets.entry(sensor_id.to_string()).or_default().push(offset_ms);
        record_time_sync_offset_ms(sensor_id, offset_ms);
    }

    pub fn summary(&self) -> std::collections::HashMap<String, StatsSummary> {
        self.offsets.iter().map(|(id, stats)| (id.clone(), StatsSummary::from(stats))).collect()
    }

    pub fn reset(&mut self) {
        self.offsets.clear();
    }
}

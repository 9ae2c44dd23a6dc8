use crate::metrics::HealthSnapshot;
use serde::{Deserialize, Serialize};

/// Bus topic carrying the periodic [`RecorderStats`].
pub const STATS_TOPIC: &str = "stat/switch-recorder";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecorderStats {
    pub service: String,
    pub active_devices: usize,
    pub samples_written: u64,
    pub failed_requests: u64,
    pub write_failures: u64,
    pub last_sample_age_ms: Option<u64>,
    pub uptime_seconds: u64,
}

impl RecorderStats {
    pub fn from_snapshot(service: &str, active_devices: usize, snapshot: &HealthSnapshot) -> Self {
        Self {
            service: service.to_string(),
            active_devices,
            samples_written: snapshot.samples,
            failed_requests: snapshot.failed_requests,
            write_failures: snapshot.write_failures,
            last_sample_age_ms: snapshot
                .last_sample_age
                .map(|age| u64::try_from(age.as_millis()).unwrap_or(u64::MAX)),
            uptime_seconds: snapshot.uptime.as_secs(),
        }
    }
}

//! The per-switch polling loop.

use crate::aggregate::aggregate;
use crate::codec;
use crate::device::{port_stats_request, DeviceId};
use crate::metrics::Metrics;
use crate::source::{request_with_timeout, StatsSource};
use crate::store::{FlatFileStore, StoreError};
use crate::AppConfig;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::watch, time::sleep};

pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_millis(10_000);
pub const DEFAULT_STATS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderSettings {
    pub sampling_interval: Duration,
    pub stats_timeout: Duration,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            stats_timeout: DEFAULT_STATS_TIMEOUT,
        }
    }
}

impl From<&AppConfig> for RecorderSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            sampling_interval: Duration::from_millis(config.sampling_interval_ms),
            stats_timeout: Duration::from_secs(config.stats_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Stopped,
}

/// What a recorder did before it stopped.
#[derive(Debug)]
pub struct TaskSummary {
    pub device: DeviceId,
    pub state: TaskState,
    pub samples_written: u64,
    pub failed_requests: u64,
    /// Set when the task ended because its file became unusable.
    pub error: Option<StoreError>,
}

/// Records one switch until its running flag is cleared.
pub struct DeviceRecorder {
    device: DeviceId,
    settings: RecorderSettings,
    store: FlatFileStore,
    source: Arc<dyn StatsSource>,
    metrics: Arc<Metrics>,
    state: TaskState,
}

impl DeviceRecorder {
    pub fn new(
        device: DeviceId,
        settings: RecorderSettings,
        store: FlatFileStore,
        source: Arc<dyn StatsSource>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            device,
            settings,
            store,
            source,
            metrics,
            state: TaskState::Created,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Runs the polling loop.
    ///
    /// `running` is read at the top of every iteration only; a cleared flag
    /// (or a dropped sender) lets the in-flight request and sleep finish first.
    /// The file is closed here, exactly once, before returning.
    pub async fn run(mut self, running: watch::Receiver<bool>) -> TaskSummary {
        let mut writer = match self.store.open_for_append(self.device).await {
            Ok(writer) => writer,
            Err(err) => {
                tracing::error!(
                    device = %self.device,
                    error = %err,
                    "cannot open record file, switch will not be recorded"
                );
                self.metrics.record_write_failure();
                return self.finish(0, 0, Some(err));
            }
        };
        self.state = TaskState::Running;
        tracing::info!(
            device = %self.device,
            path = %writer.path().display(),
            interval_ms = self.settings.sampling_interval.as_millis() as u64,
            "recording aggregate port stats"
        );

        let request = port_stats_request();
        let mut samples_written = 0u64;
        let mut failed_requests = 0u64;
        let mut failure = None;

        while keep_running(&running) {
            match request_with_timeout(
                self.source.as_ref(),
                self.device,
                &request,
                self.settings.stats_timeout,
            )
            .await
            {
                Ok(ports) => {
                    let sample = aggregate(&ports, Utc::now().timestamp_millis());
                    if let Err(err) = writer.append(&codec::encode(&sample)).await {
                        self.metrics.record_write_failure();
                        tracing::error!(
                            device = %self.device,
                            error = %err,
                            "append failed, stopping recorder"
                        );
                        failure = Some(err);
                        break;
                    }
                    samples_written += 1;
                    self.metrics.record_sample();
                    tracing::debug!(
                        device = %self.device,
                        ports = ports.len(),
                        rx_packets = sample.rx_packets,
                        tx_packets = sample.tx_packets,
                        "recorded aggregate port stats"
                    );
                }
                Err(err) => {
                    failed_requests += 1;
                    self.metrics.record_failed_request();
                    tracing::warn!(
                        device = %self.device,
                        error = %err,
                        "statistics request failed, skipping tick"
                    );
                }
            }
            sleep(self.settings.sampling_interval).await;
        }

        if let Err(err) = writer.close().await {
            tracing::warn!(device = %self.device, error = %err, "closing record file failed");
            failure.get_or_insert(err);
        }
        self.finish(samples_written, failed_requests, failure)
    }

    fn finish(
        &mut self,
        samples_written: u64,
        failed_requests: u64,
        error: Option<StoreError>,
    ) -> TaskSummary {
        self.state = TaskState::Stopped;
        TaskSummary {
            device: self.device,
            state: self.state,
            samples_written,
            failed_requests,
            error,
        }
    }
}

/// A closed channel counts as a stop request.
fn keep_running(running: &watch::Receiver<bool>) -> bool {
    running.has_changed().is_ok() && *running.borrow()
}

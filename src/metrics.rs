use crate::telemetry::RecorderStats;
use anyhow::Result;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::interval;

/// Process-wide counters shared by every recorder task.
pub struct Metrics {
    started: Instant,
    samples: AtomicU64,
    failed_requests: AtomicU64,
    write_failures: AtomicU64,
    last_sample: Mutex<Option<Instant>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            samples: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            last_sample: Mutex::new(None),
        }
    }

    pub fn record_sample(&self) {
        self.samples.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_sample.lock() {
            *guard = Some(Instant::now());
        }
    }

    pub fn record_failed_request(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last_sample_age = self.last_sample.lock().ok().and_then(|guard| {
            guard.map(|instant| Instant::now().saturating_duration_since(instant))
        });
        HealthSnapshot {
            samples: self.samples.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            last_sample_age,
            uptime: self.started.elapsed(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HealthSnapshot {
    pub samples: u64,
    pub failed_requests: u64,
    pub write_failures: u64,
    pub last_sample_age: Option<Duration>,
    pub uptime: Duration,
}

/// Heartbeat settings for [`monitor_health`].
pub struct HealthSettings {
    pub period: Duration,
    pub idle_threshold: Duration,
    pub alert_webhook: Option<String>,
}

/// Logs a heartbeat every `settings.period` and warns when switches are
/// connected but nothing has been recorded for longer than the idle threshold.
///
/// `active_devices` is polled on every heartbeat. Each heartbeat is also
/// forwarded to `publish` when a consumer is attached.
pub async fn monitor_health(
    service_name: Arc<String>,
    metrics: Arc<Metrics>,
    active_devices: impl Fn() -> usize + Send + Sync + 'static,
    mut shutdown: watch::Receiver<()>,
    settings: HealthSettings,
    publish: Option<mpsc::UnboundedSender<RecorderStats>>,
) -> Result<()> {
    let mut ticker = interval(settings.period);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let snapshot = metrics.snapshot();
                let active = active_devices();
                tracing::info!(
                    service = %service_name,
                    active_devices = active,
                    samples = snapshot.samples,
                    failed_requests = snapshot.failed_requests,
                    write_failures = snapshot.write_failures,
                    "health heartbeat"
                );
                let idle = match snapshot.last_sample_age {
                    Some(age) => age > settings.idle_threshold,
                    None => snapshot.uptime > settings.idle_threshold,
                };
                if active > 0 && idle {
                    tracing::warn!(
                        service = %service_name,
                        active_devices = active,
                        "no samples recorded in the last {} seconds",
                        settings.idle_threshold.as_secs()
                    );
                    if let Some(url) = &settings.alert_webhook {
                        tracing::error!(
                            service = %service_name,
                            webhook = %url,
                            "health alert triggered: idle beyond threshold"
                        );
                    }
                }
                if let Some(tx) = &publish {
                    let stats = RecorderStats::from_snapshot(&service_name, active, &snapshot);
                    if tx.send(stats).is_err() {
                        tracing::debug!(service = %service_name, "stats consumer gone");
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_counts_events() {
        let metrics = Metrics::new();
        assert!(metrics.snapshot().last_sample_age.is_none());
        metrics.record_sample();
        metrics.record_sample();
        metrics.record_failed_request();
        metrics.record_write_failure();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.samples, 2);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.write_failures, 1);
        assert!(snapshot.last_sample_age.is_some());
    }

    #[tokio::test]
    async fn heartbeat_publishes_until_shutdown() {
        let metrics = Arc::new(Metrics::new());
        metrics.record_sample();
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let (stats_tx, mut stats_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(monitor_health(
            Arc::new("health-test".to_string()),
            metrics.clone(),
            || 3,
            shutdown_rx,
            HealthSettings {
                period: Duration::from_millis(10),
                idle_threshold: Duration::from_secs(60),
                alert_webhook: None,
            },
            Some(stats_tx),
        ));

        let stats = stats_rx.recv().await.expect("heartbeat");
        assert_eq!(stats.service, "health-test");
        assert_eq!(stats.active_devices, 3);
        assert_eq!(stats.samples_written, 1);

        shutdown_tx.send(()).ok();
        handle.await.expect("join").expect("monitor");
    }
}

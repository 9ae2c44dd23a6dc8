use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switch_recorder::codec::{self, AggregatedPortSample};
use switch_recorder::device::{PortCounters, PortStatsRequest};
use switch_recorder::metrics::Metrics;
use switch_recorder::query;
use switch_recorder::recorder::RecorderSettings;
use switch_recorder::source::{StatsError, StatsSource};
use switch_recorder::store::FlatFileStore;
use switch_recorder::{DeviceId, RecorderRegistry};
use tempfile::tempdir;
use tokio::sync::Notify;

/// Hands out queued replies for one switch; afterwards every request times out.
struct QueuedController {
    replies: Mutex<VecDeque<Result<Vec<PortCounters>, StatsError>>>,
    served: Notify,
}

impl QueuedController {
    fn new(replies: Vec<Result<Vec<PortCounters>, StatsError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            served: Notify::new(),
        })
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.served.notified();
            if self.replies.lock().unwrap().is_empty() {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl StatsSource for QueuedController {
    async fn port_stats(
        &self,
        _device: DeviceId,
        _request: &PortStatsRequest,
    ) -> Result<Vec<PortCounters>, StatsError> {
        let next = self.replies.lock().unwrap().pop_front();
        self.served.notify_waiters();
        next.unwrap_or(Err(StatsError::Timeout(Duration::from_secs(10))))
    }
}

fn port(rx: u64, tx: u64) -> PortCounters {
    PortCounters {
        port: 1,
        rx_packets: rx,
        tx_packets: tx,
        ..PortCounters::default()
    }
}

fn settings() -> RecorderSettings {
    RecorderSettings {
        sampling_interval: Duration::from_millis(5),
        stats_timeout: Duration::from_millis(100),
    }
}

fn registry(root: &std::path::Path, controller: Arc<QueuedController>) -> RecorderRegistry {
    RecorderRegistry::new(
        FlatFileStore::new(root),
        controller,
        settings(),
        Arc::new(Metrics::new()),
    )
    .expect("registry")
}

#[tokio::test]
async fn timed_out_tick_leaves_no_line() {
    let tmp = tempdir().expect("temp dir");
    let controller = QueuedController::new(vec![
        Ok(vec![port(10, 5)]),
        Ok(vec![port(20, 5)]),
        Err(StatsError::Timeout(Duration::from_secs(10))),
    ]);
    let registry = registry(tmp.path(), controller.clone());
    let device = DeviceId::new(0x1);

    registry.on_device_connected(device);
    controller.wait_drained().await;
    registry.on_device_disconnected(device);
    let summaries = registry.shutdown().await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].samples_written, 2);

    let path = registry.resolve_record_path(device).expect("path after disconnect");
    let content = std::fs::read_to_string(path).expect("read log");
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("|rxPackets=10|txPackets=5|"));
    assert!(lines[1].contains("|rxPackets=20|txPackets=5|"));

    let records = query::last_records(&registry, device, 10).await.expect("query");
    let samples: Vec<AggregatedPortSample> = records
        .iter()
        .map(|record| AggregatedPortSample::try_from(record).expect("typed"))
        .collect();
    assert_eq!(samples[0].rx_packets, 10);
    assert_eq!(samples[1].rx_packets, 20);
    assert!(samples[0].timestamp_millis <= samples[1].timestamp_millis);
}

#[tokio::test]
async fn never_connected_switch_queries_empty() {
    let tmp = tempdir().expect("temp dir");
    let registry = registry(tmp.path(), QueuedController::new(Vec::new()));
    let device = DeviceId::new(0x2);

    assert!(registry.resolve_record_path(device).is_none());
    let records = query::last_records(&registry, device, 5).await.expect("query");
    assert!(records.is_empty());
}

#[tokio::test]
async fn truncated_tail_line_is_skipped() {
    let tmp = tempdir().expect("temp dir");
    let store = FlatFileStore::new(tmp.path());
    let device = DeviceId::new(0x3);
    let good = codec::encode(&AggregatedPortSample {
        timestamp_millis: 1,
        rx_packets: 7,
        ..AggregatedPortSample::default()
    });
    std::fs::write(
        store.record_path(device),
        format!("{good}\ntime=2|rxPackets=8|txPackets=1"),
    )
    .expect("seed log");

    let registry = registry(tmp.path(), QueuedController::new(Vec::new()));
    let records = query::last_records(&registry, device, 10).await.expect("query");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["rxPackets"], "7");
}

#[tokio::test]
async fn corrupt_line_does_not_hide_the_rest() {
    let tmp = tempdir().expect("temp dir");
    let store = FlatFileStore::new(tmp.path());
    let device = DeviceId::new(0x6);
    let mut raw = b"time=1|rxPackets=1|\ntime=2|rxPackets=\xff|\n".to_vec();
    raw.extend_from_slice(b"time=3|rxPackets=3|\n");
    std::fs::write(store.record_path(device), raw).expect("seed log");

    let registry = registry(tmp.path(), QueuedController::new(Vec::new()));
    let records = query::last_records(&registry, device, 10).await.expect("query");
    let times: Vec<&str> = records.iter().map(|r| r["time"].as_str()).collect();
    assert_eq!(times, vec!["1", "3"]);
}

#[tokio::test]
async fn appended_samples_read_back_in_write_order() {
    let tmp = tempdir().expect("temp dir");
    let store = FlatFileStore::new(tmp.path());
    let device = DeviceId::new(0x4);
    let mut writer = store.open_for_append(device).await.expect("open");
    for tick in 0..25i64 {
        let sample = AggregatedPortSample {
            timestamp_millis: tick,
            rx_bytes: tick as u64 * 100,
            ..AggregatedPortSample::default()
        };
        writer.append(&codec::encode(&sample)).await.expect("append");
    }
    writer.close().await.expect("close");

    let registry = registry(tmp.path(), QueuedController::new(Vec::new()));
    let all = query::last_records(&registry, device, 100).await.expect("query");
    assert_eq!(all.len(), 25);
    for (tick, record) in all.iter().enumerate() {
        assert_eq!(record["time"], tick.to_string());
    }

    let tail = query::last_records(&registry, device, 3).await.expect("query");
    let times: Vec<&str> = tail.iter().map(|r| r["time"].as_str()).collect();
    assert_eq!(times, vec!["22", "23", "24"]);
}

#[tokio::test]
async fn reconnect_appends_to_same_file() {
    let tmp = tempdir().expect("temp dir");
    let controller = QueuedController::new(vec![Ok(vec![port(1, 1)])]);
    let registry = registry(tmp.path(), controller.clone());
    let device = DeviceId::new(0x5);

    registry.on_device_connected(device);
    controller.wait_drained().await;
    registry.on_device_disconnected(device);
    registry.shutdown().await;

    controller.replies.lock().unwrap().push_back(Ok(vec![port(2, 2)]));
    registry.on_device_connected(device);
    controller.wait_drained().await;
    registry.on_device_disconnected(device);
    registry.shutdown().await;

    let lines = registry
        .store()
        .read_all(device)
        .await
        .expect("read")
        .expect("present");
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("|rxPackets=1|"));
    assert!(lines[1].contains("|rxPackets=2|"));
}

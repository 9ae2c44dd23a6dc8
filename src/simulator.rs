//! Offline runs against a scripted controller.
//!
//! A script lists, per switch, the replies the controller gives on successive
//! ticks; `null` stands for a request that timed out:
//!
//! ```json
//! {"devices": [
//!   {"dpid": 1, "replies": [[{"rx_packets": 10, "tx_packets": 5}], null]}
//! ]}
//! ```

use crate::device::{DeviceId, PortCounters, PortStatsRequest};
use crate::metrics::Metrics;
use crate::recorder::{RecorderSettings, TaskSummary};
use crate::registry::RecorderRegistry;
use crate::source::{StatsError, StatsSource};
use crate::store::FlatFileStore;
use crate::AppConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::{fs, sync::Notify, time::sleep};

const FINISH_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Deserialize)]
pub struct Script {
    pub devices: Vec<ScriptedDevice>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptedDevice {
    pub dpid: u64,
    #[serde(default)]
    pub replies: Vec<Option<Vec<PortCounters>>>,
}

impl Script {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid simulation script")
    }
}

/// Serves each switch's scripted replies in order, then times out.
pub struct ScriptedController {
    replies: Mutex<HashMap<DeviceId, VecDeque<Option<Vec<PortCounters>>>>>,
    timeout: Duration,
    drained: Notify,
}

impl ScriptedController {
    pub fn new(script: &Script, timeout: Duration) -> Self {
        let replies = script
            .devices
            .iter()
            .map(|device| (DeviceId::new(device.dpid), device.replies.iter().cloned().collect()))
            .collect();
        Self {
            replies: Mutex::new(replies),
            timeout,
            drained: Notify::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(VecDeque::len)
            .sum()
    }

    /// Replies still queued for switches that `still_recording` accepts.
    pub fn pending(&self, still_recording: impl Fn(DeviceId) -> bool) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(device, _)| still_recording(**device))
            .map(|(_, queue)| queue.len())
            .sum()
    }

    /// Resolves once every switch has either consumed its replies or stopped
    /// recording. A stopped recorder never pops again, so its leftovers are
    /// ignored; finished tasks are noticed by polling.
    pub async fn wait_consumed(&self, still_recording: impl Fn(DeviceId) -> bool) {
        loop {
            let notified = self.drained.notified();
            if self.pending(&still_recording) == 0 {
                return;
            }
            tokio::select! {
                _ = notified => {}
                _ = sleep(FINISH_POLL) => {}
            }
        }
    }

    /// Resolves once every scripted reply has been handed out.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.remaining() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl StatsSource for ScriptedController {
    async fn port_stats(
        &self,
        device: DeviceId,
        _request: &PortStatsRequest,
    ) -> Result<Vec<PortCounters>, StatsError> {
        let next = {
            let mut replies = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(queue) = replies.get_mut(&device) else {
                return Err(StatsError::NotConnected(device));
            };
            queue.pop_front()
        };
        self.drained.notify_waiters();
        match next {
            Some(Some(ports)) => Ok(ports),
            Some(None) | None => Err(StatsError::Timeout(self.timeout)),
        }
    }
}

/// Connects every scripted switch, lets the recorders consume the script,
/// then disconnects them and waits for their files to be closed.
pub async fn run_script(script_path: impl AsRef<Path>, config: &AppConfig) -> Result<Vec<TaskSummary>> {
    let script_path = script_path.as_ref();
    let raw = fs::read_to_string(script_path)
        .await
        .with_context(|| format!("open simulation script {}", script_path.display()))?;
    let script = Script::parse(&raw)?;

    let settings = RecorderSettings::from(config);
    let controller = Arc::new(ScriptedController::new(&script, settings.stats_timeout));
    let store = FlatFileStore::from_config(config)?;
    tracing::info!(
        script = %script_path.display(),
        records = %store.root().display(),
        devices = script.devices.len(),
        "running simulation"
    );
    let registry = RecorderRegistry::new(
        store,
        controller.clone(),
        settings,
        Arc::new(Metrics::new()),
    )?;

    for device in &script.devices {
        registry.on_device_connected(DeviceId::new(device.dpid));
    }
    controller
        .wait_consumed(|device| registry.is_active(device))
        .await;
    for device in &script.devices {
        registry.on_device_disconnected(DeviceId::new(device.dpid));
    }
    let summaries = registry.shutdown().await;

    let written: u64 = summaries.iter().map(|s| s.samples_written).sum();
    tracing::info!(samples_written = written, "simulation completed");
    Ok(summaries)
}

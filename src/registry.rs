//! Owns one recorder task per connected switch.
//!
//! Connect and disconnect notifications may arrive on any thread; the map of
//! active recorders is only touched under the registry's lock, which is never
//! held across an `.await`.
//!
//! A disconnect clears the recorder's running flag and drops the entry right
//! away. The task may still be finishing its last append when the entry is
//! gone, so a query racing the disconnect can read a prefix of the file or
//! fail transiently. The file stays queryable afterwards.

use crate::device::DeviceId;
use crate::metrics::Metrics;
use crate::recorder::{DeviceRecorder, RecorderSettings, TaskSummary};
use crate::source::{DeviceListener, StatsSource};
use crate::store::FlatFileStore;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::{runtime::Handle, sync::watch, task::JoinHandle};
use tracing::Instrument;

struct RecorderHandle {
    running: watch::Sender<bool>,
    task: JoinHandle<TaskSummary>,
}

#[derive(Default)]
struct RegistryInner {
    active: HashMap<DeviceId, RecorderHandle>,
    /// Stopped recorders that may still be closing their file.
    detached: Vec<JoinHandle<TaskSummary>>,
    /// Every switch connected since startup.
    seen: HashSet<DeviceId>,
}

pub struct RecorderRegistry {
    store: FlatFileStore,
    source: Arc<dyn StatsSource>,
    settings: RecorderSettings,
    metrics: Arc<Metrics>,
    runtime: Handle,
    inner: Mutex<RegistryInner>,
}

impl RecorderRegistry {
    /// Must be called from within a tokio runtime; recorders are spawned on it.
    pub fn new(
        store: FlatFileStore,
        source: Arc<dyn StatsSource>,
        settings: RecorderSettings,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .context("recorder registry must be created inside a tokio runtime")?;
        Ok(Self {
            store,
            source,
            settings,
            metrics,
            runtime,
            inner: Mutex::new(RegistryInner::default()),
        })
    }

    pub fn store(&self) -> &FlatFileStore {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // the map only holds handles; a panic elsewhere cannot leave it half-updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts recording `device`.
    ///
    /// Returns `false` when a live recorder already exists for it; the
    /// duplicate notification is ignored so the file keeps a single writer.
    /// A recorder that already ended on its own is replaced.
    pub fn on_device_connected(&self, device: DeviceId) -> bool {
        let mut inner = self.lock();
        inner.seen.insert(device);
        if let Some(existing) = inner.active.get(&device) {
            if !existing.task.is_finished() {
                tracing::warn!(device = %device, "switch already recorded, duplicate connect ignored");
                return false;
            }
            tracing::info!(device = %device, "replacing recorder that stopped on its own");
            inner.active.remove(&device);
        }

        let (running_tx, running_rx) = watch::channel(true);
        let recorder = DeviceRecorder::new(
            device,
            self.settings,
            self.store.clone(),
            self.source.clone(),
            self.metrics.clone(),
        );
        let span = tracing::info_span!("recorder", device = %device);
        let task = self.runtime.spawn(
            async move {
                let summary = recorder.run(running_rx).await;
                tracing::info!(
                    samples_written = summary.samples_written,
                    failed_requests = summary.failed_requests,
                    failed = summary.error.is_some(),
                    "recorder stopped"
                );
                summary
            }
            .instrument(span),
        );
        inner.active.insert(
            device,
            RecorderHandle {
                running: running_tx,
                task,
            },
        );
        tracing::info!(device = %device, "added recorder for switch");
        true
    }

    /// Stops recording `device`. Unknown switches are ignored.
    ///
    /// Returns once the entry is removed; the recorder itself exits after its
    /// current iteration.
    pub fn on_device_disconnected(&self, device: DeviceId) -> bool {
        let mut inner = self.lock();
        let Some(handle) = inner.active.remove(&device) else {
            tracing::debug!(device = %device, "disconnect for unrecorded switch ignored");
            return false;
        };
        handle.running.send_replace(false);
        inner.detached.retain(|task| !task.is_finished());
        inner.detached.push(handle.task);
        tracing::info!(device = %device, "removed recorder for switch");
        true
    }

    /// Record file of `device`, for active and disconnected switches alike.
    ///
    /// `None` when the switch was never connected since startup and has no
    /// file on disk.
    pub fn resolve_record_path(&self, device: DeviceId) -> Option<PathBuf> {
        let known = {
            let inner = self.lock();
            inner.seen.contains(&device)
        };
        let path = self.store.record_path(device);
        (known || path.is_file()).then_some(path)
    }

    /// Whether a recorder for `device` is registered and still running.
    pub fn is_active(&self, device: DeviceId) -> bool {
        self.lock()
            .active
            .get(&device)
            .map_or(false, |handle| !handle.task.is_finished())
    }

    pub fn active_count(&self) -> usize {
        self.lock()
            .active
            .values()
            .filter(|handle| !handle.task.is_finished())
            .count()
    }

    /// Stops every recorder and waits until all of them closed their files.
    pub async fn shutdown(&self) -> Vec<TaskSummary> {
        let tasks: Vec<JoinHandle<TaskSummary>> = {
            let mut inner = self.lock();
            let mut tasks: Vec<_> = inner.detached.drain(..).collect();
            for (_, handle) in inner.active.drain() {
                handle.running.send_replace(false);
                tasks.push(handle.task);
            }
            tasks
        };
        tracing::info!(recorders = tasks.len(), "waiting for recorders to stop");

        let mut summaries = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(summary) => summaries.push(summary),
                Err(err) => tracing::error!(error = %err, "recorder task did not finish cleanly"),
            }
        }
        summaries
    }
}

impl DeviceListener for RecorderRegistry {
    fn device_added(&self, device: DeviceId) {
        self.on_device_connected(device);
    }

    fn device_removed(&self, device: DeviceId) {
        self.on_device_disconnected(device);
    }
}

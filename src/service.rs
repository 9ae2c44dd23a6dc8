use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::{
    signal,
    sync::{mpsc, watch},
    time::Duration,
};

use crate::bus;
use crate::config::AppConfig;
use crate::metrics::{self, HealthSettings, Metrics};
use crate::recorder::RecorderSettings;
use crate::registry::RecorderRegistry;
use crate::store::FlatFileStore;

pub struct Service {
    config: AppConfig,
}

impl Service {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Records every switch the controller announces until ctrl-c.
    pub async fn run(self) -> Result<()> {
        let config = self.config;
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let service_name = Arc::new(config.service_name.clone());
        let metrics = Arc::new(Metrics::new());

        let store = FlatFileStore::from_config(&config).context("resolve record directory")?;
        let source = Arc::new(
            bus::BusStatsSource::connect(&config)
                .await
                .context("prepare statistics channel to the controller")?,
        );
        let registry = Arc::new(RecorderRegistry::new(
            store.clone(),
            source,
            RecorderSettings::from(&config),
            metrics.clone(),
        )?);
        let controller = bus::attach_controller(&config, registry.clone())
            .await
            .context("attach to controller notifications")?;

        tracing::info!(
            service = %service_name,
            records = %store.root().display(),
            interval_ms = config.sampling_interval_ms,
            "switch recorder started"
        );

        let (stats_tx, stats_rx) = mpsc::unbounded_channel();
        let publisher = bus::spawn_stats_publisher(&controller, stats_rx);
        let health_handle = {
            let registry = registry.clone();
            tokio::spawn(metrics::monitor_health(
                service_name.clone(),
                metrics.clone(),
                move || registry.active_count(),
                shutdown_rx,
                HealthSettings {
                    period: Duration::from_secs(config.health_interval_secs),
                    idle_threshold: Duration::from_secs(config.idle_threshold_seconds),
                    alert_webhook: config.alert_webhook.clone(),
                },
                Some(stats_tx),
            ))
        };

        signal::ctrl_c().await.ok();
        tracing::info!(service = %service_name, "ctrl-c received, requesting shutdown");

        // stop taking notifications before draining the recorders
        drop(controller);
        shutdown_tx.send(()).ok();
        let summaries = registry.shutdown().await;
        let failed = summaries.iter().filter(|s| s.error.is_some()).count();
        tracing::info!(
            service = %service_name,
            recorders = summaries.len(),
            failed,
            "all recorders stopped"
        );

        health_handle.await??;
        publisher.await.ok();
        Ok(())
    }
}

//! Seams towards the controller: statistics requests and switch notifications.

use crate::device::{DeviceId, PortCounters, PortStatsRequest};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Why a statistics request produced no reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("switch {0} is not connected to the controller")]
    NotConnected(DeviceId),
    #[error("no statistics reply within {0:?}")]
    Timeout(Duration),
    #[error("statistics transport failed: {0}")]
    Transport(String),
}

/// Issues statistics requests to switches.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn port_stats(
        &self,
        device: DeviceId,
        request: &PortStatsRequest,
    ) -> Result<Vec<PortCounters>, StatsError>;
}

/// Receives switch connect/disconnect notifications.
pub trait DeviceListener: Send + Sync {
    fn device_added(&self, device: DeviceId);
    fn device_removed(&self, device: DeviceId);
}

/// Runs one request, giving up after `wait`.
pub async fn request_with_timeout(
    source: &dyn StatsSource,
    device: DeviceId,
    request: &PortStatsRequest,
    wait: Duration,
) -> Result<Vec<PortCounters>, StatsError> {
    match tokio::time::timeout(wait, source.port_stats(device, request)).await {
        Ok(reply) => reply,
        Err(_) => Err(StatsError::Timeout(wait)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::port_stats_request;

    struct Stalled;

    #[async_trait]
    impl StatsSource for Stalled {
        async fn port_stats(
            &self,
            _device: DeviceId,
            _request: &PortStatsRequest,
        ) -> Result<Vec<PortCounters>, StatsError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn stalled_request_times_out() {
        let wait = Duration::from_millis(20);
        let err = request_with_timeout(&Stalled, DeviceId::new(1), &port_stats_request(), wait)
            .await
            .unwrap_err();
        assert_eq!(err, StatsError::Timeout(wait));
    }
}

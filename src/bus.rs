//! Controller bridge over the busrt IPC bus.
//!
//! The controller announces switches on [`SWITCH_ADDED_TOPIC`] and
//! [`SWITCH_REMOVED_TOPIC`] and answers [`STATS_METHOD`] calls. The recorder
//! in turn answers [`RECORDS_METHOD`] and [`PATH_METHOD`] for query clients.

use crate::device::{DeviceId, PortCounters, PortStatsRequest};
use crate::query;
use crate::registry::RecorderRegistry;
use crate::source::{DeviceListener, StatsError, StatsSource};
use crate::telemetry::{RecorderStats, STATS_TOPIC};
use crate::AppConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use busrt::client::AsyncClient;
use busrt::ipc::{Client, Config};
use busrt::rpc::{
    Rpc, RpcClient, RpcError, RpcEvent, RpcHandlers, RpcResult, RPC_ERROR_CODE_INTERNAL,
    RPC_ERROR_CODE_PARSE,
};
use busrt::QoS;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};

pub const SWITCH_ADDED_TOPIC: &str = "controller/switch/added";
pub const SWITCH_REMOVED_TOPIC: &str = "controller/switch/removed";
pub const STATS_METHOD: &str = "cmd.stats.port";
pub const RECORDS_METHOD: &str = "cmd.records.get";
pub const PATH_METHOD: &str = "cmd.records.path";

#[derive(Debug, Serialize, Deserialize)]
pub struct SwitchEvent {
    pub dpid: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatsCall {
    dpid: u64,
    #[serde(flatten)]
    request: PortStatsRequest,
}

#[derive(Debug, Deserialize)]
struct StatsReply {
    #[serde(default = "connected_by_default")]
    connected: bool,
    #[serde(default)]
    ports: Vec<PortCounters>,
}

fn connected_by_default() -> bool {
    true
}

/// Payload of a [`RECORDS_METHOD`] call.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordsQuery {
    pub switch: String,
    pub last: usize,
}

/// Payload of a [`PATH_METHOD`] call.
#[derive(Debug, Serialize, Deserialize)]
pub struct PathQuery {
    pub switch: String,
}

/// Requests port statistics from the controller over RPC.
pub struct BusStatsSource {
    rpc: RpcClient,
    target: String,
}

struct NoopHandlers;

#[async_trait]
impl RpcHandlers for NoopHandlers {
    async fn handle_call(&self, _event: RpcEvent) -> RpcResult {
        Ok(None)
    }
    async fn handle_notification(&self, _event: RpcEvent) {}
    async fn handle_frame(&self, _frame: busrt::Frame) {}
}

impl BusStatsSource {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let name = format!("{}.stats.{}", config.bus_client_name, std::process::id());
        let client = Client::connect(&Config::new(&config.bus_address, &name))
            .await
            .with_context(|| format!("failed to connect to bus at {}", config.bus_address))?;
        Ok(Self {
            rpc: RpcClient::new(client, NoopHandlers),
            target: config.controller_target.clone(),
        })
    }
}

#[async_trait]
impl StatsSource for BusStatsSource {
    async fn port_stats(
        &self,
        device: DeviceId,
        request: &PortStatsRequest,
    ) -> Result<Vec<PortCounters>, StatsError> {
        let payload = serde_json::to_vec(&StatsCall {
            dpid: device.as_u64(),
            request: request.clone(),
        })
        .map_err(|err| StatsError::Transport(err.to_string()))?;
        let reply = self
            .rpc
            .call(&self.target, STATS_METHOD, payload.into(), QoS::Processed)
            .await
            .map_err(|err| StatsError::Transport(err.to_string()))?;
        let reply: StatsReply = serde_json::from_slice(reply.payload())
            .map_err(|err| StatsError::Transport(format!("unreadable stats reply: {err}")))?;
        if !reply.connected {
            return Err(StatsError::NotConnected(device));
        }
        Ok(reply.ports)
    }
}

/// Answers query calls and forwards switch notifications to the registry.
pub struct ControllerHandlers {
    registry: Arc<RecorderRegistry>,
}

impl ControllerHandlers {
    pub fn new(registry: Arc<RecorderRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl RpcHandlers for ControllerHandlers {
    async fn handle_call(&self, event: RpcEvent) -> RpcResult {
        let method = event
            .parse_method()
            .map_err(|_| RpcError::new(RPC_ERROR_CODE_PARSE, None))?;
        match method {
            RECORDS_METHOD | PATH_METHOD => {
                let reply = answer_query(&self.registry, method, event.payload())
                    .await
                    .map_err(|err| {
                        RpcError::new(RPC_ERROR_CODE_INTERNAL, Some(err.to_string().into_bytes()))
                    })?;
                Ok(Some(reply))
            }
            _ => Err(RpcError::method(None)),
        }
    }

    async fn handle_notification(&self, _event: RpcEvent) {}

    async fn handle_frame(&self, frame: busrt::Frame) {
        if let Some(topic) = frame.topic() {
            dispatch_switch_event(self.registry.as_ref(), topic, frame.payload());
        }
    }
}

/// Applies a controller notification; returns `false` for unrelated or unreadable frames.
pub fn dispatch_switch_event(listener: &dyn DeviceListener, topic: &str, payload: &[u8]) -> bool {
    let added = match topic {
        SWITCH_ADDED_TOPIC => true,
        SWITCH_REMOVED_TOPIC => false,
        _ => return false,
    };
    let event: SwitchEvent = match serde_json::from_slice(payload) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(topic, error = %err, "unreadable switch notification");
            return false;
        }
    };
    let device = DeviceId::new(event.dpid);
    if added {
        listener.device_added(device);
    } else {
        listener.device_removed(device);
    }
    true
}

/// Serves [`RECORDS_METHOD`] and [`PATH_METHOD`] calls.
///
/// Records come back as `{"<switch>": [record, ...]}`, keyed by the switch id
/// exactly as it was asked for.
pub async fn answer_query(
    registry: &RecorderRegistry,
    method: &str,
    payload: &[u8],
) -> Result<Vec<u8>> {
    match method {
        RECORDS_METHOD => {
            let q: RecordsQuery =
                serde_json::from_slice(payload).context("invalid records query")?;
            let device: DeviceId = q.switch.parse()?;
            let records = query::last_records(registry, device, q.last).await?;
            let mut reply = HashMap::with_capacity(1);
            reply.insert(q.switch, records);
            Ok(serde_json::to_vec(&reply)?)
        }
        PATH_METHOD => {
            let q: PathQuery = serde_json::from_slice(payload).context("invalid path query")?;
            let device: DeviceId = q.switch.parse()?;
            let path = registry
                .resolve_record_path(device)
                .map(|path| path.display().to_string());
            Ok(serde_json::to_vec(&path)?)
        }
        other => Err(anyhow!("unsupported method '{other}'")),
    }
}

/// Subscribes to controller notifications and serves queries on behalf of `registry`.
///
/// The returned client must be kept alive for as long as the bridge should run.
pub async fn attach_controller(
    config: &AppConfig,
    registry: Arc<RecorderRegistry>,
) -> Result<RpcClient> {
    let mut client = Client::connect(&Config::new(&config.bus_address, &config.bus_client_name))
        .await
        .with_context(|| format!("failed to connect to bus at {}", config.bus_address))?;
    for topic in [SWITCH_ADDED_TOPIC, SWITCH_REMOVED_TOPIC] {
        client
            .subscribe(topic, QoS::Processed)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }
    tracing::info!(
        bus = %config.bus_address,
        name = %config.bus_client_name,
        "listening for controller switch notifications"
    );
    Ok(RpcClient::new(client, ControllerHandlers::new(registry)))
}

/// Publishes every heartbeat on [`STATS_TOPIC`].
pub fn spawn_stats_publisher(
    rpc: &RpcClient,
    mut stats: mpsc::UnboundedReceiver<RecorderStats>,
) -> JoinHandle<()> {
    let client = rpc.client().clone();
    tokio::spawn(async move {
        while let Some(snapshot) = stats.recv().await {
            let payload = match serde_json::to_vec(&snapshot) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(error = %err, "cannot encode recorder stats");
                    continue;
                }
            };
            let mut c = client.lock().await;
            if let Err(err) = c.publish(STATS_TOPIC, payload.into(), QoS::No).await {
                tracing::warn!(error = %err, "failed to publish recorder stats");
            }
        }
    })
}

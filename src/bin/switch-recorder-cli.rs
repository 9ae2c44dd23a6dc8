use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use busrt::client::AsyncClient;
use busrt::ipc::{Client, Config};
use busrt::rpc::{Rpc, RpcClient, RpcEvent, RpcHandlers, RpcResult};
use busrt::QoS;
use serde_json::Value;
use switch_recorder::bus::{PathQuery, RecordsQuery, PATH_METHOD, RECORDS_METHOD};
use switch_recorder::telemetry::{RecorderStats, STATS_TOPIC};
use switch_recorder::{AppConfig, DeviceId};
use tokio::signal;

struct CliHandlers;

#[async_trait]
impl RpcHandlers for CliHandlers {
    async fn handle_call(&self, _event: RpcEvent) -> RpcResult {
        Ok(None)
    }
    async fn handle_notification(&self, _event: RpcEvent) {}
    async fn handle_frame(&self, frame: busrt::Frame) {
        if frame.topic() == Some(STATS_TOPIC) {
            if let Ok(stats) = serde_json::from_slice::<RecorderStats>(frame.payload()) {
                println!(
                    "Recorder Stats [{}]: uptime={}s, switches={}, samples={}, failed_requests={}, write_failures={}",
                    stats.service,
                    stats.uptime_seconds,
                    stats.active_devices,
                    stats.samples_written,
                    stats.failed_requests,
                    stats.write_failures
                );
            }
        }
    }
}

enum Command {
    Records { switch: String, last: usize },
    Path { switch: String },
    Watch,
}

fn parse_args() -> Result<(String, Command)> {
    let mut args = std::env::args().skip(1);
    let mut config_path = AppConfig::default_path().to_string();
    let mut command = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a path"))?;
            }
            "records" => {
                let switch = args.next().ok_or_else(|| anyhow!("records requires a switch id"))?;
                let last = match args.next() {
                    Some(raw) => raw.parse().context("last must be a positive number")?,
                    None => 10,
                };
                command = Some(Command::Records { switch, last });
            }
            "path" => {
                let switch = args.next().ok_or_else(|| anyhow!("path requires a switch id"))?;
                command = Some(Command::Path { switch });
            }
            "--watch" | "watch" => command = Some(Command::Watch),
            "--help" | "-h" => {
                println!(
                    "Usage: switch-recorder-cli [--config <path>] <command>\n\
                     records <switch> [last]   Print the last records of a switch (default 10)\n\
                     path <switch>             Print the record file of a switch\n\
                     watch                     Follow recorder heartbeats"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument '{other}'"),
        }
    }

    let command = command.ok_or_else(|| anyhow!("missing command, see --help"))?;
    Ok((config_path, command))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let (config_path, command) = parse_args()?;
    let config = AppConfig::load(&config_path)?;

    let name = format!("switch.recorder.cli.{}", std::process::id());
    let mut client = Client::connect(&Config::new(&config.bus_address, &name))
        .await
        .with_context(|| format!("failed to connect to bus at {}", config.bus_address))?;

    let (method, payload) = match command {
        Command::Watch => {
            client.subscribe(STATS_TOPIC, QoS::Processed).await?;
            let _rpc_client = RpcClient::new(client, CliHandlers);
            println!("Listening for recorder heartbeats. Press Ctrl-C to exit.");
            signal::ctrl_c().await?;
            return Ok(());
        }
        Command::Records { switch, last } => {
            switch.parse::<DeviceId>()?;
            (RECORDS_METHOD, serde_json::to_vec(&RecordsQuery { switch, last })?)
        }
        Command::Path { switch } => {
            switch.parse::<DeviceId>()?;
            (PATH_METHOD, serde_json::to_vec(&PathQuery { switch })?)
        }
    };

    let rpc_client = RpcClient::new(client, CliHandlers);
    let response = rpc_client
        .call(&config.bus_client_name, method, payload.into(), QoS::Processed)
        .await
        .map_err(|err| anyhow!("query failed: {err}"))?;
    match serde_json::from_slice::<Value>(response.payload()) {
        Ok(json) => println!("{json:#}"),
        Err(err) => bail!("unreadable reply: {err}"),
    }
    Ok(())
}

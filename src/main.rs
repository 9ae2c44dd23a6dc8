use anyhow::{bail, Context, Result};
use switch_recorder::{logging, platform, simulator, AppConfig, Service};

#[derive(Debug)]
struct Cli {
    config_path: String,
    script_path: Option<String>,
}

impl Cli {
    fn parse() -> Result<Self> {
        let mut args = std::env::args().skip(1);
        let mut config_path: Option<String> = None;
        let mut script_path: Option<String> = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                    config_path = Some(value);
                }
                "--simulate" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--simulate requires a path"))?;
                    script_path = Some(value);
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: switch-recorder [--config <path>] [--simulate <script>]\n\
                         --config <path>     Path to TOML configuration (default: config/switch-recorder.toml)\n\
                         --simulate <path>   Record switches from a scripted controller instead of the bus"
                    );
                    std::process::exit(0);
                }
                other => {
                    if config_path.is_none() {
                        config_path = Some(other.to_string());
                    } else {
                        bail!("unknown argument '{other}'");
                    }
                }
            }
        }

        Ok(Self {
            config_path: config_path.unwrap_or_else(|| AppConfig::default_path().into()),
            script_path,
        })
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse()?;

    let config = AppConfig::load(&cli.config_path)
        .with_context(|| format!("unable to load configuration from {}", cli.config_path))?;

    let _log_guard = logging::init(&config)?;
    platform::log_platform_guidance();

    if let Some(script) = cli.script_path {
        let summaries = simulator::run_script(&script, &config).await?;
        for summary in &summaries {
            println!(
                "{} samples={} failed_requests={}",
                summary.device, summary.samples_written, summary.failed_requests
            );
        }
        Ok(())
    } else {
        Service::new(config).run().await
    }
}

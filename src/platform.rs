#[cfg(windows)]
const TEMPLATE: &str = r#"[Service]
ExecStart=switch-recorder.exe --config C:\etc\switch-recorder\switch-recorder.toml
Restart=always
"#;

#[cfg(not(windows))]
const TEMPLATE: &str = r#"[Unit]
Description=Switch aggregate port stats recorder
After=network.target

[Service]
ExecStart=/usr/local/bin/switch-recorder --config /etc/switch-recorder/switch-recorder.toml
Restart=on-failure

[Install]
WantedBy=multi-user.target
"#;

pub fn platform_template() -> &'static str {
    TEMPLATE
}

pub fn log_platform_guidance() {
    tracing::info!(
        template = platform_template(),
        "platform-specific service descriptor available"
    );
}

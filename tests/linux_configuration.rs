#[cfg(test)]
#[cfg(target_os = "linux")]
mod linux_tests {
    use std::io::Write;
    use switch_recorder::recorder::RecorderSettings;
    use switch_recorder::{platform, AppConfig};
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn loads_linux_configuration_and_defaults() {
        let mut file = NamedTempFile::new().expect("create temp config");
        writeln!(
            file,
            r#"service_name = "linux-recorder"
record_directory = "./linux-records"
sampling_interval_ms = 2500
"#
        )
        .expect("write config");

        let config = AppConfig::load(file.path()).expect("load config");
        assert_eq!(config.service_name, "linux-recorder");
        assert_eq!(config.record_directory.as_deref(), Some("./linux-records"));
        assert_eq!(config.log_level, "info");

        let settings = RecorderSettings::from(&config);
        assert_eq!(settings.sampling_interval, Duration::from_millis(2500));
        assert_eq!(settings.stats_timeout, Duration::from_secs(10));
    }

    #[test]
    fn bundled_configuration_loads() {
        let config = AppConfig::load(AppConfig::default_path()).expect("bundled config");
        assert_eq!(config.sampling_interval_ms, 10_000);
        assert!(config.record_directory.is_none());
    }

    #[test]
    fn linux_template_includes_execstart() {
        let template = platform::platform_template();
        assert!(template.contains("ExecStart=/usr/local/bin/switch-recorder"));
    }
}

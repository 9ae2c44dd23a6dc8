use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Runs the recorder binary against a simulation script and returns the
/// scratch directory, the record directory inside it and the binary's stdout.
pub fn simulate_fixture(fixture: &str) -> (TempDir, PathBuf, String) {
    let tmp = tempfile::tempdir().expect("create tempdir");
    let records = tmp.path().join("records");
    let cfg_path = tmp.path().join("switch-recorder.toml");
    let cfg = format!(
        "service_name = \"e2e-test\"\nlog_level = \"warn\"\nsampling_interval_ms = 5\nstats_timeout_secs = 1\nrecord_directory = \"{}\"\n",
        records.display().to_string().replace('\\', "\\\\")
    );
    fs::write(&cfg_path, cfg).expect("write config");

    let output = Command::cargo_bin("switch-recorder")
        .expect("binary")
        .arg("--config")
        .arg(&cfg_path)
        .arg("--simulate")
        .arg(fixture)
        .output()
        .expect("run recorder");
    assert!(
        output.status.success(),
        "recorder failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    (tmp, records, String::from_utf8_lossy(&output.stdout).into_owned())
}

//! CLI integration tests for the simulation runner.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn write_config(name: &str, json: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("offload-sim-{}-{name}.json", std::process::id()));
    fs::write(&path, json).expect("failed to write config");
    path
}

#[test]
fn test_cli_prints_results() {
    let config = write_config(
        "quick",
        r#"{ "num_devices": 2, "time_scale": 0.0, "max_tasks_per_device": 5, "run_duration_s": 5.0 }"#,
    );
    let csv_path = std::env::temp_dir().join(format!("offload-sim-{}-trace.csv", std::process::id()));

    let output = Command::new(env!("CARGO_BIN_EXE_offload-sim"))
        .arg(&config)
        .args(["--seed", "7", "--csv"])
        .arg(&csv_path)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run offload-sim");

    assert!(
        output.status.success(),
        "offload-sim exited with {:?}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("=== Results ==="), "results block missing");
    assert!(stdout.contains("Tasks generated: 10"), "unexpected totals:\n{stdout}");

    let trace = fs::read_to_string(&csv_path).expect("trace not written");
    assert!(trace.starts_with("seq,at_ms,kind,"));

    let _ = fs::remove_file(config);
    let _ = fs::remove_file(csv_path);
}

#[test]
fn test_cli_rejects_invalid_config() {
    let config = write_config("invalid", r#"{ "num_servers": 0 }"#);

    let output = Command::new(env!("CARGO_BIN_EXE_offload-sim"))
        .arg(&config)
        .output()
        .expect("failed to run offload-sim");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid configuration"), "stderr: {stderr}");

    let _ = fs::remove_file(config);
}

#[test]
fn test_cli_missing_config_file() {
    let output = Command::new(env!("CARGO_BIN_EXE_offload-sim"))
        .arg("/nonexistent/offload-config.json")
        .output()
        .expect("failed to run offload-sim");

    assert_eq!(output.status.code(), Some(1));
}

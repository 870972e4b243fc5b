//! 命令行端到端测试（不依赖检测服务器）

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn cli(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("helmet-cli").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

#[test]
fn test_config_set_then_get() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    cli(&config)
        .args(["config", "set", "server.url", "10.0.0.7:5000/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://10.0.0.7:5000"));

    cli(&config)
        .args(["config", "get", "server.url"])
        .assert()
        .success()
        .stdout(predicate::str::diff("http://10.0.0.7:5000\n"));

    cli(&config)
        .args(["config", "get"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alert.tone").and(predicate::str::contains("default-beep")));
}

#[test]
fn test_config_rejects_bad_values() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    cli(&config)
        .args(["config", "set", "alert.tone", "Air Horn"])
        .assert()
        .failure();

    cli(&config)
        .args(["config", "set", "server.colour", "blue"])
        .assert()
        .failure();

    cli(&config).args(["config", "set", "server.url", " "]).assert().failure();
    assert!(!config.exists());
}

#[test]
fn test_config_check_reports_invalid_timing() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    cli(&config).args(["config", "check"]).assert().success();

    cli(&config)
        .args(["config", "set", "timing.poll_interval_ms", "0"])
        .assert()
        .success();
    cli(&config).args(["config", "check"]).assert().failure();
}

#[test]
fn test_tones_lists_all_with_patterns() {
    let dir = TempDir::new().unwrap();
    cli(&dir.path().join("config.toml"))
        .args(["tones", "--vibration"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("emergency-siren")
                .and(predicate::str::contains("Pulse Alert"))
                .and(predicate::str::contains("400ms on, 200ms off")),
        );
}

#[test]
fn test_health_against_closed_port_fails() {
    let dir = TempDir::new().unwrap();
    cli(&dir.path().join("config.toml"))
        .args(["--server", "127.0.0.1:9", "health", "--attempts", "1"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stderr(predicate::str::contains("after 1 attempts"));
}

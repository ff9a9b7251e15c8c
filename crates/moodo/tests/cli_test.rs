//! Integration tests for the `moodo` CLI binary.
//!
//! Argument parsing, help output, completions and error handling run
//! without any network; the remaining tests point the binary at wiremock.
#![allow(clippy::unwrap_used)]

use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `moodo` binary with env isolation.
fn moodo_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("moodo");
    cmd.env("HOME", "/tmp/moodo-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/moodo-cli-test-nonexistent")
        .env_remove("MOODO_CONFIG")
        .env_remove("MOODO_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

/// Config pointing at `server`, with box 100 configured and fast failure.
fn server_config(dir: &tempfile::TempDir, server: &MockServer) -> PathBuf {
    write_config(
        dir,
        &format!(
            r#"
api_url = "{}/api"
max_api_retry = 1
api_retry_interval_ms = 10
push = false

[[devices]]
id = 100
name = "Hall"
"#,
            server.uri()
        ),
    )
}

fn remote_box(on: bool, speeds: [u8; 4]) -> Value {
    let settings: Vec<Value> = speeds
        .iter()
        .enumerate()
        .map(|(i, s)| json!({ "slot_id": i, "fan_speed": s, "fan_active": *s > 0 }))
        .collect();
    json!({
        "device_key": 100,
        "fan_volume": 60,
        "box_status": u8::from(on),
        "settings": settings
    })
}

async fn mount_boxes(server: &MockServer, remote: Value) {
    Mock::given(method("GET"))
        .and(path("/api/boxes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "boxes": [remote] })))
        .mount(server)
        .await;
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = moodo_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_flag() {
    moodo_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Moodo")
            .and(predicate::str::contains("boxes"))
            .and(predicate::str::contains("power"))
            .and(predicate::str::contains("slot")),
    );
}

#[test]
fn test_version_flag() {
    moodo_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("moodo"));
}

#[test]
fn test_completions_zsh() {
    moodo_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_bash() {
    moodo_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Argument validation ─────────────────────────────────────────────

#[test]
fn test_invalid_output_format() {
    let output = moodo_cmd()
        .args(["--output", "invalid", "boxes", "list"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(text.contains("invalid") || text.contains("possible values"), "{text}");
}

#[test]
fn test_intensity_out_of_range() {
    moodo_cmd()
        .args(["intensity", "100", "101"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("101"));
}

#[test]
fn test_slot_requires_a_change() {
    moodo_cmd()
        .args(["slot", "100", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--active").or(predicate::str::contains("--speed")));
}

#[test]
fn test_slot_index_is_one_based() {
    moodo_cmd()
        .args(["slot", "100", "0", "--speed", "10"])
        .assert()
        .code(2);
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");

    moodo_cmd()
        .args(["config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_show_redacts_token() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
token = "super-secret-token"

[[devices]]
id = 100
name = "Hall"
"#,
    );

    moodo_cmd()
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("****")
                .and(predicate::str::contains("Hall"))
                .and(predicate::str::contains("super-secret-token").not()),
        );
}

#[test]
fn test_boxes_list_without_devices() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "token = \"t\"\n");

    moodo_cmd()
        .args(["boxes", "list", "--config"])
        .arg(&path)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("No boxes configured"));
}

// ── Against a mock API ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_boxes_list_json() {
    let server = MockServer::start().await;
    mount_boxes(&server, remote_box(true, [40, 0, 0, 0])).await;
    let dir = tempfile::tempdir().unwrap();
    let path = server_config(&dir, &server);

    let output = moodo_cmd()
        .args(["boxes", "list", "-o", "json", "--token", "t", "--config"])
        .arg(&path)
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    let listed: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listed[0]["key"], 100);
    assert_eq!(listed[0]["name"], "Hall");
    assert_eq!(listed[0]["powered"], true);
    assert_eq!(listed[0]["slots"][0]["speed"], 40);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_power_on_sends_one_request() {
    let server = MockServer::start().await;
    mount_boxes(&server, remote_box(false, [0; 4])).await;
    Mock::given(method("POST"))
        .and(path("/api/boxes/100"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let path = server_config(&dir, &server);

    moodo_cmd()
        .args(["power", "100", "on", "--token", "t", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("powered on"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_power_unchanged_sends_nothing() {
    let server = MockServer::start().await;
    mount_boxes(&server, remote_box(true, [0; 4])).await;
    Mock::given(method("POST"))
        .and(path("/api/boxes/100"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let path = server_config(&dir, &server);

    moodo_cmd()
        .args(["power", "100", "on", "--token", "t", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("already on"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slot_change_while_off_fails() {
    let server = MockServer::start().await;
    mount_boxes(&server, remote_box(false, [0; 4])).await;
    let dir = tempfile::tempdir().unwrap();
    let path = server_config(&dir, &server);

    moodo_cmd()
        .args(["slot", "100", "2", "--speed", "50", "--token", "t", "--config"])
        .arg(&path)
        .assert()
        .code(6)
        .stderr(predicate::str::contains("powered off"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unauthorized_exit_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/boxes"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/boxes/100"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let path = server_config(&dir, &server);

    moodo_cmd()
        .args(["boxes", "get", "100", "--token", "bad", "--config"])
        .arg(&path)
        .assert()
        .code(3);
}

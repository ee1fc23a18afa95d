//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run with HOME pointed at a scratch
//! directory, so the real configuration is never touched.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

const QUICK_CONFIG: &str = r#"
[engine]
tick_interval_ms = 20
event_capacity = 64

[[presets]]
name = "quick"
description = "three fast ticks"
finish_message = "done {id} after {elapsed}"
cancel_message = "stopped {id}"

[[presets.phases]]
seconds = 3
label = "only"
message = "{id} {seconds}"

[[presets.phases.alerts]]
at = 2
message = "alert {id}"

[[presets]]
name = "slow"

[[presets.phases]]
seconds = 600
"#;

/// Run a CLI command with `home` as the home directory.
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-q", "-p", "phasecount-cli", "--"])
        .args(args)
        .env("HOME", home)
        .env_remove("PHASECOUNT_ENV")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn home_with_quick_config() -> TempDir {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".config").join("phasecount");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), QUICK_CONFIG).unwrap();
    home
}

#[test]
fn test_run_prints_phase_messages_in_order() {
    let home = home_with_quick_config();
    let (stdout, stderr, code) = run_cli(home.path(), &["run", "quick", "--id", "q"]);
    assert_eq!(code, 0, "run failed: {stderr}");

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["q 3", "alert q", "q 2", "q 1", "done q after 3"]);
}

#[test]
fn test_run_with_events_reports_lifecycle() {
    let home = home_with_quick_config();
    let (_, stderr, code) = run_cli(home.path(), &["run", "quick", "--id", "ev", "--events"]);
    assert_eq!(code, 0, "run failed: {stderr}");

    let types: Vec<String> = stderr
        .lines()
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .filter_map(|v| v["type"].as_str().map(str::to_string))
        .collect();
    assert_eq!(
        types,
        vec!["CountdownStarted", "PhaseStarted", "CountdownFinished", "CountdownClosed"]
    );
}

#[test]
fn test_run_cancel_after() {
    let home = home_with_quick_config();
    let (stdout, stderr, code) =
        run_cli(home.path(), &["run", "slow", "--id", "s", "--cancel-after", "1"]);
    assert_eq!(code, 0, "run failed: {stderr}");
    assert!(stdout.trim().is_empty(), "unexpected output: {stdout}");
}

#[test]
fn test_run_unknown_preset_fails() {
    let home = home_with_quick_config();
    let (_, stderr, code) = run_cli(home.path(), &["run", "nope"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"), "stderr: {stderr}");
}

#[test]
fn test_preset_list_and_show() {
    let home = home_with_quick_config();
    let (stdout, _, code) = run_cli(home.path(), &["preset", "list"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("quick\t1 phases\t3s\tthree fast ticks"));
    assert!(stdout.contains("slow\t1 phases\t600s"));

    let (stdout, _, code) = run_cli(home.path(), &["preset", "show", "quick"]);
    assert_eq!(code, 0);
    let preset: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(preset["phases"][0]["alerts"][0]["at"], 2);
}

#[test]
fn test_default_config_has_match_start_preset() {
    let home = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["preset", "list", "--json"]);
    assert_eq!(code, 0);
    let presets: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(presets[0]["name"], "match-start");
    assert!(home
        .path()
        .join(".config/phasecount/config.toml")
        .exists());
}

#[test]
fn test_config_get_set_roundtrip() {
    let home = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "engine.tick_interval_ms"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "1000");

    let (stdout, _, code) =
        run_cli(home.path(), &["config", "set", "engine.tick_interval_ms", "250"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (stdout, _, _) = run_cli(home.path(), &["config", "get", "engine.tick_interval_ms"]);
    assert_eq!(stdout.trim(), "250");
}

#[test]
fn test_config_rejects_invalid_values() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "set", "engine.tick_interval_ms", "0"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));

    let (_, _, code) = run_cli(home.path(), &["config", "get", "engine.no_such_key"]);
    assert_eq!(code, 1);
}

#[test]
fn test_config_path_points_into_home() {
    let home = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "path"]);
    assert_eq!(code, 0);
    assert!(stdout.trim().ends_with(".config/phasecount/config.toml"));
    assert!(stdout.starts_with(home.path().to_str().unwrap()));
}

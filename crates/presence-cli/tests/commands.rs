//! End-to-end checks of the commands that do not touch the radio

use std::process::{Command, Output};

fn presence(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_presence"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run presence binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_name_set_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();

    let shown = presence(&["name", "show", "--data-dir", data_dir]);
    assert!(shown.status.success());
    assert_eq!(stdout(&shown).trim(), "(not set)");

    let set = presence(&["name", "set", "alice", "--data-dir", data_dir]);
    assert!(set.status.success());

    let shown = presence(&["name", "show", "--data-dir", data_dir]);
    assert_eq!(stdout(&shown).trim(), "alice");
}

#[test]
fn test_blank_name_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = presence(&["name", "set", " ", "--data-dir", dir.path().to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_config_prints_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[engine.scan_period]\nsecs = 9\n").unwrap();

    let output = presence(&["config", "--config", path.to_str().unwrap()]);
    assert!(output.status.success());

    let printed: toml::Value = toml::from_str(&stdout(&output)).unwrap();
    assert_eq!(printed["engine"]["scan_period"]["secs"].as_integer(), Some(9));
    assert_eq!(printed["engine"]["channel_capacity"].as_integer(), Some(256));
}

//! End-to-end tests for the `sb` binary
//!
//! Every test points the binary at its own temp directory for config, data
//! and logs, and disables the widgets that need the network.

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Sandbox {
    temp: TempDir,
    config: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data");
        let config = temp.path().join("sidebar.yml");
        fs::write(
            &config,
            format!(
                "data-dir: {}\n\
                 coordinator:\n  tick-interval-ms: 100\n\
                 widgets:\n  disabled: [Weather, Stocks, System Monitor]\n",
                data.display()
            ),
        )
        .unwrap();
        Self { temp, config }
    }

    fn data_dir(&self) -> PathBuf {
        self.temp.path().join("data")
    }

    fn sb(&self) -> Command {
        let mut cmd = Command::cargo_bin("sb").unwrap();
        cmd.env("HOME", self.temp.path())
            .env("XDG_DATA_HOME", self.temp.path().join("xdg-data"))
            .env("XDG_CONFIG_HOME", self.temp.path().join("xdg-config"))
            .arg("--config")
            .arg(&self.config);
        cmd
    }
}

#[test]
fn test_version() {
    Command::cargo_bin("sb")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_widgets_lists_enabled_widgets_in_order() {
    let sandbox = Sandbox::new();
    let output = sandbox.sb().arg("widgets").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let clock = stdout.find("Clock").unwrap();
    let notes = stdout.find("Notes").unwrap();
    let shortcuts = stdout.find("Shortcuts").unwrap();
    assert!(clock < notes && notes < shortcuts);
    assert!(!stdout.contains("Weather"));
    assert!(stdout.contains("Local time and date"));
    assert!(stdout.contains("needs: persistence"));
}

#[test]
fn test_settings_show_json_creates_defaults() {
    let sandbox = Sandbox::new();
    sandbox
        .sb()
        .args(["settings", "show", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"cpu-threshold\": 85"));
    assert!(sandbox.data_dir().join("settings.yml").exists());
}

#[test]
fn test_settings_show_clamps_hand_edited_values() {
    let sandbox = Sandbox::new();
    fs::create_dir_all(sandbox.data_dir()).unwrap();
    fs::write(
        sandbox.data_dir().join("settings.yml"),
        "system-monitor:\n  cpu-threshold: 999\n",
    )
    .unwrap();

    sandbox
        .sb()
        .args(["settings", "show", "--format", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cpu-threshold: 95"));
}

#[test]
fn test_settings_path_and_backup() {
    let sandbox = Sandbox::new();
    sandbox
        .sb()
        .args(["settings", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("settings.yml"));

    sandbox
        .sb()
        .args(["settings", "backup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No settings document"));

    sandbox.sb().args(["settings", "reset"]).assert().success();
    sandbox
        .sb()
        .args(["settings", "backup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backed up to"));
}

#[test]
fn test_shortcuts_add_list_remove() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .sb()
        .args(["shortcuts", "add", "Docs", "https://docs.rs"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let id = stdout
        .trim()
        .rsplit('(')
        .next()
        .unwrap()
        .trim_end_matches(')')
        .to_string();

    sandbox
        .sb()
        .args(["shortcuts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Docs").and(predicate::str::contains("Calculator")));

    sandbox.sb().args(["shortcuts", "remove", &id]).assert().success();
    sandbox
        .sb()
        .args(["shortcuts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Docs").not());
}

#[test]
fn test_shortcuts_remove_unknown_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .sb()
        .args(["shortcuts", "remove", "no-such-id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No shortcut with id"));
}

#[test]
fn test_run_for_a_few_ticks() {
    let sandbox = Sandbox::new();
    sandbox
        .sb()
        .args(["run", "--ticks", "2"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("Clock").and(predicate::str::contains("Notes")));
    assert!(sandbox.data_dir().join("notes.yml").exists());
}

#[test]
fn test_bad_config_is_reported() {
    let sandbox = Sandbox::new();
    fs::write(&sandbox.config, "widgets: [broken\n").unwrap();
    sandbox
        .sb()
        .arg("widgets")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load"));
}

use crate::common::{TestInstall, publish, write_config, zip_package};
use assert_cmd::Command;
use predicates::prelude::*;
use wiremock::MockServer;

fn updraft() -> Command {
    let mut cmd = Command::cargo_bin("updraft").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    updraft()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("launch"));
}

#[test]
fn test_check_without_repository_fails() {
    let install = TestInstall::new();
    let config = install.install.join("empty.toml");
    std::fs::write(&config, "").unwrap();

    updraft()
        .arg("--config")
        .arg(&config)
        .arg("--install-dir")
        .arg(&install.install)
        .arg("check")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("owner and name must be configured"));
}

#[test]
fn test_explicit_config_must_exist() {
    let install = TestInstall::new();
    updraft()
        .arg("--config")
        .arg(install.install.join("missing.toml"))
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config"));
}

#[test]
fn test_invalid_config_is_reported() {
    let install = TestInstall::new();
    let config = install.install.join("broken.toml");
    std::fs::write(&config, "[repository\nowner =").unwrap();

    updraft()
        .arg("--config")
        .arg(&config)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}

#[test]
fn test_launch_without_executable_fails() {
    let install = TestInstall::new();
    let config = install.install.join("empty.toml");
    std::fs::write(&config, "").unwrap();

    updraft()
        .arg("--config")
        .arg(&config)
        .arg("--install-dir")
        .arg(&install.install)
        .arg("launch")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No target executable configured"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_and_update_against_release_server() {
    let install = TestInstall::new();
    install.write("version.txt", "v1.0.0");
    install.write("app.exe", "app v1.0");
    install.write("old.dll", "obsolete");
    install.write("settings.ini", "operator settings");

    let server = MockServer::start().await;
    publish(
        &server,
        "v1.1.0",
        "widget-1.1.0-win-x64.zip",
        zip_package(&[("app.exe", b"app v1.1"), ("version.txt", b"1.1.0\n")]),
    )
    .await;
    let config = write_config(
        &install.install,
        &server.uri(),
        "\n[protect]\nfiles = [\"settings.ini\", \"test-updraft.toml\"]\n",
    );

    let run = |subcommand: &'static str| {
        let config = config.clone();
        let install_dir = install.install.clone();
        tokio::task::spawn_blocking(move || {
            updraft()
                .arg("--config")
                .arg(&config)
                .arg("--install-dir")
                .arg(&install_dir)
                .arg("--no-progress")
                .args(["--asset-filter", "WIN-X64"])
                .arg(subcommand)
                .assert()
        })
    };

    run("check")
        .await
        .unwrap()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Update available: 1.0.0.0 -> 1.1.0.0"));

    run("update")
        .await
        .unwrap()
        .success()
        .stderr(predicate::str::contains("Updated 1.0.0.0 -> 1.1.0.0"));

    assert_eq!(install.read("app.exe"), "app v1.1");
    assert_eq!(install.read("settings.ini"), "operator settings");
    assert!(!install.path("old.dll").exists());

    run("check")
        .await
        .unwrap()
        .success()
        .stderr(predicate::str::contains("Already up to date (1.1.0.0)"));
}

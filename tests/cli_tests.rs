use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("claude-relay")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("tail"));
}

#[test]
fn serve_refuses_outside_development_mode() {
    Command::cargo_bin("claude-relay")
        .unwrap()
        .env("RELAY_MODE", "production")
        .arg("serve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("development"));
}

#[test]
fn invalid_port_is_a_config_error() {
    Command::cargo_bin("claude-relay")
        .unwrap()
        .env("RELAY_MODE", "development")
        .env("RELAY_PORT", "not-a-port")
        .arg("serve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("RELAY_PORT"));
}

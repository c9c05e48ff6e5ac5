// Command-line surface of the shipment-sync binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn shipment_sync(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("shipment-sync").unwrap();
    cmd.current_dir(workdir.path()).env("RUST_LOG", "error");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    shipment_sync(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("steps"))
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("demo"));
}

#[test]
fn test_steps_prints_mapping_table() {
    let dir = TempDir::new().unwrap();
    shipment_sync(&dir)
        .arg("steps")
        .assert()
        .success()
        .stdout(predicate::str::contains("task_UpdateStatusReceived"))
        .stdout(predicate::str::contains("LOADED_STAGE_1"))
        .stdout(predicate::str::contains("OUT_FOR_DELIVERY"))
        .stdout(predicate::str::contains("CANCELLED"));
}

#[test]
fn test_demo_walks_shipment_to_delivery() {
    let dir = TempDir::new().unwrap();
    shipment_sync(&dir)
        .arg("demo")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"applied\":false"))
        .stdout(predicate::str::contains("final status DELIVERED run demo-run"));
}

#[test]
fn test_sync_unknown_step_reports_business_error() {
    let dir = TempDir::new().unwrap();
    shipment_sync(&dir)
        .args(["sync", "--step", "task_Unmapped", "--run-id", "r-1", "--shipment-id", "1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"signal\": \"business_error\""))
        .stdout(predicate::str::contains("FATAL_DEFINITION"));
}

#[test]
fn test_sync_rejects_malformed_variables() {
    let dir = TempDir::new().unwrap();
    shipment_sync(&dir)
        .args(["sync", "--step", "task_UpdateStatusReceived", "--run-id", "r-1"])
        .args(["--variables", "not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--variables must be a JSON object"));
}

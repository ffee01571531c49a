// crates/nysm-cli/tests/scenarios.rs
// ============================================================================
// Module: CLI Scenario Tests
// Description: Drives the `nysm test` subcommand over the demo Cart/Inventory
//              scenarios (spec §8 S1/S2) and checks its exit code.
// Purpose: Exercise the full CLI surface, not just the harness library, so a
//          regression in argument parsing or output plumbing is caught too.
// Dependencies: std::process
// ============================================================================

use std::path::PathBuf;
use std::process::Command;

fn demo_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn run_test(scenario: &str) -> std::process::ExitStatus {
    Command::new(env!("CARGO_BIN_EXE_nysm")).arg("test").arg(demo_path(scenario)).status().expect("nysm binary runs")
}

#[test]
fn s1_cart_checkout_success_passes() {
    let status = run_test("s1_checkout_success.yaml");
    assert!(status.success(), "S1 scenario should pass all assertions");
}

#[test]
fn s2_insufficient_stock_passes() {
    let status = run_test("s2_insufficient_stock.yaml");
    assert!(status.success(), "S2 scenario should pass all assertions");
}

#[test]
fn run_prints_a_trace_for_s1() {
    let output = Command::new(env!("CARGO_BIN_EXE_nysm")).arg("run").arg(demo_path("s1_checkout_success.yaml")).output().expect("nysm binary runs");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert!(stdout.contains("Inventory.reserve"), "trace should include the sync-fired reserve invocation");
}

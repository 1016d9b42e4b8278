use std::fs;
use std::path::PathBuf;

use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use tempfile::TempDir;

macro_rules! saga_sim {
    () => {
        assert_cmd::cargo::cargo_bin_cmd!("saga-sim")
    };
}

fn write_scenario(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("scenario.toml");
    fs::write(&path, content).expect("write scenario");
    path
}

const FAST_POLICIES: &str = r#"
[retry]
max_attempts = 3
base_delay_ms = 1

[compensation]
max_attempts = 3
base_delay_ms = 1
"#;

#[test]
fn successful_saga_exits_zero_and_prints_summary() {
    let dir = TempDir::new().expect("create temp dir");
    let scenario = write_scenario(
        &dir,
        &format!(
            r#"{FAST_POLICIES}
[[steps]]
service = "inventory"
operation = "reserve"
payload = {{ sku = "A-1", quantity = 2 }}

[[steps]]
service = "payments"
operation = "charge"
fail_first = 2
"#
        ),
    );

    saga_sim!()
        .arg("run")
        .arg(&scenario)
        .assert()
        .success()
        .stdout(contains("Saga completed: 2 step(s)"))
        .stdout(contains("✓ inventory.reserve (1 attempt)"))
        .stdout(contains("✓ payments.charge (3 attempts)"));
}

#[test]
fn failed_saga_compensates_completed_steps_and_exits_nonzero() {
    let dir = TempDir::new().expect("create temp dir");
    let scenario = write_scenario(
        &dir,
        &format!(
            r#"{FAST_POLICIES}
[[steps]]
service = "svc"
operation = "A"

[[steps]]
service = "svc"
operation = "B"

[[steps]]
service = "svc"
operation = "C"
always_fail = true
"#
        ),
    );

    saga_sim!()
        .arg("run")
        .arg(&scenario)
        .assert()
        .failure()
        .stdout(contains("Saga failed at step 2 (svc.C) after 3 attempt(s)"))
        .stdout(contains("Compensating 2 completed step(s)"))
        .stdout(contains("Compensation: all 2 step(s) recovered"))
        .stdout(contains("↩ svc.A (1 attempt; compensation 1 attempt)"))
        .stdout(contains("↩ svc.B (1 attempt; compensation 1 attempt)"))
        .stdout(contains("✗ svc.C (3 attempts)"))
        .stderr(contains(
            "error: saga failed at step 2 ('svc.C'); 0 step(s) left unrecovered",
        ));
}

#[test]
fn unrecovered_compensation_is_reported() {
    let dir = TempDir::new().expect("create temp dir");
    let scenario = write_scenario(
        &dir,
        &format!(
            r#"{FAST_POLICIES}
[[steps]]
service = "inventory"
operation = "reserve"
compensation = "release reserved stock"
compensation_always_fail = true

[[steps]]
service = "payments"
operation = "charge"
compensation_fail_first = 1

[[steps]]
service = "shipping"
operation = "book"
always_fail = true
"#
        ),
    );

    saga_sim!()
        .arg("run")
        .arg(&scenario)
        .assert()
        .failure()
        .stdout(contains("Compensation: 1 of 2 step(s) left unrecovered"))
        .stdout(contains(
            "⚠ compensation for step 'inventory.reserve' (release reserved stock) gave up after 3 attempt(s)",
        ))
        .stdout(contains(
            "caused by: simulated compensation failure of 'inventory.reserve' on attempt 3",
        ))
        .stdout(contains("↩ payments.charge (1 attempt; compensation 2 attempts)"))
        .stderr(contains("1 step(s) left unrecovered"));
}

#[test]
fn first_step_failure_has_nothing_to_compensate() {
    let dir = TempDir::new().expect("create temp dir");
    let scenario = write_scenario(
        &dir,
        &format!(
            r#"{FAST_POLICIES}
[[steps]]
service = "inventory"
operation = "reserve"
always_fail = true

[[steps]]
service = "payments"
operation = "charge"
"#
        ),
    );

    saga_sim!()
        .arg("run")
        .arg(&scenario)
        .assert()
        .failure()
        .stdout(contains("No completed steps to compensate"))
        .stdout(contains("payments.charge").not());
}

#[test]
fn max_attempts_flag_overrides_scenario_policy() {
    let dir = TempDir::new().expect("create temp dir");
    let scenario = write_scenario(
        &dir,
        &format!(
            r#"{FAST_POLICIES}
[[steps]]
service = "payments"
operation = "charge"
fail_first = 4
"#
        ),
    );

    saga_sim!()
        .arg("run")
        .arg(&scenario)
        .assert()
        .failure()
        .stdout(contains("after 3 attempt(s)"));

    saga_sim!()
        .args(["run", "--max-attempts", "5", "--base-delay-ms", "1"])
        .arg(&scenario)
        .assert()
        .success()
        .stdout(contains("✓ payments.charge (5 attempts)"));
}

#[test]
fn empty_scenario_succeeds() {
    let dir = TempDir::new().expect("create temp dir");
    let scenario = write_scenario(&dir, FAST_POLICIES);

    saga_sim!()
        .arg("run")
        .arg(&scenario)
        .assert()
        .success()
        .stdout(contains("Saga completed: 0 step(s)"));
}

#[test]
fn zero_attempt_override_is_rejected() {
    let dir = TempDir::new().expect("create temp dir");
    let scenario = write_scenario(&dir, FAST_POLICIES);

    saga_sim!()
        .args(["run", "--max-attempts", "0"])
        .arg(&scenario)
        .assert()
        .failure()
        .stderr(contains("error: invalid [retry] policy"))
        .stderr(contains("caused by: retry policy needs at least one attempt"));
}

#[test]
fn verbose_flag_emits_step_logs() {
    let dir = TempDir::new().expect("create temp dir");
    let scenario = write_scenario(
        &dir,
        &format!(
            r#"{FAST_POLICIES}
[[steps]]
service = "inventory"
operation = "reserve"
"#
        ),
    );

    saga_sim!()
        .args(["-vv", "run"])
        .arg(&scenario)
        .env_remove("RUST_LOG")
        .assert()
        .success()
        .stderr(contains("step completed"));
}

//! Integration tests for hive-cli, spawning the compiled `hive` binary
//! against the builtin demo scenarios.

use assert_cmd::Command;
use predicates::prelude::*;

fn hive() -> Command {
    Command::cargo_bin("hive").unwrap()
}

#[test]
fn scenarios_lists_all_builtin_names() {
    hive()
        .arg("scenarios")
        .assert()
        .success()
        .stdout(predicate::str::contains("hello-world"))
        .stdout(predicate::str::contains("branch-on-score"))
        .stdout(predicate::str::contains("fan-out-join"));
}

#[test]
fn graph_unknown_scenario_fails_with_a_helpful_message() {
    hive()
        .args(["graph", "not-a-real-scenario"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown scenario"));
}

#[test]
fn graph_prints_nodes_and_join_edges() {
    hive()
        .args(["graph", "fan-out-join"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"start: ["dispatch"]"#))
        .stdout(predicate::str::contains("join edges:"))
        .stdout(predicate::str::contains(r#"["worker"] -> review"#));
}

#[test]
fn run_hello_world_finishes_with_the_expected_projection() {
    hive()
        .args(["run", "hello-world"])
        .assert()
        .success()
        .stdout(predicate::str::contains("outcome: Finished"))
        .stdout(predicate::str::contains("message = \"Hello from Hive!\""));
}

#[test]
fn run_branch_on_score_routes_to_pass() {
    hive()
        .args(["run", "branch-on-score"])
        .assert()
        .success()
        .stdout(predicate::str::contains("result = \"passed\""));
}

#[test]
fn run_fan_out_join_interrupts_without_a_resume_payload() {
    hive()
        .args(["run", "fan-out-join"])
        .assert()
        .success()
        .stdout(predicate::str::contains("outcome: Interrupted"))
        .stdout(predicate::str::contains("Approve results?"));
}

#[test]
fn run_fan_out_join_resumes_to_completion_when_given_a_payload() {
    hive()
        .args(["run", "fan-out-join", "--resume-payload", "\"approved\""])
        .assert()
        .success()
        .stdout(predicate::str::contains("results = [\"A\",\"B\",\"C\"]"))
        .stdout(predicate::str::contains("status = \"completed\""));
}

#[test]
fn checkpoints_records_one_entry_per_step_with_no_duplicates() {
    let output = hive().args(["checkpoints", "branch-on-score"]).assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2, "expected exactly one checkpoint per step, got:\n{text}");

    let ids: Vec<&str> = lines.iter().map(|line| line.split("id=").nth(1).unwrap().split_whitespace().next().unwrap()).collect();
    assert_ne!(ids[0], ids[1], "each step must produce a distinct checkpoint");
}

//! End-to-end tests for the `caseflow` binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use caseflow::exit_codes;

fn caseflow(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_caseflow"))
        .args(args)
        .current_dir(root)
        .env("RUST_LOG", "off")
        .output()
        .expect("run caseflow")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

#[test]
fn init_open_apply_show() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();

    let init = caseflow(root, &["init"]);
    assert_eq!(init.status.code(), Some(exit_codes::OK));
    assert!(root.join(".caseflow/config.toml").is_file());

    let open = caseflow(root, &["open", "case-1", "--title", "Checkout errors"]);
    assert_eq!(open.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout_json(&open)["status"], "consulting");

    fs::write(
        root.join("turn1.json"),
        r#"{"evidence":[{"summary":"500s on checkout","analysis":"started at 09:12"}]}"#,
    )
    .expect("write update");
    let apply = caseflow(root, &["apply", "case-1", "turn1.json"]);
    assert_eq!(apply.status.code(), Some(exit_codes::OK));
    let result = stdout_json(&apply);
    assert_eq!(result["case"]["turn_count"], 1);
    assert_eq!(result["record"]["progress_made"], true);
    assert!(root.join(".caseflow/turns/case-1/1/meta.json").is_file());

    let show = caseflow(root, &["show", "case-1"]);
    assert_eq!(show.status.code(), Some(exit_codes::OK));
    let report = String::from_utf8(show.stdout).expect("utf8");
    assert!(report.contains("# Checkout errors (`case-1`)"));
    assert!(report.contains("- [x] symptom_verified"));
}

#[test]
fn rejected_update_exits_with_rejected_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    caseflow(root, &["init"]);
    caseflow(root, &["open", "case-1"]);

    fs::write(root.join("bad.json"), r#"{"status_request":"resolved"}"#).expect("write");
    let apply = caseflow(root, &["apply", "case-1", "bad.json"]);
    assert_eq!(apply.status.code(), Some(exit_codes::REJECTED));
    let stderr = String::from_utf8_lossy(&apply.stderr);
    assert!(stderr.contains("consulting"));

    let transition = caseflow(root, &["transition", "case-1", "resolved"]);
    assert_eq!(transition.status.code(), Some(exit_codes::REJECTED));
}

#[test]
fn missing_workspace_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = caseflow(temp.path(), &["show", "case-1"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("caseflow init"));
}

#[test]
fn escalation_request_exits_with_escalation_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    caseflow(root, &["init"]);
    caseflow(root, &["open", "case-1"]);

    fs::write(
        root.join("turn1.json"),
        r#"{"user_input":"please escalate this to the database team"}"#,
    )
    .expect("write");
    let apply = caseflow(root, &["apply", "case-1", "turn1.json"]);
    assert_eq!(apply.status.code(), Some(exit_codes::ESCALATION));
    assert_eq!(stdout_json(&apply)["escalation"]["trigger"], "user_requested");

    let escalation = caseflow(root, &["escalation", "case-1"]);
    assert_eq!(escalation.status.code(), Some(exit_codes::ESCALATION));
    assert_eq!(stdout_json(&escalation)["active"], true);
}

#[test]
fn replay_applies_cases_in_parallel() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    caseflow(root, &["init"]);

    let replay_dir = root.join("replay");
    for case_id in ["case-a", "case-b"] {
        let dir = replay_dir.join(case_id);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("01.json"), r#"{"status_request":"investigating"}"#).expect("write");
        fs::write(
            dir.join("02.json"),
            r#"{"evidence":[{"summary":"p99 latency graph"}]}"#,
        )
        .expect("write");
    }

    let replay = caseflow(root, &["replay", "replay"]);
    assert_eq!(replay.status.code(), Some(exit_codes::OK));
    let summaries = stdout_json(&replay);
    assert_eq!(summaries[0]["case_id"], "case-a");
    assert_eq!(summaries[1]["case_id"], "case-b");
    assert_eq!(summaries[0]["turns_applied"], 2);
    assert_eq!(summaries[1]["status"], "investigating");
    assert!(root.join(".caseflow/cases/case-b.json").is_file());
}

#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const ARGO_APP: &str = "\
apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: checkout-service
spec:
  project: default
";

fn stackplan(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("stackplan").unwrap();
    cmd.current_dir(dir.path())
        .env("STACKPLAN_SOURCE", dir.path())
        .env_remove("STACKPLAN_AGE_IDENTITY")
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &TempDir, rel: &str, content: &str) {
    let path = dir.path().join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn argocd_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(&dir, "deploy/app.yaml", ARGO_APP);
    dir
}

fn write_plan(dir: &TempDir) {
    stackplan(dir)
        .args(["plan", "--name", "checkout"])
        .assert()
        .success();
}

// ---------------------------------------------------------------------------
// stackplan plan
// ---------------------------------------------------------------------------

#[test]
fn plan_dry_run_prints_document_and_writes_nothing() {
    let dir = argocd_repo();
    let output = stackplan(&dir)
        .args(["plan", "--name", "checkout", "--dry-run"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["name"], "checkout");
    assert_eq!(doc["actions"][0]["name"], "argocdSync");
    assert_eq!(doc["actions"][0]["stage"], "prerelease");
    assert_eq!(
        doc["actions"][0]["inputs"],
        serde_json::json!(["ARGOCD_SERVER", "ARGOCD_AUTH_TOKEN"])
    );
    assert!(!dir.path().join("checkout.plan").exists());
}

#[test]
fn plan_writes_plan_file() {
    let dir = argocd_repo();
    stackplan(&dir)
        .args(["plan", "--name", "checkout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("argocdSync"))
        .stdout(predicate::str::contains("checkout.plan"));

    let content = std::fs::read_to_string(dir.path().join("checkout.plan")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(doc["actions"].as_array().unwrap().len(), 1);
}

#[test]
fn plan_out_dir_places_file() {
    let dir = argocd_repo();
    let out = TempDir::new().unwrap();
    stackplan(&dir)
        .args(["plan", "--name", "checkout", "--out-dir"])
        .arg(out.path())
        .assert()
        .success();
    assert!(out.path().join("checkout.plan").exists());
    assert!(!dir.path().join("checkout.plan").exists());
}

#[test]
fn plan_require_actions_fails_on_empty_repo() {
    let dir = TempDir::new().unwrap();
    stackplan(&dir)
        .args(["plan", "--name", "empty", "--dry-run", "--require-actions"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("error:"))
        .stderr(predicate::str::contains("no actions were admitted"));
}

#[test]
fn plan_rejects_invalid_name() {
    let dir = argocd_repo();
    stackplan(&dir)
        .args(["plan", "--name", "../escape", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid plan name"));
}

// ---------------------------------------------------------------------------
// stackplan explain
// ---------------------------------------------------------------------------

#[test]
fn explain_lists_stages_inputs_and_fields() {
    let dir = argocd_repo();
    write_plan(&dir);
    stackplan(&dir)
        .args(["explain", "checkout.plan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan: checkout"))
        .stdout(predicate::str::contains("prerelease"))
        .stdout(predicate::str::contains("ARGOCD_AUTH_TOKEN"))
        .stdout(predicate::str::contains("argocd.insecure"));
}

#[test]
fn explain_json_groups_by_stage() {
    let dir = argocd_repo();
    write_plan(&dir);
    let output = stackplan(&dir)
        .args(["--json", "explain", "checkout.plan"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["stages"][0]["stage"], "prerelease");
    assert_eq!(value["stages"][0]["actions"][0]["name"], "argocdSync");
}

#[test]
fn explain_missing_plan_fails() {
    let dir = TempDir::new().unwrap();
    stackplan(&dir)
        .args(["explain", "nope.plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load plan"));
}

// ---------------------------------------------------------------------------
// stackplan actions
// ---------------------------------------------------------------------------

#[test]
fn actions_lists_catalog() {
    let dir = TempDir::new().unwrap();
    stackplan(&dir)
        .arg("actions")
        .assert()
        .success()
        .stdout(predicate::str::contains("argocdSync"))
        .stdout(predicate::str::contains("containerPublish"))
        .stdout(predicate::str::contains("argoproj/argocd"));
}

#[test]
fn actions_json_carries_stage() {
    let dir = TempDir::new().unwrap();
    let output = stackplan(&dir).args(["actions", "--json"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let argo = value
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["name"] == "argocdSync")
        .unwrap();
    assert_eq!(argo["stage"], "prerelease");
}

// ---------------------------------------------------------------------------
// stackplan run
// ---------------------------------------------------------------------------

#[test]
fn run_without_inputs_fails_before_provisioning() {
    let dir = argocd_repo();
    write_plan(&dir);
    stackplan(&dir)
        .args(["run", "checkout.plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("ARGOCD_SERVER"));
}

#[test]
fn run_rejects_unknown_stage() {
    let dir = argocd_repo();
    write_plan(&dir);
    stackplan(&dir)
        .args(["run", "checkout.plan", "--stages", "deploy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid stage"));
}

#[test]
fn run_with_everything_excluded_succeeds() {
    let dir = argocd_repo();
    write_plan(&dir);
    stackplan(&dir)
        .args(["run", "checkout.plan", "--exclude", "argocdSync"])
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped"));
}

#[test]
fn run_rejects_unknown_action() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "odd.plan",
        r#"{"name":"odd","actions":[{"name":"helmUpgrade","inputs":[],"stage":"release"}],"fields":[]}"#,
    );
    stackplan(&dir)
        .args(["run", "odd.plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown action 'helmUpgrade'"));
}

// ---------------------------------------------------------------------------
// stackplan stack
// ---------------------------------------------------------------------------

#[test]
fn stack_init_writes_inputs_template() {
    let dir = argocd_repo();
    write_plan(&dir);
    stackplan(&dir)
        .args(["stack", "init", "--from-plan", "checkout.plan"])
        .assert()
        .success();

    let template = std::fs::read_to_string(dir.path().join("inputs.env")).unwrap();
    assert!(template.contains("\nexport ARGOCD_SERVER=\n"));
    assert!(template.contains("\nexport ARGOCD_AUTH_TOKEN=\n"));
}

#[test]
fn stack_init_refuses_to_overwrite() {
    let dir = argocd_repo();
    write_plan(&dir);
    write(&dir, "inputs.env", "ARGOCD_SERVER=kept\n");
    stackplan(&dir)
        .args(["stack", "init", "--from-plan", "checkout.plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    let content = std::fs::read_to_string(dir.path().join("inputs.env")).unwrap();
    assert_eq!(content, "ARGOCD_SERVER=kept\n");
}

#[test]
fn stack_encrypt_rejects_empty_values() {
    let dir = TempDir::new().unwrap();
    write(&dir, "inputs.env", "ARGOCD_SERVER=argocd.example.com\nARGOCD_AUTH_TOKEN=\n");
    stackplan(&dir)
        .args([
            "stack",
            "encrypt",
            "inputs.env",
            "--recipient",
            "age1qyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqs3290gq",
            "--name",
            "production",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ARGOCD_AUTH_TOKEN"));
}

#[test]
fn stack_encrypt_rejects_bad_recipient() {
    let dir = TempDir::new().unwrap();
    write(&dir, "inputs.env", "ARGOCD_SERVER=argocd.example.com\n");
    stackplan(&dir)
        .args([
            "stack",
            "encrypt",
            "inputs.env",
            "--recipient",
            "ssh-ed25519 AAAA",
            "--name",
            "production",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid age recipient"));
}

#[test]
fn stack_names_reports_missing_inputs() {
    let dir = argocd_repo();
    write_plan(&dir);
    write(
        &dir,
        "production.json",
        r#"{"name":"production","recipient":"age1example","inputs":{"ARGOCD_SERVER":"-----BEGIN AGE ENCRYPTED FILE-----"}}"#,
    );
    stackplan(&dir)
        .args(["stack", "names", "production.json", "--plan", "checkout.plan"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("ARGOCD_AUTH_TOKEN"))
        .stdout(predicate::str::contains("missing"));
}

// ---------------------------------------------------------------------------
// stackplan config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_defaults_are_clean() {
    let dir = TempDir::new().unwrap();
    stackplan(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    write(&dir, ".stackplan.yaml", "node:\n  version: \"\"\n");
    stackplan(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("node.version is empty"));
}

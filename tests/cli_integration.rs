use std::path::{Path, PathBuf};
use std::process::Command;

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).expect("write fixture");
        path
    }

    fn run(&self, args: &[&str]) -> (bool, serde_json::Value) {
        let output = self.command(args).output().expect("run rulekit");
        let stdout = String::from_utf8_lossy(&output.stdout);
        let response: serde_json::Value = serde_json::from_str(stdout.trim())
            .unwrap_or_else(|e| panic!("bad response {:?}: {}", stdout, e));
        assert_eq!(response["success"].as_bool(), Some(output.status.success()));
        (output.status.success(), response)
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_rulekit"));
        cmd.current_dir(self.dir.path())
            .arg("--store")
            .arg(self.path("rules.json"))
            .arg("--audit-log")
            .arg(self.path("audit.jsonl"))
            .args(args);
        cmd
    }
}

fn audit_lines(path: &Path) -> Vec<serde_json::Value> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    content
        .lines()
        .map(|line| serde_json::from_str(line).expect("audit line is JSON"))
        .collect()
}

#[test]
fn add_combine_evaluate_round_trip() {
    let ws = Workspace::new();

    let (ok, response) = ws.run(&["add", " adults ", "Age > 18"]);
    assert!(ok);
    assert_eq!(response["data"]["id"], "adults");
    assert_eq!(response["data"]["expression"], "age > 18");

    let (ok, _) = ws.run(&["add", "region", "country = 'US' OR country = 'CA'"]);
    assert!(ok);

    let (ok, response) = ws.run(&["combine", "region", "adults"]);
    assert!(ok);
    assert_eq!(
        response["data"]["combined_expression"],
        "age > 18 AND (country = 'us' or country = 'ca')"
    );

    let (ok, response) = ws.run(&[
        "evaluate",
        "region",
        "adults",
        "--data",
        r#"{"age": 25, "country": "us", "tags": ["x"], "note": null}"#,
    ]);
    assert!(ok);
    assert_eq!(response["data"]["result"], true);

    let (ok, response) = ws.run(&[
        "evaluate",
        "adults",
        "--data",
        r#"{"country": "us"}"#,
    ]);
    assert!(!ok);
    assert!(response["error"].as_str().unwrap().contains("age"));

    let audit = audit_lines(&ws.path("audit.jsonl"));
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0]["result"], true);
    assert_eq!(audit[0]["rule_ids"][0], "region");
    assert_eq!(audit[0]["query_data"]["tags"][0], "x");
}

#[test]
fn invalid_rule_is_rejected_and_not_stored() {
    let ws = Workspace::new();

    let (ok, response) = ws.run(&["add", "broken", "age >= 18"]);
    assert!(!ok);
    assert!(
        response["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid rule syntax")
    );

    let (ok, response) = ws.run(&["list"]);
    assert!(ok);
    assert_eq!(response["data"].as_array().unwrap().len(), 0);
}

#[test]
fn unknown_rules_report_no_rules_found() {
    let ws = Workspace::new();
    let (ok, response) = ws.run(&["combine", "ghost"]);
    assert!(!ok);
    assert_eq!(response["error"], "No valid rules found");
}

#[test]
fn batch_evaluation_preserves_record_order() {
    let ws = Workspace::new();
    ws.run(&["add", "adults", "age > 18"]);

    let records = ws.write(
        "records.jsonl",
        "{\"age\": 30}\n{\"age\": 12}\n\n{\"name\": \"x\"}\n{\"age\": 19.5}\n",
    );
    let (ok, response) = ws.run(&["evaluate", "adults", "--records", records.to_str().unwrap()]);
    assert!(ok);

    let results = response["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 4);
    assert_eq!(results[0]["result"], true);
    assert_eq!(results[1]["result"], false);
    assert!(results[2]["error"].is_string());
    assert_eq!(results[3]["result"], true);
    assert_eq!(results[3]["index"], 3);

    assert_eq!(audit_lines(&ws.path("audit.jsonl")).len(), 3);
}

#[test]
fn import_list_and_clean() {
    let ws = Workspace::new();
    let rules = ws.write(
        "rules.yaml",
        "rules:\n  - id: a\n    expression: a = 1\n  - id: b\n    expression: b > 2 AND c < 3\n",
    );

    let (ok, response) = ws.run(&["import", rules.to_str().unwrap()]);
    assert!(ok);
    assert_eq!(response["data"]["imported"], 2);

    let output = ws
        .command(&["list", "--format", "yaml"])
        .output()
        .expect("run rulekit");
    assert!(output.status.success());
    let yaml = String::from_utf8_lossy(&output.stdout);
    assert!(yaml.contains("id: a"));
    assert!(yaml.contains("b > 2 and c < 3"));

    let (ok, response) = ws.run(&["clean"]);
    assert!(ok);
    assert_eq!(response["data"]["removed"], 2);

    let (_, response) = ws.run(&["list"]);
    assert_eq!(response["data"].as_array().unwrap().len(), 0);
}

#[test]
fn check_prints_canonical_form() {
    let ws = Workspace::new();
    let (ok, response) = ws.run(&["check", "a = 1 and b = 2 or c = 3"]);
    assert!(ok);
    assert_eq!(response["data"]["canonical"], "a = 1 AND (b = 2 OR c = 3)");
    assert_eq!(response["data"]["operands"], 3);

    let (ok, response) = ws.run(&["check", "(a = 1"]);
    assert!(!ok);
    assert!(
        response["error"]
            .as_str()
            .unwrap()
            .contains("missing 1 closing parenthesis")
    );
}

#[test]
fn config_file_disables_lowercasing() {
    let ws = Workspace::new();
    let config = ws.write("rulekit.yaml", "rules:\n  lowercase_expressions: false\n");

    let output = ws
        .command(&[
            "--config",
            config.to_str().unwrap(),
            "add",
            "r",
            "Country = 'US'",
        ])
        .output()
        .expect("run rulekit");
    assert!(output.status.success());
    let response: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("response is JSON");
    assert_eq!(response["data"]["expression"], "Country = 'US'");

    let (ok, response) = ws.run(&[
        "--config",
        config.to_str().unwrap(),
        "evaluate",
        "r",
        "--data",
        r#"{"COUNTRY": "US"}"#,
    ]);
    assert!(ok);
    assert_eq!(response["data"]["result"], true);
}

use std::path::Path;
use std::process::Command;

const SOURCE: &str = "\
x = 1
def f():
    y = 2
    return y

class C:
    def m(self):
        return 3

def gen():
    yield x
";

fn run_stepwise(args: &[&str], source: &str) -> (String, String, bool) {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("prog.py");
    std::fs::write(&file, source).unwrap();
    run_on(&file, args)
}

fn run_on(file: &Path, args: &[&str]) -> (String, String, bool) {
    // The file goes right after the subcommand, before its own arguments.
    let idx = args
        .iter()
        .position(|arg| matches!(*arg, "lines" | "resolve" | "function"))
        .expect("a subcommand");
    let output = Command::new(env!("CARGO_BIN_EXE_stepwise"))
        .args(&args[..=idx])
        .arg(file)
        .args(&args[idx + 1..])
        .output()
        .expect("failed to execute stepwise");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn assert_success(args: &[&str], source: &str) -> String {
    let (stdout, stderr, success) = run_stepwise(args, source);
    assert!(success, "command should succeed, stderr:\n{}", stderr);
    stdout
}

fn assert_failure(args: &[&str], source: &str) -> String {
    let (_, stderr, success) = run_stepwise(args, source);
    assert!(!success, "command should fail");
    stderr
}

#[test]
fn test_lines() {
    let stdout = assert_success(&["lines"], SOURCE);
    assert_eq!(
        stdout,
        "\
<module> Module @1: 1 2 6 10
  f Function @2: 3 4
  C Class @6: 7
    m Function @7: 8
  gen Function resumable @10: 11
"
    );
}

#[test]
fn test_lines_json() {
    let stdout = assert_success(&["--format", "json", "lines"], SOURCE);
    let root: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(root["name"], "<module>");
    assert_eq!(root["kind"], "module");
    assert_eq!(root["children"][2]["name"], "gen");
    assert_eq!(root["children"][2]["resumable"], true);
}

#[test]
fn test_resolve() {
    let stdout = assert_success(&["resolve", "1", "2", "5", "9"], SOURCE);
    assert_eq!(
        stdout,
        "\
1 -> 1 (unit starting at 1)
2 -> 3 (unit starting at 2)
5 -> 8 (unit starting at 7)
9 -> 11 (unit starting at 10)
"
    );
}

#[test]
fn test_resolve_json() {
    let (stdout, _, success) = run_stepwise(&["--format", "json", "resolve", "7", "12"], SOURCE);
    assert!(!success);
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(results[0]["requested"], 7);
    assert_eq!(results[0]["position"]["subunit_start"], 7);
    assert_eq!(results[0]["position"]["line"], 8);
    assert!(results[0].get("error").is_none());
    assert_eq!(results[1]["requested"], 12);
    assert!(
        results[1]["error"]
            .as_str()
            .unwrap()
            .contains("line 12 is after the last valid statement")
    );
}

#[test]
fn test_resolve_past_end_fails() {
    let stderr = assert_failure(&["resolve", "40"], SOURCE);
    assert!(stderr.contains("line 40 is after the last valid statement"));
}

#[test]
fn test_function() {
    assert_eq!(assert_success(&["function", "f"], SOURCE), "2\n");
    assert_eq!(assert_success(&["function", "C.m"], SOURCE), "7\n");

    let stdout = assert_success(&["--format", "json", "function", "gen"], SOURCE);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value, serde_json::json!({ "name": "gen", "line": 10 }));
}

#[test]
fn test_function_not_found() {
    let stderr = assert_failure(&["function", "m"], SOURCE);
    assert!(stderr.contains("function \"m\" not found"));
}

#[test]
fn test_syntax_error() {
    let stderr = assert_failure(&["lines"], "def f(\n    x = 1\n");
    assert!(stderr.contains("prog.py"));
}

#[test]
fn test_empty_file() {
    let stderr = assert_failure(&["lines"], "");
    assert!(stderr.contains("no lines"));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, success) = run_on(&dir.path().join("missing.py"), &["lines"]);
    assert!(!success);
    assert!(stderr.contains("missing.py"));
}

#[test]
fn test_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("stepwise.toml");

    std::fs::write(&config, "skip = [\"lib.*\"]\ncase_insensitive_paths = false\n").unwrap();
    let config_arg = config.to_str().unwrap();
    let stdout = assert_success(&["--config", config_arg, "function", "f"], SOURCE);
    assert_eq!(stdout, "2\n");

    std::fs::write(&config, "skip = [\"lib.*\"]\ncolour = true\n").unwrap();
    let stderr = assert_failure(&["--config", config_arg, "function", "f"], SOURCE);
    assert!(stderr.contains("failed to parse config"));
}

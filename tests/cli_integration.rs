//! CLI integration tests
//!
//! Drives the built binary end-to-end.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Get path to the taintbox binary
fn taintbox_bin() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test binary name
    path.pop(); // Remove deps/
    path.push("taintbox");
    path
}

fn run_taintbox(args: &[&str]) -> Output {
    Command::new(taintbox_bin())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run taintbox")
}

fn write_doc(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

const DOC: &str = r#"{
  "host": {
    "motd": {"tainted-scalar": "{{ lookup('pipe', 'id') }}"},
    "password": {"encrypted-scalar": "taintbox-vault1:AAAA"},
    "facts": {"tainted-object": ["TaintedMap", [{"os": "linux"}], {}]}
  },
  "list": [{"tainted-scalar": "in-array"}],
  "empty": {"tainted-scalar": ""}
}"#;

#[test]
fn test_inspect_lists_extended_values() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_doc(&temp_dir, "doc.json", DOC);

    let result = run_taintbox(&["inspect", "-i", path_str(&input)]);
    assert!(
        result.status.success(),
        "inspect failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let stdout = String::from_utf8(result.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "/host/motd\ttainted-scalar",
            "/host/password\tencrypted-scalar",
            "/host/facts\ttainted-object",
        ]
    );
    assert!(
        result.stderr.is_empty(),
        "unexpected stderr: {}",
        String::from_utf8_lossy(&result.stderr)
    );
}

#[test]
fn test_inspect_with_array_recursion_and_presence() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_doc(&temp_dir, "doc.json", DOC);

    let result = run_taintbox(&[
        "--recurse-arrays",
        "--presence-sentinels",
        "inspect",
        "-i",
        path_str(&input),
    ]);
    assert!(result.status.success());

    let stdout = String::from_utf8(result.stdout).unwrap();
    assert!(stdout.contains("/list/0\ttainted-scalar"));
    assert!(stdout.contains("/empty\ttainted-scalar"));
}

#[test]
fn test_normalize_is_stable() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_doc(&temp_dir, "doc.json", DOC);
    let first = temp_dir.path().join("first.json");
    let second = temp_dir.path().join("second.json");

    let result = run_taintbox(&["normalize", "-i", path_str(&input), "-o", path_str(&first)]);
    assert!(
        result.status.success(),
        "normalize failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    let result = run_taintbox(&["normalize", "-i", path_str(&first), "-o", path_str(&second)]);
    assert!(result.status.success());

    let first_text = fs::read_to_string(&first).unwrap();
    assert_eq!(first_text, fs::read_to_string(&second).unwrap());

    let normalized: serde_json::Value = serde_json::from_str(&first_text).unwrap();
    assert_eq!(
        normalized["host"]["facts"],
        serde_json::json!({"tainted-object": ["TaintedMap", [{"os": "linux"}], {}]})
    );
    assert_eq!(normalized["empty"], serde_json::json!({"tainted-scalar": ""}));
}

#[test]
fn test_normalize_keeps_key_order() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_doc(
        &temp_dir,
        "doc.json",
        r#"{"z": 1, "a": {"tainted-scalar": "x"}, "m": {"y": 2, "b": 3}}"#,
    );
    let output = temp_dir.path().join("out.json");

    let result = run_taintbox(&["normalize", "-i", path_str(&input), "-o", path_str(&output)]);
    assert!(result.status.success());
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "{\"z\":1,\"a\":{\"tainted-scalar\":\"x\"},\"m\":{\"y\":2,\"b\":3}}\n"
    );
}

#[test]
fn test_normalize_pretty() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_doc(&temp_dir, "doc.json", r#"{"a": {"tainted-scalar": "x"}}"#);
    let output = temp_dir.path().join("out.json");

    let result = run_taintbox(&[
        "normalize",
        "--pretty",
        "-i",
        path_str(&input),
        "-o",
        path_str(&output),
    ]);
    assert!(result.status.success());
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "{\n  \"a\": {\n    \"tainted-scalar\": \"x\"\n  }\n}\n"
    );
}

#[test]
fn test_unknown_envelope_type_fails() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_doc(
        &temp_dir,
        "doc.json",
        r#"{"x": {"tainted-object": ["HostVars", [], {}]}}"#,
    );
    let output = temp_dir.path().join("out.json");

    let result = run_taintbox(&["normalize", "-i", path_str(&input), "-o", path_str(&output)]);
    assert!(!result.status.success());
    assert!(!output.exists());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("HostVars"), "stderr: {}", stderr);
}

#[test]
fn test_malformed_json_fails() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_doc(&temp_dir, "doc.json", "{\"a\": ");

    let result = run_taintbox(&["inspect", "-i", path_str(&input)]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("malformed JSON"));
}

#[test]
fn test_missing_input_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.json");

    let result = run_taintbox(&["inspect", "-i", path_str(&missing)]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("failed to read from"));
}

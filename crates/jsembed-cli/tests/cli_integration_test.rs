//! CLI Integration Tests
//!
//! Runs the `jsembed` binary and checks the JSON it prints.

use serde_json::{json, Value};
use std::process::{Command, Output};

// ============================================================================
// Test Helpers
// ============================================================================

fn jsembed(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_jsembed"))
        .args(args)
        .env_remove("JSEMBED_SCRIPTS_DIR")
        .env("RUST_LOG", "error")
        .output()
        .expect("failed to run jsembed")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

// ============================================================================
// Commands
// ============================================================================

#[test]
fn test_exec_with_bindings() {
    let output = jsembed(&["exec", "price * quantity", "-b", r#"{"price": 2.5, "quantity": 4}"#]);
    assert!(output.status.success());

    let response = stdout_json(&output);
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["result"], json!(10));
}

#[test]
fn test_exec_custom_uses_prelude() {
    let output = jsembed(&["exec", "--custom", "parseCSV(csv).rowCount", "-b", r#"{"csv": "a,b\n1,2\n3,4"}"#]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["result"], json!(2));
}

#[test]
fn test_exec_failure_exits_nonzero() {
    let output = jsembed(&["exec", "throw new Error('nope')"]);
    assert!(!output.status.success());

    let response = stdout_json(&output);
    assert_eq!(response["success"], json!(false));
    assert_eq!(response["error_kind"], json!("evaluation"));
    assert!(response["error"].as_str().unwrap().contains("nope"));
}

#[test]
fn test_invoke_discount() {
    let output = jsembed(&[
        "invoke",
        "business-rules",
        "calculateAdvancedDiscount",
        "-p",
        r#"{"price": 100.0, "quantity": 15, "customerTier": "gold"}"#,
    ]);
    assert!(output.status.success());

    let response = stdout_json(&output);
    assert!(response["result"]["finalPrice"].as_f64().unwrap() < 1500.0);
}

#[test]
fn test_invoke_unknown_script() {
    let output = jsembed(&["invoke", "nope", "f"]);
    assert!(!output.status.success());
    assert_eq!(stdout_json(&output)["error_kind"], json!("script_not_found"));
}

#[test]
fn test_invoke_from_scripts_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.js"), "function greet(p) { return 'hello ' + p.name; }").unwrap();

    let dir_arg = dir.path().to_str().unwrap();
    let output = jsembed(&["--scripts-dir", dir_arg, "invoke", "hello", "greet", "-p", r#"{"name": "world"}"#]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["result"], json!("hello world"));
}

#[test]
fn test_deadline_flag() {
    let output = jsembed(&["--max-execution-time-ms", "200", "exec", "while (true) {}"]);
    assert!(!output.status.success());

    let response = stdout_json(&output);
    assert_eq!(response["error_kind"], json!("timeout"));
    assert!(response["error"].as_str().unwrap().contains("200"));
}

#[test]
fn test_invoke_rejects_intrinsics() {
    let output = jsembed(&["invoke", "math-utils", "eval", "-p", r#"{"code": "1"}"#]);
    assert!(!output.status.success());
    assert_eq!(stdout_json(&output)["error_kind"], json!("evaluation"));
}

#[test]
fn test_invoke_params_must_be_object() {
    let output = jsembed(&["invoke", "business-rules", "analyzeData", "-p", "[1, 2, 3]"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("expected a JSON object"));
}

#[test]
fn test_logic_command() {
    let output = jsembed(&[
        "logic",
        "calculateDiscount",
        "-i",
        r#"{"price": 10, "quantity": 3, "customerType": "premium"}"#,
    ]);
    assert!(output.status.success());

    let response = stdout_json(&output);
    assert_eq!(response["result"]["originalTotal"], json!(30));
    assert_eq!(response["result"]["message"], json!("Discount applied: 15%"));

    let output = jsembed(&["logic", "noSuchLogic"]);
    assert!(!output.status.success());
    assert_eq!(stdout_json(&output)["error_kind"], json!("script_not_found"));
}

#[test]
fn test_source_command() {
    let output = jsembed(&["source", "business-rules"]);
    assert!(output.status.success());

    let view = stdout_json(&output);
    assert_eq!(view["script_name"], json!("business-rules"));
    assert!(view["content"].as_str().unwrap().contains("function analyzeData"));
    assert!(view["lines"].as_u64().unwrap() > 10);

    let output = jsembed(&["source", "missing"]);
    assert!(!output.status.success());
}

#[test]
fn test_bench_report() {
    let output = jsembed(&["bench", "business-rules", "analyzeData", "-p", r#"{"dataset": [1, 2, 3]}"#, "-n", "3"]);
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["iterations"], json!(3));
    assert_eq!(report["success_count"], json!(3));
    assert_eq!(report["success_rate"], json!(1.0));
}

#[test]
fn test_scripts_listing() {
    let output = jsembed(&["scripts"]);
    assert!(output.status.success());

    let listing = stdout_json(&output);
    assert_eq!(
        listing["scripts"],
        json!(["business-rules", "data-processing", "math-utils"])
    );
    assert_eq!(listing["catalog"]["data_processing"].as_array().unwrap().len(), 5);
    assert_eq!(listing["business_logic"][0]["name"], json!("calculateDiscount"));
}

#[test]
fn test_invalid_json_params() {
    let output = jsembed(&["invoke", "business-rules", "analyzeData", "-p", "{oops"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid JSON in params"));
}

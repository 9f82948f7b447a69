//! Integration tests for the cutqa CLI
//!
//! Tests command-line interface functionality including:
//! - Command parsing and validation
//! - Scanning sample sheets and reporting verdicts
//! - Exit status for failures and `--strict`

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};

/// Test helper to get the CLI binary path
fn get_cli_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cutqa"))
}

/// Test helper to create a temporary directory
fn setup_temp_dir() -> TempDir {
    tempdir().expect("Failed to create temp directory")
}

/// Test helper to run CLI command and return output
fn run_cli_command(args: &[&str]) -> Result<std::process::Output> {
    let output = Command::new(get_cli_path())
        .env_remove("RUST_LOG")
        .args(args)
        .output()?;
    Ok(output)
}

fn write_demo(dir: &Path, name: &str, magenta: usize) -> PathBuf {
    let path = dir.join(name);
    let output = run_cli_command(&[
        "demo",
        "-o",
        path.to_str().unwrap(),
        "--magenta",
        &magenta.to_string(),
        "--other",
        "2",
    ])
    .expect("Failed to run demo command");
    assert!(
        output.status.success(),
        "demo failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    path
}

#[test]
fn test_cli_demo_command() {
    let temp_dir = setup_temp_dir();
    let output_path = temp_dir.path().join("demo.pdf");

    let output = run_cli_command(&[
        "demo",
        "-o",
        output_path.to_str().unwrap(),
        "--magenta",
        "4",
        "--pages",
        "2",
    ])
    .expect("Failed to run CLI command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("8 expected instances"));

    let content = fs::read(&output_path).expect("Failed to read PDF file");
    assert!(content.starts_with(b"%PDF-"));
}

#[test]
fn test_cli_scan_reports_failures() {
    let temp_dir = setup_temp_dir();
    let path = write_demo(temp_dir.path(), "order CUT.pdf", 3);

    let output = run_cli_command(&["scan", path.to_str().unwrap()]).unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FAIL: 3 instances of magenta lines with vector paths"));
}

#[test]
fn test_cli_scan_strict_exit_status() {
    let temp_dir = setup_temp_dir();
    let dirty = write_demo(temp_dir.path(), "dirty.pdf", 1);
    let clean = write_demo(temp_dir.path(), "clean.pdf", 0);

    let output = run_cli_command(&["scan", "--strict", clean.to_str().unwrap()]).unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("PASS: 0 instances"));

    let output = run_cli_command(&[
        "scan",
        "--strict",
        clean.to_str().unwrap(),
        dirty.to_str().unwrap(),
    ])
    .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_cli_scan_json_output() {
    let temp_dir = setup_temp_dir();
    let path = write_demo(temp_dir.path(), "a.pdf", 2);

    let output = run_cli_command(&["scan", "--json", path.to_str().unwrap()]).unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let reports = json.as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["instance_count"], 2);
    assert_eq!(reports[0]["status"], "FAIL");
}

#[test]
fn test_cli_scan_keeps_going_after_bad_file() {
    let temp_dir = setup_temp_dir();
    let bad = temp_dir.path().join("bad.pdf");
    fs::write(&bad, b"Not a valid PDF content").unwrap();
    let good = write_demo(temp_dir.path(), "good.pdf", 1);

    let output = run_cli_command(&[
        "scan",
        "--json",
        bad.to_str().unwrap(),
        good.to_str().unwrap(),
    ])
    .unwrap();

    assert!(!output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let reports = json.as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports[0]["error"]
        .as_str()
        .unwrap()
        .contains("Unreadable document"));
    assert_eq!(reports[1]["instance_count"], 1);
}

#[test]
fn test_cli_scan_nonexistent_file() {
    let output = run_cli_command(&["scan", "/nonexistent/file.pdf"]).unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read"));
}

#[test]
fn test_cli_classify_target() {
    let output = run_cli_command(&["classify", "0.9260547757148743", "0", "0.548302412033081"])
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Distance to target: 0.000000"));
    assert!(stdout.contains("Match: yes"));
}

#[test]
fn test_cli_classify_near_but_wrong_hue() {
    let output = run_cli_command(&["classify", "0.93", "0", "0.49"]).unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Close to target: yes"));
    assert!(stdout.contains("Magenta hue: no"));
    assert!(stdout.contains("Match: no"));
}

#[test]
fn test_cli_classify_far_color() {
    let output = run_cli_command(&["classify", "1", "0", "0"]).unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Close to target: no"));
    assert!(stdout.contains("Match: no"));
}

#[test]
fn test_cli_help_command() {
    let output = run_cli_command(&["--help"]).unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("scan"));
    assert!(stdout.contains("demo"));
    assert!(stdout.contains("classify"));
}

#[test]
fn test_cli_version_command() {
    let output = run_cli_command(&["--version"]).unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cutqa"));
}

#[test]
fn test_cli_missing_required_arguments() {
    let output = run_cli_command(&["scan"]).unwrap();
    assert!(!output.status.success());

    let output = run_cli_command(&["classify", "0.5"]).unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_cli_invalid_command() {
    let output = run_cli_command(&["frobnicate"]).unwrap();
    assert!(!output.status.success());
}

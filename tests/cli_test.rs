//! CLI contract tests
//!
//! Runs the built binary against graph and priors files written into a
//! temporary directory, which is also the working directory so no stray
//! graphguard.toml is picked up.

use std::path::Path;
use std::process::{Command, Output};

const CHAIN_GRAPH: &str = r#"{
    "nodes": [{"id": "A"}, {"id": "B"}, {"id": "C"}],
    "edges": [
        {"source": "A", "target": "B", "amount": 100.0},
        {"source": "B", "target": "C", "amount": 95.0, "pattern": null}
    ]
}"#;

const CHAIN_PRIORS: &str = r#"{"wallets": [{"id": "A", "baseRisk": 0.9, "reasons": ["sanctioned"]}]}"#;

fn setup() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("graph.json"), CHAIN_GRAPH).unwrap();
    std::fs::write(dir.path().join("priors.json"), CHAIN_PRIORS).unwrap();
    dir
}

fn graphguard(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_graphguard"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("GRAPHGUARD_CONFIG")
        .output()
        .expect("Failed to run graphguard")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("Invalid JSON on stdout")
}

#[test]
fn test_analyze_propagation_json() {
    let dir = setup();
    let output = graphguard(
        dir.path(),
        &[
            "analyze",
            "graph.json",
            "--priors",
            "priors.json",
            "--mode",
            "propagation",
            "--format",
            "json",
        ],
    );
    let report = stdout_json(&output);
    assert_eq!(report["mode"], "propagation");
    assert_eq!(report["summary"]["num_nodes"], 3);

    let records = report["records"].as_array().unwrap();
    assert_eq!(records.len(), 3);
    // Sorted riskiest first
    assert_eq!(records[0]["node_id"], "A");
    assert_eq!(records[1]["node_id"], "B");
    assert!((records[1]["value"].as_f64().unwrap() - 0.765).abs() < 1e-9);
    assert!((records[2]["value"].as_f64().unwrap() - 0.65025).abs() < 1e-9);
    assert_eq!(records[0]["reasons"][0], "sanctioned");
    assert_eq!(records[1]["band"], "medium");
    assert_eq!(records[1]["flagged"], true);
}

#[test]
fn test_analyze_rule_mode_is_default() {
    let dir = setup();
    let output = graphguard(
        dir.path(),
        &["analyze", "graph.json", "--priors", "priors.json", "--format", "json"],
    );
    let report = stdout_json(&output);
    assert_eq!(report["mode"], "rule");
    // A has fan-out 1, below the default threshold of 2
    assert_eq!(report["flagged"], 0);
}

#[test]
fn test_analyze_text_output() {
    let dir = setup();
    let output = graphguard(
        dir.path(),
        &["analyze", "graph.json", "--derive-priors", "--mode", "blended"],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Risk analysis"));
    assert!(stdout.contains("blended"));
    assert!(stdout.contains("WALLET"));
}

#[test]
fn test_analyze_writes_output_file() {
    let dir = setup();
    let output = graphguard(
        dir.path(),
        &["analyze", "graph.json", "--format", "json", "--output", "report.json"],
    );
    assert!(output.status.success());
    let written = std::fs::read_to_string(dir.path().join("report.json")).unwrap();
    let report: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(report["records"].as_array().unwrap().len(), 3);
}

#[test]
fn test_unknown_node_fails() {
    let dir = setup();
    std::fs::write(
        dir.path().join("bad.json"),
        r#"{"nodes": [{"id": "A"}], "edges": [{"source": "A", "target": "ghost"}]}"#,
    )
    .unwrap();
    let output = graphguard(dir.path(), &["analyze", "bad.json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ghost"), "stderr: {stderr}");
}

#[test]
fn test_unknown_mode_rejected() {
    let dir = setup();
    let output = graphguard(dir.path(), &["analyze", "graph.json", "--mode", "gnn"]);
    assert!(!output.status.success());
}

#[test]
fn test_layout_with_pin() {
    let dir = setup();
    let output = graphguard(
        dir.path(),
        &["layout", "graph.json", "--ticks", "5", "--pin", "B:10:20", "--quiet"],
    );
    let snapshot = stdout_json(&output);
    let positions = snapshot["positions"].as_array().unwrap();
    assert_eq!(positions.len(), 3);
    assert_eq!(positions[1]["id"], "B");
    assert_eq!(positions[1]["x"], 10.0);
    assert_eq!(positions[1]["y"], 20.0);
    assert_eq!(positions[1]["pinned"], true);
    assert_eq!(snapshot["settled"], false);
}

#[test]
fn test_layout_until_settled() {
    let dir = setup();
    let output = graphguard(dir.path(), &["layout", "graph.json", "--quiet"]);
    let snapshot = stdout_json(&output);
    assert_eq!(snapshot["settled"], true);
    assert!(snapshot["alpha"].as_f64().unwrap() < 0.001);
}

#[test]
fn test_layout_pin_unknown_wallet() {
    let dir = setup();
    let output = graphguard(dir.path(), &["layout", "graph.json", "--pin", "ghost:1:1", "--quiet"]);
    assert!(!output.status.success());
}

#[test]
fn test_stats_json() {
    let dir = setup();
    let output = graphguard(dir.path(), &["stats", "graph.json", "--format", "json"]);
    let stats = stdout_json(&output);
    assert_eq!(stats["summary"]["num_nodes"], 3);
    assert_eq!(stats["summary"]["num_edges"], 2);
    assert_eq!(stats["summary"]["num_isolated_nodes"], 0);
    assert_eq!(stats["top_fan_out"][0]["id"], "A");
}

#[test]
fn test_init_writes_template_once() {
    let dir = tempfile::tempdir().unwrap();
    let first = graphguard(dir.path(), &["init"]);
    assert!(first.status.success());
    assert!(dir.path().join("graphguard.toml").exists());

    let second = graphguard(dir.path(), &["init"]);
    assert!(!second.status.success());

    let forced = graphguard(dir.path(), &["init", "--force"]);
    assert!(forced.status.success());
}

#[test]
fn test_project_config_sets_default_mode() {
    let dir = setup();
    std::fs::write(dir.path().join("graphguard.toml"), "[risk]\nmode = \"propagation\"\n").unwrap();
    let output = graphguard(
        dir.path(),
        &["analyze", "graph.json", "--priors", "priors.json", "--format", "json"],
    );
    let report = stdout_json(&output);
    assert_eq!(report["mode"], "propagation");
}

#[test]
fn test_explicit_config_must_be_valid() {
    let dir = setup();
    std::fs::write(dir.path().join("bad.toml"), "[risk.propagation]\ndecay = 0.0\n").unwrap();
    let output = graphguard(dir.path(), &["--config", "bad.toml", "analyze", "graph.json"]);
    assert!(!output.status.success());
}

//! CLI smoke tests: run the built binary and check its JSON output.

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};

fn cli_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_spark"));
    cmd.env("RUST_LOG", "warn")
        .env_remove("SPARK_PERSISTENCE_BACKEND")
        .env_remove("SPARK_PERSISTENCE_PATH")
        .arg("--config")
        .arg("/tmp/nonexistent_spark_config_12345.toml");
    cmd
}

fn json_stdout(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "spark failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

fn observe(store: &Path, metrics: &str, content: &str) -> Value {
    let output = cli_bin()
        .args(["observe", "--store"])
        .arg(store)
        .args(["--metrics", metrics, "--content", content])
        .output()
        .expect("failed to run");
    json_stdout(&output)
}

#[test]
fn test_help_flag() {
    let output = cli_bin().arg("--help").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"), "Expected usage info in --help output");
}

#[test]
fn test_version_flag() {
    let output = Command::new(env!("CARGO_BIN_EXE_spark"))
        .arg("--version")
        .output()
        .expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("spark"), "Expected binary name in --version output");
}

#[test]
fn test_evaluate_prints_voice_phase_triggers() {
    let output = cli_bin()
        .args(["evaluate", "--metrics", r#"{"pain":0.9,"painCycles":3}"#])
        .output()
        .expect("failed to run");
    let v = json_stdout(&output);
    assert_eq!(v["voice"], "Kain");
    assert_eq!(v["phase"], "Darkness");
    assert!(v["triggers"].as_array().unwrap().is_empty());
}

#[test]
fn test_evaluate_clamps_negative_pain_cycles() {
    let output = cli_bin()
        .args(["evaluate", "--metrics", r#"{"pain":0.9,"painCycles":-1}"#])
        .output()
        .expect("failed to run");
    let v = json_stdout(&output);
    assert_eq!(v["voice"], "Kain");
    assert_eq!(v["phase"], "Clarity");
}

#[test]
fn test_evaluate_sustains_across_repeated_metrics() {
    let output = cli_bin()
        .args(["evaluate", "--metrics", r#"{"pain":0.9}"#, "--metrics", r#"{"pain":0.9}"#])
        .output()
        .expect("failed to run");
    assert!(output.status.success());
    // One pretty-printed document per vector.
    let stdout = String::from_utf8_lossy(&output.stdout);
    let docs: Vec<Value> = serde_json::Deserializer::from_str(&stdout)
        .into_iter::<Value>()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(docs.len(), 2);
    assert!(docs[0]["triggers"].as_array().unwrap().is_empty());
    assert_eq!(docs[1]["triggers"][0]["rule"], "pain_shatter");
}

#[test]
fn test_observe_help_says_triggers_are_per_call() {
    let output = cli_bin().args(["observe", "--help"]).output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("fresh session"), "{}", stdout);
}

#[test]
fn test_evaluate_rejects_bad_json() {
    let output = cli_bin()
        .args(["evaluate", "--metrics", "not json"])
        .output()
        .expect("failed to run");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_observe_then_stats_and_recall() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("graph.json");

    let first = observe(&store, r#"{"trust":0.95,"clarity":0.9}"#, "steady");
    assert_eq!(first["edges"], 0);
    let second = observe(&store, r#"{"trust":0.9,"clarity":0.95}"#, "still steady");
    assert!(second["edges"].as_u64().unwrap() >= 1);
    assert_ne!(first["nodeId"], second["nodeId"]);

    let output = cli_bin()
        .args(["graph", "stats", "--store"])
        .arg(&store)
        .output()
        .expect("failed to run");
    let stats = json_stdout(&output);
    assert_eq!(stats["nodes"], 10);
    assert_eq!(stats["canonical"], 8);

    let output = cli_bin()
        .args(["recall", "--store"])
        .arg(&store)
        .args(["--metrics", r#"{"trust":0.95,"clarity":0.9}"#, "--threshold", "0.5"])
        .output()
        .expect("failed to run");
    let hits = json_stdout(&output);
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["content"], "steady");
}

#[test]
fn test_export_of_missing_store_is_canon_only() {
    let dir = tempfile::tempdir().unwrap();
    let output = cli_bin()
        .args(["graph", "export", "--store"])
        .arg(dir.path().join("absent.json"))
        .output()
        .expect("failed to run");
    let graph = json_stdout(&output);
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 8);
    assert!(graph["edges"].as_array().unwrap().is_empty());
}

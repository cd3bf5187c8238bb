//! CLI integration tests for hyra
//!
//! Each test runs the binary against its own config directory and database.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command isolated from the user's configuration and API keys
#[allow(deprecated)]
fn hyra_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("hyra").unwrap();
    cmd.env("HYRA_CONFIG_DIR", home.path().join("config"));
    cmd.env("HYRA_DATABASE", home.path().join("hyra.db"));
    cmd.env_remove("HYRA_JUDGE_API_KEY");
    cmd.env_remove("GOOGLE_API_KEY");
    cmd.env("RUST_LOG", "off");
    cmd.current_dir(home.path());
    cmd
}

#[test]
fn test_domains_list_shows_seeded_domains() {
    let home = TempDir::new().unwrap();

    hyra_cmd(&home)
        .args(["domains", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Factual Q&A"))
        .stdout(predicate::str::contains(
            "Open-Ended Q&A / Conversational Quality [subjective]",
        ));
}

#[test]
fn test_models_add_then_list() {
    let home = TempDir::new().unwrap();

    hyra_cmd(&home)
        .args(["models", "add", "opt-125m", "--provider", "facebook", "--cost", "0.5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Model registered"));

    hyra_cmd(&home)
        .args(["models", "list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"provider\": \"facebook\""))
        .stdout(predicate::str::contains("opt-125m"));
}

#[test]
fn test_models_add_rejects_negative_cost() {
    let home = TempDir::new().unwrap();

    hyra_cmd(&home)
        .args(["models", "add", "m", "--provider", "p", "--cost=-1"])
        .assert()
        .failure();
}

#[test]
fn test_config_set_get_round_trip() {
    let home = TempDir::new().unwrap();

    hyra_cmd(&home)
        .args(["config", "set", "routing.weights.latency", "0.3"])
        .assert()
        .success();

    hyra_cmd(&home)
        .args(["config", "get", "routing.weights.latency"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0.3"));

    assert!(home.path().join("config").join("config.toml").exists());
}

#[test]
fn test_config_rejects_negative_weight() {
    let home = TempDir::new().unwrap();

    hyra_cmd(&home)
        .args(["config", "set", "routing.weights.accuracy", "-0.5"])
        .assert()
        .failure();
}

#[test]
fn test_config_path_uses_override() {
    let home = TempDir::new().unwrap();

    hyra_cmd(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_db_status_reports_latest_schema() {
    let home = TempDir::new().unwrap();

    hyra_cmd(&home)
        .args(["db", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Up to date"));
}

#[test]
fn test_metrics_unknown_domain_fails_with_code() {
    let home = TempDir::new().unwrap();

    hyra_cmd(&home)
        .args(["models", "add", "m", "--provider", "p"])
        .assert()
        .success();

    hyra_cmd(&home)
        .args(["metrics", "--domain", "Astrology"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E001"));
}

#[test]
fn test_metrics_shows_cold_start_scores() {
    let home = TempDir::new().unwrap();

    hyra_cmd(&home)
        .args(["models", "add", "m", "--provider", "p"])
        .assert()
        .success();

    hyra_cmd(&home)
        .args(["metrics", "--domain", "Factual Q&A"])
        .assert()
        .success()
        .stdout(predicate::str::contains("p/m"))
        .stdout(predicate::str::contains("(cold start)"));
}

#[test]
fn test_route_without_models_exits_with_no_candidates() {
    let home = TempDir::new().unwrap();

    // Unreachable judge: classification falls back to the default domain
    hyra_cmd(&home)
        .args(["config", "set", "judge.base_url", "http://127.0.0.1:9"])
        .assert()
        .success();

    hyra_cmd(&home)
        .args(["route", "What is the capital of France?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1101"))
        .stderr(predicate::str::contains("hyra models add"));
}

fn write_eval_set(home: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = home.path().join("eval_set.json");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_benchmark_rejects_malformed_eval_set() {
    let home = TempDir::new().unwrap();
    let path = write_eval_set(&home, r#"{"domain": "Factual Q&A"}"#);

    hyra_cmd(&home)
        .arg("benchmark")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("E700"));
}

#[test]
fn test_benchmark_unknown_model_id_fails_with_code() {
    let home = TempDir::new().unwrap();
    let path = write_eval_set(
        &home,
        r#"[{"domain": "Factual Q&A", "q": "Capital of France?", "a": "Paris"}]"#,
    );

    hyra_cmd(&home)
        .arg("benchmark")
        .arg(&path)
        .args(["--model", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E002"));
}

#[test]
fn test_benchmark_without_models_exits_with_no_candidates() {
    let home = TempDir::new().unwrap();
    let path = write_eval_set(
        &home,
        r#"[{"domain": "Factual Q&A", "q": "Capital of France?", "a": "Paris"}]"#,
    );

    hyra_cmd(&home)
        .arg("benchmark")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1101"));
}

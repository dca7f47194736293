use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn trs_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("trs");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // No connectors: learning runs offline and finds nothing.
    let config_content = format!(
        r#"[db]
path = "{}/data/trs.sqlite"

[embedding]
provider = "hashed"
dims = 64

[learning]
max_iterations = 3
"#,
        root.display()
    );

    let config_path = config_dir.join("trs.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_trs(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = trs_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run trs binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn add_topic(config_path: &Path, title: &str) -> String {
    let (stdout, stderr, success) = run_trs(config_path, &["topic", "add", title]);
    assert!(success, "topic add failed: {}", stderr);
    stdout.trim().to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_trs(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/trs.sqlite").exists());

    // Idempotent.
    let (_, stderr, success) = run_trs(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_trs(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_sources_lists_unconfigured() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_trs(&config_path, &["sources"]);
    assert!(success);
    assert!(stdout.contains("pubmed"));
    assert!(stdout.contains("semantic_scholar"));
    assert!(stdout.contains("NOT CONFIGURED"));
}

#[test]
fn test_topic_lifecycle() {
    let (_tmp, config_path) = setup_test_env();
    run_trs(&config_path, &["init"]);

    let id = add_topic(&config_path, "Chemical peel");
    assert_eq!(id.len(), 36);

    let (stdout, _, success) = run_trs(&config_path, &["topic", "list"]);
    assert!(success);
    assert!(stdout.contains("Chemical peel"));
    assert!(stdout.contains("proposed"));

    let (stdout, _, success) = run_trs(
        &config_path,
        &["topic", "queries", &id, "--query", "glycolic peel", "--query", "TCA peel"],
    );
    assert!(success);
    assert!(stdout.contains("glycolic peel"));

    let (stdout, stderr, success) = run_trs(&config_path, &["topic", "approve", &id]);
    assert!(success, "approve failed: {}", stderr);
    assert!(stdout.contains("approved"));

    // Approving twice is a state conflict.
    let (_, stderr, success) = run_trs(&config_path, &["topic", "approve", &id]);
    assert!(!success);
    assert!(stderr.contains("does not allow"));

    let (stdout, _, success) = run_trs(&config_path, &["topic", "show", &id]);
    assert!(success);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["status"], "approved");
    assert_eq!(json["search_queries"][1], "TCA peel");

    let (stdout, _, success) = run_trs(&config_path, &["topic", "defer", &id]);
    assert!(success);
    assert!(stdout.contains("proposed"));

    let (_, _, success) = run_trs(&config_path, &["topic", "delete", &id]);
    assert!(success);
    let (_, stderr, success) = run_trs(&config_path, &["topic", "show", &id]);
    assert!(!success);
    assert!(stderr.contains("Topic not found"));
}

#[test]
fn test_list_filters_by_status() {
    let (_tmp, config_path) = setup_test_env();
    let keep = add_topic(&config_path, "Microneedling");
    let reject = add_topic(&config_path, "Exosomes");
    let (_, _, success) = run_trs(&config_path, &["topic", "reject", &reject]);
    assert!(success);

    let (stdout, _, success) = run_trs(&config_path, &["topic", "list", "--status", "rejected"]);
    assert!(success);
    assert!(stdout.contains(&reject));
    assert!(!stdout.contains(&keep));
}

#[test]
fn test_score_with_catalogue_match() {
    let (_tmp, config_path) = setup_test_env();
    run_trs(&config_path, &["init"]);

    let (_, stderr, success) = run_trs(
        &config_path,
        &["catalogue", "add", "Chemical peel", "--tag", "peeling"],
    );
    assert!(success, "catalogue add failed: {}", stderr);

    let (stdout, _, success) = run_trs(&config_path, &["catalogue", "list"]);
    assert!(success);
    assert!(stdout.contains("Chemical peel"));
    assert!(stdout.contains("peeling"));

    // Empty corpus: only the catalogue contributes.
    let (stdout, _, success) = run_trs(&config_path, &["score", "chemical peel", "--json"]);
    assert!(success);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["score"], 15.0);
    assert_eq!(json["status"], "red");
    assert_eq!(json["ready_for_generation"], false);
    assert_eq!(json["details"]["atlas"]["match_found"], true);

    let (stdout, _, success) = run_trs(&config_path, &["score", "Tattoo removal"]);
    assert!(success);
    assert!(stdout.contains("Score: 0.0 (red)"));
}

#[test]
fn test_learn_without_sources_stagnates() {
    let (_tmp, config_path) = setup_test_env();
    let id = add_topic(&config_path, "Chemical peel");

    // Learning needs approval first.
    let (_, stderr, success) = run_trs(&config_path, &["learn", &id]);
    assert!(!success);
    assert!(stderr.contains("proposed"));

    run_trs(&config_path, &["topic", "approve", &id]);
    let (stdout, stderr, success) = run_trs(&config_path, &["learn", &id]);
    assert!(success, "learn failed: {}", stderr);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["final_status"], "stagnated");
    assert_eq!(json["iterations"].as_array().unwrap().len(), 2);

    let (stdout, _, success) = run_trs(&config_path, &["learn-batch", &id, "missing"]);
    assert!(success);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["status"], "completed");
    assert_eq!(json["ok"], 1);
    assert_eq!(json["failed"], 1);
}

#[test]
fn test_stats_and_embed_on_empty_corpus() {
    let (_tmp, config_path) = setup_test_env();
    add_topic(&config_path, "Chemical peel");

    let (stdout, _, success) = run_trs(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   0"));
    assert!(stdout.contains("proposed"));

    let (stdout, stderr, success) = run_trs(&config_path, &["embed", "pending"]);
    assert!(success, "embed pending failed: {}", stderr);
    assert!(stdout.contains("all chunks up to date"));
}

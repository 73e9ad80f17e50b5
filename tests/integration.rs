use linkmeta::linkmeta_core::frontmatter::parse_document;
use linkmeta::linkmeta_core::models::Frontmatter;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn linkmeta_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("linkmeta");
    path
}

const RULES: &str = r##"
[[rules]]
id = "movie-watched"
name = "Last watched"
source_pattern = "Daily Notes/*"
target_tag = "#movie"
update_field = "lastWatched"
value_type = "date"
priority = 1

[[rules]]
id = "mentions"
name = "Mentioned in"
source_pattern = "Daily Notes/*"
target_folder = "Projects"
update_field = "mentionedIn"
value_type = "append_unique_link"
priority = 2
"##;

fn setup_test_env(preserve_history: bool) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let vault = root.join("vault");
    fs::create_dir_all(vault.join("Daily Notes")).unwrap();
    fs::create_dir_all(vault.join("Movies")).unwrap();
    fs::create_dir_all(vault.join("Projects")).unwrap();
    fs::write(
        vault.join("Daily Notes/2024-03-10.md"),
        "# Sunday\n\nWatched [[Alien]] again. Worked on [[Garden]].\n",
    )
    .unwrap();
    fs::write(vault.join("Movies/Alien.md"), "---\ntags: [movie]\n---\n# Alien\n").unwrap();
    fs::write(vault.join("Projects/Garden.md"), "Raised beds.\n").unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        "[vault]\nroot = \"{}\"\n\n[options]\npreserve_history = {}\n{}",
        vault.display(),
        preserve_history,
        RULES
    );
    let config_path = config_dir.join("linkmeta.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_linkmeta(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = linkmeta_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run linkmeta binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn vault_path(config_path: &Path, rel: &str) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("vault").join(rel)
}

fn frontmatter(config_path: &Path, rel: &str) -> Frontmatter {
    let text = fs::read_to_string(vault_path(config_path, rel)).unwrap();
    parse_document(&text).unwrap().0
}

#[test]
fn test_process_sets_date_on_tagged_target() {
    let (_tmp, config_path) = setup_test_env(false);

    let (stdout, stderr, success) = run_linkmeta(&config_path, &["process", "Daily Notes/2024-03-10.md"]);
    assert!(success, "process failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("fields updated:  2"), "stdout={}", stdout);

    let alien = frontmatter(&config_path, "Movies/Alien.md");
    assert_eq!(alien["lastWatched"], json!("2024-03-10"));
    assert!(!alien.contains_key("mentionedIn"));

    let garden = frontmatter(&config_path, "Projects/Garden.md");
    assert_eq!(garden["mentionedIn"], json!(["[[2024-03-10]]"]));

    let body = fs::read_to_string(vault_path(&config_path, "Projects/Garden.md")).unwrap();
    assert!(body.ends_with("---\nRaised beds.\n"));
}

#[test]
fn test_newer_existing_date_is_kept() {
    let (_tmp, config_path) = setup_test_env(false);
    fs::write(
        vault_path(&config_path, "Movies/Alien.md"),
        "---\ntags: [movie]\nlastWatched: 2024-05-01\n---\n",
    )
    .unwrap();

    let (_, stderr, success) = run_linkmeta(&config_path, &["process", "Daily Notes/2024-03-10.md"]);
    assert!(success, "stderr={}", stderr);
    assert_eq!(frontmatter(&config_path, "Movies/Alien.md")["lastWatched"], json!("2024-05-01"));
}

#[test]
fn test_unique_link_not_duplicated() {
    let (_tmp, config_path) = setup_test_env(false);

    run_linkmeta(&config_path, &["process", "Daily Notes/2024-03-10.md"]);
    run_linkmeta(&config_path, &["process", "Daily Notes/2024-03-10.md"]);

    let garden = frontmatter(&config_path, "Projects/Garden.md");
    assert_eq!(garden["mentionedIn"], json!(["[[2024-03-10]]"]));
}

#[test]
fn test_watch_history_has_no_duplicate_dates() {
    let (_tmp, config_path) = setup_test_env(true);

    run_linkmeta(&config_path, &["process", "Daily Notes/2024-03-10.md"]);
    run_linkmeta(&config_path, &["process", "Daily Notes/2024-03-10.md"]);

    let alien = frontmatter(&config_path, "Movies/Alien.md");
    assert_eq!(alien["watchHistory"], json!(["2024-03-10"]));
}

#[test]
fn test_process_missing_document_fails() {
    let (_tmp, config_path) = setup_test_env(false);
    let (_, stderr, success) = run_linkmeta(&config_path, &["process", "Nope.md"]);
    assert!(!success);
    assert!(stderr.contains("Document not found"));
}

#[test]
fn test_process_all_json_report() {
    let (_tmp, config_path) = setup_test_env(false);

    let (stdout, stderr, success) =
        run_linkmeta(&config_path, &["process-all", "--progress", "off", "--json"]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);

    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["documents"], json!(3));
    assert_eq!(report["fields_updated"], json!(2));
    assert_eq!(report["errors"], json!(0));
}

#[test]
fn test_validate_ok_and_failing() {
    let (_tmp, config_path) = setup_test_env(false);

    let (stdout, _, success) = run_linkmeta(&config_path, &["validate"]);
    assert!(success, "stdout={}", stdout);
    assert!(stdout.contains("2 rules, 0 errors"));

    let mut content = fs::read_to_string(&config_path).unwrap();
    content.push_str("\n[[rules]]\nid = \"mentions\"\nname = \"Dup\"\nsource_pattern = \"x\"\nupdate_field = \"bad field\"\nvalue_type = \"custom\"\n");
    fs::write(&config_path, content).unwrap();

    let (stdout, stderr, success) = run_linkmeta(&config_path, &["validate", "--json"]);
    assert!(!success);
    assert!(stderr.contains("Rule set is invalid"));
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["is_valid"], json!(false));
    assert_eq!(
        report["rule_set"]["errors"][0],
        json!("Duplicate rule IDs found: mentions")
    );
}

#[test]
fn test_disable_rule_is_saved_and_respected() {
    let (_tmp, config_path) = setup_test_env(false);

    let (stdout, _, success) = run_linkmeta(&config_path, &["rules", "disable", "movie-watched"]);
    assert!(success);
    assert!(stdout.contains("disabled"));

    let (stdout, _, _) = run_linkmeta(&config_path, &["rules", "list"]);
    assert!(stdout.contains("movie-watched"));

    run_linkmeta(&config_path, &["process", "Daily Notes/2024-03-10.md"]);
    assert!(!frontmatter(&config_path, "Movies/Alien.md").contains_key("lastWatched"));

    let (_, _, success) = run_linkmeta(&config_path, &["rules", "enable", "movie-watched"]);
    assert!(success);
    run_linkmeta(&config_path, &["process", "Daily Notes/2024-03-10.md"]);
    assert_eq!(
        frontmatter(&config_path, "Movies/Alien.md")["lastWatched"],
        json!("2024-03-10")
    );
}

#[test]
fn test_unknown_rule_id_fails() {
    let (_tmp, config_path) = setup_test_env(false);
    let (_, stderr, success) = run_linkmeta(&config_path, &["rules", "enable", "ghost"]);
    assert!(!success);
    assert!(stderr.contains("No rule with id 'ghost'"));
}

#[test]
fn test_rules_show_lists_matches() {
    let (_tmp, config_path) = setup_test_env(false);
    let (stdout, stderr, success) = run_linkmeta(&config_path, &["rules", "show", "movie-watched"]);
    assert!(success, "stderr={}", stderr);
    assert!(stdout.contains("source documents: 1"));
    assert!(stdout.contains("Movies/Alien.md"));
}

#[test]
fn test_init_writes_example_config() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("config").join("linkmeta.toml");

    let (stdout, _, success) = run_linkmeta(&config_path, &["init"]);
    assert!(success);
    assert!(stdout.contains("Wrote example configuration"));
    assert!(config_path.exists());

    let (_, _, success) = run_linkmeta(&config_path, &["init"]);
    assert!(!success, "second init must not overwrite");
}

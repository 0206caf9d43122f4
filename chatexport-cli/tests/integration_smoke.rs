//! Smoke tests for the chatexport binary against page fixtures

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PAGE: &str = r#"{
  "url": "https://gemini.google.com/app/5e1b",
  "title": "Trip planning - Gemini",
  "conversation_title": "Trip planning",
  "turns": [
    {"author": "user", "text": "Plan three days in Kyoto"},
    {"author": "assistant", "body": [
      {"tag": "p", "children": ["Day one: ", {"tag": "strong", "children": ["Fushimi Inari"]}]}
    ]},
    {"author": "user", "text": "Add a rainy day option"}
  ],
  "sidebar": [
    {"title": "Trip planning", "href": "/app/5e1b"},
    {"title": "Sourdough starter", "href": "/app/77aa"},
    {"title": "Locked chat", "href": "/app/90ff", "deletable": false}
  ]
}"#;

fn page_in(dir: &TempDir, json: &str) -> PathBuf {
    let path = dir.path().join("page.json");
    fs::write(&path, json).unwrap();
    path
}

/// Binary with HOME pointed at `dir`, so no user config is picked up.
fn chatexport(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("chatexport").unwrap();
    cmd.env("HOME", dir)
        .env_remove("CHATEXPORT_CONFIG")
        .env_remove("CHATEXPORT_OUTPUT_DIR")
        .env_remove("RUST_LOG");
    cmd
}

// === Export Command Tests ===

#[test]
fn test_export_help() {
    let dir = TempDir::new().unwrap();
    let mut cmd = chatexport(dir.path());
    cmd.arg("export").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Output format"));
}

#[test]
fn test_export_markdown() {
    let dir = TempDir::new().unwrap();
    let page = page_in(&dir, PAGE);
    let out = dir.path().join("out");

    let mut cmd = chatexport(dir.path());
    cmd.arg("--quiet")
        .arg("export")
        .arg("--page")
        .arg(&page)
        .arg("--out")
        .arg(&out);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Exported 3 messages (2 user, 1 assistant)"));

    let body = fs::read_to_string(out.join("Trip-planning.md")).unwrap();
    assert!(body.starts_with("# Trip planning\n\n"));
    assert!(body.contains("## User\n\nPlan three days in Kyoto"));
    assert!(body.contains("## Gemini\n\nDay one: **Fushimi Inari**"));
}

#[test]
fn test_export_html_json_summary() {
    let dir = TempDir::new().unwrap();
    let page = page_in(&dir, PAGE);
    let out = dir.path().join("out");

    let mut cmd = chatexport(dir.path());
    cmd.arg("export")
        .arg("--page")
        .arg(&page)
        .arg("--format")
        .arg("html")
        .arg("--out")
        .arg(&out)
        .arg("--json");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"messageCount\": 3"))
        .stdout(predicate::str::contains("\"userCount\": 2"))
        .stdout(predicate::str::contains("Trip-planning.html"));

    let body = fs::read_to_string(out.join("Trip-planning.html")).unwrap();
    assert!(body.contains("<strong>Fushimi Inari</strong>"));
}

#[test]
fn test_export_rejects_other_sites() {
    let dir = TempDir::new().unwrap();
    let page = page_in(&dir, &PAGE.replace("gemini.google.com", "example.com"));

    let mut cmd = chatexport(dir.path());
    cmd.arg("export").arg("--page").arg(&page).arg("--out").arg(dir.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Gemini chat page"));
}

#[test]
fn test_export_missing_page() {
    let dir = TempDir::new().unwrap();

    let mut cmd = chatexport(dir.path());
    cmd.arg("export").arg("--page").arg(dir.path().join("nope.json"));

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open page"));
}

// === Delete Command Tests ===

#[test]
fn test_delete_requires_a_selection() {
    let dir = TempDir::new().unwrap();
    let page = page_in(&dir, PAGE);

    let mut cmd = chatexport(dir.path());
    cmd.arg("delete").arg("--page").arg(&page);

    cmd.assert().failure();
}

#[test]
fn test_delete_list() {
    let dir = TempDir::new().unwrap();
    let page = page_in(&dir, PAGE);

    let mut cmd = chatexport(dir.path());
    cmd.arg("delete").arg("--page").arg(&page).arg("--list");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Sourdough starter\t/app/77aa"));
}

#[test]
fn test_delete_all_and_save() {
    let dir = TempDir::new().unwrap();
    let page = page_in(&dir, PAGE);

    let mut cmd = chatexport(dir.path());
    cmd.arg("--quiet")
        .arg("delete")
        .arg("--page")
        .arg(&page)
        .arg("--all")
        .arg("--yes")
        .arg("--save");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Deleted 2 of 3 conversations"))
        .stdout(predicate::str::contains("Could not find Delete option"));

    let saved = fs::read_to_string(&page).unwrap();
    assert!(saved.contains("Locked chat"));
    assert!(!saved.contains("Sourdough starter"));
}

#[test]
fn test_delete_unknown_title() {
    let dir = TempDir::new().unwrap();
    let page = page_in(&dir, PAGE);

    let mut cmd = chatexport(dir.path());
    cmd.arg("delete")
        .arg("--page")
        .arg(&page)
        .arg("--select")
        .arg("No such chat")
        .arg("--yes");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("matched the selection"));
}

// === Config Command Tests ===

#[test]
fn test_config_init_and_show() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chatexport.toml");

    let mut cmd = chatexport(dir.path());
    cmd.arg("config").arg("init").arg("--config").arg(&path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Created config"));

    let mut cmd = chatexport(dir.path());
    cmd.arg("config").arg("init").arg("--config").arg(&path);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    let mut cmd = chatexport(dir.path());
    cmd.arg("config").arg("show").arg("--config").arg(&path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("[scroll]"))
        .stdout(predicate::str::contains("max_steps = 500"));
}

#[test]
fn test_config_path_defaults_to_home() {
    let dir = TempDir::new().unwrap();

    let mut cmd = chatexport(dir.path());
    cmd.arg("config").arg("path");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(".chatexport/config.toml"));
}

// === Completions Tests ===

#[test]
fn test_completions_bash() {
    let dir = TempDir::new().unwrap();
    let mut cmd = chatexport(dir.path());
    cmd.arg("completions").arg("bash");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("chatexport"));
}

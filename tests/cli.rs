use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn gds_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("gds");
    path
}

/// Config with a cached genshin dump holding one avatar.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let excel = root.join("raw/genshin/ExcelBinOutput");
    fs::create_dir_all(&excel).unwrap();
    fs::write(
        excel.join("AvatarExcelConfigData.json"),
        r#"[{"id": 7, "nameTextMapHash": "abc", "useType": "AVATAR_FORMAL", "qualityType": "QUALITY_PURPLE"}]"#,
    )
    .unwrap();
    let text = root.join("raw/genshin/TextMap");
    fs::create_dir_all(&text).unwrap();
    fs::write(text.join("TextMapEN.json"), r#"{"abc": "Hero"}"#).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/gamedata.sqlite"

[storage]
root = "{root}/raw"
icon_root = "{root}/public"
public_url = "https://static.example.com/gd"

[sync]
skip_download = true
skip_revision_check = true

[fetch]
max_retries = 1
backoff_secs = 0

[sources.genshin]
repo = "{root}/no-such-repo"
raw_base = "http://127.0.0.1:9/raw"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("sync.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_gds(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = gds_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run gds binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_gds(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/gamedata.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_gds(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_gds(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_sources_lists_configured_sources() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_gds(&config_path, &["sources"]);
    assert!(success, "sources failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("genshin"));
    assert!(stdout.contains("never"));
    assert!(!stdout.contains("starrail"));
}

#[test]
fn test_update_then_stats() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_gds(&config_path, &["update", "--progress", "off"]);
    assert!(success, "update failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("genshin"));
    assert!(stdout.contains("1 inserted"));

    let (stdout, _, success) = run_gds(&config_path, &["update", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("0 inserted"));
    assert!(stdout.contains("1 skipped"));

    let (stdout, stderr, success) = run_gds(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Records:     1"));
    assert!(stdout.contains("AVATAR"));
}

#[test]
fn test_update_rejects_unconfigured_source() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_gds(&config_path, &["update", "--source", "zzz"]);
    assert!(!success);
    assert!(stderr.contains("not configured"));
}

#[test]
fn test_update_rejects_unknown_game() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_gds(&config_path, &["update", "--source", "tetris"]);
    assert!(!success);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_gds(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ORPHAN_KEY: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c4b5a69788796a5b4c3d2e1f0";

fn herald_cmd() -> Command {
    Command::cargo_bin("herald").unwrap()
}

/// Writes a settings file whose cache lives inside `dir`.
fn settings_in(dir: &TempDir) -> (PathBuf, PathBuf) {
    let cache_dir = dir.path().join("cache");
    let settings_path = dir.path().join("settings.json");
    let settings = settings_json(&cache_dir);
    fs::write(&settings_path, settings).unwrap();
    (settings_path, cache_dir)
}

fn settings_json(cache_dir: &Path) -> String {
    format!(
        r#"{{ "settings_version": 2.0, "cache_size_mb": 5, "cache_dir": {:?} }}"#,
        cache_dir.to_str().unwrap()
    )
}

#[test]
fn help_describes_the_tool() {
    herald_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("speak"))
        .stdout(predicate::str::contains("cache"));
}

#[test]
fn version_names_the_binary() {
    herald_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("herald "));
}

#[test]
fn speak_requires_a_title() {
    herald_cmd()
        .arg("speak")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--title"));
}

#[test]
fn speak_rejects_unknown_rate() {
    herald_cmd()
        .args(["speak", "--title", "Jump", "--rate", "ludicrous"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown rate"));
}

#[test]
fn cache_stats_on_empty_cache() {
    let dir = TempDir::new().unwrap();
    let (settings, cache_dir) = settings_in(&dir);

    herald_cmd()
        .arg("--settings")
        .arg(&settings)
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries:   0"))
        .stdout(predicate::str::contains("of 5.00 MB"));

    assert!(cache_dir.is_dir());
}

#[test]
fn cache_stats_counts_orphaned_audio() {
    let dir = TempDir::new().unwrap();
    let (settings, cache_dir) = settings_in(&dir);
    fs::create_dir_all(&cache_dir).unwrap();
    fs::write(cache_dir.join(format!("{ORPHAN_KEY}.mp3")), [0xFFu8; 64]).unwrap();

    herald_cmd()
        .arg("--settings")
        .arg(&settings)
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries:   1"));
}

#[test]
fn cache_rebuild_writes_index_and_prunes_legacy_audio() {
    let dir = TempDir::new().unwrap();
    let (settings, cache_dir) = settings_in(&dir);
    fs::create_dir_all(&cache_dir).unwrap();
    fs::write(cache_dir.join(format!("{ORPHAN_KEY}.mp3")), [0xFFu8; 64]).unwrap();
    fs::write(cache_dir.join("old.wav"), b"RIFF").unwrap();

    herald_cmd()
        .arg("--settings")
        .arg(&settings)
        .args(["cache", "rebuild"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed 1 entries"));

    let index = fs::read_to_string(cache_dir.join("CacheIndex.json")).unwrap();
    assert!(index.contains(ORPHAN_KEY));
    assert!(!cache_dir.join("old.wav").exists());
}

#[test]
fn voices_lists_builtin_catalog() {
    let dir = TempDir::new().unwrap();
    let (settings, _) = settings_in(&dir);

    herald_cmd()
        .arg("--settings")
        .arg(&settings)
        .arg("voices")
        .assert()
        .success()
        .stdout(predicate::str::contains("* American - Christopher"))
        .stdout(predicate::str::contains("en-US-ChristopherNeural"));
}

#[test]
fn unreadable_settings_exit_non_zero() {
    let dir = TempDir::new().unwrap();
    let settings = dir.path().join("settings.json");
    fs::write(&settings, "{ not json").unwrap();

    herald_cmd()
        .arg("--settings")
        .arg(&settings)
        .args(["cache", "stats"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

//! CLI argument validation tests.
//!
//! Tests command-line argument parsing, validation, and error handling.

#![allow(clippy::unwrap_used)]
#![allow(deprecated)] // cargo_bin deprecation

use assert_cmd::Command;
use predicates::prelude::*;

fn repcam(cwd: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("repcam").unwrap();
    cmd.current_dir(cwd).env("XDG_CONFIG_HOME", cwd);
    cmd
}

#[test]
fn test_missing_classifier_shows_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    repcam(temp_dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--custom_classifier is required"));
}

#[test]
fn test_missing_classifier_dir_fails_before_streaming() {
    let temp_dir = tempfile::tempdir().unwrap();
    repcam(temp_dir.path())
        .arg("--custom_classifier")
        .arg(temp_dir.path().join("nowhere"))
        .arg("--backbone")
        .arg(temp_dir.path().join("nothing.safetensors"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn test_kebab_case_aliases_accepted() {
    let temp_dir = tempfile::tempdir().unwrap();
    repcam(temp_dir.path())
        .arg("--custom-classifier")
        .arg(temp_dir.path())
        .arg("--camera-id")
        .arg("1")
        .arg("--backbone")
        .arg(temp_dir.path().join("absent.safetensors"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unexpected argument").not());
}

#[test]
fn test_invalid_fps_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    repcam(temp_dir.path())
        .arg("--custom_classifier")
        .arg(temp_dir.path())
        .arg("--fps")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a positive frame rate"));
}

#[test]
fn test_invalid_smoothing_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    repcam(temp_dir.path())
        .arg("--smoothing")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 1"));
}

#[test]
fn test_help_lists_original_flag_names() {
    let temp_dir = tempfile::tempdir().unwrap();
    repcam(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--custom_classifier")
                .and(predicate::str::contains("--path_in"))
                .and(predicate::str::contains("--path_out"))
                .and(predicate::str::contains("--use_gpu")),
        );
}

#[test]
fn test_labels_requires_classifier() {
    let temp_dir = tempfile::tempdir().unwrap();
    repcam(temp_dir.path())
        .arg("labels")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--custom_classifier"));
}

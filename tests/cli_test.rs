//! CLI end-to-end tests
//!
//! Tests for the slidecast command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

/// Get a command for the slidecast binary
#[allow(deprecated)]
fn slidecast_cmd() -> Command {
    Command::cargo_bin("slidecast").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = slidecast_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = slidecast_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("slidecast"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_flag() {
    let mut cmd = slidecast_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("slidecast"));
}

#[test]
fn test_cli_transcode_help() {
    let mut cmd = slidecast_cmd();
    cmd.args(["transcode", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("full pipeline"))
        .stdout(predicate::str::contains("--scale"))
        .stdout(predicate::str::contains("--codec"))
        .stdout(predicate::str::contains("--vaapi"));
}

#[test]
fn test_cli_transcode_missing_input_fails() {
    let mut cmd = slidecast_cmd();
    cmd.args(["transcode", "/nonexistent/clip.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_probe_help() {
    let mut cmd = slidecast_cmd();
    cmd.args(["probe", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Probe a media file"));
}

#[test]
fn test_cli_probe_missing_file_fails() {
    let mut cmd = slidecast_cmd();
    cmd.args(["probe", "/nonexistent/clip.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = slidecast_cmd();
    cmd.arg("check-tools").assert().success().stdout(
        predicate::str::contains("ffmpeg")
            .and(predicate::str::contains("ffprobe")),
    );
}

#[test]
fn test_cli_validate_defaults() {
    let mut cmd = slidecast_cmd();
    cmd.arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("defaults"))
        .stdout(predicate::str::contains("Default codec: h264"));
}

#[test]
fn test_cli_validate_valid_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[transcode]\ndefault_codec = \"vp9\"").unwrap();

    let mut cmd = slidecast_cmd();
    cmd.arg("validate")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Default codec: vp9"));
}

#[test]
fn test_cli_validate_malformed_file_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "not toml [[[").unwrap();

    let mut cmd = slidecast_cmd();
    cmd.arg("validate").arg(file.path()).assert().failure();
}

#[test]
fn test_cli_version_command() {
    let mut cmd = slidecast_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

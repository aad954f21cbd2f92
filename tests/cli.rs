//! CLI end-to-end tests
//!
//! Tests for the camsync command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

use camsync::common::Codec;
use camsync::index::{DiskIndexCache, Fingerprint, FrameIndex, IndexCache};

/// Get a command for the camsync binary
#[allow(deprecated)]
fn camsync_cmd() -> Command {
    Command::cargo_bin("camsync").unwrap()
}

const RECORDING_DATA: &str = concat!(
    r#"<Recording RecordingToken="20190812_113000_B27F_00408C18823A">"#,
    "<SourceToken>4</SourceToken>",
    "<StartTime>2019-08-12T09:30:00.813188Z</StartTime>",
    "<StopTime>2019-08-12T09:45:00.945062Z</StopTime>",
    "<Track><VideoAttributes>",
    "<Width>1920</Width><Height>2160</Height><Framerate>25.00000</Framerate>",
    "</VideoAttributes></Track>",
    "</Recording>",
);

fn block_data(start: &str, stop: &str, status: &str) -> String {
    format!(
        "<RecordingBlock><StartTime>{start}</StartTime><StopTime>{stop}</StopTime>\
         <Status>{status}</Status></RecordingBlock>"
    )
}

/// Write a recording with two blocks under `root`.
fn write_recording(root: &Path) {
    fs::write(root.join("recording.xml"), RECORDING_DATA).unwrap();
    let blocks = [
        ("b1", "2019-08-12T09:30:00.813188Z", "2019-08-12T09:35:00.813188Z"),
        ("b2", "2019-08-12T09:35:00.900000Z", "2019-08-12T09:45:00.945062Z"),
    ];
    for (name, start, stop) in blocks {
        let dir = root.join(name);
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(format!("{name}.xml")), block_data(start, stop, "Complete")).unwrap();
        fs::write(dir.join(format!("{name}.mkv")), b"video").unwrap();
    }
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = camsync_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = camsync_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("camsync "));
}

#[test]
fn test_cli_recording_text() {
    let dir = tempdir().unwrap();
    write_recording(dir.path());

    let mut cmd = camsync_cmd();
    cmd.arg("recording")
        .arg(dir.path().join("recording.xml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("20190812_113000_B27F_00408C18823A"))
        .stdout(predicate::str::contains("Channel: 4"))
        .stdout(predicate::str::contains("Blocks: 2"))
        .stdout(predicate::str::contains("2019-08-12T09:30:00.813188Z"));
}

#[test]
fn test_cli_recording_json() {
    let dir = tempdir().unwrap();
    write_recording(dir.path());

    let output = camsync_cmd()
        .arg("recording")
        .arg(dir.path().join("recording.xml"))
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["channel"], 4);
    assert_eq!(json["width"], 1920);
    let blocks = json["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 2);
    assert!(blocks[0]["path"].as_str().unwrap().ends_with("b1.mkv"));
    assert_eq!(blocks[1]["status"], "Complete");
}

#[test]
fn test_cli_recording_incomplete_block_fails() {
    let dir = tempdir().unwrap();
    write_recording(dir.path());
    fs::write(
        dir.path().join("b2/b2.xml"),
        block_data("2019-08-12T09:35:00Z", "2019-08-12T09:45:00Z", "Recording"),
    )
    .unwrap();

    let mut cmd = camsync_cmd();
    cmd.arg("recording")
        .arg(dir.path().join("recording.xml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Complete"));
}

#[test]
fn test_cli_index_summary() {
    let dir = tempdir().unwrap();
    let video = dir.path().join("clip.mkv");
    fs::write(&video, b"video").unwrap();

    let mut builder = FrameIndex::builder(Codec::H264);
    for i in 0..50i64 {
        builder.push(i * 40_000, i as u64 * 1000, i % 25 == 0);
    }
    let index = builder.build(1_448_984_844_000_000);
    let fingerprint = Fingerprint::compute(&video, Codec::H264).unwrap();
    DiskIndexCache::sidecar()
        .store(&video, &fingerprint, &index)
        .unwrap();

    let mut cmd = camsync_cmd();
    cmd.arg("index")
        .arg(&video)
        .assert()
        .success()
        .stdout(predicate::str::contains("Codec: h264"))
        .stdout(predicate::str::contains("Frames: 50"))
        .stdout(predicate::str::contains("Keyframes: 2"))
        .stdout(predicate::str::contains(fingerprint.as_str()));

    let output = camsync_cmd()
        .arg("index")
        .arg(dir.path().join("clip.mkv.idx"))
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["frames"], 50);
    assert_eq!(json["first_systime"], 1_448_984_844.0);
}

#[test]
fn test_cli_index_missing() {
    let dir = tempdir().unwrap();
    let mut cmd = camsync_cmd();
    cmd.arg("index")
        .arg(dir.path().join("nothing.mkv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read index file"));
}

#[test]
fn test_cli_validate_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("camsync.toml");
    fs::write(&config, "[cache]\nmode = \"directory\"\n").unwrap();

    let mut cmd = camsync_cmd();
    cmd.arg("validate")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("cache.dir is not set"))
        .stdout(predicate::str::contains("Cache mode: Directory"));

    fs::write(&config, "[decode]\ngrey = true\n").unwrap();
    let mut cmd = camsync_cmd();
    cmd.arg("--config")
        .arg(&config)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Grey: true"));
}

#[test]
fn test_cli_validate_invalid_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("camsync.toml");
    fs::write(&config, "[cache]\nmode = \"cloud\"\n").unwrap();

    let mut cmd = camsync_cmd();
    cmd.arg("validate")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

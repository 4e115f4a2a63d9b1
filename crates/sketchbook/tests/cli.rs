use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn sketchbook(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sketchbook"))
        .env("SKETCHBOOK_CONFIG_DIR", root.join("config"))
        .env("SKETCHBOOK_DATA_DIR", root.join("data"))
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run sketchbook")
}

#[test]
fn export_writes_numbered_frames() {
    let root = TempDir::new().unwrap();
    let out = root.path().join("out");
    let output = sketchbook(
        root.path(),
        &[
            "export",
            "flock",
            "--frames",
            "2",
            "--seed",
            "42",
            "--size",
            "64x64",
            "--backend",
            "2d",
            "--out",
            out.to_str().unwrap(),
        ],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let dir = out.join("flock-42");
    assert!(dir.join("frame-00000.png").exists());
    assert!(dir.join("frame-00001.png").exists());
    assert!(!dir.join("frame-00002.png").exists());
    let printed = String::from_utf8_lossy(&output.stdout);
    assert_eq!(printed.trim(), dir.display().to_string());
}

#[test]
fn export_defaults_to_timestamped_data_dir() {
    let root = TempDir::new().unwrap();
    let sketches = root.path().join("config/sketches");
    fs::create_dir_all(&sketches).unwrap();
    fs::write(
        sketches.join("echo.toml"),
        "seed = 7\n\n[surface]\nwidth = 32\nheight = 32\n\n[params]\ncount = 3\n",
    )
    .unwrap();

    let output = sketchbook(root.path(), &["export", "echo"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let exports = root.path().join("data/exports");
    let stamps: Vec<_> = fs::read_dir(&exports)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(stamps.len(), 1);
    assert!(stamps[0].join("echo-7/frame-00000.png").exists());
}

#[test]
fn mesh_sketches_refuse_the_2d_backend() {
    let root = TempDir::new().unwrap();
    let output = sketchbook(
        root.path(),
        &[
            "export",
            "tubes",
            "--backend",
            "2d",
            "--size",
            "16x16",
            "--out",
            root.path().join("out").to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("gpu"), "stderr: {stderr}");
}

#[test]
fn list_json_describes_every_sketch() {
    let root = TempDir::new().unwrap();
    let output = sketchbook(root.path(), &["list", "--json"]);
    assert!(output.status.success());

    let sketches: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = sketches
        .as_array()
        .unwrap()
        .iter()
        .map(|sketch| sketch["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["flock", "echo", "tubes", "panes"]);
    assert_eq!(sketches[2]["backend"], "gpu");
}

#[test]
fn unknown_sketch_fails_cleanly() {
    let root = TempDir::new().unwrap();
    let output = sketchbook(root.path(), &["export", "nope"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown sketch"));
}

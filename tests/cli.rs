//! Command line of the `dakara-play` binary

use std::process::Command;

use tempfile::TempDir;

fn run(args: &[&str], home: &TempDir) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_dakara-play"))
        .args(args)
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute dakara-play");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

#[test]
fn version_is_printed() {
    let home = TempDir::new().unwrap();
    let (stdout, _stderr, code) = run(&["--version"], &home);

    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), format!("dakara-play {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn create_config_writes_default_file() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("player.toml");
    let path_arg = path.to_str().unwrap();

    let (_stdout, _stderr, code) = run(&["--config", path_arg, "create-config"], &home);
    assert_eq!(code, 0);
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("kara_folder"));
    assert!(content.contains("backend = \"vlc\""));

    // kept unless forced
    std::fs::write(&path, "fullscreen = true\n").unwrap();
    run(&["--config", path_arg, "create-config"], &home);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "fullscreen = true\n");

    run(&["--config", path_arg, "create-config", "--force"], &home);
    assert!(std::fs::read_to_string(&path).unwrap().contains("[durations]"));
}

#[test]
fn play_without_config_fails() {
    let home = TempDir::new().unwrap();
    let missing = home.path().join("missing.toml");

    let (_stdout, stderr, code) = run(&["--config", missing.to_str().unwrap(), "play"], &home);
    assert_eq!(code, 1);
    assert!(stderr.contains("Unable to load the configuration"));
    assert!(stderr.contains("create-config"));
}

#[test]
fn invalid_backend_is_rejected() {
    let home = TempDir::new().unwrap();
    let (_stdout, stderr, code) = run(&["play", "--backend", "gstreamer"], &home);

    assert_eq!(code, 2);
    assert!(stderr.contains("gstreamer"));
}

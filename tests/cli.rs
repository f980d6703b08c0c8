use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("lightbox-tui").expect("bin");
    cmd.env_remove("LIGHTBOX_SHARE__BASE_URL")
        .env_remove("LIGHTBOX_CATALOG__PATH");
    cmd
}

#[test]
fn prints_version() {
    bin()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    bin()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("Lightbox-TUI"))
        .stdout(predicate::str::contains("--catalog"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn prints_share_link() {
    let dir = tempdir().unwrap();
    bin()
        .args(["--config"])
        .arg(dir.path().join("config.yaml"))
        .args(["--link", "3"])
        .assert()
        .success()
        .stdout("https://eazyfilms.com/?image=3\n");
}

#[test]
fn share_link_uses_configured_origin() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    fs::write(&config, "share:\n  base_url: https://photos.example.org/gallery\n").unwrap();
    bin()
        .arg("--config")
        .arg(&config)
        .args(["--link", "12"])
        .assert()
        .success()
        .stdout(predicate::str::diff("https://photos.example.org/?image=12\n"));
}

#[test]
fn share_link_rejects_items_outside_catalog() {
    let dir = tempdir().unwrap();
    let manifest = dir.path().join("catalog.yaml");
    fs::write(
        &manifest,
        "- id: 1\n  src: pier.jpg\n  title: Pier\n  category: Street\n",
    )
    .unwrap();
    bin()
        .arg("--config")
        .arg(dir.path().join("config.yaml"))
        .arg("--catalog")
        .arg(&manifest)
        .args(["--link", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("item 5"));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    bin()
        .arg("--bogus")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown argument --bogus"));
}

//! Smoke tests for the ridebook CLI
//!
//! These tests verify basic CLI functionality without a browser: help,
//! configuration handling, and order-list replay from saved pages.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command for the ridebook binary with a clean environment
fn ridebook() -> Command {
    let mut cmd = Command::cargo_bin("ridebook").expect("ridebook binary should exist");
    cmd.env_remove("RIDEBOOK_ID")
        .env_remove("RIDEBOOK_PASSWORD")
        .env_remove("RIDEBOOK_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

const ORDERS: &str = r#"<html><body><div class="order-list">
  <div class="order-item"><span class="status">已派車</span>
    <span class="date-time">2026/10/20 16:40</span><span class="car-no">KAA-1234</span>
    <span class="driver">王大明</span><span class="fee">車資 120元</span></div>
  <div class="order-item"><span class="status">已取消</span>
    <span class="date-time">2026/10/21 09:00</span><span class="car-no">KAA-9999</span>
    <span class="fee">車資 120元</span></div>
</div></body></html>"#;

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    ridebook()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    ridebook()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("reserve"))
        .stdout(predicate::str::contains("scrape"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_no_args_fails() {
    ridebook().assert().failure();
}

#[test]
fn test_scrape_help_mentions_fixture() {
    ridebook()
        .args(["scrape", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--fixture"))
        .stdout(predicate::str::contains("RIDEBOOK_ID"));
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_prints_defaults() {
    ridebook()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("base_url"))
        .stdout(predicate::str::contains("max_iterations"))
        .stdout(predicate::str::contains("credentials").not());
}

#[test]
fn test_config_check_with_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ridebook.yaml");
    fs::write(
        &path,
        "site:\n  base_url: https://booking.example/\nscrape:\n  max_iterations: 4\n",
    )
    .unwrap();
    ridebook()
        .args(["config", "--check", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration OK"));
}

#[test]
fn test_config_rejects_bad_url() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ridebook.yaml");
    fs::write(&path, "site:\n  base_url: ftp://booking.example/\n").unwrap();
    ridebook()
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_missing_config_file_fails() {
    ridebook()
        .args(["config", "--config", "/nonexistent/ridebook.yaml"])
        .assert()
        .failure();
}

// ============================================================================
// Flow Tests (no browser)
// ============================================================================

#[test]
fn test_reserve_without_credentials_fails_before_launch() {
    ridebook()
        .arg("reserve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("credentials missing"));
}

#[test]
fn test_scrape_fixture_prints_dispatched_orders() {
    let temp = TempDir::new().unwrap();
    let page = temp.path().join("orders.html");
    fs::write(&page, ORDERS).unwrap();
    ridebook()
        .args(["-q", "scrape", "--fixture"])
        .arg(&page)
        .assert()
        .success()
        .stdout(predicate::str::contains("KAA-1234"))
        .stdout(predicate::str::contains("KAA-9999").not())
        .stdout(predicate::str::contains("\"stopReason\": \"fixed_point\""));
}

#[test]
fn test_scrape_fixture_to_output_file() {
    let temp = TempDir::new().unwrap();
    let page = temp.path().join("orders.html");
    let out = temp.path().join("orders.json");
    fs::write(&page, ORDERS).unwrap();
    ridebook()
        .args(["-q", "scrape", "--fixture"])
        .arg(&page)
        .arg("--output")
        .arg(&out)
        .assert()
        .success();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["records"][0]["vehicleNumber"], "KAA-1234");
    assert_eq!(json["success"], true);
}

#[test]
fn test_scrape_fixture_without_list_fails() {
    let temp = TempDir::new().unwrap();
    let page = temp.path().join("maintenance.html");
    fs::write(&page, "<html><body><p>系統維護中</p></body></html>").unwrap();
    ridebook()
        .args(["-q", "scrape", "--fixture"])
        .arg(&page)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Flow did not complete"));
}

#[test]
fn test_scrape_rejects_zero_iterations() {
    ridebook()
        .args(["scrape", "--max-iterations", "0", "--fixture", "x.html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--max-iterations"));
}

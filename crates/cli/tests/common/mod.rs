// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test utilities for CLI integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::Path;
use tempfile::TempDir;

/// `harbor` with logging quieted so stderr only carries failures
pub fn harbor() -> Command {
    let mut cmd = Command::cargo_bin("harbor").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

/// Temporary directory holding a store directory and config files
pub fn setup_test_env() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Config with short election windows so simulations finish quickly
pub fn write_fast_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("harbor.toml");
    std::fs::write(
        &path,
        r#"
[election]
baseline_window = "100ms"
max_window = "200ms"
heartbeat_interval = "200ms"

[wal]
replay_delay = "50ms"
result_poll_interval = "20ms"
"#,
    )
    .unwrap();
    path
}

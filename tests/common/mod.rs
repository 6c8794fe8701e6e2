#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use codeqa::config::PipelineConfig;
use codeqa::Pipeline;

/// Python-backed tests are `#[ignore]`d by default and run with
/// `cargo test -- --ignored`. Once opted in, a missing interpreter is a
/// failure rather than a silent pass.
pub fn require_pytest() {
    let ok = Command::new("python3")
        .args(["-m", "pytest", "--version"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    assert!(ok, "python3 with pytest is required for this test");
}

pub fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let p = dir.join(name);
    fs::write(&p, body).unwrap();
    p
}

/// Offline pipeline with its memory bank inside `dir`.
pub fn offline_pipeline(dir: &Path) -> Pipeline {
    Pipeline::new(PipelineConfig {
        memory_path: dir.join("data").join("memory_bank.json"),
        timeout_secs: 60,
        ..PipelineConfig::default()
    })
}

// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=DUAL_CAMERA_RECORDER_VERSION");

    // Packaged builds set the version explicitly
    let version = match std::env::var("DUAL_CAMERA_RECORDER_VERSION") {
        Ok(v) => v,
        Err(_) => git_version().unwrap_or_else(env_version),
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

fn env_version() -> String {
    std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".to_string())
}

/// `git describe` output reshaped to "<tag>-<hash>" or "<tag>-dirty-<hash>"
fn git_version() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let described = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let described = described.strip_prefix('v').unwrap_or(&described);

    // No tag yet: describe falls back to the bare hash
    if !described.contains('.') {
        return Some(format!("{}-{}", env_version(), described));
    }

    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    if parts.len() >= 3 {
        let hash = parts[0].strip_prefix('g').unwrap_or(parts[0]);
        Some(format!("{}-dirty-{}", parts[2], hash))
    } else {
        let hash = commit_hash().unwrap_or_else(|| "unknown".to_string());
        Some(format!("{}-{}", described, hash))
    }
}

fn commit_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

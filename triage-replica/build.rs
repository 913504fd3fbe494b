//! Build identification for the startup log and `/health`
//!
//! Exposes `GIT_HASH` (short hash, `-dirty` when the tree has local edits),
//! `BUILD_TIMESTAMP` and `BUILD_PROFILE` as compile-time env vars.

use std::process::Command;

/// Trimmed stdout of a successful git invocation
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn main() {
    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=../.git/index");

    let git_hash = match git(&["rev-parse", "--short=8", "HEAD"]) {
        Some(hash) => {
            let dirty = git(&["status", "--porcelain", "--untracked-files=no"])
                .map_or(false, |status| !status.is_empty());
            if dirty {
                format!("{}-dirty", hash)
            } else {
                hash
            }
        }
        None => "unknown".to_string(),
    };

    let build_timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=BUILD_PROFILE={}", profile);
}

use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

/// Stamps `BUILD_TIME`, `GIT_COMMIT_HASH` and `GIT_DIRTY` for `src/version.rs`.
fn main() {
    let build_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=BUILD_TIME={build_time}");

    let commit = git(&["rev-parse", "--short", "HEAD"])
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=GIT_COMMIT_HASH={commit}");

    let dirty = match git(&["diff", "--quiet", "--ignore-submodules"]) {
        Some(_) => "clean",
        None if commit == "unknown" => "unknown",
        None => "dirty",
    };
    println!("cargo:rustc-env=GIT_DIRTY={dirty}");

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
}

/// Output of a successful git invocation; `None` when git fails or is missing.
fn git(args: &[&str]) -> Option<std::process::Output> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
}

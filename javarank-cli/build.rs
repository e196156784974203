// Build script that stamps the binary with `git describe` output.
//
// Falls back to CARGO_PKG_VERSION when git is unavailable at build time.

use std::process::Command;

fn main() {
    let version = describe_version().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=JAVARANK_VERSION={}", version);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/tags");
}

fn describe_version() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let described = String::from_utf8(output.stdout).ok()?;
    let described = described.trim();

    match described.strip_prefix('v') {
        // "v0.1.0" or "v0.1.0-5-gabc123-dirty": keep only the tag part
        Some(tagged) => Some(tagged.split('-').next().unwrap_or(tagged).to_string()),
        // bare sha, possibly dirty
        None => Some(format!("{}-{}", env!("CARGO_PKG_VERSION"), described)),
    }
}

use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    let commit = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".into());
    let branch = git(&["branch", "--show-current"]).unwrap_or_else(|| "unknown".into());

    println!("cargo:rustc-env=RELINST_GIT_COMMIT={}", commit);
    println!("cargo:rustc-env=RELINST_GIT_BRANCH={}", branch);

    // A tag at HEAD marks a release build.
    let tag = git(&["tag", "--points-at", "HEAD"])
        .and_then(|t| t.lines().next().map(str::to_string));
    if let Some(tag) = tag {
        println!("cargo:rustc-env=RELINST_GIT_TAG={}", tag);
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
}

#![cfg(feature = "e2e")]

mod common;

use common::{CommandOutput, TestContext};

// Real release assets of vdot v0.3.7 with the digests published alongside them.
const VDOT_DESCRIPTOR: &str = r#"
name: vdot
desc: Create your .env files and start processes using Vault
homepage: https://github.com/sjparkinson/vdot
version: 0.3.7
assets:
  macos-x86_64:
    url: https://github.com/sjparkinson/vdot/releases/download/v0.3.7/vdot-v0.3.7-x86_64-apple-darwin.tar.gz
    sha256: d27cbe0401311ef9c8f722e1cd9a6cc5638f0bc16890e388e13a70dcfec1b2de
  linux-x86_64:
    url: https://github.com/sjparkinson/vdot/releases/download/v0.3.7/vdot-v0.3.7-x86_64-unknown-linux-musl.tar.gz
    sha256: 13d1301fbf544784c198a0b9f6e43c942383664857b030ff1810785448916f10
"#;

#[test]
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn e2e_install_vdot_from_github() {
    let ctx = TestContext::new();
    let descriptor = ctx.write_descriptor("vdot.yaml", VDOT_DESCRIPTOR);

    let output: CommandOutput = ctx
        .cmd()
        .args(["-v", "install", descriptor.to_str().unwrap()])
        .output()
        .expect("Failed to run relinst")
        .into();

    output
        .assert_success()
        .assert_stdout_contains("installed vdot 0.3.7");
    assert!(ctx.installed().is_file());

    ctx.run(&["test", "vdot"]).assert_success();
}

#[test]
fn e2e_tampered_digest_is_rejected() {
    let ctx = TestContext::new();
    let tampered = VDOT_DESCRIPTOR
        .replace(
            "13d1301fbf544784c198a0b9f6e43c942383664857b030ff1810785448916f10",
            "13d1301fbf544784c198a0b9f6e43c942383664857b030ff1810785448916f11",
        )
        .replace(
            "d27cbe0401311ef9c8f722e1cd9a6cc5638f0bc16890e388e13a70dcfec1b2de",
            "d27cbe0401311ef9c8f722e1cd9a6cc5638f0bc16890e388e13a70dcfec1b2df",
        );
    let descriptor = ctx.write_descriptor("vdot.yaml", &tampered);

    for platform in ["linux-x86_64", "macos-x86_64"] {
        ctx.run(&["install", descriptor.to_str().unwrap(), "--platform", platform])
            .assert_failure()
            .assert_stderr_contains("verify: sha256 mismatch");
    }
    assert!(!ctx.installed().exists());
}

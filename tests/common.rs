use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const OK_SCRIPT: &str = "#!/bin/sh\necho \"usage: vdot [--help]\"\nexit 0\n";

// Each integration test binary uses a different subset of these helpers.
#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
    pub bin_dir: PathBuf,
    pub bin_path: PathBuf,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config").join("config.json");
        let bin_dir = temp_dir.path().join("bin");

        let bin_path = PathBuf::from(env!("CARGO_BIN_EXE_relinst"));

        Self {
            temp_dir,
            config_path,
            bin_dir,
            bin_path,
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::new(&self.bin_path);
        cmd.env("RELINST_CONFIG_PATH", &self.config_path);
        cmd.env("RELINST_BIN_DIR", &self.bin_dir);
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("XDG_CONFIG_HOME", self.temp_dir.path().join("xdg-config"));
        cmd.env_remove("RELINST_RUN_SELF_TEST");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    pub fn run(&self, args: &[&str]) -> CommandOutput {
        self.cmd()
            .args(args)
            .output()
            .expect("Failed to run relinst")
            .into()
    }

    /// Write a tar.gz holding `vdot-<version>/vdot` with the given script and
    /// return its `file://` URL and SHA-256.
    pub fn write_release(&self, archive_name: &str, script: &str) -> (String, String) {
        let bytes = tar_gz(&[("vdot-v0.3.7/vdot", script.as_bytes(), 0o755)]);
        let path = self.temp_dir.path().join(archive_name);
        fs::write(&path, &bytes).expect("write archive");
        (format!("file://{}", path.display()), sha256_hex(&bytes))
    }

    pub fn write_descriptor(&self, file_name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(file_name);
        fs::write(&path, content).expect("write descriptor");
        path
    }

    pub fn installed(&self) -> PathBuf {
        self.bin_dir.join("vdot")
    }
}

#[allow(dead_code)]
pub fn descriptor_yaml(platform: &str, url: &str, sha256: &str) -> String {
    format!(
        r#"name: vdot
desc: Create your .env files and start processes using Vault
homepage: https://github.com/sjparkinson/vdot
version: 0.3.7
assets:
  "{}":
    url: "{}"
    sha256: "{}"
"#,
        platform, url, sha256
    )
}

#[allow(dead_code)]
pub fn host_platform() -> &'static str {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("macos", "aarch64") => "macos-aarch64",
        ("macos", _) => "macos-x86_64",
        ("linux", "aarch64") => "linux-aarch64",
        ("windows", _) => "windows-x86_64",
        _ => "linux-x86_64",
    }
}

#[allow(dead_code)]
pub fn tar_gz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *contents)
            .expect("append tar entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

#[allow(dead_code)]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[allow(dead_code)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status,
        }
    }
}

#[allow(dead_code)]
impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        if !self.status.success() {
            panic!(
                "Command failed with status {:?}\nstdout: {}\nstderr: {}",
                self.status.code(),
                self.stdout,
                self.stderr
            );
        }
        self
    }

    pub fn assert_failure(&self) -> &Self {
        if self.status.success() {
            panic!(
                "Command unexpectedly succeeded\nstdout: {}\nstderr: {}",
                self.stdout, self.stderr
            );
        }
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Stdout did not contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Stderr did not contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}

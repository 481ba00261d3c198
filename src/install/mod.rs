//! The install pipeline.
//!
//! resolve -> fetch -> verify -> extract (or build) -> stage -> self-test ->
//! move into place -> record.
//!
//! The new executable is written to a staging file next to its final path and
//! only renamed over it once the self-test passed, so a failed install never
//! replaces a working binary with a broken one.

pub mod source;

use crate::archive::extract_entry;
use crate::config::save_config;
use crate::descriptor::{Asset, ReleaseDescriptor, SourceBuild};
use crate::digest::{verify, Sha256Digest};
use crate::download::fetch;
use crate::error::{InstallError, InstallResult};
use crate::platform::Platform;
use crate::types::{InstallKind, InstallRecord, RelinstConfig};
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempPath;

const ETXTBSY: i32 = 26;
const STDERR_TAIL: usize = 512;

/// How a descriptor gets turned into an executable on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStrategy<'a> {
    Prebuilt(&'a Asset),
    FromSource(&'a SourceBuild),
}

impl<'a> InstallStrategy<'a> {
    /// Pick the strategy once, before any network access.
    pub fn select(
        descriptor: &'a ReleaseDescriptor,
        platform: Platform,
        from_source: bool,
    ) -> InstallResult<Self> {
        if from_source {
            return descriptor
                .source
                .as_ref()
                .map(InstallStrategy::FromSource)
                .ok_or_else(|| InstallError::UnsupportedPlatform {
                    platform: platform.to_string(),
                    available: "no source build declared".to_string(),
                });
        }

        match descriptor.resolve_asset(platform) {
            Ok(asset) => Ok(InstallStrategy::Prebuilt(asset)),
            Err(err) => match &descriptor.source {
                Some(src) => {
                    tracing::info!(
                        "No prebuilt {} for {}, building from source",
                        descriptor.name,
                        platform
                    );
                    Ok(InstallStrategy::FromSource(src))
                }
                None => Err(err),
            },
        }
    }

    pub fn kind(&self) -> InstallKind {
        match self {
            InstallStrategy::Prebuilt(_) => InstallKind::Prebuilt,
            InstallStrategy::FromSource(_) => InstallKind::Source,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            InstallStrategy::Prebuilt(a) => &a.url,
            InstallStrategy::FromSource(s) => &s.url,
        }
    }

    pub fn sha256(&self) -> &Sha256Digest {
        match self {
            InstallStrategy::Prebuilt(a) => &a.sha256,
            InstallStrategy::FromSource(s) => &s.sha256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub platform: Platform,
    pub bin_dir: PathBuf,
    pub from_source: bool,
    pub run_self_test: bool,
}

#[derive(Debug, Clone)]
pub struct Installed {
    pub path: PathBuf,
    pub kind: InstallKind,
    pub sha256: Sha256Digest,
}

/// Run the whole pipeline for one descriptor.
pub async fn install(
    descriptor: &ReleaseDescriptor,
    opts: &InstallOptions,
) -> InstallResult<Installed> {
    let strategy = InstallStrategy::select(descriptor, opts.platform, opts.from_source)?;
    let file_name = descriptor.executable_name(opts.platform);
    let target = opts.bin_dir.join(&file_name);

    tracing::info!(
        "Installing {} {} ({}) for {}",
        descriptor.name,
        descriptor.version,
        strategy.kind(),
        opts.platform
    );

    let executable = match strategy {
        InstallStrategy::Prebuilt(asset) => {
            let bytes = fetch(&asset.url).await?;
            verify(&bytes, &asset.sha256)?;
            extract_entry(&bytes, asset.format, &file_name)?
        }
        InstallStrategy::FromSource(src) => source::build(src, &file_name).await?,
    };

    let staged = stage(&executable, &opts.bin_dir, &file_name)?;
    if opts.run_self_test {
        self_test(&staged, &descriptor.test.args)?;
    } else {
        tracing::warn!("Skipping self-test of {}", descriptor.name);
    }

    staged.persist(&target).map_err(|e| InstallError::Io(e.error))?;
    tracing::info!("Installed {} to {}", descriptor.name, target.display());

    Ok(Installed {
        path: target,
        kind: strategy.kind(),
        sha256: *strategy.sha256(),
    })
}

/// Write `bytes` to an executable temp file in `dir`. The file is removed
/// when the returned path is dropped without being persisted.
fn stage(bytes: &[u8], dir: &Path, file_name: &str) -> InstallResult<TempPath> {
    fs::create_dir_all(dir)?;
    let mut file = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".staging")
        .tempfile_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o755))?;
    }

    tracing::debug!("Staged {} at {}", file_name, file.path().display());
    // Close the write handle; exec of a file open for writing fails.
    Ok(file.into_temp_path())
}

/// Run `path args...` and require exit status 0.
pub fn self_test(path: &Path, args: &[String]) -> InstallResult<()> {
    tracing::info!("Self-testing {} {}", path.display(), args.join(" "));

    let fail = |reason: String| InstallError::SelfTest {
        path: path.display().to_string(),
        reason,
    };

    let output = run_captured(path, args).map_err(|e| fail(format!("could not be run: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail = tail(stderr.trim(), STDERR_TAIL);
        let code = output
            .status
            .code()
            .map_or_else(|| "a signal".to_string(), |c| c.to_string());
        return Err(fail(if tail.is_empty() {
            format!("exited with {}", code)
        } else {
            format!("exited with {}: {}", code, tail)
        }));
    }
    Ok(())
}

// Another thread forking while a staging file was still open for writing can
// leave a copy of that descriptor alive for a moment; retry on ETXTBSY.
fn run_captured(path: &Path, args: &[String]) -> std::io::Result<Output> {
    let mut attempts = 0;
    loop {
        let result = Command::new(path)
            .args(args)
            .stdin(Stdio::null())
            .output();
        match result {
            Err(e) if e.raw_os_error() == Some(ETXTBSY) && attempts < 5 => {
                attempts += 1;
                std::thread::sleep(std::time::Duration::from_millis(20 * attempts));
            }
            other => return other,
        }
    }
}

pub(crate) fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Install and record the result in the state file.
pub async fn install_release(
    config: &mut RelinstConfig,
    descriptor: &ReleaseDescriptor,
    opts: &InstallOptions,
) -> Result<PathBuf> {
    let previous = config.tools.get(&descriptor.name).map(|r| r.version.clone());

    let installed = install(descriptor, opts).await?;

    let record = InstallRecord {
        name: descriptor.name.clone(),
        version: descriptor.version.to_string(),
        platform: opts.platform.to_string(),
        kind: installed.kind,
        executable_path: installed.path.to_string_lossy().to_string(),
        sha256: installed.sha256.to_hex(),
        installed_at: Utc::now().to_rfc3339(),
        test_args: descriptor.test.args.clone(),
        homepage: descriptor.homepage.clone(),
    };
    config.tools.insert(descriptor.name.clone(), record);
    save_config(config)?;

    if let Some(v) = previous.filter(|v| *v != descriptor.version.to_string()) {
        tracing::info!("Replaced {} {} with {}", descriptor.name, v, descriptor.version);
    }

    Ok(installed.path)
}

/// Re-run the self-test of an installed tool.
pub fn test_installed(config: &RelinstConfig, name: &str) -> Result<()> {
    let record = config
        .tools
        .get(name)
        .ok_or_else(|| anyhow!("Tool '{}' is not installed", name))?;
    self_test(Path::new(&record.executable_path), &record.test_args)?;
    Ok(())
}

pub fn remove_tool(config: &mut RelinstConfig, name: &str) -> Result<()> {
    let record = config
        .tools
        .remove(name)
        .ok_or_else(|| anyhow!("Tool '{}' not found", name))?;

    match fs::remove_file(&record.executable_path) {
        Ok(()) => tracing::info!("Removed {}", record.executable_path),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!("{} was already gone", record.executable_path)
        }
        Err(e) => {
            return Err(anyhow!(
                "Could not remove {}: {}",
                record.executable_path,
                e
            ))
        }
    }

    save_config(config)?;
    tracing::info!("Tool '{}' removed successfully", name);
    Ok(())
}

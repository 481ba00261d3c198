//! Build-from-source strategy.
//!
//! The source archive goes through the same verification as a prebuilt one;
//! the toolchain only ever runs on verified bytes.

use crate::archive::unpack;
use crate::descriptor::{SourceBuild, Toolchain};
use crate::digest::verify;
use crate::download::fetch;
use crate::error::{InstallError, InstallResult};
use crate::install::tail;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use walkdir::WalkDir;

const MAX_ROOT_DEPTH: usize = 2;

/// Fetch, verify, unpack and build; returns the built executable's bytes.
pub async fn build(source: &SourceBuild, file_name: &str) -> InstallResult<Vec<u8>> {
    let bytes = fetch(&source.url).await?;
    verify(&bytes, &source.sha256)?;

    let work = TempDir::new()?;
    unpack(&bytes, source.format, work.path())?;

    let root = find_source_root(work.path(), &source.toolchain.manifest)?;
    run_toolchain(&source.toolchain, &root)?;

    let output = output_path(&source.toolchain, &root, file_name);
    fs::read(&output).map_err(|e| {
        InstallError::Build(format!(
            "expected build output {} is missing: {}",
            output.display(),
            e
        ))
    })
}

/// Shallowest directory (at most two levels down) that holds `manifest`.
/// Source tarballs usually wrap everything in one `<name>-<version>/` folder.
pub fn find_source_root(dir: &Path, manifest: &str) -> InstallResult<PathBuf> {
    WalkDir::new(dir)
        .max_depth(MAX_ROOT_DEPTH + 1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == manifest)
        .min_by_key(|e| e.depth())
        .and_then(|e| e.path().parent().map(Path::to_path_buf))
        .ok_or_else(|| {
            InstallError::Build(format!(
                "no {} found in the unpacked source archive",
                manifest
            ))
        })
}

fn output_path(toolchain: &Toolchain, root: &Path, file_name: &str) -> PathBuf {
    match &toolchain.output {
        Some(rel) => root.join(rel),
        None => root.join("target").join("release").join(file_name),
    }
}

pub fn run_toolchain(toolchain: &Toolchain, root: &Path) -> InstallResult<()> {
    tracing::info!(
        "Building in {}: {} {}",
        root.display(),
        toolchain.program,
        toolchain.args.join(" ")
    );

    let output = Command::new(&toolchain.program)
        .args(&toolchain.args)
        .current_dir(root)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                InstallError::Build(format!(
                    "toolchain '{}' not found on PATH",
                    toolchain.program
                ))
            } else {
                InstallError::Build(format!("could not run '{}': {}", toolchain.program, e))
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(InstallError::Build(format!(
            "'{}' failed ({}): {}",
            toolchain.program,
            output.status,
            tail(stderr.trim(), 512)
        )));
    }

    tracing::debug!("Build finished");
    Ok(())
}

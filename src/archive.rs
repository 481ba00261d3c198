use crate::error::{InstallError, InstallResult};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;
use tar::Archive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[serde(rename = "tar.gz", alias = "tgz")]
    TarGz,
    #[serde(rename = "tar.xz")]
    TarXz,
    #[serde(rename = "zip")]
    Zip,
}

impl ArchiveFormat {
    /// Guess the format from the file name at the end of a URL.
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(&['?', '#'][..]).next().unwrap_or(url).to_lowercase();
        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if path.ends_with(".tar.xz") || path.ends_with(".txz") {
            Some(ArchiveFormat::TarXz)
        } else if path.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else {
            None
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim_start_matches('.').to_lowercase().as_str() {
            "tar.gz" | "tgz" => Some(ArchiveFormat::TarGz),
            "tar.xz" | "txz" => Some(ArchiveFormat::TarXz),
            "zip" => Some(ArchiveFormat::Zip),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarXz => "tar.xz",
            ArchiveFormat::Zip => "zip",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn malformed(format: ArchiveFormat, e: impl fmt::Display) -> InstallError {
    InstallError::Archive(format!("malformed {} archive: {}", format, e))
}

/// Read the regular file named `entry_name` out of an in-memory archive.
///
/// The entry may sit in any directory; when several match, the shallowest
/// wins.
pub fn extract_entry(
    bytes: &[u8],
    format: ArchiveFormat,
    entry_name: &str,
) -> InstallResult<Vec<u8>> {
    tracing::info!("Extracting {} from {} archive...", entry_name, format);

    let found = match format {
        ArchiveFormat::TarGz => find_in_tar(GzDecoder::new(bytes), format, entry_name)?,
        ArchiveFormat::TarXz => find_in_tar(xz2::read::XzDecoder::new(bytes), format, entry_name)?,
        ArchiveFormat::Zip => find_in_zip(bytes, entry_name)?,
    };

    found.ok_or_else(|| {
        InstallError::Archive(format!(
            "entry '{}' not found in {} archive",
            entry_name, format
        ))
    })
}

fn find_in_tar<R: Read>(
    reader: R,
    format: ArchiveFormat,
    entry_name: &str,
) -> InstallResult<Option<Vec<u8>>> {
    let mut archive = Archive::new(reader);
    let mut best: Option<(usize, Vec<u8>)> = None;

    for entry in archive.entries().map_err(|e| malformed(format, e))? {
        let mut entry = entry.map_err(|e| malformed(format, e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path().map_err(|e| malformed(format, e))?.into_owned();
        if path.file_name().and_then(|n| n.to_str()) != Some(entry_name) {
            continue;
        }

        let depth = path.components().count();
        tracing::debug!("Candidate entry {} (depth {})", path.display(), depth);
        if best.as_ref().map_or(true, |(d, _)| depth < *d) {
            let mut buf = Vec::new();
            entry
                .read_to_end(&mut buf)
                .map_err(|e| malformed(format, e))?;
            best = Some((depth, buf));
        }
    }

    Ok(best.map(|(_, buf)| buf))
}

fn find_in_zip(bytes: &[u8], entry_name: &str) -> InstallResult<Option<Vec<u8>>> {
    let format = ArchiveFormat::Zip;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| malformed(format, e))?;
    let mut best: Option<(usize, usize)> = None;

    for i in 0..archive.len() {
        let file = archive.by_index(i).map_err(|e| malformed(format, e))?;
        if !file.is_file() {
            continue;
        }
        let Some(path) = file.enclosed_name() else {
            tracing::warn!("Skipping unsafe path in zip: {}", file.name());
            continue;
        };
        if path.file_name().and_then(|n| n.to_str()) != Some(entry_name) {
            continue;
        }
        let depth = path.components().count();
        if best.map_or(true, |(d, _)| depth < d) {
            best = Some((depth, i));
        }
    }

    match best {
        Some((_, index)) => {
            let mut file = archive.by_index(index).map_err(|e| malformed(format, e))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).map_err(|e| malformed(format, e))?;
            Ok(Some(buf))
        }
        None => Ok(None),
    }
}

/// Unpack a whole archive into `dest`. Used for source trees.
pub fn unpack(bytes: &[u8], format: ArchiveFormat, dest: &Path) -> InstallResult<()> {
    tracing::info!("Unpacking {} archive into {}", format, dest.display());
    fs::create_dir_all(dest)?;

    match format {
        ArchiveFormat::TarGz => Archive::new(GzDecoder::new(bytes))
            .unpack(dest)
            .map_err(|e| malformed(format, e)),
        ArchiveFormat::TarXz => Archive::new(xz2::read::XzDecoder::new(bytes))
            .unpack(dest)
            .map_err(|e| malformed(format, e)),
        ArchiveFormat::Zip => unpack_zip(bytes, dest),
    }
}

fn unpack_zip(bytes: &[u8], dest: &Path) -> InstallResult<()> {
    let format = ArchiveFormat::Zip;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| malformed(format, e))?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| malformed(format, e))?;
        let Some(relative) = file.enclosed_name().map(|p| p.to_path_buf()) else {
            tracing::warn!("Skipping unsafe path in zip: {}", file.name());
            continue;
        };
        let outpath = dest.join(relative);

        if file.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = fs::File::create(&outpath)?;
        io::copy(&mut file, &mut outfile).map_err(|e| malformed(format, e))?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&outpath, fs::Permissions::from_mode(mode & 0o777))?;
        }
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_format_from_url() {
        assert_eq!(
            ArchiveFormat::from_url("https://x/vdot-v0.3.7-x86_64-apple-darwin.tar.gz"),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::from_url("https://x/vdot.zip?token=abc"),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(ArchiveFormat::from_url("https://x/vdot.TGZ"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_url("https://x/vdot.tar.xz"), Some(ArchiveFormat::TarXz));
        assert_eq!(ArchiveFormat::from_url("https://x/vdot"), None);
    }

    #[test]
    fn test_extract_from_tar_gz_prefers_shallowest() {
        let bytes = tar_gz(&[
            ("vdot-v0.3.7/docs/vdot", &b"nested"[..], 0o644),
            ("vdot-v0.3.7/vdot", &b"binary"[..], 0o755),
            ("README.md", &b"readme"[..], 0o644),
        ]);
        let out = extract_entry(&bytes, ArchiveFormat::TarGz, "vdot").unwrap();
        assert_eq!(out, b"binary");
    }

    #[test]
    fn test_extract_from_zip() {
        let bytes = zip(&[("dist/vdot", &b"zipped"[..]), ("LICENSE", &b"mit"[..])]);
        let out = extract_entry(&bytes, ArchiveFormat::Zip, "vdot").unwrap();
        assert_eq!(out, b"zipped");
    }

    #[test]
    fn test_missing_entry_is_archive_error() {
        let bytes = tar_gz(&[("README.md", &b"readme"[..], 0o644)]);
        let err = extract_entry(&bytes, ArchiveFormat::TarGz, "vdot").unwrap_err();
        assert!(matches!(err, InstallError::Archive(ref m) if m.contains("not found")));
    }

    #[test]
    fn test_malformed_archive_is_archive_error() {
        let err = extract_entry(b"definitely not gzip", ArchiveFormat::TarGz, "vdot").unwrap_err();
        assert!(matches!(err, InstallError::Archive(_)));

        let err = extract_entry(b"PK but not really", ArchiveFormat::Zip, "vdot").unwrap_err();
        assert!(matches!(err, InstallError::Archive(_)));
    }

    #[test]
    fn test_unpack_zip_keeps_modes() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = zip(&[("src/build.sh", &b"#!/bin/sh\n"[..])]);
        unpack(&bytes, ArchiveFormat::Zip, dir.path()).unwrap();
        let path = dir.path().join("src/build.sh");
        assert!(path.is_file());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }
}

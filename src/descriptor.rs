//! Release descriptors: what to download for each platform and how to check it.
//!
//! Descriptors are read from JSON or YAML into a loosely typed raw form, then
//! validated field by field. Everything that can be wrong with a descriptor
//! (bad hashes, unknown platforms, leftover placeholders) is reported here,
//! before any network access.

use crate::archive::ArchiveFormat;
use crate::digest::Sha256Digest;
use crate::error::{InstallError, InstallResult};
use crate::platform::Platform;
use crate::template::has_placeholder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

const ANY_PLATFORM: &str = "any";

/// Key of an entry in a descriptor's asset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlatformKey {
    Only(Platform),
    /// One archive for every platform.
    Any,
}

impl FromStr for PlatformKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case(ANY_PLATFORM) {
            Ok(PlatformKey::Any)
        } else {
            s.parse().map(PlatformKey::Only)
        }
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformKey::Only(p) => write!(f, "{}", p),
            PlatformKey::Any => f.write_str(ANY_PLATFORM),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub url: String,
    pub sha256: Sha256Digest,
    pub format: ArchiveFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_build_args")]
    pub args: Vec<String>,
    /// Built executable, relative to the source root. Defaults to
    /// `target/release/<binary>`.
    #[serde(default)]
    pub output: Option<String>,
    /// File that marks the source root inside the unpacked archive.
    #[serde(default = "default_manifest")]
    pub manifest: String,
}

fn default_program() -> String {
    "cargo".to_string()
}
fn default_build_args() -> Vec<String> {
    vec!["build".into(), "--release".into(), "--locked".into()]
}
fn default_manifest() -> String {
    "Cargo.toml".to_string()
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_build_args(),
            output: None,
            manifest: default_manifest(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBuild {
    pub url: String,
    pub sha256: Sha256Digest,
    pub format: ArchiveFormat,
    pub toolchain: Toolchain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    #[serde(default = "default_test_args")]
    pub args: Vec<String>,
}

fn default_test_args() -> Vec<String> {
    vec!["--help".to_string()]
}

impl Default for TestSpec {
    fn default() -> Self {
        Self {
            args: default_test_args(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    pub name: String,
    pub desc: Option<String>,
    pub homepage: Option<String>,
    pub version: semver::Version,
    /// File name of the executable inside the archive and once installed.
    pub binary: String,
    pub assets: BTreeMap<PlatformKey, Asset>,
    pub source: Option<SourceBuild>,
    pub test: TestSpec,
}

// On-disk shape. Hashes, platforms and versions stay strings here so that
// validation can name the offending field.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDescriptor {
    name: String,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    version: String,
    #[serde(default)]
    binary: Option<String>,
    #[serde(default)]
    assets: BTreeMap<String, RawAsset>,
    #[serde(default)]
    source: Option<RawSource>,
    #[serde(default)]
    test: Option<TestSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAsset {
    url: String,
    sha256: String,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSource {
    url: String,
    sha256: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    toolchain: Option<Toolchain>,
}

fn invalid(field: &str, msg: impl fmt::Display) -> InstallError {
    InstallError::descriptor(format!("{}: {}", field, msg))
}

fn check_no_placeholder(field: &str, value: &str) -> InstallResult<()> {
    if has_placeholder(value) {
        return Err(invalid(
            field,
            format!("unresolved placeholder in '{}' (render the descriptor first)", value),
        ));
    }
    Ok(())
}

fn check_file_name(field: &str, value: &str) -> InstallResult<()> {
    if value.is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    if value.contains(&['/', '\\'][..]) || value == "." || value == ".." {
        return Err(invalid(field, format!("'{}' must be a plain file name", value)));
    }
    Ok(())
}

fn check_url(field: &str, url: &str) -> InstallResult<()> {
    check_no_placeholder(field, url)?;
    if !(url.starts_with("https://") || url.starts_with("http://") || url.starts_with("file://")) {
        return Err(invalid(
            field,
            format!("'{}' is not an http(s):// or file:// URL", url),
        ));
    }
    Ok(())
}

fn parse_digest(field: &str, value: &str) -> InstallResult<Sha256Digest> {
    check_no_placeholder(field, value)?;
    value.parse().map_err(|e| invalid(field, e))
}

fn parse_format(field: &str, explicit: Option<&str>, url: &str) -> InstallResult<ArchiveFormat> {
    match explicit {
        Some(f) => ArchiveFormat::parse(f).ok_or_else(|| {
            invalid(field, format!("unsupported archive format '{}' (tar.gz, tar.xz, zip)", f))
        }),
        None => ArchiveFormat::from_url(url).ok_or_else(|| {
            invalid(
                field,
                format!("cannot infer archive format from '{}'; set 'format'", url),
            )
        }),
    }
}

impl ReleaseDescriptor {
    /// Load from a file; `.json` is read as JSON, anything else as YAML.
    pub fn load(path: &Path) -> InstallResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            InstallError::descriptor(format!("cannot read {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loading descriptor from {}", path.display());

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    pub fn from_json(content: &str) -> InstallResult<Self> {
        let raw: RawDescriptor = serde_json::from_str(content)
            .map_err(|e| InstallError::descriptor(format!("invalid JSON: {}", e)))?;
        Self::validate(raw)
    }

    pub fn from_yaml(content: &str) -> InstallResult<Self> {
        let raw: RawDescriptor = serde_yaml::from_str(content)
            .map_err(|e| InstallError::descriptor(format!("invalid YAML: {}", e)))?;
        Self::validate(raw)
    }

    fn validate(raw: RawDescriptor) -> InstallResult<Self> {
        check_no_placeholder("name", &raw.name)?;
        check_file_name("name", &raw.name)?;

        check_no_placeholder("version", &raw.version)?;
        let version = semver::Version::parse(raw.version.strip_prefix('v').unwrap_or(&raw.version))
            .map_err(|e| {
                invalid(
                    "version",
                    format!("'{}' is not a semantic version: {}", raw.version, e),
                )
            })?;

        let binary = raw.binary.unwrap_or_else(|| raw.name.clone());
        check_no_placeholder("binary", &binary)?;
        check_file_name("binary", &binary)?;

        if let Some(homepage) = &raw.homepage {
            check_no_placeholder("homepage", homepage)?;
        }

        let mut assets = BTreeMap::new();
        for (key, asset) in raw.assets {
            let field = format!("assets.{}", key);
            check_no_placeholder(&field, &key)?;
            let platform: PlatformKey = key.parse().map_err(|e| invalid(&field, e))?;

            check_url(&format!("{}.url", field), &asset.url)?;
            let sha256 = parse_digest(&format!("{}.sha256", field), &asset.sha256)?;
            let format = parse_format(
                &format!("{}.format", field),
                asset.format.as_deref(),
                &asset.url,
            )?;

            if assets
                .insert(platform, Asset { url: asset.url, sha256, format })
                .is_some()
            {
                return Err(invalid(&field, format!("platform '{}' listed twice", platform)));
            }
        }

        let source = match raw.source {
            Some(src) => {
                check_url("source.url", &src.url)?;
                let sha256 = parse_digest("source.sha256", &src.sha256)?;
                let format = parse_format("source.format", src.format.as_deref(), &src.url)?;
                let toolchain = src.toolchain.unwrap_or_default();
                if toolchain.program.trim().is_empty() {
                    return Err(invalid("source.toolchain.program", "must not be empty"));
                }
                Some(SourceBuild {
                    url: src.url,
                    sha256,
                    format,
                    toolchain,
                })
            }
            None => None,
        };

        if assets.is_empty() && source.is_none() {
            return Err(InstallError::descriptor(
                "no assets and no source: nothing to install",
            ));
        }

        Ok(ReleaseDescriptor {
            name: raw.name,
            desc: raw.desc,
            homepage: raw.homepage,
            version,
            binary,
            assets,
            source,
            test: raw.test.unwrap_or_default(),
        })
    }

    /// The asset for `platform`: an exact entry first, then `any`.
    pub fn resolve_asset(&self, platform: Platform) -> InstallResult<&Asset> {
        self.assets
            .get(&PlatformKey::Only(platform))
            .or_else(|| self.assets.get(&PlatformKey::Any))
            .ok_or_else(|| InstallError::UnsupportedPlatform {
                platform: platform.to_string(),
                available: self.available_platforms(),
            })
    }

    pub fn resolve_url(&self, platform: Platform) -> InstallResult<&str> {
        self.resolve_asset(platform).map(|a| a.url.as_str())
    }

    pub fn available_platforms(&self) -> String {
        if self.assets.is_empty() {
            return "none".to_string();
        }
        self.assets
            .keys()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Name the executable gets inside the archive and on disk.
    pub fn executable_name(&self, platform: Platform) -> String {
        let suffix = platform.executable_suffix();
        if suffix.is_empty() || self.binary.ends_with(suffix) {
            self.binary.clone()
        } else {
            format!("{}{}", self.binary, suffix)
        }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstallKind {
    Prebuilt,
    Source,
}

impl std::fmt::Display for InstallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallKind::Prebuilt => f.write_str("prebuilt"),
            InstallKind::Source => f.write_str("source"),
        }
    }
}

/// One installed tool, keyed by name in [`RelinstConfig::tools`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallRecord {
    pub name: String,
    pub version: String,
    pub platform: String,
    pub kind: InstallKind,
    pub executable_path: String,
    /// Digest of the verified download (archive or source tarball).
    pub sha256: String,
    pub installed_at: String,
    #[serde(default = "default_test_args")]
    pub test_args: Vec<String>,
    #[serde(default)]
    pub homepage: Option<String>,
}

fn default_test_args() -> Vec<String> {
    vec!["--help".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelinstSettings {
    #[serde(default = "default_bin_dir")]
    pub bin_dir: String,
    #[serde(default = "default_run_self_test")]
    pub run_self_test: bool,
}

fn default_bin_dir() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".local")
        .join("bin")
        .to_string_lossy()
        .to_string()
}
fn default_run_self_test() -> bool {
    true
}

impl Default for RelinstSettings {
    fn default() -> Self {
        Self {
            bin_dir: default_bin_dir(),
            run_self_test: default_run_self_test(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RelinstConfig {
    #[serde(default)]
    pub tools: BTreeMap<String, InstallRecord>,
    #[serde(default)]
    pub settings: RelinstSettings,
}

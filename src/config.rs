use crate::types::*;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "relinst";
pub const CONFIG_FILE_NAME: &str = "config.json";

pub const SETTING_KEYS: &[&str] = &["bin_dir", "run_self_test"];

pub fn get_user_config_dir() -> Result<PathBuf> {
    let path = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join(APP_NAME);
    Ok(path)
}

pub fn get_config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("RELINST_CONFIG_PATH") {
        return Ok(PathBuf::from(path));
    }
    let path = get_user_config_dir()?.join(CONFIG_FILE_NAME);
    tracing::debug!("Config file path: {}", path.display());
    Ok(path)
}

pub fn load_config() -> Result<RelinstConfig> {
    let mut config = read_config(&get_config_file_path()?)?;
    apply_env_overrides(&mut config.settings);
    Ok(config)
}

/// Read the state file at `path`; a missing file is an empty state.
pub fn read_config(path: &Path) -> Result<RelinstConfig> {
    if !path.exists() {
        return Ok(RelinstConfig::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read config file at {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| "Could not parse config file as JSON")
}

fn apply_env_overrides(settings: &mut RelinstSettings) {
    if let Ok(bin_dir) = std::env::var("RELINST_BIN_DIR") {
        settings.bin_dir = bin_dir;
    }
    if let Ok(value) = std::env::var("RELINST_RUN_SELF_TEST") {
        settings.run_self_test = parse_bool(&value).unwrap_or(settings.run_self_test);
    }
}

pub fn save_config(config: &RelinstConfig) -> Result<()> {
    write_config(config, &get_config_file_path()?)
}

pub fn write_config(config: &RelinstConfig, config_path: &Path) -> Result<()> {
    let config_dir = match config_path.parent() {
        Some(dir) if dir.as_os_str().is_empty() => Path::new("."),
        Some(dir) => dir,
        None => return Err(anyhow!("Invalid config path")),
    };

    fs::create_dir_all(config_dir)?;

    // The state file is only ever replaced whole.
    let content = serde_json::to_string_pretty(config)?;
    let mut tmp = tempfile::NamedTempFile::new_in(config_dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(config_path)
        .map_err(|e| anyhow!("Could not write {}: {}", config_path.display(), e.error))?;

    Ok(())
}

pub fn normalize_key(key: &str) -> String {
    key.replace('-', "_")
        .chars()
        .map(|c| {
            if c.is_ascii_uppercase() {
                format!("_{}", c.to_lowercase())
            } else {
                c.to_string()
            }
        })
        .collect::<String>()
        .to_lowercase()
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn get_setting(settings: &RelinstSettings, key: &str) -> Result<String> {
    match normalize_key(key).as_str() {
        "bin_dir" => Ok(settings.bin_dir.clone()),
        "run_self_test" => Ok(settings.run_self_test.to_string()),
        other => Err(unknown_key(other)),
    }
}

pub fn set_setting(settings: &mut RelinstSettings, key: &str, value: &str) -> Result<()> {
    match normalize_key(key).as_str() {
        "bin_dir" => {
            if value.trim().is_empty() {
                return Err(anyhow!("bin_dir must not be empty"));
            }
            settings.bin_dir = value.to_string();
        }
        "run_self_test" => {
            settings.run_self_test = parse_bool(value)
                .ok_or_else(|| anyhow!("Invalid value for 'run_self_test': '{}'", value))?;
        }
        other => return Err(unknown_key(other)),
    }
    Ok(())
}

pub fn unset_setting(settings: &mut RelinstSettings, key: &str) -> Result<()> {
    let defaults = RelinstSettings::default();
    match normalize_key(key).as_str() {
        "bin_dir" => settings.bin_dir = defaults.bin_dir,
        "run_self_test" => settings.run_self_test = defaults.run_self_test,
        other => return Err(unknown_key(other)),
    }
    Ok(())
}

fn unknown_key(key: &str) -> anyhow::Error {
    anyhow!(
        "'{}' is not a valid configuration setting. Valid settings: {}",
        key,
        SETTING_KEYS.join(", ")
    )
}

//! Config file discovery, loading, and environment variable overlay.

use crate::{CloseCodes, ConfigError, PeerConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded, in load order.
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode a config value.
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations, in load order.
///
/// Only returns files that exist. If `override_path` is given it is
/// appended last (after the local `./peerwire.toml`), giving it the
/// highest file-based precedence short of environment variables.
pub fn discover_config_files_with_override(override_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/peerwire/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("peerwire/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    let local = PathBuf::from("peerwire.toml");
    if local.exists() {
        files.push(local);
    }

    if let Some(path) = override_path {
        if path.exists() {
            files.push(path.to_path_buf());
        }
    }

    files
}

pub fn load_from_file(path: &Path) -> Result<PeerConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_toml(&contents, path)
}

fn parse_toml(contents: &str, path: &Path) -> Result<PeerConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut config = PeerConfig::default();

    if let Some(v) = table.get("base_timeout_ms").and_then(|v| v.as_integer()) {
        config.base_timeout_ms = v as u64;
    }
    if let Some(v) = table.get("idle_timeout_ms") {
        config.idle_timeout_ms = if v.is_integer() {
            v.as_integer().map(|n| n as u64)
        } else {
            None
        };
    }
    if let Some(v) = table.get("ping_interval_ms").and_then(|v| v.as_integer()) {
        config.ping_interval_ms = v as u64;
    }
    if let Some(v) = table.get("ping_timeout_ms").and_then(|v| v.as_integer()) {
        config.ping_timeout_ms = v as u64;
    }

    if let Some(codes) = table.get("close_codes").and_then(|v| v.as_table()) {
        let mut close_codes = CloseCodes::default();
        if let Some(v) = codes.get("normal").and_then(|v| v.as_integer()) {
            close_codes.normal = v as u16;
        }
        if let Some(v) = codes.get("soft_disconnect").and_then(|v| v.as_integer()) {
            close_codes.soft_disconnect = v as u16;
        }
        if let Some(v) = codes.get("abnormal").and_then(|v| v.as_integer()) {
            close_codes.abnormal = v as u16;
        }
        config.close_codes = close_codes;
    }

    Ok(config)
}

/// Merge two configs, with `overlay` taking precedence field-by-field.
pub fn merge_configs(base: PeerConfig, overlay: PeerConfig) -> PeerConfig {
    let default = PeerConfig::default();
    PeerConfig {
        base_timeout_ms: if overlay.base_timeout_ms != default.base_timeout_ms {
            overlay.base_timeout_ms
        } else {
            base.base_timeout_ms
        },
        idle_timeout_ms: if overlay.idle_timeout_ms != default.idle_timeout_ms {
            overlay.idle_timeout_ms
        } else {
            base.idle_timeout_ms
        },
        ping_interval_ms: if overlay.ping_interval_ms != default.ping_interval_ms {
            overlay.ping_interval_ms
        } else {
            base.ping_interval_ms
        },
        ping_timeout_ms: if overlay.ping_timeout_ms != default.ping_timeout_ms {
            overlay.ping_timeout_ms
        } else {
            base.ping_timeout_ms
        },
        close_codes: if overlay.close_codes != default.close_codes {
            overlay.close_codes
        } else {
            base.close_codes
        },
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut PeerConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("PEERWIRE_BASE_TIMEOUT_MS") {
        if let Ok(n) = v.parse() {
            config.base_timeout_ms = n;
            sources.env_overrides.push("PEERWIRE_BASE_TIMEOUT_MS".to_string());
        }
    }
    if let Ok(v) = env::var("PEERWIRE_IDLE_TIMEOUT_MS") {
        config.idle_timeout_ms = v.parse().ok();
        sources.env_overrides.push("PEERWIRE_IDLE_TIMEOUT_MS".to_string());
    }
    if let Ok(v) = env::var("PEERWIRE_PING_INTERVAL_MS") {
        if let Ok(n) = v.parse() {
            config.ping_interval_ms = n;
            sources.env_overrides.push("PEERWIRE_PING_INTERVAL_MS".to_string());
        }
    }
    if let Ok(v) = env::var("PEERWIRE_PING_TIMEOUT_MS") {
        if let Ok(n) = v.parse() {
            config.ping_timeout_ms = n;
            sources.env_overrides.push("PEERWIRE_PING_TIMEOUT_MS".to_string());
        }
    }
}

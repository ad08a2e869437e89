//! Minimal configuration loading for peerwire.
//!
//! This crate provides configuration loading with minimal dependencies,
//! designed to be imported by every peerwire crate without pulling in the
//! protocol or transport stacks.
//!
//! # Config file locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/peerwire/config.toml` (system)
//! 2. `~/.config/peerwire/config.toml` (user)
//! 3. `./peerwire.toml` (local override)
//! 4. Environment variables (`PEERWIRE_*`)
//!
//! # Example config
//!
//! ```toml
//! base_timeout_ms = 2000
//! idle_timeout_ms = 60000
//! ping_interval_ms = 15000
//! ping_timeout_ms = 5000
//! ```

mod loader;

pub use loader::ConfigSources;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Close codes used by the reference WebSocket transport to signal intent on
/// disconnect. Their *meaning* is fixed by the protocol; only their literal
/// numeric values are configurable, and only so interop tests can probe
/// non-default values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseCodes {
    /// Deliberate, final close — do not attempt to reconnect.
    pub normal: u16,
    /// Transport dropped but the peer should be considered reconnecting.
    pub soft_disconnect: u16,
    /// Abnormal closure (no close frame received).
    pub abnormal: u16,
}

impl Default for CloseCodes {
    fn default() -> Self {
        Self {
            normal: 4000,
            soft_disconnect: 4001,
            abnormal: 1006,
        }
    }
}

/// Runtime configuration for a [`Peer`](../peerwire_core/struct.Peer.html).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfig {
    /// Base used in the per-request timeout formula:
    /// `base_timeout_ms * (15 + 0.1 * pending_count)`.
    pub base_timeout_ms: u64,
    /// Idle watchdog: close the peer if no message is seen for this long.
    /// `None` disables the watchdog.
    pub idle_timeout_ms: Option<u64>,
    /// How often the reference WebSocket transport sends a liveness ping.
    pub ping_interval_ms: u64,
    /// How long to wait for a pong before considering the transport dead.
    pub ping_timeout_ms: u64,
    #[serde(default)]
    pub close_codes: CloseCodes,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            base_timeout_ms: 2000,
            idle_timeout_ms: Some(60_000),
            ping_interval_ms: 15_000,
            ping_timeout_ms: 5_000,
            close_codes: CloseCodes::default(),
        }
    }
}

impl PeerConfig {
    /// The per-request timeout for a table currently holding `pending_count`
    /// entries, per the formula `base * (15 + 0.1 * pending_count)`.
    pub fn request_timeout_ms(&self, pending_count: usize) -> u64 {
        let factor = 15.0 + 0.1 * pending_count as f64;
        (self.base_timeout_ms as f64 * factor) as u64
    }

    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/peerwire/config.toml`
    /// 3. `~/.config/peerwire/config.toml`
    /// 4. `./peerwire.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about which sources fired.
    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = PeerConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }
}

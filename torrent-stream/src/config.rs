use std::{path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;
use torrent_pwp::PeerConfig;

use crate::error::ConfigError;

/// Runtime settings, read from a TOML file. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Directory the catalog's descriptor paths are relative to.
    pub files_root: PathBuf,
    /// Port reported to trackers.
    pub port: u16,
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub tracker_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub bitfield_timeout_secs: u64,
    pub piece_timeout_secs: u64,
    pub block_size: u32,
    pub max_backlog: usize,
    pub verify_piece_hashes: bool,
    pub tolerate_keep_alive: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            files_root: PathBuf::from("files"),
            port: 6881,
            session_ttl_secs: 4 * 60 * 60,
            sweep_interval_secs: 10 * 60,
            tracker_timeout_secs: 10,
            connect_timeout_secs: 3,
            handshake_timeout_secs: 3,
            bitfield_timeout_secs: 5,
            piece_timeout_secs: 15,
            block_size: torrent_pwp::config::DEFAULT_BLOCK_SIZE,
            max_backlog: torrent_pwp::config::DEFAULT_MAX_BACKLOG,
            verify_piece_hashes: false,
            tolerate_keep_alive: false,
        }
    }
}

impl StreamConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn tracker_timeout(&self) -> Duration {
        Duration::from_secs(self.tracker_timeout_secs)
    }

    pub fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            bitfield_timeout: Duration::from_secs(self.bitfield_timeout_secs),
            piece_timeout: Duration::from_secs(self.piece_timeout_secs),
            block_size: self.block_size,
            max_backlog: self.max_backlog,
            verify_piece_hashes: self.verify_piece_hashes,
            tolerate_keep_alive: self.tolerate_keep_alive,
        }
    }
}

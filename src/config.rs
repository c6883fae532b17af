// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Runtime configuration shared by the registrar and invoker binaries.
// Every field has a default, so an empty file (or no file) is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mailbox: MailboxConfig,
    pub endpoint: EndpointConfig,
    pub unit: UnitConfig,
    /// Give up waiting for a registration after this long (unbounded if unset).
    pub wait_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    pub path_token: String,
    pub project_id: u8,
    pub capacity: usize,
    pub poll_interval_ms: u64,
    /// Clear the slot after the invoker reads it.
    pub consume: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub path: PathBuf,
    pub max_frame: usize,
    pub io_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    pub path: PathBuf,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            path_token: "shmfile".to_owned(),
            project_id: 65,
            capacity: 256,
            poll_interval_ms: 1000,
            consume: true,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/cbreg.sock"),
            max_frame: crate::frame::DEFAULT_MAX_PAYLOAD,
            io_timeout_ms: 5000,
        }
    }
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("./libcallback.so") }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mailbox: MailboxConfig::default(),
            endpoint: EndpointConfig::default(),
            unit: UnitConfig::default(),
            wait_timeout_ms: None,
        }
    }
}

impl Config {
    /// Load a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mailbox.path_token.is_empty() {
            return Err(Error::Config("mailbox.path_token is empty".into()));
        }
        if self.mailbox.capacity < 2 {
            return Err(Error::Config(format!(
                "mailbox.capacity must be at least 2, got {}",
                self.mailbox.capacity
            )));
        }
        if self.mailbox.poll_interval_ms == 0 {
            return Err(Error::Config("mailbox.poll_interval_ms must be non-zero".into()));
        }
        if self.endpoint.path.as_os_str().is_empty() {
            return Err(Error::Config("endpoint.path is empty".into()));
        }
        if self.endpoint.max_frame == 0 {
            return Err(Error::Config("endpoint.max_frame must be non-zero".into()));
        }
        if self.unit.path.as_os_str().is_empty() {
            return Err(Error::Config("unit.path is empty".into()));
        }
        Ok(())
    }

    pub fn mailbox_key(&self) -> String {
        crate::shm_name::mailbox_key(&self.mailbox.path_token, self.mailbox.project_id)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.mailbox.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    /// Zero disables the socket timeout.
    pub fn io_timeout(&self) -> Option<Duration> {
        match self.endpoint.io_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.mailbox.capacity, 256);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.unit.path, PathBuf::from("./libcallback.so"));
        assert_eq!(cfg.wait_timeout(), None);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_toml(
            r#"
            wait_timeout_ms = 2500

            [mailbox]
            poll_interval_ms = 50
            consume = false

            [unit]
            path = "/opt/cb/libcallback.so"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.mailbox.poll_interval_ms, 50);
        assert!(!cfg.mailbox.consume);
        assert_eq!(cfg.mailbox.capacity, 256);
        assert_eq!(cfg.mailbox.path_token, "shmfile");
        assert_eq!(cfg.unit.path, PathBuf::from("/opt/cb/libcallback.so"));
        assert_eq!(cfg.wait_timeout(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn rejects_degenerate_values() {
        assert!(matches!(
            Config::from_toml("[mailbox]\ncapacity = 1\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("[mailbox]\npoll_interval_ms = 0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(Config::from_toml("mailbox = 3"), Err(Error::Config(_))));
    }

    #[test]
    fn mailbox_key_follows_token() {
        let mut cfg = Config::default();
        let a = cfg.mailbox_key();
        cfg.mailbox.project_id = 66;
        assert_ne!(a, cfg.mailbox_key());
    }
}

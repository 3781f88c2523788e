//! posebridge-osc/src/config.rs
//!
//! Validated bridge configuration plus the string-keyed persisted store it
//! round-trips through. Validation never throws: a bad edit keeps the
//! previous value.

use crate::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

pub const KEY_IP_ADDRESS: &str = "ipAddress";
pub const KEY_OSC_PORT: &str = "oscPort";
pub const KEY_TCP_PORT: &str = "tcpPort";
pub const KEY_MANUAL: &str = "manual";

pub const DEFAULT_TARGET_IP: &str = "127.0.0.1";
pub const DEFAULT_OSC_PORT: u16 = 9000;

/// True for a case-insensitive "localhost" or any IPv4/IPv6 literal.
pub fn validate_ip(candidate: &str) -> bool {
    candidate.eq_ignore_ascii_case("localhost") || candidate.parse::<IpAddr>().is_ok()
}

/// Returns the candidate when it validates, otherwise the fallback.
/// "localhost" passes through unreplaced here; the alias is only resolved
/// on assignment into [`BridgeConfig`].
pub fn normalize_ip(candidate: &str, fallback: &str) -> String {
    if validate_ip(candidate) {
        candidate.to_string()
    } else {
        fallback.to_string()
    }
}

/// Live bridge settings, backed by a [`ConfigStore`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Destination IP text, already normalized (no "localhost" alias).
    pub target_ip: String,
    /// UDP port tracker messages are sent to.
    pub osc_port: u16,
    /// TCP port our own OSCQuery surface is advertised on; 0 = ephemeral.
    pub tcp_port: u16,
    /// When set, the MANUAL session wins and discovery is suppressed.
    pub manual_override: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            target_ip: DEFAULT_TARGET_IP.to_string(),
            osc_port: DEFAULT_OSC_PORT,
            tcp_port: 0,
            manual_override: false,
        }
    }
}

impl BridgeConfig {
    /// Assigns the destination IP if the candidate validates, resolving the
    /// "localhost" alias; otherwise the previous value stays.
    pub fn set_target_ip(&mut self, candidate: &str) {
        let normalized = normalize_ip(candidate, &self.target_ip);
        self.target_ip = if normalized.eq_ignore_ascii_case("localhost") {
            DEFAULT_TARGET_IP.to_string()
        } else {
            normalized
        };
    }

    /// Assigns the send port if the text parses as u16; otherwise the
    /// previous value stays.
    pub fn set_osc_port(&mut self, candidate: &str) {
        match candidate.parse::<u16>() {
            Ok(port) => self.osc_port = port,
            Err(_) => warn!("ignoring invalid port text '{candidate}'"),
        }
    }

    /// The destination as an `IpAddr`; target_ip is kept normalized so this
    /// only falls back on a corrupted store.
    pub fn target_addr(&self) -> IpAddr {
        self.target_ip
            .parse()
            .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST))
    }

    pub fn load(store: &dyn ConfigStore) -> Self {
        let mut cfg = Self::default();
        if let Some(ip) = store.get(KEY_IP_ADDRESS) {
            cfg.set_target_ip(&ip);
        }
        if let Some(port) = store.get(KEY_OSC_PORT) {
            cfg.set_osc_port(&port);
        }
        if let Some(tcp) = store.get(KEY_TCP_PORT) {
            if let Ok(p) = tcp.parse::<u16>() {
                cfg.tcp_port = p;
            }
        }
        if let Some(manual) = store.get(KEY_MANUAL) {
            cfg.manual_override = manual == "true";
        }
        debug!("loaded config: {cfg:?}");
        cfg
    }

    pub fn save(&self, store: &dyn ConfigStore) {
        store.set(KEY_IP_ADDRESS, &self.target_ip);
        store.set(KEY_OSC_PORT, &self.osc_port.to_string());
        store.set(KEY_TCP_PORT, &self.tcp_port.to_string());
        store.set(KEY_MANUAL, if self.manual_override { "true" } else { "false" });
    }
}

/// Externally-owned string-keyed settings store.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// JSON-file backed [`ConfigStore`]. Writes through on every `set`; a store
/// that cannot be written is logged and otherwise ignored, settings just
/// stop persisting.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                BridgeError::ConfigError(format!(
                    "settings file {} is not valid JSON: {e}",
                    path.display()
                ))
            })?,
            Err(_) => HashMap::new(),
        };
        Ok(Self { path, values: Mutex::new(values) })
    }

    /// Platform default: `<config dir>/posebridge-osc/settings.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("posebridge-osc").join("settings.json"))
    }

    fn flush(&self, values: &HashMap<String, String>) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_vec_pretty(values) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&self.path, bytes) {
                    warn!("could not persist settings to {}: {e}", self.path.display());
                }
            }
            Err(e) => warn!("could not serialize settings: {e}"),
        }
    }
}

impl ConfigStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut values = self.values.lock().unwrap();
        values.insert(key.to_string(), value.to_string());
        self.flush(&values);
    }
}

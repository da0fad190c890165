use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Port used when neither the config file nor `PORT` sets one.
pub const DEFAULT_PORT: u16 = 21562;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairlineConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub pairing: PairingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Bearer token required on every route except `/` and `/health`.
    /// Unset disables auth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Largest accepted request body, uploads included.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            token: None,
            max_upload_bytes: 8 * 1024 * 1024,
        }
    }
}

/// On-disk locations, relative to the working directory unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// One credential-store directory per session lives here.
    pub sessions_dir: PathBuf,
    /// Uploaded message files are kept here while their task runs.
    pub uploads_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sessions_dir: PathBuf::from("temp"),
            uploads_dir: PathBuf::from("uploads"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Seconds to wait for the library to hand back a pairing code.
    pub timeout_secs: u64,
    /// Name shown under Linked Devices on the phone.
    pub device_name: String,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            device_name: "Pairline".into(),
        }
    }
}

impl PairlineConfig {
    /// Copy safe to print: secrets replaced.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.server.token.is_some() {
            copy.server.token = Some("[REDACTED]".into());
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = PairlineConfig::default();
        assert_eq!(cfg.server.port, 21562);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.storage.sessions_dir, PathBuf::from("temp"));
        assert_eq!(cfg.storage.uploads_dir, PathBuf::from("uploads"));
        assert_eq!(cfg.pairing.timeout_secs, 30);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let cfg: PairlineConfig = toml::from_str("[server]\nport = 8080\n").unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.pairing, PairingConfig::default());
    }

    #[test]
    fn redacted_hides_token() {
        let mut cfg = PairlineConfig::default();
        cfg.server.token = Some("abc".into());
        let out = toml::to_string(&cfg.redacted()).unwrap();
        assert!(!out.contains("abc"));
        assert!(out.contains("[REDACTED]"));
    }
}

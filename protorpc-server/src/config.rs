//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via PROTORPC_CONFIG)
//! 3. Environment variables

use protorpc_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "PROTORPC_CONFIG";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Name the server's environment logs under.
    pub env_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            env_name: "protorpc".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))
    }

    /// Applies overrides from `lookup`, which maps a variable name to its
    /// value. Unparseable values are rejected rather than ignored.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(addr) = lookup("PROTORPC_BIND") {
            self.network.bind_addr = addr
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PROTORPC_BIND={addr}")))?;
        }
        if let Some(backlog) = lookup("PROTORPC_BACKLOG") {
            self.network.backlog = backlog
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PROTORPC_BACKLOG={backlog}")))?;
        }
        if let Some(name) = lookup("PROTORPC_ENV_NAME") {
            if !name.is_empty() {
                self.env_name = name;
            }
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.backlog == 0 {
            return Err(ConfigError::Invalid("backlog must be positive".to_string()));
        }
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Pending-connection queue length passed to `listen`.
    pub backlog: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            backlog: 5,
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper storing a `SocketAddr` as a string in YAML.
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(addr)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.bind_addr.port(), 1234);
        assert_eq!(config.network.backlog, 5);
        assert_eq!(config.env_name, "protorpc");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(vars(&[
                ("PROTORPC_BIND", "0.0.0.0:4321"),
                ("PROTORPC_BACKLOG", "64"),
                ("PROTORPC_ENV_NAME", "arith"),
            ]))
            .unwrap();
        assert_eq!(config.network.bind_addr, "0.0.0.0:4321".parse().unwrap());
        assert_eq!(config.network.backlog, 64);
        assert_eq!(config.env_name, "arith");
    }

    #[test]
    fn test_bad_override_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(vars(&[("PROTORPC_BACKLOG", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("PROTORPC_BACKLOG"));

        let err = config
            .apply_overrides(vars(&[("PROTORPC_BACKLOG", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("protorpc.yaml");
        std::fs::write(&path, "network:\n  bind_addr: \"127.0.0.1:9000\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.network.bind_addr.port(), 9000);
        assert_eq!(config.network.backlog, 5);
        assert_eq!(config.env_name, "protorpc");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("protorpc.yaml");

        let mut config = Config::default();
        config.network.backlog = 128;
        config.env_name = "echo".to_string();
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.network, config.network);
        assert_eq!(loaded.env_name, config.env_name);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(matches!(
            Config::from_file(&missing),
            Err(ConfigError::Io(..))
        ));

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "network:\n  bind_addr: \"not an address\"\n").unwrap();
        assert!(matches!(Config::from_file(&bad), Err(ConfigError::Parse(..))));
    }
}

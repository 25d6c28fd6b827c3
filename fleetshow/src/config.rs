//! Run configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes:
//!
//! ```toml
//! [device]
//! command_idle_ms = 3000
//! command_ceiling_ms = 120000
//!
//! [dispatch]
//! pool_size = 32
//!
//! [node]
//! invoke_ceiling_ms = 1800000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Durations written as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Top-level config file layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub device: DeviceConfig,
    pub dispatch: DispatchConfig,
    pub node: NodeConfig,
}

impl FileConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => load_config(path),
            None => Ok(Self::default()),
        }
    }
}

/// Device dialect and per-stage capture timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// SSH port the devices expose their CLI on.
    pub port: u16,

    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,

    /// Command that drops the login session into the device shell.
    pub shell_command: String,

    /// Command that disables output paging.
    pub pagination_command: String,

    /// Regex matched case-insensitively against the shell-entry response.
    pub reauth_pattern: String,

    #[serde(rename = "handshake_idle_ms", with = "duration_ms")]
    pub handshake_idle: Duration,

    #[serde(rename = "handshake_ceiling_ms", with = "duration_ms")]
    pub handshake_ceiling: Duration,

    #[serde(rename = "command_idle_ms", with = "duration_ms")]
    pub command_idle: Duration,

    #[serde(rename = "command_ceiling_ms", with = "duration_ms")]
    pub command_ceiling: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: 830,
            connect_timeout: Duration::from_secs(15),
            shell_command: "shell".to_string(),
            pagination_command: "terminal length 0".to_string(),
            reauth_pattern: "password:".to_string(),
            handshake_idle: Duration::from_secs(1),
            handshake_ceiling: Duration::from_secs(5),
            command_idle: Duration::from_secs(2),
            command_ceiling: Duration::from_secs(60),
        }
    }
}

/// Worker pool and reader settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Upper bound on concurrent device sessions.
    pub pool_size: usize,

    /// Upper bound on a single blocking channel read.
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pool_size: 16,
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Management node shell layout and stage ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,

    pub restricted_prompts: Vec<String>,
    pub subshell_prompts: Vec<String>,
    pub subshell_command: String,
    pub exit_command: String,

    /// Ceiling for shell-level changes and short sub-shell commands.
    #[serde(rename = "prompt_ceiling_ms", with = "duration_ms")]
    pub prompt_ceiling: Duration,

    /// Ceiling for the remote tool run.
    #[serde(rename = "invoke_ceiling_ms", with = "duration_ms")]
    pub invoke_ceiling: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            restricted_prompts: vec!["vmanage#".to_string(), "vmanage>".to_string()],
            subshell_prompts: vec!["vmanage:~$".to_string(), "vmanage:~#".to_string()],
            subshell_command: "vshell".to_string(),
            exit_command: "exit".to_string(),
            prompt_ceiling: Duration::from_secs(10),
            invoke_ceiling: Duration::from_secs(600),
        }
    }
}

/// Load a TOML configuration from a file.
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config: T = toml::from_str(&content).map_err(ConfigError::Parse)?;
    Ok(config)
}

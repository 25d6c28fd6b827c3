//! Device dialect definition.

use std::time::Duration;

use regex::Regex;

use crate::config::DeviceConfig;
use crate::error::{ConfigError, Result};

/// How to drive one family of devices.
///
/// The defaults describe SD-WAN edge routers reached on the NETCONF port:
/// log in, type `shell` (which may ask for the password again), disable
/// paging with `terminal length 0`, then run show commands.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    /// SSH port.
    pub port: u16,

    /// Connect timeout.
    pub connect_timeout: Duration,

    /// Command sent right after the shell channel opens.
    pub shell_command: String,

    /// Command that disables output paging.
    pub pagination_command: String,

    /// Marker that the shell-entry response is asking for the password again.
    pub reauth_prompt: Regex,

    /// Idle timeout for shell entry and pagination captures.
    pub handshake_idle: Duration,

    /// Ceiling for shell entry and pagination captures.
    pub handshake_ceiling: Duration,

    /// Idle timeout for command captures.
    pub command_idle: Duration,

    /// Ceiling for command captures.
    pub command_ceiling: Duration,
}

impl DeviceProfile {
    /// Build a profile from configuration.
    pub fn from_config(config: &DeviceConfig) -> Result<Self> {
        let reauth_prompt = Regex::new(&format!("(?i){}", regex::escape(&config.reauth_pattern)))
            .map_err(|e| ConfigError::Invalid(format!("reauth_pattern: {}", e)))?;

        if config.command_ceiling < config.command_idle {
            return Err(ConfigError::Invalid(
                "command_ceiling_ms must not be shorter than command_idle_ms".to_string(),
            )
            .into());
        }

        Ok(Self {
            port: config.port,
            connect_timeout: config.connect_timeout,
            shell_command: config.shell_command.clone(),
            pagination_command: config.pagination_command.clone(),
            reauth_prompt,
            handshake_idle: config.handshake_idle,
            handshake_ceiling: config.handshake_ceiling,
            command_idle: config.command_idle,
            command_ceiling: config.command_ceiling,
        })
    }

    /// Whether a shell-entry response is asking for the password.
    pub fn wants_reauth(&self, response: &str) -> bool {
        self.reauth_prompt.is_match(response)
    }

    /// Set the SSH port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the command-capture timeouts.
    pub fn with_command_timeouts(mut self, idle: Duration, ceiling: Duration) -> Self {
        self.command_idle = idle;
        self.command_ceiling = ceiling;
        self
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        let config = DeviceConfig::default();
        Self {
            port: config.port,
            connect_timeout: config.connect_timeout,
            shell_command: config.shell_command,
            pagination_command: config.pagination_command,
            reauth_prompt: Regex::new("(?i)password:").unwrap(),
            handshake_idle: config.handshake_idle,
            handshake_ceiling: config.handshake_ceiling,
            command_idle: config.command_idle,
            command_ceiling: config.command_ceiling,
        }
    }
}

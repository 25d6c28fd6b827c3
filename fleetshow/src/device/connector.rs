//! russh-backed device connections.

use std::time::Duration;

use russh::Channel;
use russh::client::Msg;

use super::profile::DeviceProfile;
use super::{Connector, DeviceLink};
use crate::error::Result;
use crate::inventory::HostRecord;
use crate::transport::{HostKeyVerification, SshConfig, SshTransport};

/// Connects to devices over SSH with password authentication.
#[derive(Debug, Clone)]
pub struct SshConnector {
    port: u16,
    timeout: Duration,
    inactivity: Duration,
    host_key_verification: HostKeyVerification,
}

impl SshConnector {
    /// Connector using the port and connect timeout of `profile`.
    ///
    /// Device host keys are not checked. A device silent for longer than
    /// the longest read ceiling is dropped.
    pub fn new(profile: &DeviceProfile) -> Self {
        Self {
            port: profile.port,
            timeout: profile.connect_timeout,
            inactivity: profile.handshake_ceiling.max(profile.command_ceiling),
            host_key_verification: HostKeyVerification::Disabled,
        }
    }

    fn config_for(&self, host: &HostRecord) -> Result<SshConfig> {
        SshConfig::builder(host.address.to_string())
            .port(self.port)
            .username(host.username.clone())
            .password(host.credential.clone())
            .timeout(self.timeout)
            .inactivity_timeout(Some(self.inactivity))
            .host_key_verification(self.host_key_verification.clone())
            .build()
    }

    /// Override host key verification.
    pub fn with_host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }
}

impl Connector for SshConnector {
    type Link = SshTransport;

    async fn connect(&self, host: &HostRecord) -> Result<SshTransport> {
        SshTransport::connect(self.config_for(host)?).await
    }
}

impl DeviceLink for SshTransport {
    type Channel = Channel<Msg>;

    async fn open_shell(&mut self) -> Result<Channel<Msg>> {
        SshTransport::open_shell(self).await
    }

    async fn close(self) -> Result<()> {
        self.disconnect().await
    }
}

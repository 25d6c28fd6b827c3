//! Device session state machine.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use secrecy::ExposeSecret;

use super::profile::DeviceProfile;
use super::{Connector, DeviceLink};
use crate::channel::{ChannelReader, ShellChannel, StopReason};
use crate::error::{Error, ErrorKind, Result, SessionError, TransportError};
use crate::inventory::{CommandScript, HostRecord, OutputArtifact};

/// Stage of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Disconnected,
    Connected,
    ShellEntered,
    Authenticated,
    PaginationDisabled,
    Executing,
    Closed,
    Failed,
}

impl DeviceState {
    /// Whether `next` directly follows `self`.
    ///
    /// `Failed` is reachable from every live state and `Closed` only from
    /// `Executing`; both are terminal.
    pub fn can_advance_to(self, next: DeviceState) -> bool {
        use DeviceState::*;
        match (self, next) {
            (Closed | Failed, _) => false,
            (_, Failed) => true,
            (Disconnected, Connected)
            | (Connected, ShellEntered)
            | (ShellEntered, Authenticated)
            | (Authenticated, PaginationDisabled)
            | (PaginationDisabled, Executing)
            | (Executing, Closed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeviceState::Closed | DeviceState::Failed)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a host's session failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFailure {
    pub kind: ErrorKind,
    /// State the session was in when the error occurred.
    pub during: DeviceState,
    pub message: String,
}

/// Final status of one host's session.
#[derive(Debug, Clone)]
pub struct HostOutcome {
    pub address: Ipv4Addr,
    /// 1-based host-list line this host came from.
    pub line: usize,
    /// `Closed` on success, `Failed` otherwise.
    pub state: DeviceState,
    pub commands_completed: usize,
    pub reauthenticated: bool,
    /// Set once the first capture has been written.
    pub artifact: Option<PathBuf>,
    pub failure: Option<HostFailure>,
}

impl HostOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Outcome for a session that never got to run.
    pub fn aborted(address: Ipv4Addr, line: usize, err: &Error) -> Self {
        Self {
            address,
            line,
            state: DeviceState::Failed,
            commands_completed: 0,
            reauthenticated: false,
            artifact: None,
            failure: Some(HostFailure {
                kind: err.kind(),
                during: DeviceState::Disconnected,
                message: err.to_string(),
            }),
        }
    }
}

/// One device, one channel, one pass over the command script.
pub struct DeviceSession {
    host: HostRecord,
    line: usize,
    profile: Arc<DeviceProfile>,
    script: Arc<CommandScript>,
    reader: ChannelReader,
    artifact: OutputArtifact,
    state: DeviceState,
    reauth_sent: bool,
    commands_completed: usize,
}

impl DeviceSession {
    /// Create a session writing its artifact into `output_dir`.
    pub fn new(
        host: HostRecord,
        line: usize,
        profile: Arc<DeviceProfile>,
        script: Arc<CommandScript>,
        reader: ChannelReader,
        output_dir: &Path,
    ) -> Self {
        let artifact = OutputArtifact::new(output_dir, host.address);
        Self {
            host,
            line,
            profile,
            script,
            reader,
            artifact,
            state: DeviceState::Disconnected,
            reauth_sent: false,
            commands_completed: 0,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Run the session to completion. Errors end up in the outcome, never
    /// in the caller.
    pub async fn run<C: Connector>(mut self, connector: &C) -> HostOutcome {
        info!("[{}] connecting on port {}", self.host.address, self.profile.port);

        let limit = self.profile.connect_timeout;
        let connect = tokio::time::timeout(limit, connector.connect(&self.host));
        let result = match connect
            .await
            .unwrap_or_else(|_| Err(TransportError::Timeout(limit).into()))
        {
            Ok(mut link) => {
                let result = self.on_connected(&mut link).await;
                if let Err(e) = link.close().await {
                    debug!("[{}] error closing connection: {}", self.host.address, e);
                }
                result
            }
            Err(e) => Err(e),
        };

        self.finish(result)
    }

    async fn on_connected<L: DeviceLink>(&mut self, link: &mut L) -> Result<()> {
        self.advance(DeviceState::Connected)?;
        let limit = self.profile.connect_timeout;
        let mut channel = tokio::time::timeout(limit, link.open_shell())
            .await
            .map_err(|_| TransportError::Timeout(limit))??;
        let result = self.drive(&mut channel).await;
        if let Err(e) = channel.shutdown().await {
            debug!("[{}] error closing channel: {}", self.host.address, e);
        }
        result
    }

    async fn drive<Ch: ShellChannel>(&mut self, channel: &mut Ch) -> Result<()> {
        let address = self.host.address;
        let profile = Arc::clone(&self.profile);

        channel.send_line(&profile.shell_command).await?;
        self.advance(DeviceState::ShellEntered)?;

        let entry = self
            .reader
            .read(channel, profile.handshake_idle, profile.handshake_ceiling)
            .await?;
        if profile.wants_reauth(&entry.text) && !self.reauth_sent {
            debug!("[{}] shell asked for the password again", address);
            self.reauth_sent = true;
            channel
                .send_line(self.host.credential.expose_secret())
                .await?;
            self.reader
                .read(channel, profile.handshake_idle, profile.handshake_ceiling)
                .await?;
        }
        self.advance(DeviceState::Authenticated)?;

        channel.send_line(&profile.pagination_command).await?;
        self.reader
            .read(channel, profile.handshake_idle, profile.handshake_ceiling)
            .await?;
        self.advance(DeviceState::PaginationDisabled)?;

        self.advance(DeviceState::Executing)?;
        let script = Arc::clone(&self.script);
        for command in script.commands() {
            channel.send_line(command).await?;
            let capture = self
                .reader
                .read(channel, profile.command_idle, profile.command_ceiling)
                .await?;
            if capture.stop == StopReason::Ceiling {
                warn!(
                    "[{}] '{}' still producing output after {:?}, moving on",
                    address, command, profile.command_ceiling
                );
            }
            self.artifact.append(&capture.text).await?;
            self.commands_completed += 1;
            debug!(
                "[{}] '{}' captured {} bytes in {:?}",
                address,
                command,
                capture.text.len(),
                capture.elapsed
            );
            if capture.stop == StopReason::Closed {
                return Err(crate::error::ChannelError::Closed.into());
            }
        }

        Ok(())
    }

    fn advance(&mut self, next: DeviceState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(SessionError::IllegalTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        debug!("[{}] {} -> {}", self.host.address, self.state, next);
        self.state = next;
        Ok(())
    }

    fn finish(mut self, result: Result<()>) -> HostOutcome {
        let address = self.host.address;
        let failure = match result {
            Ok(()) => match self.advance(DeviceState::Closed) {
                Ok(()) => None,
                Err(e) => Some((self.state, e)),
            },
            Err(e) => Some((self.state, e)),
        };

        let failure = failure.map(|(during, err)| {
            warn!("[{}] session failed in {} ({}): {}", address, during, err.kind(), err);
            self.state = DeviceState::Failed;
            HostFailure {
                kind: err.kind(),
                during,
                message: err.to_string(),
            }
        });

        if failure.is_none() {
            info!(
                "[{}] done, {} command(s) captured",
                address, self.commands_completed
            );
        }

        HostOutcome {
            address,
            line: self.line,
            state: self.state,
            commands_completed: self.commands_completed,
            reauthenticated: self.reauth_sent,
            artifact: self
                .artifact
                .is_created()
                .then(|| self.artifact.path().to_path_buf()),
            failure,
        }
    }
}

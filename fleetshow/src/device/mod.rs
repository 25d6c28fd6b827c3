//! Per-device sessions.
//!
//! A [`DeviceSession`] owns one connection to one device and walks it
//! through shell entry, re-authentication, pagination and the command
//! script. How the connection is made is behind [`Connector`], so the
//! state machine runs the same over russh or a scripted channel.

mod connector;
mod profile;
mod session;

pub use connector::SshConnector;
pub use profile::DeviceProfile;
pub use session::{DeviceSession, DeviceState, HostFailure, HostOutcome};

use std::future::Future;

use crate::channel::ShellChannel;
use crate::error::Result;
use crate::inventory::HostRecord;

/// Opens authenticated connections to devices.
pub trait Connector: Send + Sync {
    type Link: DeviceLink;

    /// Connect and authenticate to `host`.
    fn connect(&self, host: &HostRecord) -> impl Future<Output = Result<Self::Link>> + Send;
}

/// An authenticated connection to one device.
pub trait DeviceLink: Send {
    type Channel: ShellChannel;

    /// Request an interactive shell channel.
    fn open_shell(&mut self) -> impl Future<Output = Result<Self::Channel>> + Send;

    /// Tear down the connection.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

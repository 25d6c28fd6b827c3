//! SSH connections over russh.
//!
//! Devices and the management node are both reached through
//! [`SshTransport`]: one authenticated connection that hands out a PTY
//! shell channel and, for file staging, an SFTP subsystem channel.

pub mod config;
mod ssh;

pub use config::{AuthMethod, HostKeyVerification, SshConfig, SshConfigBuilder};
pub use ssh::SshTransport;

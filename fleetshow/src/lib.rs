//! # Fleetshow
//!
//! Run a fixed list of show commands against a fleet of network devices
//! over interactive SSH shells, and stage such runs on a management node
//! whose own CLI is layered.
//!
//! Devices expose nothing but a human-oriented text shell, so the core of
//! the crate is deciding when a response is complete:
//!
//! - [`ChannelReader::read`] stops once the remote has gone quiet for an
//!   idle timeout, or at a hard ceiling.
//! - [`ChannelReader::read_until_any`] stops as soon as a known prompt
//!   literal shows up.
//!
//! On top of that sit a per-device state machine ([`DeviceSession`]), a
//! bounded fan-out over hosts ([`Dispatcher`]), and the management node
//! orchestration ([`OrchestratorSession`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use fleetshow::{CommandScript, DeviceProfile, Dispatcher, HostList, SshConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fleetshow::Error> {
//!     let hosts = HostList::load(Path::new("hosts.txt")).await?;
//!     let script = Arc::new(CommandScript::load(Path::new("commands.txt")).await?);
//!
//!     let profile = DeviceProfile::default();
//!     let dispatcher = Dispatcher::new(SshConnector::new(&profile), profile)
//!         .with_output_dir("logs");
//!
//!     let report = dispatcher.run(hosts, script).await;
//!     println!("{} host(s) succeeded", report.succeeded().count());
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod orchestrator;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use channel::{
    Capture, ChannelReader, PromptMatch, PromptSet, ReadChunk, ShellChannel, StopReason,
};
pub use config::{DeviceConfig, DispatchConfig, FileConfig, NodeConfig};
pub use device::{
    Connector, DeviceLink, DeviceProfile, DeviceSession, DeviceState, HostOutcome, SshConnector,
};
pub use dispatch::{Dispatcher, RunReport};
pub use error::{Error, ErrorKind, Result};
pub use inventory::{CommandScript, HostList, HostRecord, OutputArtifact};
pub use orchestrator::{
    FileTransfer, NodeProfile, OrchestrationReport, OrchestrationState, OrchestratorOptions,
    OrchestratorSession, RunArtifacts, RunContext, SftpTransfer, Verbosity, run_orchestration,
};
pub use transport::{AuthMethod, HostKeyVerification, SshConfig, SshConfigBuilder};

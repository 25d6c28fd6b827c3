//! Remote orchestration through a management node's layered shell.
//!
//! The node lands logins in a restricted CLI; the tool has to be staged
//! and run from a general-purpose sub-shell reached from it. An
//! [`OrchestratorSession`] walks the [`OrchestrationState`] machine over
//! one shell channel while a [`FileTransfer`] moves files on the side.

mod context;
mod profile;
mod session;
mod state;
mod transfer;
mod verbosity;

pub use context::{RunContext, TIMESTAMP_FORMAT, normalize_remote_base};
pub use profile::{LevelDefinition, NodeProfile, ShellLevel};
pub use session::{
    OrchestrationReport, OrchestratorOptions, OrchestratorSession, RunArtifacts, TOOL_MODE,
};
pub use state::OrchestrationState;
pub use transfer::{FileTransfer, RemoteEntry, SftpTransfer, remote_join, sort_newest_first};
pub use verbosity::{ERROR_MARKERS, Verbosity, error_lines};

use std::io::Write;

use log::{debug, info};

use crate::error::Result;
use crate::transport::{SshConfig, SshTransport};

/// Connect to the management node and run one orchestration end to end.
pub async fn run_orchestration<W: Write + Send>(
    config: SshConfig,
    profile: NodeProfile,
    options: OrchestratorOptions,
    artifacts: &RunArtifacts,
    context: &RunContext,
    console: W,
) -> Result<OrchestrationReport> {
    artifacts.verify()?;

    let node = config.host.clone();
    if options.verbosity.shows_progress() {
        info!("[{}] connecting...", node);
    }
    let transport = SshTransport::connect(config).await?;
    if options.verbosity.shows_progress() {
        info!("[{}] connected", node);
    }

    let result = drive(&transport, &node, profile, options, artifacts, context, console).await;

    if let Err(e) = transport.disconnect().await {
        debug!("[{}] error disconnecting: {}", node, e);
    }
    result
}

async fn drive<W: Write + Send>(
    transport: &SshTransport,
    node: &str,
    profile: NodeProfile,
    options: OrchestratorOptions,
    artifacts: &RunArtifacts,
    context: &RunContext,
    console: W,
) -> Result<OrchestrationReport> {
    let shell = transport.open_shell().await?;
    let transfer = SftpTransfer::open(transport).await?;

    let mut session = OrchestratorSession::new(node, shell, transfer, console, profile, options);
    let result = session.run(artifacts, context).await;

    if let Err(e) = session.close().await {
        debug!("[{}] error closing shell: {}", node, e);
    }
    result
}

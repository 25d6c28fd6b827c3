//! Nested-shell orchestration on the management node.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};

use super::context::RunContext;
use super::profile::{NodeProfile, ShellLevel};
use super::state::OrchestrationState;
use super::transfer::{FileTransfer, remote_join};
use super::verbosity::Verbosity;
use crate::channel::{ChannelReader, PromptMatch, ShellChannel};
use crate::error::{ConfigError, Error, Result, SessionError, TransferError};
use crate::inventory::is_artifact_name;

/// Mode given to the uploaded tool.
pub const TOOL_MODE: u32 = 0o755;

/// The three local files a run uploads.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub tool: PathBuf,
    pub hosts: PathBuf,
    pub commands: PathBuf,
}

impl RunArtifacts {
    /// Artifacts named `tool`, `hosts` and `commands` inside `dir`.
    pub fn in_dir(dir: &Path, tool: &str, hosts: &str, commands: &str) -> Self {
        Self {
            tool: dir.join(tool),
            hosts: dir.join(hosts),
            commands: dir.join(commands),
        }
    }

    /// Fail with [`ConfigError::MissingFile`] for the first file that does not exist.
    pub fn verify(&self) -> Result<()> {
        for path in [&self.tool, &self.hosts, &self.commands] {
            if !path.is_file() {
                return Err(ConfigError::MissingFile(path.clone()).into());
            }
        }
        Ok(())
    }

    fn remote_name(path: &Path) -> Result<String> {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ConfigError::Invalid(format!("'{}' does not name a file", path.display())).into()
            })
    }
}

/// Orchestration settings from the command line.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    pub verbosity: Verbosity,
    pub download_outputs: bool,
    /// Program that runs the tool, for script-based tools.
    pub interpreter: Option<String>,
}

/// What an orchestration run did.
#[derive(Debug, Clone)]
pub struct OrchestrationReport {
    pub context: RunContext,
    /// Remote files that already existed and were replaced.
    pub overwritten: Vec<String>,
    /// Directory the artifacts were listed from.
    pub listed_from: String,
    /// `output_*.txt` names found remotely, newest first.
    pub artifacts: Vec<String>,
    /// Local copies, when downloading was requested.
    pub downloaded: Vec<PathBuf>,
}

/// Drives one management node through its shell levels.
pub struct OrchestratorSession<Ch, T, W> {
    node: String,
    channel: Ch,
    transfer: T,
    console: W,
    errors: Box<dyn Write + Send>,
    profile: NodeProfile,
    options: OrchestratorOptions,
    reader: ChannelReader,
    state: OrchestrationState,
}

impl<Ch, T, W> OrchestratorSession<Ch, T, W>
where
    Ch: ShellChannel,
    T: FileTransfer,
    W: Write + Send,
{
    pub fn new(
        node: impl Into<String>,
        channel: Ch,
        transfer: T,
        console: W,
        profile: NodeProfile,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            node: node.into(),
            channel,
            transfer,
            console,
            errors: Box::new(std::io::stderr()),
            profile,
            options,
            reader: ChannelReader::default(),
            state: OrchestrationState::BasePrompt,
        }
    }

    /// Write error lines of remote output to `errors` instead of stderr.
    pub fn with_error_output(mut self, errors: impl Write + Send + 'static) -> Self {
        self.errors = Box::new(errors);
        self
    }

    pub fn with_reader(mut self, reader: ChannelReader) -> Self {
        self.reader = reader;
        self
    }

    pub fn state(&self) -> OrchestrationState {
        self.state
    }

    /// Stage `artifacts`, run the tool, and collect what it produced.
    pub async fn run(
        &mut self,
        artifacts: &RunArtifacts,
        context: &RunContext,
    ) -> Result<OrchestrationReport> {
        self.enter_restricted().await?;
        self.enter_subshell().await?;
        let overwritten = self.stage(artifacts, context).await?;
        self.invoke(artifacts, context).await?;
        let (listed_from, found, downloaded) = self.harvest(context).await?;
        self.exit().await?;

        Ok(OrchestrationReport {
            context: context.clone(),
            overwritten,
            listed_from,
            artifacts: found,
            downloaded,
        })
    }

    /// Close the shell channel and hand back the console.
    pub async fn close(mut self) -> Result<W> {
        self.channel.shutdown().await?;
        Ok(self.console)
    }

    async fn enter_restricted(&mut self) -> Result<()> {
        let ceiling = self.profile.prompt_ceiling;
        self.expect(OrchestrationState::RestrictedShell, ceiling).await?;
        self.advance(OrchestrationState::RestrictedShell)?;
        self.progress("at restricted shell");
        Ok(())
    }

    async fn enter_subshell(&mut self) -> Result<()> {
        let command = self
            .profile
            .level(ShellLevel::SubShell)
            .and_then(|level| level.entry_command.clone())
            .ok_or_else(|| ConfigError::Invalid("no sub-shell entry command".to_string()))?;
        self.channel.send_line(&command).await?;

        let ceiling = self.profile.prompt_ceiling;
        self.expect(OrchestrationState::SubShell, ceiling).await?;
        self.advance(OrchestrationState::SubShell)?;
        self.progress("entered sub-shell");
        Ok(())
    }

    /// Create the run directory and upload the artifacts into it.
    async fn stage(
        &mut self,
        artifacts: &RunArtifacts,
        context: &RunContext,
    ) -> Result<Vec<String>> {
        self.progress(&format!("using remote dir: {}", context.remote_dir));
        self.transfer.create_dir_all(&context.remote_dir).await?;

        let uploads = [
            (&artifacts.tool, Some(TOOL_MODE)),
            (&artifacts.hosts, None),
            (&artifacts.commands, None),
        ];

        let mut overwritten = Vec::new();
        let mut targets = Vec::with_capacity(uploads.len());
        for (local, mode) in uploads {
            let remote = context.remote_path(&RunArtifacts::remote_name(local)?);
            if self.transfer.exists(&remote).await? {
                warn!("[{}] overwriting existing remote file {}", self.node, remote);
                overwritten.push(remote.clone());
            }
            targets.push((local, remote, mode));
        }

        self.progress(&format!("uploading files to {}", context.remote_dir));
        for (local, remote, mode) in targets {
            self.transfer.upload(local, &remote, mode).await?;
        }
        Ok(overwritten)
    }

    async fn invoke(&mut self, artifacts: &RunArtifacts, context: &RunContext) -> Result<()> {
        let command = self.invocation(artifacts, context)?;
        self.advance(OrchestrationState::Invoking)?;
        self.progress("running tool in sub-shell");
        debug!("[{}] invoking: {}", self.node, command);

        self.channel.send_line(&command).await?;
        let ceiling = self.profile.invoke_ceiling;
        let output = self.expect(OrchestrationState::Invoking, ceiling).await?;
        self.echo(&output.text)?;

        if self.options.verbosity == Verbosity::Verbose {
            self.progress("latest remote logs:");
            let listing = format!("ls -lt {} | head -n 5", context.remote_logs);
            self.channel.send_line(&listing).await?;
            let prompts = self.profile.prompts(ShellLevel::SubShell);
            let logs = self
                .reader
                .read_until_any(&mut self.channel, &prompts, self.profile.prompt_ceiling)
                .await?;
            if logs.text.trim().is_empty() {
                self.echo("(no logs found)")?;
            } else {
                self.echo(&logs.text)?;
            }
        } else {
            self.progress("remote logs: (use --verbose to show)");
        }
        Ok(())
    }

    /// Command line that runs the tool against the staged inputs.
    pub fn invocation(&self, artifacts: &RunArtifacts, context: &RunContext) -> Result<String> {
        let tool = context.remote_path(&RunArtifacts::remote_name(&artifacts.tool)?);
        let hosts = context.remote_path(&RunArtifacts::remote_name(&artifacts.hosts)?);
        let commands = context.remote_path(&RunArtifacts::remote_name(&artifacts.commands)?);
        let tool = match &self.options.interpreter {
            Some(interpreter) => format!("{} {}", interpreter, tool),
            // A bare relative name would be looked up in PATH.
            None if !tool.contains('/') => format!("./{}", tool),
            None => tool,
        };
        Ok(format!(
            "{} {} {} --logs-dir {}",
            tool, hosts, commands, context.remote_logs
        ))
    }

    async fn harvest(
        &mut self,
        context: &RunContext,
    ) -> Result<(String, Vec<String>, Vec<PathBuf>)> {
        self.advance(OrchestrationState::HarvestingLogs)?;

        let (listed_from, entries) = match self.transfer.list_dir(&context.remote_logs).await {
            Ok(entries) => (context.remote_logs.clone(), entries),
            Err(Error::Transfer(TransferError::NotFound { .. })) => {
                debug!(
                    "[{}] {} missing, listing {}",
                    self.node, context.remote_logs, context.remote_dir
                );
                let entries = self.transfer.list_dir(&context.remote_dir).await?;
                (context.remote_dir.clone(), entries)
            }
            Err(e) => return Err(e),
        };

        let found: Vec<String> = entries
            .into_iter()
            .map(|entry| entry.name)
            .filter(|name| is_artifact_name(name))
            .collect();
        info!(
            "[{}] {} output artifact(s) in {}",
            self.node,
            found.len(),
            listed_from
        );

        let mut downloaded = Vec::new();
        if self.options.download_outputs {
            self.progress(&format!(
                "downloading output_*.txt -> {}",
                context.local_logs.display()
            ));
            tokio::fs::create_dir_all(&context.local_logs)
                .await
                .map_err(|source| TransferError::Local {
                    path: context.local_logs.clone(),
                    source,
                })?;
            for name in &found {
                let local = context.local_logs.join(name);
                self.transfer
                    .download(&remote_join(&listed_from, name), &local)
                    .await?;
                downloaded.push(local);
            }
        }

        Ok((listed_from, found, downloaded))
    }

    async fn exit(&mut self) -> Result<()> {
        let command = self
            .profile
            .level(ShellLevel::SubShell)
            .and_then(|level| level.exit_command.clone())
            .unwrap_or_else(|| "exit".to_string());
        self.channel.send_line(&command).await?;

        let prompts = self.profile.prompts(ShellLevel::Restricted);
        let result = self
            .reader
            .read_until_any(&mut self.channel, &prompts, self.profile.prompt_ceiling)
            .await?;
        if !result.is_matched() {
            warn!(
                "[{}] no restricted shell prompt after '{}' (expected one of {:?})",
                self.node,
                command,
                prompts.literals()
            );
        }
        self.advance(OrchestrationState::Exited)?;
        self.progress("done");
        Ok(())
    }

    /// Wait for the prompt that marks `target` as reached.
    async fn expect(
        &mut self,
        target: OrchestrationState,
        ceiling: Duration,
    ) -> Result<PromptMatch> {
        let prompts = target
            .shell_level()
            .map(|level| self.profile.prompts(level))
            .unwrap_or_else(|| crate::channel::PromptSet::new(Vec::<String>::new()));

        let result = self
            .reader
            .read_until_any(&mut self.channel, &prompts, ceiling)
            .await?;
        match &result.matched {
            Some(prompt) => {
                debug!("[{}] matched '{}' for {}", self.node, prompt, target);
                Ok(result)
            }
            None => {
                self.echo(&result.text)?;
                Err(SessionError::PromptNotFound {
                    state: target.to_string(),
                    expected: prompts.literals().to_vec(),
                    waited: result.elapsed,
                }
                .into())
            }
        }
    }

    fn advance(&mut self, next: OrchestrationState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::IllegalTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        debug!("[{}] {} -> {}", self.node, self.state, next);
        self.state = next;
        Ok(())
    }

    fn progress(&self, message: &str) {
        if self.options.verbosity.shows_progress() {
            info!("[{}] {}", self.node, message);
        }
    }

    /// Show remote output according to the verbosity.
    fn echo(&mut self, output: &str) -> Result<()> {
        let verbosity = self.options.verbosity;
        for line in verbosity.console_lines(output) {
            writeln!(self.console, "{}", line)?;
        }
        self.console.flush()?;
        for line in verbosity.error_stream_lines(output) {
            writeln!(self.errors, "{}", line)?;
        }
        self.errors.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{MockDevice, MockTransfer, SharedBuffer};

    const TS: &str = "20260314_090507";

    struct Fixture {
        _dir: tempfile::TempDir,
        local: PathBuf,
        artifacts: RunArtifacts,
        context: RunContext,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().to_path_buf();
        std::fs::write(local.join("fleetshow"), "#!/bin/sh\n").unwrap();
        std::fs::write(local.join("hosts.txt"), "10.0.0.1,admin,pw1\n").unwrap();
        std::fs::write(local.join("commands.txt"), "show version\n").unwrap();
        let artifacts = RunArtifacts::in_dir(&local, "fleetshow", "hosts.txt", "commands.txt");
        let context = RunContext {
            timestamp: TS.to_string(),
            remote_dir: format!("sdwan-bulk-show/{}", TS),
            remote_logs: format!("sdwan-bulk-show/{}/logs", TS),
            local_logs: local.join("logs").join(TS),
        };
        Fixture {
            _dir: dir,
            local,
            artifacts,
            context,
        }
    }

    fn vmanage() -> MockDevice {
        MockDevice::new("vmanage:~$ ")
            .greeting("Welcome to Viptela CLI\r\nvmanage# ")
            .reply("vshell", "vmanage:~$ ")
            .reply("exit", "exit\r\nvmanage# ")
    }

    fn options(verbosity: Verbosity, download_outputs: bool) -> OrchestratorOptions {
        OrchestratorOptions {
            verbosity,
            download_outputs,
            interpreter: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_with_downloads() {
        let fx = fixture();
        let logs = fx.context.remote_logs.clone();
        let device = vmanage().reply_prefix(
            &format!("sdwan-bulk-show/{}/fleetshow", TS),
            "dispatching 1 command(s)\r\n[10.0.0.9] connect error: refused\r\nvmanage:~$ ",
        );
        let transfer = MockTransfer::new()
            .with_dir(&logs)
            .with_file(&format!("{}/output_10.0.0.1.txt", logs), "IOS XE")
            .with_file(&format!("{}/notes.log", logs), "x");

        let errors = SharedBuffer::default();
        let mut session = OrchestratorSession::new(
            "10.71.131.72",
            device.shell(),
            transfer.clone(),
            Vec::new(),
            NodeProfile::default(),
            options(Verbosity::Normal, true),
        )
        .with_error_output(errors.clone());
        let report = session.run(&fx.artifacts, &fx.context).await.unwrap();
        assert_eq!(session.state(), OrchestrationState::Exited);

        let run = format!("sdwan-bulk-show/{}", TS);
        assert!(transfer.has_dir("sdwan-bulk-show"));
        assert!(transfer.has_dir(&run));
        assert_eq!(
            transfer.uploads(),
            vec![
                format!("{}/fleetshow", run),
                format!("{}/hosts.txt", run),
                format!("{}/commands.txt", run),
            ]
        );
        assert_eq!(transfer.mode(&format!("{}/fleetshow", run)), Some(0o755));
        assert_eq!(
            transfer.file(&format!("{}/hosts.txt", run)).as_deref(),
            Some("10.0.0.1,admin,pw1\n")
        );

        assert_eq!(
            device.sent(),
            vec![
                "vshell".to_string(),
                format!(
                    "{run}/fleetshow {run}/hosts.txt {run}/commands.txt --logs-dir {run}/logs"
                ),
                "exit".to_string(),
            ]
        );

        assert_eq!(report.listed_from, logs);
        assert_eq!(report.artifacts, vec!["output_10.0.0.1.txt"]);
        let local = fx.local.join("logs").join(TS).join("output_10.0.0.1.txt");
        assert_eq!(report.downloaded, vec![local.clone()]);
        assert_eq!(std::fs::read_to_string(local).unwrap(), "IOS XE");
        assert!(report.overwritten.is_empty());

        let console = String::from_utf8(session.close().await.unwrap()).unwrap();
        assert!(console.is_empty());
        assert_eq!(errors.contents(), "[10.0.0.9] connect error: refused\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_restricted_prompt_is_timeout() {
        let fx = fixture();
        let device = MockDevice::new("$ ").greeting("Last login: never\r\n$ ");
        let transfer = MockTransfer::new();

        let mut session = OrchestratorSession::new(
            "node",
            device.shell(),
            transfer.clone(),
            Vec::new(),
            NodeProfile::default(),
            options(Verbosity::Quiet, false),
        );
        let err = session.run(&fx.artifacts, &fx.context).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        match err {
            Error::Session(SessionError::PromptNotFound { state, expected, waited }) => {
                assert_eq!(state, "RestrictedShell");
                assert_eq!(expected, vec!["vmanage#", "vmanage>"]);
                assert_eq!(waited, Duration::from_secs(10));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.state(), OrchestrationState::BasePrompt);
        assert!(device.sent().is_empty());
        assert!(transfer.uploads().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_files_reported_and_replaced() {
        let fx = fixture();
        let run = fx.context.remote_dir.clone();
        let device = vmanage();
        let transfer = MockTransfer::new()
            .with_dir(&run)
            .with_file(&format!("{}/hosts.txt", run), "stale");

        let mut session = OrchestratorSession::new(
            "node",
            device.shell(),
            transfer.clone(),
            Vec::new(),
            NodeProfile::default(),
            options(Verbosity::Normal, false),
        );
        let report = session.run(&fx.artifacts, &fx.context).await.unwrap();

        assert_eq!(report.overwritten, vec![format!("{}/hosts.txt", run)]);
        assert_eq!(
            transfer.file(&format!("{}/hosts.txt", run)).as_deref(),
            Some("10.0.0.1,admin,pw1\n")
        );
        assert_eq!(report.listed_from, run);
        assert!(report.artifacts.is_empty());
        assert!(report.downloaded.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_stops_before_invocation() {
        let fx = fixture();
        let device = vmanage();
        let transfer = MockTransfer::new().failing_uploads();

        let mut session = OrchestratorSession::new(
            "node",
            device.shell(),
            transfer,
            Vec::new(),
            NodeProfile::default(),
            options(Verbosity::Normal, false),
        );
        let err = session.run(&fx.artifacts, &fx.context).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transfer);
        assert_eq!(session.state(), OrchestrationState::SubShell);
        assert_eq!(device.sent(), vec!["vshell"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verbose_echoes_output_and_log_listing() {
        let fx = fixture();
        let logs = fx.context.remote_logs.clone();
        let device = vmanage()
            .reply_prefix("sdwan-bulk-show/", "run started\r\nrun finished\r\nvmanage:~$ ")
            .reply(
                &format!("ls -lt {} | head -n 5", logs),
                "-rw-r--r-- 1 admin admin 6 output_10.0.0.1.txt\r\nvmanage:~$ ",
            );
        let transfer = MockTransfer::new().with_dir(&logs);

        let errors = SharedBuffer::default();
        let mut session = OrchestratorSession::new(
            "node",
            device.shell(),
            transfer,
            Vec::new(),
            NodeProfile::default(),
            options(Verbosity::Verbose, false),
        )
        .with_error_output(errors.clone());
        session.run(&fx.artifacts, &fx.context).await.unwrap();

        assert!(errors.contents().is_empty());
        let console = String::from_utf8(session.close().await.unwrap()).unwrap();
        assert!(console.contains("run started\nrun finished\n"));
        assert!(console.contains("output_10.0.0.1.txt"));
        assert_eq!(device.sent()[2], format!("ls -lt {} | head -n 5", logs));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_exit_prompt_only_warns() {
        let fx = fixture();
        let device = MockDevice::new("vmanage:~$ ")
            .greeting("vmanage> ")
            .reply("vshell", "vmanage:~$ ")
            .hang_up_on("exit");
        let transfer = MockTransfer::new().with_dir(&fx.context.remote_logs);

        let mut session = OrchestratorSession::new(
            "node",
            device.shell(),
            transfer,
            Vec::new(),
            NodeProfile::default(),
            options(Verbosity::Quiet, false),
        );
        session.run(&fx.artifacts, &fx.context).await.unwrap();
        assert_eq!(session.state(), OrchestrationState::Exited);
    }

    #[test]
    fn test_invocation_with_interpreter() {
        let fx = fixture();
        let artifacts =
            RunArtifacts::in_dir(&fx.local, "bulk-show.py", "hosts.txt", "commands.txt");
        let mut context = fx.context.clone();
        context.remote_dir = "run".to_string();
        context.remote_logs = "run/logs".to_string();

        let session = OrchestratorSession::new(
            "node",
            MockDevice::new("$").shell(),
            MockTransfer::new(),
            Vec::new(),
            NodeProfile::default(),
            OrchestratorOptions {
                interpreter: Some("python3".to_string()),
                ..OrchestratorOptions::default()
            },
        );
        assert_eq!(
            session.invocation(&artifacts, &context).unwrap(),
            "python3 run/bulk-show.py run/hosts.txt run/commands.txt --logs-dir run/logs"
        );
    }

    #[test]
    fn test_verify_reports_missing_file() {
        let fx = fixture();
        std::fs::remove_file(fx.local.join("commands.txt")).unwrap();
        let err = fx.artifacts.verify().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("commands.txt"));
    }
}

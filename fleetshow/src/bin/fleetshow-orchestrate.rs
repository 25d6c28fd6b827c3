//! Stage a fleetshow run on a management node and collect its output.
//!
//! ```bash
//! fleetshow-orchestrate 10.71.131.72 --user admin --key ~/.ssh/id_ed25519 \
//!     --hosts hosts.txt --commands commands.txt --download-outputs
//! ```
//!
//! A timestamped directory is created under `--remote-dir` for each run;
//! the tool writes its output under `<remote-dir>/<timestamp>/logs`, and
//! downloads land in `<local-dir>/logs/<timestamp>`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use fleetshow::config::FileConfig;
use fleetshow::{
    Error, NodeProfile, OrchestratorOptions, RunArtifacts, RunContext, SshConfig, Verbosity,
    run_orchestration,
};

const EXIT_RUNTIME: u8 = 1;
const EXIT_USAGE: u8 = 2;

#[derive(Parser)]
#[command(name = "fleetshow-orchestrate")]
#[command(about = "Upload fleetshow and its inputs to a management node and run it there")]
#[command(version)]
struct Args {
    /// Management node hostname or IP
    node: String,

    /// SSH port
    #[arg(long, default_value_t = 22)]
    port: u16,

    /// SSH username
    #[arg(long)]
    user: String,

    /// SSH password (prompted for when neither this nor --key is given)
    #[arg(long, conflicts_with = "key")]
    password: Option<String>,

    /// Path to an SSH private key
    #[arg(long)]
    key: Option<PathBuf>,

    /// Remote base directory; a timestamped run directory is created inside
    #[arg(long, default_value = "~/sdwan-bulk-show")]
    remote_dir: String,

    /// Local directory holding the tool and input files
    #[arg(long, default_value = ".")]
    local_dir: PathBuf,

    /// Host list file name inside the local directory
    #[arg(long, default_value = "hosts.txt")]
    hosts: String,

    /// Command script file name inside the local directory
    #[arg(long, default_value = "commands.txt")]
    commands: String,

    /// Tool file name inside the local directory
    #[arg(long, default_value = "fleetshow")]
    tool: String,

    /// Interpreter to run the tool with (for script-based tools)
    #[arg(long)]
    interpreter: Option<String>,

    /// Download output_*.txt files after the run
    #[arg(long)]
    download_outputs: bool,

    /// Show the full remote output
    #[arg(short, long)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long)]
    quiet: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let verbosity = match Verbosity::from_flags(args.verbose, args.quiet) {
        Ok(verbosity) => verbosity,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };
    fleetshow::logging::init(verbosity.log_filter());

    let node = args.node.clone();
    match run(args, verbosity).await {
        Ok(()) => ExitCode::SUCCESS,
        Err((code, e)) => {
            error!("[{}] {} error: {}", node, e.kind(), e);
            ExitCode::from(code)
        }
    }
}

async fn run(args: Args, verbosity: Verbosity) -> Result<(), (u8, Error)> {
    let usage = |e: Error| (EXIT_USAGE, e);
    let runtime = |e: Error| (EXIT_RUNTIME, e);

    let config = FileConfig::load_or_default(args.config.as_deref()).map_err(usage)?;
    let profile = NodeProfile::from_config(&config.node).map_err(usage)?;

    let artifacts = RunArtifacts::in_dir(&args.local_dir, &args.tool, &args.hosts, &args.commands);
    artifacts.verify().map_err(runtime)?;

    let mut ssh = SshConfig::builder(args.node.as_str())
        .port(args.port)
        .username(args.user.as_str())
        .timeout(config.node.connect_timeout)
        .inactivity_timeout(None);
    ssh = match (args.password, args.key) {
        (Some(password), _) => ssh.password(password),
        (None, Some(key)) => ssh.private_key(key),
        (None, None) => {
            let password = rpassword::prompt_password("SSH password: ")
                .map_err(|e| runtime(e.into()))?;
            ssh.password(password)
        }
    };
    let ssh = ssh.build().map_err(usage)?;

    let context = RunContext::now(&args.remote_dir, &args.local_dir);
    let options = OrchestratorOptions {
        verbosity,
        download_outputs: args.download_outputs,
        interpreter: args.interpreter,
    };

    let report = run_orchestration(
        ssh,
        profile,
        options,
        &artifacts,
        &context,
        std::io::stdout(),
    )
    .await
    .map_err(runtime)?;

    for path in &report.overwritten {
        info!("[{}] replaced {}", args.node, path);
    }
    if args.download_outputs {
        info!(
            "[{}] downloaded {} file(s) to {}",
            args.node,
            report.downloaded.len(),
            report.context.local_logs.display()
        );
    } else {
        info!(
            "[{}] {} output file(s) left in {}",
            args.node,
            report.artifacts.len(),
            report.listed_from
        );
    }
    Ok(())
}

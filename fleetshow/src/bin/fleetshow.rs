//! Run a command script against every host in a host list.
//!
//! ```bash
//! fleetshow hosts.txt commands.txt --logs-dir logs --pool-size 8
//! ```
//!
//! Each valid host gets `output_<address>.txt` in the logs directory. Hosts
//! that fail are reported but never stop the rest of the batch.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::error;

use fleetshow::{
    ChannelReader, CommandScript, DeviceProfile, Dispatcher, Error, FileConfig, HostList,
    RunReport, SshConnector,
};

const EXIT_RUNTIME: u8 = 1;
const EXIT_USAGE: u8 = 2;

#[derive(Parser)]
#[command(name = "fleetshow")]
#[command(about = "Collect show-command output from a fleet of devices over SSH")]
#[command(version)]
struct Args {
    /// Host list, one `address,username,password` per line
    hosts: PathBuf,

    /// Command script, one command per line
    commands: PathBuf,

    /// Directory for the output_<address>.txt files
    #[arg(long, default_value = ".")]
    logs_dir: PathBuf,

    /// Maximum number of devices worked on at once
    #[arg(long)]
    pool_size: Option<usize>,

    /// Device SSH port (default 830)
    #[arg(long)]
    port: Option<u16>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    fleetshow::logging::init("info");

    match run(args).await {
        Ok(report) => {
            print_summary(&report);
            ExitCode::SUCCESS
        }
        Err((code, e)) => {
            error!("{}", e);
            ExitCode::from(code)
        }
    }
}

async fn run(args: Args) -> Result<RunReport, (u8, Error)> {
    let config =
        FileConfig::load_or_default(args.config.as_deref()).map_err(|e| (EXIT_USAGE, e))?;

    let mut profile = DeviceProfile::from_config(&config.device).map_err(|e| (EXIT_USAGE, e))?;
    if let Some(port) = args.port {
        profile = profile.with_port(port);
    }
    let pool_size = args.pool_size.unwrap_or(config.dispatch.pool_size);

    let hosts = HostList::load(&args.hosts)
        .await
        .map_err(|e| (EXIT_RUNTIME, e))?;
    let script = CommandScript::load(&args.commands)
        .await
        .map_err(|e| (EXIT_RUNTIME, e))?;
    tokio::fs::create_dir_all(&args.logs_dir)
        .await
        .map_err(|e| (EXIT_RUNTIME, Error::from(e)))?;

    let dispatcher = Dispatcher::new(SshConnector::new(&profile), profile)
        .with_pool_size(pool_size)
        .with_reader(ChannelReader::new(config.dispatch.poll_interval))
        .with_output_dir(&args.logs_dir);

    Ok(dispatcher.run(hosts, Arc::new(script)).await)
}

fn print_summary(report: &RunReport) {
    for skipped in &report.skipped {
        eprintln!("line {:>4}  skipped   {}", skipped.line, skipped.reason);
    }
    for outcome in &report.outcomes {
        match &outcome.failure {
            None => eprintln!(
                "{:<15}  ok        {} command(s)",
                outcome.address.to_string(),
                outcome.commands_completed
            ),
            Some(failure) => eprintln!(
                "{:<15}  {:<8}  {} (during {})",
                outcome.address.to_string(),
                failure.kind.to_string(),
                failure.message,
                failure.during
            ),
        }
    }
}

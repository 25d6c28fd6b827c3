//! Fan-out of device sessions over a bounded worker pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::Semaphore;

use crate::channel::ChannelReader;
use crate::device::{Connector, DeviceProfile, DeviceSession, HostOutcome};
use crate::error::{Error, SessionError};
use crate::inventory::{CommandScript, HostList, RejectedLine};

/// Runs one [`DeviceSession`] per host, at most `pool_size` at a time.
///
/// Each session is its own tokio task, so a host stuck in a long capture
/// never holds up its siblings, and a panicking session only takes its own
/// host down.
pub struct Dispatcher<C> {
    connector: Arc<C>,
    profile: Arc<DeviceProfile>,
    reader: ChannelReader,
    pool_size: usize,
    output_dir: PathBuf,
}

impl<C> Dispatcher<C>
where
    C: Connector + 'static,
{
    pub const DEFAULT_POOL_SIZE: usize = 16;

    pub fn new(connector: C, profile: DeviceProfile) -> Self {
        Self {
            connector: Arc::new(connector),
            profile: Arc::new(profile),
            reader: ChannelReader::default(),
            pool_size: Self::DEFAULT_POOL_SIZE,
            output_dir: PathBuf::from("."),
        }
    }

    /// Set the maximum number of concurrent sessions (at least 1).
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Directory that receives the `output_<address>.txt` artifacts.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_reader(mut self, reader: ChannelReader) -> Self {
        self.reader = reader;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Effective number of workers for `hosts` hosts.
    pub fn workers_for(&self, hosts: usize) -> usize {
        self.pool_size.min(hosts).max(1)
    }

    /// Run `script` against every valid host and wait for all of them.
    pub async fn run(&self, hosts: HostList, script: Arc<CommandScript>) -> RunReport {
        let HostList {
            hosts: records,
            rejected,
        } = hosts;

        let workers = self.workers_for(records.len());
        info!(
            "dispatching {} command(s) to {} host(s), {} at a time",
            script.len(),
            records.len(),
            workers
        );
        let permits = Arc::new(Semaphore::new(workers));

        let mut handles = Vec::with_capacity(records.len());
        for (line, host) in records {
            let address = host.address;
            let session = DeviceSession::new(
                host,
                line,
                Arc::clone(&self.profile),
                Arc::clone(&script),
                self.reader,
                &self.output_dir,
            );
            let connector = Arc::clone(&self.connector);
            let permits = Arc::clone(&permits);

            let handle = tokio::spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let err: Error = SessionError::WorkerPool(e.to_string()).into();
                        return HostOutcome::aborted(address, line, &err);
                    }
                };
                session.run(connector.as_ref()).await
            });
            handles.push((address, line, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (address, line, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    error!("[{}] session task aborted: {}", address, join_err);
                    let err: Error = SessionError::Aborted(join_err.to_string()).into();
                    HostOutcome::aborted(address, line, &err)
                }
            };
            outcomes.push(outcome);
        }

        let report = RunReport {
            skipped: rejected,
            outcomes,
        };
        info!(
            "run complete: {} succeeded, {} failed, {} line(s) skipped",
            report.succeeded().count(),
            report.failed().count(),
            report.skipped.len()
        );
        for outcome in report.failed() {
            if let Some(failure) = &outcome.failure {
                warn!(
                    "[{}] failed ({}) during {}: {}",
                    outcome.address, failure.kind, failure.during, failure.message
                );
            }
        }
        report
    }
}

/// Aggregated result of one dispatch run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Host-list lines that never became sessions.
    pub skipped: Vec<RejectedLine>,

    /// One entry per dispatched host, in host-list order.
    pub outcomes: Vec<HostOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &HostOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &HostOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed().next().is_none()
    }
}

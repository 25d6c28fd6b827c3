//! Scripted in-memory devices, channels and transfers for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;

use crate::channel::{ReadChunk, ShellChannel};
use crate::device::{Connector, DeviceLink};
use crate::error::{Result, TransferError, TransportError};
use crate::inventory::HostRecord;
use crate::orchestrator::{FileTransfer, RemoteEntry, sort_newest_first};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Channel replaying a fixed schedule of chunks, each due at an offset
/// from the moment the channel was built.
pub struct TimedChannel {
    origin: Instant,
    schedule: VecDeque<(Duration, Vec<u8>)>,
    closing: bool,
}

impl TimedChannel {
    pub fn new(schedule: Vec<(Duration, Vec<u8>)>) -> Self {
        Self {
            origin: Instant::now(),
            schedule: schedule.into(),
            closing: false,
        }
    }

    /// Report the channel closed once the schedule is drained.
    pub fn closing(mut self) -> Self {
        self.closing = true;
        self
    }
}

impl ShellChannel for TimedChannel {
    async fn send(&mut self, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn read_chunk(&mut self, wait: Duration) -> Result<ReadChunk> {
        let now = Instant::now();
        let due = match self.schedule.front() {
            Some((offset, _)) => self.origin + *offset,
            None if self.closing => return Ok(ReadChunk::Closed),
            None => {
                tokio::time::sleep(wait).await;
                return Ok(ReadChunk::Idle);
            }
        };
        if due > now {
            tokio::time::sleep_until(due.min(now + wait)).await;
        }
        if due <= Instant::now() {
            let (_, data) = self.schedule.pop_front().unwrap_or_default();
            Ok(ReadChunk::Data(data))
        } else {
            Ok(ReadChunk::Idle)
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct DeviceState {
    prompt: String,
    greeting: Vec<u8>,
    replies: HashMap<String, String>,
    prefix_replies: Vec<(String, String)>,
    hang_up_on: HashSet<String>,
    panic_on: HashSet<String>,
    stall_shell: bool,
    streams: HashMap<String, (Vec<u8>, Duration)>,

    pending: Vec<u8>,
    stream: Option<(Vec<u8>, Duration, Instant)>,
    remote_closed: bool,
    sent: Vec<String>,
    closed: bool,
}

/// A scripted device shell.
///
/// Every line sent is recorded and answered with its configured reply, or
/// with the bare prompt for commands without one.
#[derive(Clone)]
pub struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    pub fn new(prompt: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                prompt: prompt.to_string(),
                ..DeviceState::default()
            })),
        }
    }

    /// Output waiting on the channel as soon as it opens.
    pub fn greeting(self, text: &str) -> Self {
        lock(&self.state).greeting = text.as_bytes().to_vec();
        self
    }

    pub fn reply(self, command: &str, text: &str) -> Self {
        lock(&self.state)
            .replies
            .insert(command.to_string(), text.to_string());
        self
    }

    /// Reply to any command starting with `prefix`.
    pub fn reply_prefix(self, prefix: &str, text: &str) -> Self {
        lock(&self.state)
            .prefix_replies
            .push((prefix.to_string(), text.to_string()));
        self
    }

    /// Close the channel from the remote side after `command`.
    pub fn hang_up_on(self, command: &str) -> Self {
        lock(&self.state).hang_up_on.insert(command.to_string());
        self
    }

    /// Emit `chunk` every `interval` after `command` until the next send.
    pub fn stream_on(self, command: &str, chunk: &[u8], interval: Duration) -> Self {
        lock(&self.state)
            .streams
            .insert(command.to_string(), (chunk.to_vec(), interval));
        self
    }

    pub fn panic_on(self, command: &str) -> Self {
        lock(&self.state).panic_on.insert(command.to_string());
        self
    }

    /// Never answer the shell request.
    pub fn stall_shell(self) -> Self {
        lock(&self.state).stall_shell = true;
        self
    }

    /// Lines sent to the device, without terminators.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.state).sent.clone()
    }

    /// Whether the shell or the connection was closed by the client.
    pub fn closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Open a shell on this device.
    pub fn shell(&self) -> MockShell {
        let mut state = lock(&self.state);
        let greeting = state.greeting.clone();
        state.pending.extend_from_slice(&greeting);
        MockShell {
            state: Arc::clone(&self.state),
        }
    }
}

/// Shell channel onto a [`MockDevice`].
pub struct MockShell {
    state: Arc<Mutex<DeviceState>>,
}

impl ShellChannel for MockShell {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(data);
        let command = text.trim_end_matches(['\r', '\n']).to_string();

        let should_panic = {
            let mut state = lock(&self.state);
            state.sent.push(command.clone());
            state.stream = None;

            let reply = state.replies.get(&command).cloned().or_else(|| {
                state
                    .prefix_replies
                    .iter()
                    .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                    .map(|(_, text)| text.clone())
            });
            match reply {
                Some(reply) => state.pending.extend_from_slice(reply.as_bytes()),
                None if state.hang_up_on.contains(&command) => {}
                None if state.streams.contains_key(&command) => {}
                None => {
                    let prompt = state.prompt.clone();
                    state.pending.extend_from_slice(prompt.as_bytes());
                }
            }
            if let Some((chunk, interval)) = state.streams.get(&command).cloned() {
                state.stream = Some((chunk, interval, Instant::now() + interval));
            }
            if state.hang_up_on.contains(&command) {
                state.remote_closed = true;
            }
            state.panic_on.contains(&command)
        };

        if should_panic {
            panic!("device crashed on '{}'", command);
        }
        Ok(())
    }

    async fn read_chunk(&mut self, wait: Duration) -> Result<ReadChunk> {
        let now = Instant::now();
        let next_due = {
            let mut state = lock(&self.state);
            if !state.pending.is_empty() {
                return Ok(ReadChunk::Data(std::mem::take(&mut state.pending)));
            }
            if state.remote_closed {
                return Ok(ReadChunk::Closed);
            }
            state.stream.as_ref().map(|(_, _, due)| *due)
        };

        let until = next_due.map_or(now + wait, |due| due.min(now + wait));
        if until > now {
            tokio::time::sleep_until(until).await;
        }

        let mut state = lock(&self.state);
        let now = Instant::now();
        if let Some((chunk, interval, due)) = state.stream.as_mut() {
            if *due <= now {
                *due = now + *interval;
                return Ok(ReadChunk::Data(chunk.clone()));
            }
        }
        Ok(ReadChunk::Idle)
    }

    async fn shutdown(&mut self) -> Result<()> {
        lock(&self.state).closed = true;
        Ok(())
    }
}

#[derive(Default)]
struct ConnectorState {
    devices: HashMap<Ipv4Addr, MockDevice>,
    refused: HashSet<Ipv4Addr>,
    stalled: HashSet<Ipv4Addr>,
    attempts: Vec<Ipv4Addr>,
    active: usize,
    max_concurrent: usize,
}

/// Connector handing out [`MockDevice`] shells by address.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, address: &str, device: MockDevice) -> Self {
        if let Ok(address) = address.parse() {
            lock(&self.state).devices.insert(address, device);
        }
        self
    }

    /// Refuse connections to `address`.
    pub fn refuse(self, address: &str) -> Self {
        if let Ok(address) = address.parse() {
            lock(&self.state).refused.insert(address);
        }
        self
    }

    /// Accept the TCP connection to `address` but never finish the handshake.
    pub fn stall(self, address: &str) -> Self {
        if let Ok(address) = address.parse() {
            lock(&self.state).stalled.insert(address);
        }
        self
    }

    /// Addresses connected to, in attempt order.
    pub fn attempts(&self) -> Vec<Ipv4Addr> {
        lock(&self.state).attempts.clone()
    }

    /// Highest number of simultaneously open links.
    pub fn max_concurrent(&self) -> usize {
        lock(&self.state).max_concurrent
    }
}

impl Connector for MockConnector {
    type Link = MockLink;

    async fn connect(&self, host: &HostRecord) -> Result<MockLink> {
        let stalled = {
            let mut state = lock(&self.state);
            state.attempts.push(host.address);
            state.stalled.contains(&host.address)
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = lock(&self.state);
        let device = match state.devices.get(&host.address) {
            Some(device) if !state.refused.contains(&host.address) => device.clone(),
            _ => {
                return Err(TransportError::ConnectionFailed {
                    host: host.address.to_string(),
                    port: 830,
                    source: std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "connection refused",
                    ),
                }
                .into());
            }
        };
        state.active += 1;
        state.max_concurrent = state.max_concurrent.max(state.active);
        Ok(MockLink {
            device,
            connector: Arc::clone(&self.state),
        })
    }
}

/// Open connection to a [`MockDevice`].
pub struct MockLink {
    device: MockDevice,
    connector: Arc<Mutex<ConnectorState>>,
}

impl DeviceLink for MockLink {
    type Channel = MockShell;

    async fn open_shell(&mut self) -> Result<MockShell> {
        let stalled = lock(&self.device.state).stall_shell;
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(self.device.shell())
    }

    async fn close(self) -> Result<()> {
        lock(&self.device.state).closed = true;
        let mut state = lock(&self.connector);
        state.active = state.active.saturating_sub(1);
        Ok(())
    }
}

/// Cloneable in-memory writer.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.bytes)).into_owned()
    }
}

impl std::io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        lock(&self.bytes).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct TransferState {
    dirs: HashSet<String>,
    files: HashMap<String, (Vec<u8>, u32)>,
    modes: HashMap<String, u32>,
    uploads: Vec<String>,
    fail_uploads: bool,
    clock: u32,
}

/// In-memory remote filesystem.
#[derive(Clone, Default)]
pub struct MockTransfer {
    state: Arc<Mutex<TransferState>>,
}

impl MockTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a file on the remote side, newer than everything before it.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        {
            let mut state = lock(&self.state);
            state.clock += 1;
            let mtime = state.clock;
            state
                .files
                .insert(path.to_string(), (content.as_bytes().to_vec(), mtime));
        }
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        lock(&self.state).dirs.insert(path.to_string());
        self
    }

    /// Make every upload fail.
    pub fn failing_uploads(self) -> Self {
        lock(&self.state).fail_uploads = true;
        self
    }

    pub fn has_dir(&self, path: &str) -> bool {
        lock(&self.state).dirs.contains(path)
    }

    pub fn file(&self, path: &str) -> Option<String> {
        lock(&self.state)
            .files
            .get(path)
            .map(|(data, _)| String::from_utf8_lossy(data).into_owned())
    }

    pub fn mode(&self, path: &str) -> Option<u32> {
        lock(&self.state).modes.get(path).copied()
    }

    /// Remote paths uploaded to, in order.
    pub fn uploads(&self) -> Vec<String> {
        lock(&self.state).uploads.clone()
    }
}

impl FileTransfer for MockTransfer {
    async fn create_dir_all(&self, path: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if !current.is_empty() || path.starts_with('/') {
                current.push('/');
            }
            current.push_str(part);
            state.dirs.insert(current.clone());
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let state = lock(&self.state);
        Ok(state.files.contains_key(path) || state.dirs.contains(path))
    }

    async fn upload(&self, local: &Path, remote: &str, mode: Option<u32>) -> Result<()> {
        let data = tokio::fs::read(local)
            .await
            .map_err(|source| TransferError::Local {
                path: local.to_path_buf(),
                source,
            })?;
        let mut state = lock(&self.state);
        if state.fail_uploads {
            return Err(TransferError::Remote {
                path: remote.to_string(),
                message: "permission denied".to_string(),
            }
            .into());
        }
        state.clock += 1;
        let mtime = state.clock;
        state.files.insert(remote.to_string(), (data, mtime));
        if let Some(mode) = mode {
            state.modes.insert(remote.to_string(), mode);
        }
        state.uploads.push(remote.to_string());
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        let data = match lock(&self.state).files.get(remote) {
            Some((data, _)) => data.clone(),
            None => {
                return Err(TransferError::NotFound {
                    path: remote.to_string(),
                }
                .into());
            }
        };
        tokio::fs::write(local, data)
            .await
            .map_err(|source| TransferError::Local {
                path: local.to_path_buf(),
                source,
            })?;
        Ok(())
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let state = lock(&self.state);
        if !state.dirs.contains(path) {
            return Err(TransferError::NotFound {
                path: path.to_string(),
            }
            .into());
        }
        let prefix = format!("{}/", path);
        let entries = state
            .files
            .iter()
            .filter_map(|(file, (_, mtime))| {
                let name = file.strip_prefix(&prefix)?;
                (!name.contains('/')).then(|| RemoteEntry {
                    name: name.to_string(),
                    modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(u64::from(*mtime))),
                })
            })
            .collect();
        Ok(sort_newest_first(entries))
    }
}

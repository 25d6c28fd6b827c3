//! Channel layer: reading responses from a non-cooperative text shell.
//!
//! Devices give no end-of-response marker, so completion is inferred
//! either from quiescence ([`ChannelReader::read`]) or from a known prompt
//! literal showing up in the stream ([`ChannelReader::read_until_any`]).

mod buffer;
mod patterns;
mod reader;

pub use buffer::CaptureBuffer;
pub use patterns::{PromptMatch, PromptSet};
pub use reader::{Capture, ChannelReader, QuiescenceClock, StopReason};

use std::future::Future;
use std::time::Duration;

use log::trace;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use crate::error::{ChannelError, Result};

/// Outcome of one bounded-latency read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadChunk {
    /// Bytes arrived.
    Data(Vec<u8>),
    /// Nothing arrived within the wait.
    Idle,
    /// The remote side closed the channel.
    Closed,
}

/// An open interactive shell channel.
pub trait ShellChannel: Send {
    /// Write raw bytes to the remote shell.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Wait at most `wait` for the next chunk of output.
    fn read_chunk(&mut self, wait: Duration) -> impl Future<Output = Result<ReadChunk>> + Send;

    /// Close the channel.
    fn shutdown(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Send a line followed by a newline.
    fn send_line(&mut self, line: &str) -> impl Future<Output = Result<()>> + Send {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        async move { self.send(&data).await }
    }
}

impl ShellChannel for Channel<Msg> {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.data(data).await.map_err(ChannelError::Ssh)?;
        Ok(())
    }

    async fn read_chunk(&mut self, wait: Duration) -> Result<ReadChunk> {
        let started = tokio::time::Instant::now();
        loop {
            let remaining = wait.saturating_sub(started.elapsed());
            let msg = match tokio::time::timeout(remaining, self.wait()).await {
                Err(_) => return Ok(ReadChunk::Idle),
                Ok(msg) => msg,
            };
            match msg {
                Some(ChannelMsg::Data { data }) => return Ok(ReadChunk::Data(data.to_vec())),
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    return Ok(ReadChunk::Data(data.to_vec()));
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Ok(ReadChunk::Closed);
                }
                Some(other) => trace!("ignoring channel message {:?}", other),
            }
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        Channel::close(self).await.map_err(ChannelError::Ssh)?;
        Ok(())
    }
}

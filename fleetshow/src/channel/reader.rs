//! Quiescence-based response capture.

use std::time::Duration;

use log::trace;
use tokio::time::Instant;

use super::buffer::CaptureBuffer;
use super::patterns::{PromptMatch, PromptSet};
use super::{ReadChunk, ShellChannel};
use crate::error::Result;

/// Why a capture stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing arrived for the idle timeout.
    Quiescent,
    /// The hard ceiling was reached.
    Ceiling,
    /// The remote closed the channel.
    Closed,
}

/// Text captured for one request.
#[derive(Debug, Clone)]
pub struct Capture {
    /// Received bytes, lossily decoded.
    pub text: String,

    /// Why the capture ended.
    pub stop: StopReason,

    /// Time spent capturing.
    pub elapsed: Duration,
}

/// Dual-timeout completion rule.
///
/// Tracks the start of a capture and the arrival of the last byte; a
/// capture is complete once the remote has been silent for `idle`, or
/// unconditionally once `max_wait` has elapsed since the start.
#[derive(Debug, Clone, Copy)]
pub struct QuiescenceClock {
    start: Instant,
    last_data: Instant,
    idle: Duration,
    max_wait: Duration,
}

impl QuiescenceClock {
    /// Start the clock at `now`.
    pub fn start(now: Instant, idle: Duration, max_wait: Duration) -> Self {
        Self {
            start: now,
            last_data: now,
            idle,
            max_wait,
        }
    }

    /// Record that bytes arrived at `now`.
    pub fn record_data(&mut self, now: Instant) {
        self.last_data = now;
    }

    /// Whether the hard ceiling has passed.
    pub fn ceiling_reached(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.start) >= self.max_wait
    }

    /// Decide after an empty read. Idle is checked before the ceiling.
    pub fn check(&self, now: Instant) -> Option<StopReason> {
        if now.saturating_duration_since(self.last_data) >= self.idle {
            Some(StopReason::Quiescent)
        } else if self.ceiling_reached(now) {
            Some(StopReason::Ceiling)
        } else {
            None
        }
    }

    /// How long the next read may block without overshooting either deadline.
    pub fn next_wait(&self, now: Instant, poll_interval: Duration) -> Duration {
        let to_idle = self
            .idle
            .saturating_sub(now.saturating_duration_since(self.last_data));
        let to_ceiling = self.max_wait.saturating_sub(self.elapsed(now));
        poll_interval.min(to_idle).min(to_ceiling)
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }
}

/// Reads responses off a [`ShellChannel`].
#[derive(Debug, Clone, Copy)]
pub struct ChannelReader {
    poll_interval: Duration,
}

impl ChannelReader {
    /// Default upper bound for a single blocking read.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Capture until the remote goes quiet for `idle`, or `max_wait` passes.
    pub async fn read<C: ShellChannel>(
        &self,
        channel: &mut C,
        idle: Duration,
        max_wait: Duration,
    ) -> Result<Capture> {
        let mut buffer = CaptureBuffer::new();
        let mut clock = QuiescenceClock::start(Instant::now(), idle, max_wait);

        let stop = loop {
            let wait = clock.next_wait(Instant::now(), self.poll_interval);
            match channel.read_chunk(wait).await? {
                ReadChunk::Data(data) => {
                    trace!("read {} bytes", data.len());
                    buffer.extend(&data);
                    let now = Instant::now();
                    clock.record_data(now);
                    if clock.ceiling_reached(now) {
                        break StopReason::Ceiling;
                    }
                }
                ReadChunk::Idle => {
                    if let Some(reason) = clock.check(Instant::now()) {
                        break reason;
                    }
                }
                ReadChunk::Closed => break StopReason::Closed,
            }
        };

        let elapsed = clock.elapsed(Instant::now());
        trace!("capture stopped ({:?}) after {:?}, {} bytes", stop, elapsed, buffer.len());

        Ok(Capture {
            text: buffer.into_text(),
            stop,
            elapsed,
        })
    }

    /// Capture until any of `prompts` appears, or `max_wait` passes.
    pub async fn read_until_any<C: ShellChannel>(
        &self,
        channel: &mut C,
        prompts: &PromptSet,
        max_wait: Duration,
    ) -> Result<PromptMatch> {
        let start = Instant::now();
        let mut buffer = CaptureBuffer::new();
        let mut matched = None;

        loop {
            let remaining = max_wait.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            let wait = self.poll_interval.min(remaining);
            match channel.read_chunk(wait).await? {
                ReadChunk::Data(data) => {
                    buffer.extend(&data);
                    if let Some(index) = buffer.search_new(prompts) {
                        matched = prompts.literal(index).map(str::to_string);
                        break;
                    }
                }
                ReadChunk::Idle => {}
                ReadChunk::Closed => break,
            }
        }

        Ok(PromptMatch {
            text: buffer.into_text(),
            matched,
            elapsed: start.elapsed(),
        })
    }
}

impl Default for ChannelReader {
    fn default() -> Self {
        Self::new(Self::DEFAULT_POLL_INTERVAL)
    }
}

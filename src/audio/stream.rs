//! Periodic batcher: buffer → resample → PCM → frame → transport.
//!
//! The timer runs independently of capture timing.  Each tick resolves the
//! handler id afresh, swaps the buffered chunks out and ships them as one
//! [`OutboundFrame`].  Frames that meet a closed transport are dropped, not
//! re-queued, so a reconnect never replays stale audio.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::buffer::SampleBuffer;
use super::frame::OutboundFrame;
use super::resample::{resample, TARGET_SAMPLE_RATE};
use crate::transport::Transport;

/// Default send cadence.
pub const SEND_INTERVAL: Duration = Duration::from_millis(100);

/// Shortest cadence the timer accepts; shorter requests are raised to it.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_millis(1);

/// Looked up on every tick; `None` means no channel is negotiated yet.
pub type HandlerIdProvider = Arc<dyn Fn() -> Option<u8> + Send + Sync>;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No handler id; buffer left untouched.
    NoHandler,
    /// Nothing buffered.
    Empty,
    Sent { handler_id: u8, samples: usize },
    /// Transport not open; the batch was drained and discarded.
    Dropped { samples: usize },
}

/// Run one tick against `buffer`.
pub fn send_buffered(
    buffer: &SampleBuffer,
    source_rate: u32,
    handler_id: Option<u8>,
    transport: &dyn Transport,
) -> TickOutcome {
    let Some(handler_id) = handler_id else {
        return TickOutcome::NoHandler;
    };
    if buffer.is_empty() {
        return TickOutcome::Empty;
    }

    let combined = buffer.drain_concat();
    let samples = resample(&combined, source_rate, TARGET_SAMPLE_RATE);
    // A handful of high-rate samples can round down to nothing.
    if samples.is_empty() {
        return TickOutcome::Empty;
    }

    if !transport.is_open() {
        log::debug!("stream: transport not open, dropping {} samples", samples.len());
        return TickOutcome::Dropped {
            samples: samples.len(),
        };
    }

    let frame = OutboundFrame::encode(handler_id, &samples);
    let count = frame.sample_count();
    transport.send(frame.into_bytes());
    TickOutcome::Sent {
        handler_id,
        samples: count,
    }
}

// ---------------------------------------------------------------------------
// StreamingScheduler
// ---------------------------------------------------------------------------

/// Owner of the (single) send timer.
pub struct StreamingScheduler {
    buffer: SampleBuffer,
    transport: Arc<dyn Transport>,
    source_rate: Arc<AtomicU32>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingScheduler {
    pub fn new(buffer: SampleBuffer, transport: Arc<dyn Transport>, interval: Duration) -> Self {
        let interval = if interval < MIN_SEND_INTERVAL {
            log::warn!(
                "stream: send interval {interval:?} too short, using {MIN_SEND_INTERVAL:?}"
            );
            MIN_SEND_INTERVAL
        } else {
            interval
        };
        Self {
            buffer,
            transport,
            source_rate: Arc::new(AtomicU32::new(TARGET_SAMPLE_RATE)),
            interval,
            task: Mutex::new(None),
        }
    }

    /// Record the rate the capture tier delivers.  Picked up on the next tick.
    pub fn set_source_rate(&self, rate: u32) {
        self.source_rate.store(rate, Ordering::Relaxed);
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate.load(Ordering::Relaxed)
    }

    /// Start the send timer, replacing any running one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_sending(&self, handler_id: HandlerIdProvider) {
        let mut task = self.lock_task();
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let buffer = self.buffer.clone();
        let transport = Arc::clone(&self.transport);
        let source_rate = Arc::clone(&self.source_rate);
        let period = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                send_buffered(
                    &buffer,
                    source_rate.load(Ordering::Relaxed),
                    handler_id(),
                    transport.as_ref(),
                );
            }
        }));
        log::debug!("stream: sending every {} ms", period.as_millis());
    }

    /// Cancel the send timer.  No-op when not sending.
    pub fn stop_sending(&self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
            log::debug!("stream: stopped");
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.lock_task().as_ref().is_some_and(|t| !t.is_finished())
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StreamingScheduler {
    fn drop(&mut self) {
        self.stop_sending();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

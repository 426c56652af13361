//! Platform audio backends.
//!
//! [`AudioBackend`] hands out [`InputDevice`]s; an input device installs one
//! [`CaptureTier`] at a time and feeds every captured chunk to a
//! [`ChunkSink`].  [`CpalBackend`] is the production implementation.
//!
//! The cpal stream is `!Send` on some platforms, so [`CpalInput`] builds and
//! owns it on a dedicated `audio-capture` thread and only keeps a stop channel
//! and the join handle.  That keeps the device handle `Send`.
//!
//! The legacy tier forwards raw callback blocks to an `audio-processor`
//! thread that re-chunks them to [`LEGACY_CHUNK_SAMPLES`].  Disabling the
//! track sends a reset that drops any partial chunk, and disconnecting joins
//! the processor so every queued block has reached the sink on return.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};

use super::capture::{CaptureConstraints, CaptureTier, DeviceError, TierError};
use super::resample::stereo_to_mono;

/// Fixed chunk size produced by the legacy processing tier.
pub const LEGACY_CHUNK_SAMPLES: usize = 2048;

/// Destination for captured mono chunks.
pub type ChunkSink = Arc<dyn Fn(Vec<f32>) + Send + Sync>;

/// Format actually delivered by an installed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Source of input devices.
pub trait AudioBackend: Send + Sync {
    /// Open the device selected by `constraints`.
    fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn InputDevice>, DeviceError>;
}

/// An acquired microphone.
pub trait InputDevice: Send {
    fn name(&self) -> &str;

    /// Build the processing path for `tier` and start delivering chunks.
    fn install(&mut self, tier: CaptureTier, sink: ChunkSink) -> Result<TierInfo, TierError>;

    /// Track enable flag; chunks captured while disabled are discarded.
    fn set_enabled(&self, enabled: bool);

    /// Tear down the installed processing path.  Idempotent.
    fn disconnect(&mut self);

    /// Release the device itself.  Idempotent.
    fn release(&mut self);
}

// ---------------------------------------------------------------------------
// CpalBackend
// ---------------------------------------------------------------------------

/// Backend over the cpal default host.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn InputDevice>, DeviceError> {
        let host = cpal::default_host();
        let device = find_input_device(&host, constraints.device.as_deref())?;
        let name = device.name().unwrap_or_else(|_| "unknown".into());

        // Fails early when the OS refuses access to the device.
        device.default_input_config()?;

        let enhancements = constraints.requested_enhancements();
        if !enhancements.is_empty() {
            log::debug!("mic: host {:?} ignores enhancements {enhancements:?}", host.id());
        }

        Ok(Box::new(CpalInput {
            name,
            requested: constraints.device.clone(),
            preferred_rate: constraints.sample_rate,
            enabled: Arc::new(AtomicBool::new(true)),
            worker: None,
            released: false,
        }))
    }
}

fn find_input_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, DeviceError> {
    match name {
        None => host.default_input_device().ok_or(DeviceError::NoDevice),
        Some(wanted) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or(DeviceError::NoDevice),
    }
}

struct CaptureWorker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// A cpal input device.  The stream lives on the `audio-capture` thread.
pub struct CpalInput {
    name: String,
    requested: Option<String>,
    preferred_rate: u32,
    enabled: Arc<AtomicBool>,
    worker: Option<CaptureWorker>,
    released: bool,
}

impl InputDevice for CpalInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn install(&mut self, tier: CaptureTier, sink: ChunkSink) -> Result<TierInfo, TierError> {
        self.disconnect();

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<TierInfo, TierError>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let requested = self.requested.clone();
        let preferred_rate = self.preferred_rate;
        let enabled = Arc::clone(&self.enabled);

        let handle = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let built =
                    build_tier_stream(tier, requested.as_deref(), preferred_rate, enabled, sink);
                let tier_stream = match built {
                    Ok(tier_stream) => {
                        let _ = ready_tx.send(Ok(tier_stream.info));
                        tier_stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Blocks until a stop is sent or the sender is dropped.
                let _ = stop_rx.recv();
                tier_stream.close();
            })
            .map_err(|e| TierError::Unsupported(format!("cannot spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(info)) => {
                self.worker = Some(CaptureWorker { stop_tx, handle });
                Ok(info)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(TierError::WorkerExited)
            }
        }
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn disconnect(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.handle.join().is_err() {
                log::warn!("mic: capture thread panicked during shutdown");
            }
        }
    }

    fn release(&mut self) {
        self.disconnect();
        if !self.released {
            self.released = true;
            self.enabled.store(false, Ordering::Relaxed);
        }
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.release();
    }
}

/// A running tier: the cpal stream plus, for the legacy tier, its processing
/// thread.
struct TierStream {
    stream: cpal::Stream,
    info: TierInfo,
    processor: Option<JoinHandle<()>>,
}

impl TierStream {
    /// Stop the device callback, then wait for the processor to flush what
    /// was already queued.  Nothing reaches the sink after this returns.
    fn close(self) {
        drop(self.stream);
        if let Some(processor) = self.processor {
            if processor.join().is_err() {
                log::warn!("mic: audio processor thread panicked");
            }
        }
    }
}

fn build_tier_stream(
    tier: CaptureTier,
    requested: Option<&str>,
    preferred_rate: u32,
    enabled: Arc<AtomicBool>,
    sink: ChunkSink,
) -> Result<TierStream, TierError> {
    let host = cpal::default_host();
    let device = find_input_device(&host, requested)
        .map_err(|e| TierError::Unsupported(e.to_string()))?;

    let tier_stream = match tier {
        CaptureTier::Worklet => build_worklet(&device, preferred_rate, enabled, sink)?,
        CaptureTier::LegacyProcessor => build_legacy(&device, enabled, sink)?,
    };
    if let Err(e) = tier_stream.stream.play() {
        tier_stream.close();
        return Err(e.into());
    }
    Ok(tier_stream)
}

/// Mono `f32` stream, preferring `preferred_rate`; chunks go straight to the
/// sink from the audio thread.
fn build_worklet(
    device: &cpal::Device,
    preferred_rate: u32,
    enabled: Arc<AtomicBool>,
    sink: ChunkSink,
) -> Result<TierStream, TierError> {
    let mono: Vec<_> = device
        .supported_input_configs()?
        .filter(|range| {
            range.channels() == 1 && range.sample_format() == cpal::SampleFormat::F32
        })
        .collect();

    let preferred = cpal::SampleRate(preferred_rate);
    let chosen = mono
        .iter()
        .find(|r| r.min_sample_rate() <= preferred && preferred <= r.max_sample_rate())
        .map(|r| r.clone().with_sample_rate(preferred))
        .or_else(|| mono.first().map(|r| r.clone().with_max_sample_rate()))
        .ok_or_else(|| TierError::Unsupported("no mono f32 input configuration".into()))?;

    let config: cpal::StreamConfig = chosen.into();
    let info = TierInfo {
        sample_rate: config.sample_rate.0,
        channels: 1,
    };

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if enabled.load(Ordering::Relaxed) {
                sink(data.to_vec());
            }
        },
        |err: cpal::StreamError| log::error!("mic: stream error: {err}"),
        None,
    )?;
    Ok(TierStream {
        stream,
        info,
        processor: None,
    })
}

/// Device-default stream of any format; raw buffers are handed to a
/// processing thread that downmixes and emits fixed-size chunks.
fn build_legacy(
    device: &cpal::Device,
    enabled: Arc<AtomicBool>,
    sink: ChunkSink,
) -> Result<TierStream, TierError> {
    let supported = device.default_input_config()?;
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels;
    let info = TierInfo {
        sample_rate: config.sample_rate.0,
        channels: 1,
    };

    let (raw_tx, raw_rx) = mpsc::channel::<RawBlock>();
    let processor = std::thread::Builder::new()
        .name("audio-processor".into())
        .spawn(move || run_processor(raw_rx, channels, sink))
        .map_err(|e| TierError::Unsupported(format!("cannot spawn processor thread: {e}")))?;

    let built = match format {
        cpal::SampleFormat::F32 => forwarding_stream::<f32>(device, &config, enabled, raw_tx),
        cpal::SampleFormat::I16 => forwarding_stream::<i16>(device, &config, enabled, raw_tx),
        cpal::SampleFormat::U16 => forwarding_stream::<u16>(device, &config, enabled, raw_tx),
        other => {
            drop(raw_tx);
            Err(TierError::Unsupported(format!("sample format {other:?}")))
        }
    };

    match built {
        Ok(stream) => Ok(TierStream {
            stream,
            info,
            processor: Some(processor),
        }),
        Err(e) => {
            // The sender is gone, so the processor is already on its way out.
            let _ = processor.join();
            Err(e)
        }
    }
}

fn forwarding_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    enabled: Arc<AtomicBool>,
    raw_tx: mpsc::Sender<RawBlock>,
) -> Result<cpal::Stream, TierError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut was_enabled = true;
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            // Receiver gone means the processor thread already stopped.
            if enabled.load(Ordering::Relaxed) {
                was_enabled = true;
                let samples = data.iter().map(|&s| f32::from_sample(s)).collect();
                let _ = raw_tx.send(RawBlock::Samples(samples));
            } else if was_enabled {
                was_enabled = false;
                let _ = raw_tx.send(RawBlock::Reset);
            }
        },
        |err: cpal::StreamError| log::error!("mic: stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

// ---------------------------------------------------------------------------
// Legacy processing
// ---------------------------------------------------------------------------

/// Message from the legacy stream callback to its processing thread.
#[derive(Debug, Clone, PartialEq)]
enum RawBlock {
    /// Interleaved samples, already converted to `f32`.
    Samples(Vec<f32>),
    /// The track was disabled; forget any partial chunk.
    Reset,
}

/// Downmixes interleaved blocks and cuts them into fixed-size mono chunks.
/// A partial tail is held until enough samples arrive.
#[derive(Debug)]
struct Rechunker {
    chunk_len: usize,
    pending: Vec<f32>,
}

impl Rechunker {
    fn new(chunk_len: usize) -> Self {
        Self {
            chunk_len,
            pending: Vec::with_capacity(chunk_len * 2),
        }
    }

    fn push(&mut self, raw: &[f32], channels: u16) -> Vec<Vec<f32>> {
        self.pending.extend(stereo_to_mono(raw, channels));
        let mut chunks = Vec::new();
        while self.pending.len() >= self.chunk_len {
            chunks.push(self.pending.drain(..self.chunk_len).collect());
        }
        chunks
    }

    fn clear(&mut self) {
        self.pending.clear();
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Body of the `audio-processor` thread.  Returns once the sender is dropped
/// and every queued block has been handled.
fn run_processor(rx: mpsc::Receiver<RawBlock>, channels: u16, sink: ChunkSink) {
    let mut rechunker = Rechunker::new(LEGACY_CHUNK_SAMPLES);
    while let Ok(block) = rx.recv() {
        match block {
            RawBlock::Samples(raw) => {
                for chunk in rechunker.push(&raw, channels) {
                    sink(chunk);
                }
            }
            RawBlock::Reset => rechunker.clear(),
        }
    }
}

// ---------------------------------------------------------------------------
// MockBackend  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockBackend;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Microphone capture engine.
//!
//! [`CaptureEngine`] owns the single live capture session: one device handle,
//! one installed processing path ("tier") and the [`SampleBuffer`] the tier
//! feeds.  Starting a new session always tears the previous one down first.
//!
//! # Tiers
//!
//! ```text
//! Worklet          mono stream, chunks pushed straight from the audio thread
//!   │ install fails
//!   ▼
//! LegacyProcessor  device-default stream → processing thread → 2048-sample
//!                  mono chunks
//! ```
//!
//! Both tiers end in the same [`SampleBuffer::push`], so the streaming
//! scheduler never knows which one is running.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::buffer::SampleBuffer;
use super::device::{AudioBackend, ChunkSink, InputDevice};
use super::resample::TARGET_SAMPLE_RATE;
use crate::config::MicrophoneConfig;

// ---------------------------------------------------------------------------
// DeviceError / TierError
// ---------------------------------------------------------------------------

/// Failure to start a capture session.  Surfaced once; never retried.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no audio input device available")]
    NoDevice,

    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("no capture tier could be installed: {0}")]
    Unsatisfiable(String),

    #[error("audio backend error: {0}")]
    Backend(String),
}

impl DeviceError {
    /// Classify a free-form backend message.  Hosts report permission
    /// failures as backend-specific errors.
    pub fn from_backend(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("permission") || lower.contains("not authorized") {
            Self::PermissionDenied(message)
        } else {
            Self::Backend(message)
        }
    }
}

impl From<cpal::DefaultStreamConfigError> for DeviceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => Self::NoDevice,
            cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
                Self::Unsatisfiable("device does not support input streams".into())
            }
            other => Self::from_backend(other.to_string()),
        }
    }
}

impl From<cpal::DevicesError> for DeviceError {
    fn from(err: cpal::DevicesError) -> Self {
        Self::from_backend(err.to_string())
    }
}

/// Failure to install one capture tier.  Never reaches the caller directly:
/// the engine falls back to the next tier and only reports
/// [`DeviceError::Unsatisfiable`] when every tier fails.
#[derive(Debug, Error)]
pub enum TierError {
    #[error("{0}")]
    Unsupported(String),

    #[error("failed to query stream configs: {0}")]
    Configs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to query default config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("capture worker exited before reporting readiness")]
    WorkerExited,
}

// ---------------------------------------------------------------------------
// CaptureTier
// ---------------------------------------------------------------------------

/// Processing path used to get raw chunks out of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTier {
    /// Mono stream whose audio-thread callback pushes chunks directly.
    Worklet,
    /// Device-default stream forwarded to a processing thread that downmixes
    /// and re-chunks.  Used only when `Worklet` cannot be installed.
    LegacyProcessor,
}

impl CaptureTier {
    /// Installation order.
    pub const PREFERENCE: [CaptureTier; 2] = [CaptureTier::Worklet, CaptureTier::LegacyProcessor];

    pub fn label(&self) -> &'static str {
        match self {
            CaptureTier::Worklet => "worklet",
            CaptureTier::LegacyProcessor => "legacy processor",
        }
    }
}

impl fmt::Display for CaptureTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// CaptureConstraints / CaptureSettings
// ---------------------------------------------------------------------------

/// What the engine asks the platform for.  Everything except the device
/// itself is best effort.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConstraints {
    pub sample_rate: u32,
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub voice_isolation: bool,
    /// Input device name; `None` selects the host default.
    pub device: Option<String>,
}

impl CaptureConstraints {
    pub fn from_config(config: &MicrophoneConfig) -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            channels: 1,
            echo_cancellation: config.echo_cancellation,
            noise_suppression: config.noise_suppression,
            auto_gain_control: config.auto_gain_control,
            voice_isolation: config.voice_isolation,
            device: config.device.clone(),
        }
    }

    /// Names of the enhancement toggles that are switched on.
    pub fn requested_enhancements(&self) -> Vec<&'static str> {
        [
            ("echo_cancellation", self.echo_cancellation),
            ("noise_suppression", self.noise_suppression),
            ("auto_gain_control", self.auto_gain_control),
            ("voice_isolation", self.voice_isolation),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self::from_config(&MicrophoneConfig::default())
    }
}

/// Settings in effect once a session is running.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureSettings {
    pub device: String,
    pub tier: CaptureTier,
    /// Rate the tier actually delivers; drives resampling decisions.
    pub sample_rate: u32,
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub voice_isolation: bool,
}

// ---------------------------------------------------------------------------
// CaptureEngine
// ---------------------------------------------------------------------------

struct ActiveCapture {
    device: Box<dyn InputDevice>,
    settings: CaptureSettings,
}

/// Owner of the live capture session.
pub struct CaptureEngine {
    backend: Arc<dyn AudioBackend>,
    buffer: SampleBuffer,
    active: Option<ActiveCapture>,
}

impl CaptureEngine {
    pub fn new(backend: Arc<dyn AudioBackend>, buffer: SampleBuffer) -> Self {
        Self {
            backend,
            buffer,
            active: None,
        }
    }

    /// Acquire the device and install the first tier that works.
    ///
    /// Any running session is stopped first.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`DeviceError`] when acquisition fails, or
    /// [`DeviceError::Unsatisfiable`] when neither tier can be installed.
    pub fn start(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<CaptureSettings, DeviceError> {
        self.stop();

        let mut device = self.backend.acquire(constraints)?;
        log::debug!(
            "mic: acquired '{}' (requested {} Hz, {} ch, enhancements {:?})",
            device.name(),
            constraints.sample_rate,
            constraints.channels,
            constraints.requested_enhancements()
        );

        let buffer = self.buffer.clone();
        let sink: ChunkSink = Arc::new(move |chunk| buffer.push(chunk));

        let mut failures = Vec::new();
        for tier in CaptureTier::PREFERENCE {
            match device.install(tier, Arc::clone(&sink)) {
                Ok(info) => {
                    let settings = CaptureSettings {
                        device: device.name().to_string(),
                        tier,
                        sample_rate: info.sample_rate,
                        channels: info.channels,
                        echo_cancellation: constraints.echo_cancellation,
                        noise_suppression: constraints.noise_suppression,
                        auto_gain_control: constraints.auto_gain_control,
                        voice_isolation: constraints.voice_isolation,
                    };
                    log::info!("mic: capture via {tier} at {} Hz", info.sample_rate);
                    self.active = Some(ActiveCapture {
                        device,
                        settings: settings.clone(),
                    });
                    return Ok(settings);
                }
                Err(e) => {
                    log::info!("mic: {tier} unavailable ({e})");
                    device.disconnect();
                    failures.push(format!("{tier}: {e}"));
                }
            }
        }

        device.release();
        Err(DeviceError::Unsatisfiable(failures.join("; ")))
    }

    /// Disconnect the graph, release the device and drop buffered samples.
    /// No-op when nothing is running.
    pub fn stop(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.device.disconnect();
            active.device.release();
            log::debug!("mic: released '{}'", active.settings.device);
        }
        self.buffer.clear();
    }

    /// Disable the captured track without touching the device or graph.
    pub fn pause(&self) {
        if let Some(active) = &self.active {
            active.device.set_enabled(false);
        }
    }

    /// Re-enable the captured track.
    pub fn resume(&self) {
        if let Some(active) = &self.active {
            active.device.set_enabled(true);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn settings(&self) -> Option<&CaptureSettings> {
        self.active.as_ref().map(|a| &a.settings)
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::MockBackend;

    fn engine(backend: &MockBackend) -> CaptureEngine {
        CaptureEngine::new(Arc::new(backend.clone()), SampleBuffer::new())
    }

    #[test]
    fn worklet_is_preferred() {
        let backend = MockBackend::new(48_000);
        let mut engine = engine(&backend);

        let settings = engine.start(&CaptureConstraints::default()).expect("start");
        assert_eq!(settings.tier, CaptureTier::Worklet);
        assert_eq!(settings.sample_rate, 48_000);
        assert!(engine.is_active());
    }

    #[test]
    fn worklet_failure_falls_back_to_legacy_processor() {
        let backend = MockBackend::new(44_100);
        backend.fail_tier(CaptureTier::Worklet);
        let mut engine = engine(&backend);

        let settings = engine.start(&CaptureConstraints::default()).expect("start");
        assert_eq!(settings.tier, CaptureTier::LegacyProcessor);
        assert_eq!(backend.live_handles(), 1);
    }

    #[test]
    fn both_tiers_failing_is_unsatisfiable_and_releases_device() {
        let backend = MockBackend::new(16_000);
        backend.fail_tier(CaptureTier::Worklet);
        backend.fail_tier(CaptureTier::LegacyProcessor);
        let mut engine = engine(&backend);

        let err = engine.start(&CaptureConstraints::default()).unwrap_err();
        assert!(matches!(err, DeviceError::Unsatisfiable(_)), "{err}");
        assert_eq!(backend.live_handles(), 0);
        assert!(!engine.is_active());
    }

    #[test]
    fn acquisition_failure_is_surfaced() {
        let backend = MockBackend::new(16_000);
        backend.fail_acquire();
        let mut engine = engine(&backend);

        let err = engine.start(&CaptureConstraints::default()).unwrap_err();
        assert!(matches!(err, DeviceError::PermissionDenied(_)), "{err}");
        assert_eq!(backend.acquisitions(), 1);
    }

    #[test]
    fn captured_chunks_reach_the_buffer() {
        let backend = MockBackend::new(16_000);
        let mut engine = engine(&backend);
        engine.start(&CaptureConstraints::default()).expect("start");

        backend.emit(vec![0.1; 128]);
        backend.emit(vec![0.2; 128]);
        assert_eq!(engine.buffer().chunk_count(), 2);
    }

    #[test]
    fn pause_disables_track_without_releasing_device() {
        let backend = MockBackend::new(16_000);
        let mut engine = engine(&backend);
        engine.start(&CaptureConstraints::default()).expect("start");

        engine.pause();
        backend.emit(vec![0.1; 128]);
        assert!(engine.buffer().is_empty());
        assert_eq!(backend.live_handles(), 1);

        engine.resume();
        backend.emit(vec![0.1; 128]);
        assert_eq!(engine.buffer().chunk_count(), 1);
        assert_eq!(backend.acquisitions(), 1);
    }

    #[test]
    fn stop_is_idempotent_and_clears_buffer() {
        let backend = MockBackend::new(16_000);
        let mut engine = engine(&backend);
        engine.stop();

        engine.start(&CaptureConstraints::default()).expect("start");
        backend.emit(vec![0.3; 64]);
        engine.stop();
        engine.stop();

        assert!(engine.buffer().is_empty());
        assert_eq!(backend.live_handles(), 0);
        assert_eq!(backend.releases(), 1);
    }

    #[test]
    fn teardown_disconnects_graph_before_releasing_device() {
        let backend = MockBackend::new(16_000);
        let mut engine = engine(&backend);
        engine.start(&CaptureConstraints::default()).expect("start");
        engine.stop();

        let events = backend.events();
        let disconnect = events.iter().position(|e| e == "disconnect").expect("disconnect");
        let release = events.iter().position(|e| e == "release").expect("release");
        assert!(disconnect < release, "{events:?}");
    }

    #[test]
    fn restarting_never_overlaps_device_handles() {
        let backend = MockBackend::new(48_000);
        let mut engine = engine(&backend);

        for _ in 0..5 {
            engine.start(&CaptureConstraints::default()).expect("start");
            assert_eq!(backend.live_handles(), 1);
            assert_eq!(backend.max_live_handles(), 1);
        }
        engine.stop();
        assert_eq!(backend.live_handles(), 0);
        assert_eq!(backend.acquisitions(), 5);
    }

    #[test]
    fn constraints_follow_config() {
        let config = MicrophoneConfig {
            echo_cancellation: false,
            noise_suppression: true,
            auto_gain_control: false,
            voice_isolation: true,
            device: Some("USB Mic".into()),
        };
        let c = CaptureConstraints::from_config(&config);
        assert_eq!(c.sample_rate, 16_000);
        assert_eq!(c.channels, 1);
        assert_eq!(c.device.as_deref(), Some("USB Mic"));
        assert_eq!(c.requested_enhancements(), vec!["noise_suppression", "voice_isolation"]);
    }

    #[test]
    fn permission_messages_are_classified() {
        assert!(matches!(
            DeviceError::from_backend("Permission denied by user"),
            DeviceError::PermissionDenied(_)
        ));
        assert!(matches!(
            DeviceError::from_backend("ALSA function failed"),
            DeviceError::Backend(_)
        ));
    }

    #[test]
    fn settings_serialise_for_debug_dump() {
        let backend = MockBackend::new(44_100);
        let mut engine = engine(&backend);
        let settings = engine.start(&CaptureConstraints::default()).expect("start");

        let json = serde_json::to_value(&settings).expect("json");
        assert_eq!(json["tier"], "worklet");
        assert_eq!(json["sample_rate"], 44_100);
    }
}

//! Audio pipeline: microphone capture → buffer → resample → PCM → frame.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → InputDevice tier callback → SampleBuffer (push)
//!           ⇢ StreamingScheduler tick (every 100 ms)
//!               → take chunks → resample to 16 kHz → s16le → OutboundFrame
//!               → Transport::send (only while open)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_satellite::audio::{AudioManager, CaptureConstraints, CpalBackend, SEND_INTERVAL};
//! use voice_satellite::transport::WebSocketTransport;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let transport = Arc::new(WebSocketTransport::connect("ws://127.0.0.1:10700").await?);
//! let audio = AudioManager::new(Arc::new(CpalBackend), transport, SEND_INTERVAL);
//! audio.start_microphone(&CaptureConstraints::default())?;
//! audio.start_sending(|| Some(1));
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod capture;
pub mod device;
pub mod frame;
pub mod manager;
pub mod pcm;
pub mod resample;
pub mod stream;

pub use buffer::SampleBuffer;
pub use capture::{
    CaptureConstraints, CaptureEngine, CaptureSettings, CaptureTier, DeviceError, TierError,
};
pub use device::{AudioBackend, ChunkSink, CpalBackend, InputDevice, TierInfo};
pub use frame::OutboundFrame;
pub use manager::AudioManager;
pub use pcm::{encode_pcm16, float_to_pcm16, write_pcm16_le};
pub use resample::{resample, resample_to_16k, stereo_to_mono, TARGET_SAMPLE_RATE};
pub use stream::{
    send_buffered, HandlerIdProvider, StreamingScheduler, TickOutcome, MIN_SEND_INTERVAL,
    SEND_INTERVAL,
};

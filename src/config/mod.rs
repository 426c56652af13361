//! Configuration module for the voice satellite.
//!
//! Provides `AppConfig` (top-level settings), its per-subsystem sections, and
//! `AppPaths` for the platform config directory.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, MicrophoneConfig, SessionConfig, StreamingConfig, TransportConfig};

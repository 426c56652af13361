//! Satellite settings structs, defaults and TOML loading.
//!
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it wants to change.  The client never writes the file back.

use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// MicrophoneConfig
// ---------------------------------------------------------------------------

/// Capture constraints.  The enhancement toggles are best effort; hosts that
/// do not support one ignore it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrophoneConfig {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub voice_isolation: bool,
    /// Input device name; `None` means the system default.
    pub device: Option<String>,
}

impl Default for MicrophoneConfig {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            voice_isolation: false,
            device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Period of the send timer in milliseconds.
    pub send_interval_ms: u64,
}

impl StreamingConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long the surface must stay hidden before the mic is paused.
    pub hide_debounce_ms: u64,
}

impl SessionConfig {
    pub fn hide_debounce(&self) -> Duration {
        Duration::from_millis(self.hide_debounce_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hide_debounce_ms: 500,
        }
    }
}

// ---------------------------------------------------------------------------
// TransportConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// WebSocket endpoint of the voice server.
    pub url: String,
    /// Binary handler id audio frames are tagged with.  `None` keeps the
    /// satellite connected but silent.
    pub handler_id: Option<u8>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:10700/satellite".into(),
            handler_id: Some(1),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, read from `settings.toml`.
///
/// ```rust,no_run
/// use voice_satellite::config::AppConfig;
///
/// // Returns Default when the file is missing.
/// let config = AppConfig::load().unwrap();
/// assert_eq!(config.streaming.send_interval_ms, 100);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Verbose diagnostic logging.
    pub debug: bool,
    pub microphone: MicrophoneConfig,
    pub streaming: StreamingConfig,
    pub session: SessionConfig,
    pub transport: TransportConfig,
}

impl AppConfig {
    /// Load from the platform-appropriate `settings.toml`.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.  A missing file yields the defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        Ok(config)
    }

    /// Reject values that parse but cannot drive the satellite.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.streaming.send_interval_ms > 0,
            "streaming.send_interval_ms must be at least 1"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Tunable configuration for playback and capture
//!
//! Defaults reproduce the production behaviour exactly: 100ms target latency,
//! 60ms audio lead trim, 120ms staleness, 220ms span ceiling and a 750ms / depth-10
//! stall bypass. Both structs load from YAML and fall back to defaults for any
//! field that is not given.
//!
//! ```rust
//! use avsync::PlayoutConfig;
//!
//! let config = PlayoutConfig::from_yaml_str("target_latency_us: 80000").unwrap();
//! assert_eq!(config.target_latency_us, 80_000);
//! assert_eq!(config.audio.lead_trim_us, 60_000);
//! ```

use serde::{Deserialize, Serialize};

use super::Codec;
use crate::{MediaError, Result};

/// Backpressure and gating thresholds of one playout queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(default)]
pub struct QueuePolicy {
    /// Margin subtracted from the clock's playable bound
    pub lead_trim_us: u64,
    /// Heads further than this behind the playable bound are dropped
    pub staleness_us: u64,
    /// Maximum buffered span between the oldest and newest timed unit
    pub span_ceiling_us: u64,
    /// How long the head may stay gated before the bypass kicks in
    pub stall_threshold_us: u64,
    /// Minimum queue depth for the bypass to apply
    pub stall_depth: usize,
    /// Units released per drain call
    pub max_drain_per_call: usize,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            lead_trim_us: 0,
            staleness_us: 120_000,
            span_ceiling_us: 220_000,
            stall_threshold_us: 750_000,
            stall_depth: 10,
            max_drain_per_call: 16,
        }
    }
}

impl QueuePolicy {
    /// Audio defaults: gate 60ms early to cover output callback latency.
    pub fn audio() -> Self {
        Self { lead_trim_us: 60_000, ..Self::default() }
    }

    /// Video defaults: no lead trim, smaller per-tick budget.
    pub fn video() -> Self {
        Self { max_drain_per_call: 8, ..Self::default() }
    }

    pub fn validate(&self, stream: &str) -> Result<()> {
        if self.span_ceiling_us == 0 {
            return Err(MediaError::config(format!("{stream}: span_ceiling_us must be > 0")));
        }
        if self.staleness_us == 0 {
            return Err(MediaError::config(format!("{stream}: staleness_us must be > 0")));
        }
        if self.stall_depth == 0 {
            return Err(MediaError::config(format!("{stream}: stall_depth must be > 0")));
        }
        if self.max_drain_per_call == 0 {
            return Err(MediaError::config(format!("{stream}: max_drain_per_call must be > 0")));
        }
        Ok(())
    }
}

fn default_audio_policy() -> QueuePolicy {
    QueuePolicy::audio()
}

fn default_video_policy() -> QueuePolicy {
    QueuePolicy::video()
}

/// Receive-side configuration.
///
/// A `audio:` or `video:` section given in YAML replaces that stream's policy;
/// fields missing from the section take [`QueuePolicy::default`] values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(default)]
pub struct PlayoutConfig {
    /// Intentional buffering delay added to the playable bound
    pub target_latency_us: u64,
    /// Video decode timer period
    pub video_poll_interval_ms: u64,
    /// Expected video frame rate, used for pacing subscriptions
    pub video_frame_rate: f64,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    #[serde(default = "default_audio_policy")]
    pub audio: QueuePolicy,
    #[serde(default = "default_video_policy")]
    pub video: QueuePolicy,
}

impl Default for PlayoutConfig {
    fn default() -> Self {
        Self {
            target_latency_us: 100_000,
            video_poll_interval_ms: 5,
            video_frame_rate: 30.0,
            audio_sample_rate: 48_000,
            audio_channels: 1,
            audio: QueuePolicy::audio(),
            video: QueuePolicy::video(),
        }
    }
}

impl PlayoutConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_latency_us > 10_000_000 {
            return Err(MediaError::config("target_latency_us must not exceed 10s"));
        }
        if self.video_poll_interval_ms == 0 {
            return Err(MediaError::config("video_poll_interval_ms must be > 0"));
        }
        if self.video_frame_rate.is_nan() || self.video_frame_rate <= 0.0 {
            return Err(MediaError::config("video_frame_rate must be > 0"));
        }
        if self.audio_sample_rate == 0 {
            return Err(MediaError::config("audio_sample_rate must be > 0"));
        }
        if !(1..=8).contains(&self.audio_channels) {
            return Err(MediaError::config("audio_channels must be between 1 and 8"));
        }
        self.audio.validate("audio")?;
        self.video.validate("video")
    }
}

/// Send-side configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(default)]
pub struct CaptureConfig {
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    /// PCM frames accumulated before each encoder call
    pub audio_chunk_frames: usize,
    pub audio_codec: Codec,
    pub initial_bitrate_bps: u32,
    pub expected_frame_rate: u32,
    /// Buffered units per outbound channel before the oldest sender waits
    pub event_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            audio_sample_rate: 48_000,
            audio_channels: 1,
            audio_chunk_frames: 960,
            audio_codec: Codec::Opus,
            initial_bitrate_bps: 2_000_000,
            expected_frame_rate: 30,
            event_capacity: 256,
        }
    }
}

impl CaptureConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio_sample_rate == 0 {
            return Err(MediaError::config("audio_sample_rate must be > 0"));
        }
        if !(1..=8).contains(&self.audio_channels) {
            return Err(MediaError::config("audio_channels must be between 1 and 8"));
        }
        if self.audio_chunk_frames == 0 {
            return Err(MediaError::config("audio_chunk_frames must be > 0"));
        }
        if !self.audio_codec.is_audio() {
            return Err(MediaError::config(format!("{} is not an audio codec", self.audio_codec)));
        }
        if self.initial_bitrate_bps == 0 {
            return Err(MediaError::config("initial_bitrate_bps must be > 0"));
        }
        if self.event_capacity == 0 {
            return Err(MediaError::config("event_capacity must be > 0"));
        }
        Ok(())
    }
}

//! Real-time HEVC + Opus media pipeline core.
//!
//! avsync holds the parts of a peer-to-peer A/V chat pipeline that carry
//! the timing logic. The platform codecs, capture devices and the transport
//! stay outside and plug in through traits.
//!
//! # Features
//!
//! - **Bitstream framing**: Annex-B split/assemble, length-prefixed conversion,
//!   HEVC parameter-set tracking and Opus TOC duration inference
//! - **Lip sync**: one monotonic clock anchored by the first playable unit,
//!   shared by the audio and video playout queues
//! - **Backpressure**: stale-drop, span trimming and a stall bypass keep
//!   latency bounded under bursty arrival
//! - **Drivers**: timer-driven video decode, real-time pull audio render, and a
//!   cancellable capture/encode task
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use avsync::{EncodedUnit, PlayoutConfig, SyncClock};
//! use avsync::queue::{AnchorRule, PlayoutQueue};
//!
//! let config = PlayoutConfig::default();
//! let clock = Arc::new(SyncClock::new(config.target_latency_us));
//! let mut queue = PlayoutQueue::new("video", config.video, AnchorRule::KeyframeOnly);
//!
//! queue.insert(EncodedUnit::video(vec![0, 0, 0, 1, 0x26, 0x01], 1_000_000, true));
//! let ready = queue.drain(&clock);
//! assert_eq!(ready.len(), 1);
//! assert!(clock.is_anchored());
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

// Bitstream and timing
pub mod bitstream;
pub mod clock;
pub mod queue;
pub mod stream;

// Drivers and boundaries
pub mod bridge;
pub mod capture;
pub mod codec;
pub mod debug_log;
pub mod playback;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use bridge::{MediaBackends, MediaBridge, TextureHandle};
pub use capture::{CaptureController, CaptureEvents};
pub use clock::SyncClock;
pub use debug_log::DebugLog;
pub use playback::{AudioPlayer, VideoPlayer};

//! Receive-side decode/render drivers
//!
//! - [`VideoPlayer`]: queues Annex-B access units, decodes on a ~5ms timer and
//!   publishes only the latest decoded image
//! - [`AudioPlayer`]: decodes packets on arrival and serves a real-time pull
//!   callback from the decoded PCM queue
//!
//! Both players gate their queues with the same [`SyncClock`](crate::clock::SyncClock).

mod audio;
mod video;

pub use audio::{AAC_FRAMES_PER_PACKET, AudioPlayer, DEFAULT_OPUS_FRAMES, packet_frames};
pub use video::VideoPlayer;

use serde::Serialize;

use crate::queue::QueueStats;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct VideoStats {
    pub queue: QueueStats,
    /// Samples accepted by the decoder session
    pub submitted: u64,
    pub decode_failures: u64,
    pub session_rebuilds: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct AudioStats {
    pub queue: QueueStats,
    /// Decoded audio still waiting to be played
    pub buffered_us: u64,
    /// Frames zero-filled while the clock was running
    pub underrun_frames: u64,
    /// Callbacks that found the queue locked and output silence
    pub contended_callbacks: u64,
    pub decode_failures: u64,
    pub dropped_while_suspended: u64,
}

//! Core data model shared by capture and playback.
//!
//! - [`EncodedUnit`] is one framed packet with its codec, PTS and payload
//! - [`Codec`] carries the wire-level identifier of each stream
//! - [`VideoFrame`] and [`PcmChunk`] are what the external codec sessions hand back
//! - [`PlayoutConfig`], [`QueuePolicy`] and [`CaptureConfig`] hold the tunables
//!
//! All timestamps are microseconds. A PTS of 0 marks an untimed unit that is
//! played immediately and never gated by the synchronization clock.

mod codec;
mod config;
mod frame;
mod unit;
mod update_rate;

pub use codec::Codec;
pub use config::{CaptureConfig, PlayoutConfig, QueuePolicy};
pub use frame::{PcmChunk, VideoFrame};
pub use unit::{EncodedUnit, UnitTiming, frames_to_us, pts_from_wire, us_to_frames};
pub use update_rate::UpdateRate;

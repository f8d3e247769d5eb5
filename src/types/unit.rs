//! Encoded unit: the packet that crosses the transport boundary

use bytes::Bytes;

use super::Codec;

/// Per-kind timing metadata of an [`EncodedUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitTiming {
    /// Video access unit; keyframes carry VPS/SPS/PPS in front of the slices.
    Video { is_keyframe: bool },
    /// Audio packet with its compressed-domain duration hint (0 = unknown).
    Audio { frames_per_packet: u32 },
}

/// One framed packet.
///
/// Immutable once created. `pts_us == 0` means "no timing, play immediately".
/// The payload is reference counted so moving a unit between capture, transport
/// and playout queue never copies the bitstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUnit {
    codec: Codec,
    pts_us: u64,
    payload: Bytes,
    timing: UnitTiming,
}

impl EncodedUnit {
    /// Create an HEVC access unit.
    pub fn video(payload: impl Into<Bytes>, pts_us: u64, is_keyframe: bool) -> Self {
        Self {
            codec: Codec::Hevc,
            pts_us,
            payload: payload.into(),
            timing: UnitTiming::Video { is_keyframe },
        }
    }

    /// Create an audio packet.
    pub fn audio(codec: Codec, payload: impl Into<Bytes>, pts_us: u64, frames_per_packet: u32) -> Self {
        Self { codec, pts_us, payload: payload.into(), timing: UnitTiming::Audio { frames_per_packet } }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn pts_us(&self) -> u64 {
        self.pts_us
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn timing(&self) -> UnitTiming {
        self.timing
    }

    /// Whether the unit carries a presentation timestamp.
    pub fn is_timed(&self) -> bool {
        self.pts_us > 0
    }

    /// True for video keyframes. Audio packets are all independently decodable.
    pub fn is_keyframe(&self) -> bool {
        match self.timing {
            UnitTiming::Video { is_keyframe } => is_keyframe,
            UnitTiming::Audio { .. } => true,
        }
    }

    /// Compressed-domain duration hint in frames; `None` for video or unknown.
    pub fn frames_per_packet(&self) -> Option<u32> {
        match self.timing {
            UnitTiming::Audio { frames_per_packet } if frames_per_packet > 0 => Some(frames_per_packet),
            _ => None,
        }
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Normalise a signed timestamp coming from an application boundary.
///
/// Negative values have no meaning as presentation time and are treated as
/// untimed (0).
pub fn pts_from_wire(pts: i64) -> u64 {
    u64::try_from(pts).unwrap_or(0)
}

/// Convert a frame count at `sample_rate` to microseconds.
pub fn frames_to_us(frames: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    frames.saturating_mul(1_000_000) / u64::from(sample_rate)
}

/// Convert microseconds to a frame count at `sample_rate`, rounding down.
pub fn us_to_frames(us: u64, sample_rate: u32) -> u64 {
    us.saturating_mul(u64::from(sample_rate)) / 1_000_000
}

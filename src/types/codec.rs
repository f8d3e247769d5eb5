//! Codec identifiers carried alongside every unit

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{MediaError, Result};

/// Compressed format of an [`EncodedUnit`](super::EncodedUnit).
///
/// The wire id travels with each unit so a multiplexed transport can tell the
/// streams apart without separate channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum Codec {
    /// H.265 / HEVC video in Annex-B framing
    Hevc,
    /// MPEG-4 AAC-LC audio, 1024 frames per packet
    Aac,
    /// Opus audio, self-describing TOC byte
    Opus,
}

impl Codec {
    /// Wire-level identifier.
    pub const fn wire_id(self) -> u8 {
        match self {
            Codec::Hevc => 1,
            Codec::Aac => 2,
            Codec::Opus => 3,
        }
    }

    /// Resolve a wire-level identifier.
    pub fn from_wire_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Codec::Hevc),
            2 => Ok(Codec::Aac),
            3 => Ok(Codec::Opus),
            _ => Err(MediaError::UnknownCodec { id }),
        }
    }

    pub const fn is_video(self) -> bool {
        matches!(self, Codec::Hevc)
    }

    pub const fn is_audio(self) -> bool {
        !self.is_video()
    }
}

impl TryFrom<u8> for Codec {
    type Error = MediaError;

    fn try_from(id: u8) -> Result<Self> {
        Codec::from_wire_id(id)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Codec::Hevc => "HEVC",
            Codec::Aac => "AAC",
            Codec::Opus => "Opus",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_ids_match_protocol() {
        assert_eq!(Codec::Hevc.wire_id(), 1);
        assert_eq!(Codec::Opus.wire_id(), 3);

        for codec in [Codec::Hevc, Codec::Aac, Codec::Opus] {
            assert_eq!(Codec::from_wire_id(codec.wire_id()).unwrap(), codec);
        }
    }

    #[test]
    fn unknown_wire_id_is_rejected() {
        assert!(matches!(Codec::try_from(0), Err(MediaError::UnknownCodec { id: 0 })));
        assert!(matches!(Codec::try_from(0xFF), Err(MediaError::UnknownCodec { id: 0xFF })));
    }

    #[test]
    fn media_kind() {
        assert!(Codec::Hevc.is_video());
        assert!(Codec::Opus.is_audio());
        assert!(Codec::Aac.is_audio());
    }
}

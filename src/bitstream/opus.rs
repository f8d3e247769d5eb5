//! Opus packet duration from the TOC byte
//!
//! Senders don't always signal how many frames an audio packet holds. For Opus
//! the first byte (table-of-contents) encodes the per-frame duration through its
//! configuration number and the number of frames through the frame count code.

/// Opus never carries more than 120ms per packet.
pub const MAX_PACKET_SAMPLES: u32 = 5760;

/// Duration of one frame at 48 kHz for a TOC configuration number (0..=31).
pub fn samples_per_frame(config: u8) -> u32 {
    match config {
        // SILK: 10, 20, 40, 60 ms
        0..=11 => [480, 960, 1920, 2880][usize::from(config % 4)],
        // Hybrid: 10, 20 ms
        12..=15 => [480, 960][usize::from(config % 2)],
        // CELT: 2.5, 5, 10, 20 ms
        _ => [120, 240, 480, 960][usize::from(config % 4)],
    }
}

/// Parsed table-of-contents byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusToc {
    pub config: u8,
    pub stereo: bool,
    pub frame_count_code: u8,
}

impl OpusToc {
    pub fn parse(toc: u8) -> Self {
        Self { config: toc >> 3, stereo: toc & 0x04 != 0, frame_count_code: toc & 0x03 }
    }
}

/// Total samples (48 kHz) in an Opus packet.
///
/// `None` for an empty packet, a code 3 packet without its count byte, and
/// any result that is zero or above [`MAX_PACKET_SAMPLES`].
pub fn infer_opus_frame_duration(packet: &[u8]) -> Option<u32> {
    let toc = OpusToc::parse(*packet.first()?);

    let frames = match toc.frame_count_code {
        0 => 1,
        1 | 2 => 2,
        _ => u32::from(packet.get(1)? & 0x3F),
    };

    let total = samples_per_frame(toc.config) * frames;
    (total > 0 && total <= MAX_PACKET_SAMPLES).then_some(total)
}

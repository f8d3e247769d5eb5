//! Decoded media: video images and PCM chunks

use bytes::Bytes;

use super::unit::{frames_to_us, us_to_frames};
use crate::queue::Timed;

/// A decoded video image as handed out by the codec session.
///
/// The pixel payload is opaque to the pipeline (NV12 on Apple hardware); it is
/// reference counted so publishing the latest frame never copies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub pts_us: u64,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl VideoFrame {
    pub fn new(pts_us: u64, width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self { pts_us, width, height, data: data.into() }
    }
}

/// Interleaved f32 PCM decoded from one audio packet.
///
/// The render callback consumes chunks sample-granularly, so the chunk keeps a
/// read cursor. Its effective timestamp advances with the cursor, which lets the
/// playout queue account for a partially played head.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmChunk {
    pts_us: u64,
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
    read_frame: usize,
}

impl PcmChunk {
    pub fn new(pts_us: u64, sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self { pts_us, sample_rate, channels: channels.max(1), samples, read_frame: 0 }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Timestamp of the next unplayed frame; 0 for untimed chunks.
    pub fn pts_us(&self) -> u64 {
        if self.pts_us == 0 {
            return 0;
        }
        self.pts_us.saturating_add(frames_to_us(self.read_frame as u64, self.sample_rate))
    }

    /// Total frames (samples per channel) in the chunk.
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    pub fn remaining_frames(&self) -> usize {
        self.frames().saturating_sub(self.read_frame)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_frames() == 0
    }

    /// Unplayed interleaved samples.
    pub fn remaining_samples(&self) -> &[f32] {
        let start = self.read_frame * usize::from(self.channels);
        self.samples.get(start..).unwrap_or(&[])
    }

    /// Copy up to `out.len()` interleaved samples into `out` and advance the cursor.
    ///
    /// Returns the number of frames copied.
    pub fn read_into(&mut self, out: &mut [f32]) -> usize {
        let channels = usize::from(self.channels);
        let frames = (out.len() / channels).min(self.remaining_frames());
        let count = frames * channels;
        let start = self.read_frame * channels;
        if let (Some(dst), Some(src)) = (out.get_mut(..count), self.samples.get(start..start + count)) {
            dst.copy_from_slice(src);
        }
        self.read_frame += frames;
        frames
    }

    /// Advance the read cursor without playing.
    pub fn skip_frames(&mut self, frames: usize) {
        self.read_frame = self.read_frame.saturating_add(frames).min(self.frames());
    }
}

impl Timed for PcmChunk {
    fn pts_us(&self) -> u64 {
        PcmChunk::pts_us(self)
    }

    fn remaining_us(&self) -> u64 {
        frames_to_us(self.remaining_frames() as u64, self.sample_rate)
    }

    fn skip_us(&mut self, us: u64) -> bool {
        let frames = usize::try_from(us_to_frames(us, self.sample_rate)).unwrap_or(usize::MAX);
        self.skip_frames(frames);
        !self.is_exhausted()
    }

    fn is_consumed(&self) -> bool {
        self.is_exhausted()
    }
}

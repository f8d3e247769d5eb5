//! PCM chunking and audio packet timestamping

use tracing::debug;

use crate::codec::EncodedAudioPacket;
use crate::types::{CaptureConfig, Codec, EncodedUnit, PcmChunk, frames_to_us};

/// Accumulates captured PCM into the fixed-size chunks the audio encoder
/// expects, and stamps the packets the encoder returns.
#[derive(Debug)]
pub struct AudioPacketizer {
    codec: Codec,
    sample_rate: u32,
    channels: u16,
    chunk_frames: usize,
    pending: Vec<f32>,
    pending_pts_us: u64,
}

impl AudioPacketizer {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            codec: config.audio_codec,
            sample_rate: config.audio_sample_rate,
            channels: config.audio_channels.max(1),
            chunk_frames: config.audio_chunk_frames.max(1),
            pending: Vec::new(),
            pending_pts_us: 0,
        }
    }

    /// Append captured PCM and return every complete chunk.
    ///
    /// A chunk's PTS is the capture time of its first frame. Input with a
    /// different channel layout or rate is dropped.
    pub fn push(&mut self, pcm: &PcmChunk) -> Vec<PcmChunk> {
        if pcm.channels() != self.channels || pcm.sample_rate() != self.sample_rate {
            debug!(
                channels = pcm.channels(),
                sample_rate = pcm.sample_rate(),
                "dropped PCM with unexpected format"
            );
            return Vec::new();
        }

        if self.pending.is_empty() {
            self.pending_pts_us = pcm.pts_us();
        }
        self.pending.extend_from_slice(pcm.remaining_samples());

        let chunk_samples = self.chunk_frames * usize::from(self.channels);
        let mut chunks = Vec::new();
        while self.pending.len() >= chunk_samples {
            let samples: Vec<f32> = self.pending.drain(..chunk_samples).collect();
            chunks.push(PcmChunk::new(self.pending_pts_us, self.sample_rate, self.channels, samples));
            if self.pending_pts_us != 0 {
                self.pending_pts_us += frames_to_us(self.chunk_frames as u64, self.sample_rate);
            }
        }
        chunks
    }

    /// Stamp encoder output for a chunk captured at `chunk_pts_us`.
    ///
    /// When the encoder splits one chunk into several packets, each packet's
    /// PTS advances by the duration of the packets before it.
    pub fn packetize(&self, chunk_pts_us: u64, packets: Vec<EncodedAudioPacket>) -> Vec<EncodedUnit> {
        let mut pts_us = chunk_pts_us;
        let mut units = Vec::with_capacity(packets.len());

        for packet in packets {
            if packet.data.is_empty() {
                continue;
            }
            units.push(EncodedUnit::audio(self.codec, packet.data, pts_us, packet.frames));
            if pts_us != 0 {
                pts_us += frames_to_us(u64::from(packet.frames), self.sample_rate);
            }
        }
        units
    }

    /// Frames buffered toward the next chunk.
    pub fn pending_frames(&self) -> usize {
        self.pending.len() / usize::from(self.channels)
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.pending_pts_us = 0;
    }
}

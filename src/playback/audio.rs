//! Pull-based audio driver
//!
//! Packets are decoded the moment they arrive and queued as PCM. The output
//! device pulls samples through [`AudioPlayer::render`], which only copies
//! already-decoded data and never waits for a lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::AudioStats;
use crate::bitstream::infer_opus_frame_duration;
use crate::clock::SyncClock;
use crate::codec::{AudioDecoder, AudioDecoderFactory};
use crate::queue::{AnchorRule, PlayoutQueue};
use crate::types::{Codec, EncodedUnit, PcmChunk, PlayoutConfig};

/// AAC-LC always carries 1024 frames per packet.
pub const AAC_FRAMES_PER_PACKET: u32 = 1024;
/// Fallback when an Opus packet carries no hint and an unparseable TOC.
pub const DEFAULT_OPUS_FRAMES: u32 = 960;

/// Frames in a compressed packet: hint first, then codec knowledge.
pub fn packet_frames(unit: &EncodedUnit) -> u32 {
    match unit.codec() {
        Codec::Aac => AAC_FRAMES_PER_PACKET,
        Codec::Opus => unit
            .frames_per_packet()
            .or_else(|| infer_opus_frame_duration(unit.payload()))
            .unwrap_or(DEFAULT_OPUS_FRAMES),
        Codec::Hevc => 0,
    }
}

/// Receive-side audio driver.
///
/// Shared between the receive path ([`push`](Self::push)) and the real-time
/// output callback ([`render`](Self::render)); wrap it in an `Arc`.
pub struct AudioPlayer {
    queue: Mutex<PlayoutQueue<PcmChunk>>,
    decoder: Mutex<Option<(Codec, Box<dyn AudioDecoder>)>>,
    factory: Arc<dyn AudioDecoderFactory>,
    clock: Arc<SyncClock>,
    sample_rate: u32,
    channels: u16,
    suspended: AtomicBool,
    underrun_frames: AtomicU64,
    contended_callbacks: AtomicU64,
    decode_failures: AtomicU64,
    dropped_while_suspended: AtomicU64,
}

impl AudioPlayer {
    pub fn new(config: &PlayoutConfig, clock: Arc<SyncClock>, factory: Arc<dyn AudioDecoderFactory>) -> Self {
        Self {
            queue: Mutex::new(PlayoutQueue::new("audio", config.audio, AnchorRule::AnyUnit)),
            decoder: Mutex::new(None),
            factory,
            clock,
            sample_rate: config.audio_sample_rate,
            channels: config.audio_channels,
            suspended: AtomicBool::new(false),
            underrun_frames: AtomicU64::new(0),
            contended_callbacks: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            dropped_while_suspended: AtomicU64::new(0),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Decode one packet and queue its PCM.
    ///
    /// Decode failures are logged and the packet is dropped.
    pub fn push(&self, unit: EncodedUnit) {
        if self.suspended.load(Ordering::Acquire) {
            self.dropped_while_suspended.fetch_add(1, Ordering::Relaxed);
            trace!(pts_us = unit.pts_us(), "audio suspended, packet dropped");
            return;
        }

        let codec = unit.codec();
        if !codec.is_audio() || unit.payload().is_empty() {
            debug!(%codec, "ignored non-audio or empty packet");
            return;
        }

        let frames = packet_frames(&unit);
        let samples = match self.decode(codec, unit.payload(), frames) {
            Some(samples) if !samples.is_empty() => samples,
            _ => return,
        };

        trace!(pts_us = unit.pts_us(), frames, "queued decoded audio");
        let chunk = PcmChunk::new(unit.pts_us(), self.sample_rate, self.channels, samples);
        self.queue.lock().insert(chunk);
    }

    fn decode(&self, codec: Codec, packet: &[u8], frames: u32) -> Option<Vec<f32>> {
        let mut slot = self.decoder.lock();

        if slot.as_ref().is_none_or(|(current, _)| *current != codec) {
            match self.factory.create_decoder(codec, self.sample_rate, self.channels) {
                Ok(decoder) => {
                    info!(%codec, sample_rate = self.sample_rate, channels = self.channels, "audio decoder created");
                    *slot = Some((codec, decoder));
                }
                Err(e) => {
                    self.decode_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(%codec, "audio decoder setup failed: {}", e);
                    return None;
                }
            }
        }

        let (_, decoder) = slot.as_mut()?;
        match decoder.decode(packet, frames) {
            Ok(samples) => Some(samples),
            Err(e) => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%codec, frames, "audio decode failed: {}", e);
                None
            }
        }
    }

    /// Fill `out` with interleaved samples; the real-time callback entry point.
    ///
    /// Never blocks: if the queue is busy the buffer is zero-filled. Any
    /// shortfall is zero-filled too. Returns the number of frames rendered
    /// from queued audio.
    pub fn render(&self, out: &mut [f32]) -> usize {
        if self.suspended.load(Ordering::Acquire) {
            out.fill(0.0);
            return 0;
        }

        let Some(mut queue) = self.queue.try_lock() else {
            self.contended_callbacks.fetch_add(1, Ordering::Relaxed);
            out.fill(0.0);
            return 0;
        };

        let channels = usize::from(self.channels.max(1));
        let budget = queue.policy().max_drain_per_call;
        let mut written = 0;
        let mut touched = 0;

        while written < out.len() && touched < budget {
            touched += 1;
            let target = &mut out[written..];
            match queue.release_with(&self.clock, |chunk| chunk.read_into(target)) {
                Some(frames) => written += frames * channels,
                None => break,
            }
        }
        drop(queue);

        if written < out.len() {
            out[written..].fill(0.0);
            if self.clock.is_anchored() {
                let missing = (out.len() - written) / channels;
                self.underrun_frames.fetch_add(missing as u64, Ordering::Relaxed);
            }
        }

        written / channels
    }

    /// Pause output and discard everything buffered.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Release);
        self.queue.lock().clear();
        info!("audio suspended");
    }

    /// Resume output with an empty queue.
    pub fn resume(&self) {
        self.queue.lock().clear();
        self.suspended.store(false, Ordering::Release);
        info!("audio resumed");
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Clear the queue and release the decoder.
    pub fn stop(&self) {
        self.queue.lock().clear();
        self.decoder.lock().take();
        info!("audio player stopped");
    }

    pub fn stats(&self) -> AudioStats {
        let queue = self.queue.lock();
        AudioStats {
            queue: queue.stats(),
            buffered_us: queue.buffered_us(),
            underrun_frames: self.underrun_frames.load(Ordering::Relaxed),
            contended_callbacks: self.contended_callbacks.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            dropped_while_suspended: self.dropped_while_suspended.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeAudioDecoderFactory, ManualTimeSource};

    fn player() -> (AudioPlayer, Arc<FakeAudioDecoderFactory>, Arc<SyncClock>, Arc<ManualTimeSource>) {
        let time = Arc::new(ManualTimeSource::new(1_000_000));
        let clock = Arc::new(SyncClock::with_time_source(100_000, time.clone()));
        let factory = Arc::new(FakeAudioDecoderFactory::default());
        (AudioPlayer::new(&PlayoutConfig::default(), clock.clone(), factory.clone()), factory, clock, time)
    }

    #[test]
    fn frame_count_resolution() {
        assert_eq!(packet_frames(&EncodedUnit::audio(Codec::Opus, vec![0x00], 1, 0)), 480);
        assert_eq!(packet_frames(&EncodedUnit::audio(Codec::Opus, vec![0x00], 1, 960)), 960);
        assert_eq!(packet_frames(&EncodedUnit::audio(Codec::Opus, vec![0xFB], 1, 0)), DEFAULT_OPUS_FRAMES);
        assert_eq!(packet_frames(&EncodedUnit::audio(Codec::Aac, vec![0x21], 1, 0)), 1024);
    }

    #[test]
    fn renders_decoded_audio_and_zero_fills() {
        let (player, _, clock, _) = player();
        player.push(EncodedUnit::audio(Codec::Opus, vec![0xF8, 0x01], 500_000, 0));

        let mut out = vec![1.0f32; 1200];
        assert_eq!(player.render(&mut out), 960);
        assert!(clock.is_anchored());
        assert!(out[..960].iter().all(|&s| s != 0.0));
        assert!(out[960..].iter().all(|&s| s == 0.0));
        assert_eq!(player.stats().underrun_frames, 240);
    }

    #[test]
    fn partial_reads_span_callbacks() {
        let (player, _, _, _) = player();
        player.push(EncodedUnit::audio(Codec::Opus, vec![0xF8], 500_000, 0));

        let mut out = vec![0.0f32; 512];
        assert_eq!(player.render(&mut out), 512);
        assert_eq!(player.render(&mut out), 448);
        assert_eq!(player.stats().queue.rendered, 1);
    }

    #[test]
    fn future_audio_waits_for_the_clock() {
        let (player, _, clock, time) = player();
        clock.anchor_if_needed(1_000_000, "video keyframe");
        // 100ms latency, 60ms lead trim: playable = 1_040_000 at anchor time.
        player.push(EncodedUnit::audio(Codec::Opus, vec![0xF8], 1_100_000, 0));

        let mut out = vec![0.0f32; 480];
        assert_eq!(player.render(&mut out), 0);

        time.advance_us(60_000);
        assert_eq!(player.render(&mut out), 480);
    }

    #[test]
    fn decode_failure_drops_packet() {
        let (player, factory, _, _) = player();
        factory.fail_next_decode();
        player.push(EncodedUnit::audio(Codec::Opus, vec![0xF8], 500_000, 0));

        assert_eq!(player.stats().decode_failures, 1);
        assert_eq!(player.stats().queue.inserted, 0);

        player.push(EncodedUnit::audio(Codec::Opus, vec![0xF8], 520_000, 0));
        assert_eq!(player.stats().queue.inserted, 1);
    }

    #[test]
    fn codec_switch_recreates_decoder() {
        let (player, factory, _, _) = player();
        player.push(EncodedUnit::audio(Codec::Opus, vec![0xF8], 500_000, 0));
        player.push(EncodedUnit::audio(Codec::Aac, vec![0x21, 0x10], 520_000, 0));
        assert_eq!(factory.created(), vec![Codec::Opus, Codec::Aac]);
    }

    #[test]
    fn suspend_clears_and_silences() {
        let (player, _, _, _) = player();
        player.push(EncodedUnit::audio(Codec::Opus, vec![0xF8], 500_000, 0));
        player.suspend();
        player.push(EncodedUnit::audio(Codec::Opus, vec![0xF8], 520_000, 0));

        let mut out = vec![1.0f32; 256];
        assert_eq!(player.render(&mut out), 0);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(player.stats().dropped_while_suspended, 1);

        player.resume();
        player.push(EncodedUnit::audio(Codec::Opus, vec![0xF8], 540_000, 0));
        assert_eq!(player.render(&mut out), 256);
    }

    #[test]
    fn contended_lock_zero_fills() {
        let (player, _, _, _) = player();
        player.push(EncodedUnit::audio(Codec::Opus, vec![0xF8], 500_000, 0));

        let guard = player.queue.lock();
        let mut out = vec![1.0f32; 64];
        assert_eq!(player.render(&mut out), 0);
        assert!(out.iter().all(|&s| s == 0.0));
        drop(guard);

        assert_eq!(player.stats().contended_callbacks, 1);
    }
}

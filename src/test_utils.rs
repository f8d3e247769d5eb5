//! Test doubles for the codec and capture boundaries
//!
//! Deterministic stand-ins for the platform pieces: a manually advanced time
//! source, decoder and encoder sessions that complete synchronously, and a
//! capture backend fed from a script. Also builds small HEVC access units with
//! realistic NAL headers.

#![cfg(any(test, feature = "test-utils"))]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::bitstream::{HevcParameterSets, assemble_annex_b, to_length_prefixed};
use crate::capture::{CaptureBackend, CaptureSource, CapturedSample};
use crate::clock::TimeSource;
use crate::codec::{
    AudioDecoder, AudioDecoderFactory, AudioEncodeSession, EncodedAudioPacket, EncodedSampleSink,
    EncodedVideoSample, FrameSink, VideoDecodeSession, VideoDecoderFactory, VideoEncodeSession,
};
use crate::types::{Codec, PcmChunk, VideoFrame};
use crate::{MediaError, Result};

/// Time source that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now_us: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(start_us: u64) -> Self {
        Self { now_us: AtomicU64::new(start_us) }
    }

    pub fn advance_us(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::AcqRel);
    }

    pub fn set_us(&self, us: u64) {
        self.now_us.store(us, Ordering::Release);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::Acquire)
    }
}

/// VPS/SPS/PPS whose payload byte differs per `variant`.
pub fn hevc_parameter_sets(variant: u8) -> HevcParameterSets {
    HevcParameterSets {
        vps: Bytes::from(vec![0x40, 0x01, 0x0C, variant]),
        sps: Bytes::from(vec![0x42, 0x01, 0x01, variant]),
        pps: Bytes::from(vec![0x44, 0x01, 0xC1, variant]),
    }
}

/// IDR slice NAL (type 19).
pub const IDR_SLICE: [u8; 4] = [0x26, 0x01, 0xAF, 0x09];

/// Trailing picture slice NAL (type 1).
pub const DELTA_SLICE: [u8; 4] = [0x02, 0x01, 0xD0, 0x21];

/// Annex-B keyframe access unit: parameter sets for `variant` plus an IDR slice.
pub fn hevc_access_unit(variant: u8) -> Vec<u8> {
    assemble_annex_b(hevc_parameter_sets(variant).as_slices(), [IDR_SLICE])
}

/// Annex-B access unit with a single non-IRAP slice.
pub fn hevc_delta_unit() -> Vec<u8> {
    assemble_annex_b(std::iter::empty::<&[u8]>(), [DELTA_SLICE])
}

#[derive(Debug, Default)]
struct VideoDecoderState {
    created: usize,
    invalidated: usize,
    drained_before_invalidate: usize,
    last_sink: Option<FrameSink>,
    fail_decodes: bool,
}

/// Decoder factory whose sessions emit one 64x48 frame per submitted sample.
#[derive(Debug, Default, Clone)]
pub struct FakeVideoDecoderFactory {
    state: Arc<Mutex<VideoDecoderState>>,
}

impl FakeVideoDecoderFactory {
    pub fn sessions_created(&self) -> usize {
        self.state.lock().created
    }

    pub fn invalidated_sessions(&self) -> usize {
        self.state.lock().invalidated
    }

    /// Invalidations that were preceded by `finish_pending` on the same session.
    pub fn pending_drained_before_invalidate(&self) -> usize {
        self.state.lock().drained_before_invalidate
    }

    /// Make every subsequent decode call fail.
    pub fn fail_decodes(&self, fail: bool) {
        self.state.lock().fail_decodes = fail;
    }

    /// Simulate a codec callback arriving through the most recent sink.
    pub fn deliver_late_frame(&self, pts_us: u64) -> bool {
        let sink = self.state.lock().last_sink.clone();
        sink.is_some_and(|sink| sink.deliver(VideoFrame::new(pts_us, 64, 48, vec![0u8; 16])))
    }
}

impl VideoDecoderFactory for FakeVideoDecoderFactory {
    fn create_session(
        &self,
        _parameter_sets: &HevcParameterSets,
        sink: FrameSink,
    ) -> Result<Box<dyn VideoDecodeSession>> {
        let mut state = self.state.lock();
        state.created += 1;
        state.last_sink = Some(sink.clone());
        Ok(Box::new(FakeVideoSession { sink, state: Arc::clone(&self.state), drained: false }))
    }
}

struct FakeVideoSession {
    sink: FrameSink,
    state: Arc<Mutex<VideoDecoderState>>,
    drained: bool,
}

impl VideoDecodeSession for FakeVideoSession {
    fn decode(&mut self, sample: &[u8], pts_us: u64) -> Result<()> {
        if self.state.lock().fail_decodes {
            return Err(MediaError::decode(Codec::Hevc, "scripted failure"));
        }
        self.drained = false;
        self.sink.deliver(VideoFrame::new(pts_us, 64, 48, sample.to_vec()));
        Ok(())
    }

    fn finish_pending(&mut self) {
        self.drained = true;
    }

    fn invalidate(&mut self) {
        let mut state = self.state.lock();
        state.invalidated += 1;
        if self.drained {
            state.drained_before_invalidate += 1;
        }
    }
}

#[derive(Debug, Default)]
struct AudioDecoderState {
    created: Vec<Codec>,
    fail_next: bool,
}

/// Audio decoder factory producing constant 0.5 PCM.
#[derive(Debug, Default, Clone)]
pub struct FakeAudioDecoderFactory {
    state: Arc<Mutex<AudioDecoderState>>,
}

impl FakeAudioDecoderFactory {
    pub fn created(&self) -> Vec<Codec> {
        self.state.lock().created.clone()
    }

    pub fn fail_next_decode(&self) {
        self.state.lock().fail_next = true;
    }
}

impl AudioDecoderFactory for FakeAudioDecoderFactory {
    fn create_decoder(&self, codec: Codec, _sample_rate: u32, channels: u16) -> Result<Box<dyn AudioDecoder>> {
        self.state.lock().created.push(codec);
        Ok(Box::new(FakeAudioDecoder { codec, channels, state: Arc::clone(&self.state) }))
    }
}

struct FakeAudioDecoder {
    codec: Codec,
    channels: u16,
    state: Arc<Mutex<AudioDecoderState>>,
}

impl AudioDecoder for FakeAudioDecoder {
    fn decode(&mut self, packet: &[u8], frames: u32) -> Result<Vec<f32>> {
        if std::mem::take(&mut self.state.lock().fail_next) {
            return Err(MediaError::decode(self.codec, "scripted failure"));
        }
        if packet.is_empty() {
            return Err(MediaError::decode(self.codec, "empty packet"));
        }
        Ok(vec![0.5; frames as usize * usize::from(self.channels)])
    }
}

/// Capture source replaying a fixed list of samples.
pub struct ScriptedSource {
    script: VecDeque<Result<CapturedSample>>,
    dimensions: Option<(u32, u32)>,
    hold_open: bool,
    stopped: Arc<AtomicBool>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<CapturedSample>>) -> Self {
        Self {
            script: script.into(),
            dimensions: Some((64, 48)),
            hold_open: false,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Keep pending after the script instead of reporting end of stream.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn with_dimensions(mut self, dimensions: Option<(u32, u32)>) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Flag set once the driver stopped the source.
    pub fn stopped_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }
}

#[async_trait::async_trait]
impl CaptureSource for ScriptedSource {
    async fn next_sample(&mut self) -> Result<Option<CapturedSample>> {
        // Let the driver service its other branches between samples.
        tokio::task::yield_now().await;
        if let Some(next) = self.script.pop_front() {
            return next.map(Some);
        }
        if self.hold_open {
            std::future::pending::<()>().await;
        }
        Ok(None)
    }

    fn video_dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct BackendState {
    deny_permission: bool,
    script: Vec<Result<CapturedSample>>,
    sources_opened: usize,
    video_sessions_created: usize,
    video_sessions_invalidated: usize,
    initial_bitrate: Option<u32>,
    last_bitrate: Option<u32>,
    fail_video_encodes: usize,
    fail_audio_encodes: usize,
}

/// Capture backend with synchronous fake encoders.
///
/// The video encoder turns every frame into one length-prefixed sample: a
/// keyframe carrying parameter sets for the first frame and every 30th after
/// it, delta slices otherwise. The audio encoder returns one Opus packet per
/// chunk.
#[derive(Debug, Default, Clone)]
pub struct FakeCaptureBackend {
    state: Arc<Mutex<BackendState>>,
}

impl FakeCaptureBackend {
    /// Fail the next `open_source` calls with a permission error.
    pub fn deny_permission(&self) {
        self.state.lock().deny_permission = true;
    }

    /// Samples produced by the next opened source before it idles.
    pub fn script(&self, samples: Vec<Result<CapturedSample>>) {
        self.state.lock().script = samples;
    }

    pub fn sources_opened(&self) -> usize {
        self.state.lock().sources_opened
    }

    pub fn video_sessions_created(&self) -> usize {
        self.state.lock().video_sessions_created
    }

    pub fn video_sessions_invalidated(&self) -> usize {
        self.state.lock().video_sessions_invalidated
    }

    /// Bitrate the most recent video session was created with.
    pub fn initial_bitrate(&self) -> Option<u32> {
        self.state.lock().initial_bitrate
    }

    /// Bitrate most recently applied to a live session.
    pub fn last_bitrate(&self) -> Option<u32> {
        self.state.lock().last_bitrate
    }

    /// Fail the next `count` video encode calls.
    pub fn fail_next_video_encodes(&self, count: usize) {
        self.state.lock().fail_video_encodes = count;
    }

    /// Fail the next `count` audio encode calls.
    pub fn fail_next_audio_encodes(&self, count: usize) {
        self.state.lock().fail_audio_encodes = count;
    }
}

/// Consume one scripted failure from `budget`.
fn take_failure(budget: &mut usize) -> bool {
    if *budget == 0 {
        return false;
    }
    *budget -= 1;
    true
}

impl CaptureBackend for FakeCaptureBackend {
    fn open_source(&self, video_enabled: bool) -> Result<Box<dyn CaptureSource>> {
        let mut state = self.state.lock();
        if state.deny_permission {
            return Err(MediaError::PermissionDenied { device: "camera".to_string() });
        }
        state.sources_opened += 1;
        let script = std::mem::take(&mut state.script);
        let dimensions = video_enabled.then_some((64, 48));
        Ok(Box::new(ScriptedSource::new(script).with_dimensions(dimensions).hold_open()))
    }

    fn create_video_encoder(
        &self,
        _width: u32,
        _height: u32,
        bitrate_bps: u32,
        _frame_rate: u32,
        sink: EncodedSampleSink,
    ) -> Result<Box<dyn VideoEncodeSession>> {
        let mut state = self.state.lock();
        state.video_sessions_created += 1;
        state.initial_bitrate = Some(bitrate_bps);
        Ok(Box::new(FakeVideoEncoder { sink, state: Arc::clone(&self.state), frame_index: 0 }))
    }

    fn create_audio_encoder(
        &self,
        codec: Codec,
        _sample_rate: u32,
        _channels: u16,
    ) -> Result<Box<dyn AudioEncodeSession>> {
        Ok(Box::new(FakeAudioEncoder { codec, state: Arc::clone(&self.state) }))
    }
}

struct FakeVideoEncoder {
    sink: EncodedSampleSink,
    state: Arc<Mutex<BackendState>>,
    frame_index: u64,
}

impl VideoEncodeSession for FakeVideoEncoder {
    fn encode(&mut self, frame: &VideoFrame) -> Result<()> {
        if take_failure(&mut self.state.lock().fail_video_encodes) {
            return Err(MediaError::encode(Codec::Hevc, "scripted failure"));
        }
        let is_keyframe = self.frame_index % 30 == 0;
        self.frame_index += 1;

        let slice: &[u8] = if is_keyframe { &IDR_SLICE } else { &DELTA_SLICE };
        let sample = EncodedVideoSample {
            pts_us: frame.pts_us,
            is_keyframe,
            data: Bytes::from(to_length_prefixed(slice)?),
            parameter_sets: is_keyframe.then(|| hevc_parameter_sets(1)),
        };
        self.sink.deliver(sample);
        Ok(())
    }

    fn set_bitrate(&mut self, bps: u32) -> Result<()> {
        self.state.lock().last_bitrate = Some(bps);
        Ok(())
    }

    fn finish_pending(&mut self) {}

    fn invalidate(&mut self) {
        self.state.lock().video_sessions_invalidated += 1;
    }
}

struct FakeAudioEncoder {
    codec: Codec,
    state: Arc<Mutex<BackendState>>,
}

impl AudioEncodeSession for FakeAudioEncoder {
    fn encode(&mut self, chunk: &PcmChunk) -> Result<Vec<EncodedAudioPacket>> {
        if take_failure(&mut self.state.lock().fail_audio_encodes) {
            return Err(MediaError::encode(self.codec, "scripted failure"));
        }
        // CELT fullband 20ms, single frame.
        let toc = match self.codec {
            Codec::Opus => 0xF8,
            _ => 0x21,
        };
        Ok(vec![EncodedAudioPacket { data: Bytes::from(vec![toc, 0x01, 0x02]), frames: chunk.frames() as u32 }])
    }
}

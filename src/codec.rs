//! Boundary with the external codec sessions
//!
//! Platform codecs (VideoToolbox, AudioConverter, MediaCodec, ...) live behind
//! these traits. The pipeline only ever talks to a session through a boxed
//! trait object and receives asynchronous output through an owned sink handle.
//!
//! Sinks are tied to a session generation in a shared [`SessionRegistry`].
//! Tearing a session down bumps the generation, so output callbacks that the
//! codec delivers after teardown are recognised and dropped instead of touching
//! state that belongs to the next session.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::trace;

use crate::Result;
use crate::bitstream::HevcParameterSets;
use crate::types::{Codec, PcmChunk, VideoFrame};

/// Generation counter shared between a driver and the sinks it hands out.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start a new session generation and return a handle bound to it.
    pub fn begin(self: &Arc<Self>) -> SessionHandle {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        SessionHandle { generation, registry: Arc::clone(self) }
    }

    /// Orphan every outstanding handle.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// Identity of one codec session, checked before any output is accepted.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    generation: u64,
    registry: Arc<SessionRegistry>,
}

impl SessionHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.registry.current() == self.generation
    }
}

/// Where a decoder session delivers decoded images.
///
/// Only the most recent image is kept; undisplayed older images are
/// overwritten.
#[derive(Debug, Clone)]
pub struct FrameSink {
    handle: SessionHandle,
    latest: Arc<watch::Sender<Option<VideoFrame>>>,
}

impl FrameSink {
    pub fn new(handle: SessionHandle, latest: Arc<watch::Sender<Option<VideoFrame>>>) -> Self {
        Self { handle, latest }
    }

    /// Publish a decoded frame. Returns `false` if the session was torn down.
    pub fn deliver(&self, frame: VideoFrame) -> bool {
        if !self.handle.is_active() {
            trace!(generation = self.handle.generation(), "dropped frame from retired decoder session");
            return false;
        }
        self.latest.send_replace(Some(frame));
        true
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}

/// Factory for hardware HEVC decoder sessions.
pub trait VideoDecoderFactory: Send + Sync + 'static {
    /// Create a session from a complete VPS/SPS/PPS set.
    ///
    /// Samples submitted to the session use 4-byte length-prefixed framing.
    fn create_session(
        &self,
        parameter_sets: &HevcParameterSets,
        sink: FrameSink,
    ) -> Result<Box<dyn VideoDecodeSession>>;
}

/// A running decoder session.
pub trait VideoDecodeSession: Send {
    /// Submit one length-prefixed sample. Output arrives through the sink.
    fn decode(&mut self, sample: &[u8], pts_us: u64) -> Result<()>;

    /// Wait for outstanding asynchronous decodes to be delivered.
    fn finish_pending(&mut self);

    /// Release the session. No output may be delivered afterwards.
    fn invalidate(&mut self);
}

/// Factory for audio decoders (Opus, AAC).
pub trait AudioDecoderFactory: Send + Sync + 'static {
    fn create_decoder(&self, codec: Codec, sample_rate: u32, channels: u16) -> Result<Box<dyn AudioDecoder>>;
}

/// Synchronous packet-to-PCM converter.
pub trait AudioDecoder: Send {
    /// Decode one packet holding `frames` frames into interleaved f32 samples.
    fn decode(&mut self, packet: &[u8], frames: u32) -> Result<Vec<f32>>;
}

/// Output of the hardware video encoder for one submitted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedVideoSample {
    pub pts_us: u64,
    /// Sync-sample attachment of the encoder output
    pub is_keyframe: bool,
    /// Length-prefixed NAL units
    pub data: Bytes,
    /// Parameter sets from the output format description, present on keyframes
    pub parameter_sets: Option<HevcParameterSets>,
}

/// Where an encoder session delivers its output.
///
/// Encoder callbacks run on a codec-owned thread; delivery is a non-blocking
/// channel send.
#[derive(Debug, Clone)]
pub struct EncodedSampleSink {
    handle: SessionHandle,
    tx: mpsc::UnboundedSender<EncodedVideoSample>,
}

impl EncodedSampleSink {
    pub fn new(handle: SessionHandle, tx: mpsc::UnboundedSender<EncodedVideoSample>) -> Self {
        Self { handle, tx }
    }

    pub fn deliver(&self, sample: EncodedVideoSample) -> bool {
        if !self.handle.is_active() {
            trace!(generation = self.handle.generation(), "dropped sample from retired encoder session");
            return false;
        }
        self.tx.send(sample).is_ok()
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}

/// A running hardware video encoder.
pub trait VideoEncodeSession: Send {
    /// Submit a raw frame. Output arrives through the sink.
    fn encode(&mut self, frame: &VideoFrame) -> Result<()>;

    /// Apply a new average bitrate to the live session.
    fn set_bitrate(&mut self, bps: u32) -> Result<()>;

    fn finish_pending(&mut self);

    fn invalidate(&mut self);
}

/// One compressed audio packet with its duration in frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioPacket {
    pub data: Bytes,
    pub frames: u32,
}

/// Synchronous PCM-to-packet converter.
pub trait AudioEncodeSession: Send {
    /// Convert one fixed-size PCM chunk. May return zero, one or several packets.
    fn encode(&mut self, chunk: &PcmChunk) -> Result<Vec<EncodedAudioPacket>>;
}

//! Send side: capture, encode and frame
//!
//! A [`CaptureBackend`] opens the platform devices and codec sessions. The
//! [`CaptureDriver`] task owns them for the lifetime of one capture session:
//! raw frames go to the hardware encoder and come back through an
//! [`EncodedSampleSink`](crate::codec::EncodedSampleSink) to be framed as
//! Annex-B; PCM is chunked, encoded and timestamped by the
//! [`AudioPacketizer`]. Framed units leave through two separate channels, one
//! per stream.
//!
//! [`CaptureController`] is the control plane: start, stop and live bitrate
//! changes.

mod controller;
mod driver;
mod framer;
mod packetizer;

pub use controller::CaptureController;
pub use driver::{CaptureDriver, CaptureOutputs, CaptureSession, CaptureStats, DriverHandle};
pub use framer::frame_video_sample;
pub use packetizer::AudioPacketizer;

use tokio::sync::mpsc;

use crate::Result;
use crate::codec::{AudioEncodeSession, EncodedSampleSink, VideoEncodeSession};
use crate::types::{Codec, EncodedUnit, PcmChunk, VideoFrame};

/// Raw media from the capture devices.
#[derive(Debug, Clone)]
pub enum CapturedSample {
    Video(VideoFrame),
    Audio(PcmChunk),
}

/// Stream of raw capture samples.
#[async_trait::async_trait]
pub trait CaptureSource: Send + 'static {
    /// Next captured sample, or `None` once the devices stopped.
    async fn next_sample(&mut self) -> Result<Option<CapturedSample>>;

    /// Negotiated camera resolution, `None` for audio-only capture.
    fn video_dimensions(&self) -> Option<(u32, u32)>;

    /// Stop the devices. Called once when the capture session ends.
    fn stop(&mut self) {}
}

/// Platform binding that opens devices and codec sessions.
///
/// Every method is a setup step: errors are returned to the caller of
/// `start_capture` and nothing is retried.
pub trait CaptureBackend: Send + Sync + 'static {
    /// Request permissions and open the capture devices.
    fn open_source(&self, video_enabled: bool) -> Result<Box<dyn CaptureSource>>;

    fn create_video_encoder(
        &self,
        width: u32,
        height: u32,
        bitrate_bps: u32,
        frame_rate: u32,
        sink: EncodedSampleSink,
    ) -> Result<Box<dyn VideoEncodeSession>>;

    fn create_audio_encoder(
        &self,
        codec: Codec,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn AudioEncodeSession>>;
}

/// Receiving ends of the outbound unit channels.
#[derive(Debug)]
pub struct CaptureEvents {
    pub video: mpsc::Receiver<EncodedUnit>,
    pub audio: mpsc::Receiver<EncodedUnit>,
}

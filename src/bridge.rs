//! Application boundary
//!
//! [`MediaBridge`] is what the method/event channel of the host application
//! talks to. It owns one playback session (shared clock, video and audio
//! players), the capture controller and the debug log ring. Wire-level
//! arguments (signed PTS, codec ids) are normalised here.
//!
//! ```rust
//! use std::sync::Arc;
//! use avsync::bridge::{MediaBackends, MediaBridge};
//! use avsync::test_utils::{FakeAudioDecoderFactory, FakeCaptureBackend, FakeVideoDecoderFactory};
//! use avsync::{CaptureConfig, PlayoutConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> avsync::Result<()> {
//! let backends = MediaBackends {
//!     video_decoder: Arc::new(FakeVideoDecoderFactory::default()),
//!     audio_decoder: Arc::new(FakeAudioDecoderFactory::default()),
//!     capture: Arc::new(FakeCaptureBackend::default()),
//! };
//! let (bridge, _events) = MediaBridge::new(backends, PlayoutConfig::default(), CaptureConfig::default())?;
//!
//! let texture = bridge.initialize_decoder();
//! assert_eq!(bridge.initialize_decoder(), texture);
//! bridge.initialize_audio();
//! bridge.push_audio_frame(vec![0xF8, 0x01], 20_000, 0, 3)?;
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capture::{CaptureBackend, CaptureController, CaptureEvents};
use crate::clock::SyncClock;
use crate::codec::{AudioDecoderFactory, VideoDecoderFactory};
use crate::debug_log::DebugLog;
use crate::playback::{AudioPlayer, AudioStats, VideoPlayer, VideoStats};
use crate::types::{CaptureConfig, Codec, EncodedUnit, PlayoutConfig, UpdateRate, VideoFrame, pts_from_wire};
use crate::{MediaError, Result};

/// Identifier of the surface decoded video is published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct TextureHandle(pub u64);

/// Platform codec and device bindings used by the bridge.
#[derive(Clone)]
pub struct MediaBackends {
    pub video_decoder: Arc<dyn VideoDecoderFactory>,
    pub audio_decoder: Arc<dyn AudioDecoderFactory>,
    pub capture: Arc<dyn CaptureBackend>,
}

struct VideoSlot {
    texture: TextureHandle,
    player: Arc<VideoPlayer>,
}

/// Capture and playback control surface.
pub struct MediaBridge {
    playout: PlayoutConfig,
    clock: Arc<SyncClock>,
    video_decoder: Arc<dyn VideoDecoderFactory>,
    audio_decoder: Arc<dyn AudioDecoderFactory>,
    video: Mutex<Option<VideoSlot>>,
    audio: Mutex<Option<Arc<AudioPlayer>>>,
    capture: CaptureController,
    debug_log: DebugLog,
    next_texture: AtomicU64,
}

impl MediaBridge {
    /// Validate both configurations and create the bridge.
    ///
    /// The returned [`CaptureEvents`] carry encoded units from every capture
    /// session the bridge starts.
    pub fn new(
        backends: MediaBackends,
        playout: PlayoutConfig,
        capture: CaptureConfig,
    ) -> Result<(Self, CaptureEvents)> {
        playout.validate()?;
        let (capture, events) = CaptureController::new(backends.capture, capture)?;

        let bridge = Self {
            clock: Arc::new(SyncClock::new(playout.target_latency_us)),
            playout,
            video_decoder: backends.video_decoder,
            audio_decoder: backends.audio_decoder,
            video: Mutex::new(None),
            audio: Mutex::new(None),
            capture,
            debug_log: DebugLog::new(),
            next_texture: AtomicU64::new(1),
        };
        Ok((bridge, events))
    }

    // Capture

    pub fn start_capture(&self, video_enabled: bool) -> Result<()> {
        self.capture.start_capture(video_enabled)
    }

    pub async fn stop_capture(&self) -> Result<()> {
        self.capture.stop_capture().await
    }

    pub fn set_bitrate(&self, bps: u32) -> Result<()> {
        self.capture.set_bitrate(bps)
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_running()
    }

    // Video playback

    /// Create the video player and start its decode timer.
    ///
    /// Idempotent: returns the existing handle when already initialized. Must
    /// be called within a tokio runtime.
    pub fn initialize_decoder(&self) -> TextureHandle {
        let mut slot = self.video.lock();
        if let Some(video) = slot.as_ref() {
            return video.texture;
        }

        let texture = TextureHandle(self.next_texture.fetch_add(1, Ordering::Relaxed));
        let player = VideoPlayer::spawn(&self.playout, Arc::clone(&self.clock), Arc::clone(&self.video_decoder));
        *slot = Some(VideoSlot { texture, player: Arc::new(player) });
        info!(texture = texture.0, "video decoder initialized");
        texture
    }

    /// Queue one Annex-B access unit. Negative PTS plays immediately.
    pub fn decode_frame(&self, access_unit: impl Into<Bytes>, pts: i64) -> Result<()> {
        let player = self.video_player()?;
        player.push(access_unit, pts_from_wire(pts));
        Ok(())
    }

    /// Latest-wins stream of decoded images for the texture.
    pub fn video_frames(&self, rate: UpdateRate) -> Result<Pin<Box<dyn Stream<Item = VideoFrame> + Send>>> {
        Ok(self.video_player()?.frames(rate))
    }

    pub fn latest_video_frame(&self) -> Option<VideoFrame> {
        self.video.lock().as_ref().and_then(|video| video.player.latest_frame())
    }

    pub fn video_stats(&self) -> Option<VideoStats> {
        self.video.lock().as_ref().map(|video| video.player.stats())
    }

    fn video_player(&self) -> Result<Arc<VideoPlayer>> {
        self.video
            .lock()
            .as_ref()
            .map(|video| Arc::clone(&video.player))
            .ok_or_else(|| MediaError::not_initialized("video decoder"))
    }

    // Audio playback

    /// Create the audio player. A no-op when already initialized.
    pub fn initialize_audio(&self) {
        let mut slot = self.audio.lock();
        if slot.is_some() {
            debug!("audio already initialized");
            return;
        }
        *slot = Some(Arc::new(AudioPlayer::new(
            &self.playout,
            Arc::clone(&self.clock),
            Arc::clone(&self.audio_decoder),
        )));
        info!(
            sample_rate = self.playout.audio_sample_rate,
            channels = self.playout.audio_channels,
            "audio initialized"
        );
    }

    /// Decode and queue one audio packet.
    ///
    /// `frames_per_packet` of 0 means unknown; `codec_id` is the wire id.
    pub fn push_audio_frame(
        &self,
        packet: impl Into<Bytes>,
        pts: i64,
        frames_per_packet: u32,
        codec_id: u8,
    ) -> Result<()> {
        let codec = Codec::from_wire_id(codec_id)?;
        if !codec.is_audio() {
            return Err(MediaError::config(format!("{codec} is not an audio codec")));
        }
        let player = self.audio_player()?;
        player.push(EncodedUnit::audio(codec, packet, pts_from_wire(pts), frames_per_packet));
        Ok(())
    }

    pub fn suspend_audio(&self) -> Result<()> {
        self.audio_player()?.suspend();
        Ok(())
    }

    pub fn resume_audio(&self) -> Result<()> {
        self.audio_player()?.resume();
        Ok(())
    }

    /// Output callback entry point. Outputs silence if audio is not
    /// initialized or the player slot is busy.
    pub fn render_audio(&self, out: &mut [f32]) -> usize {
        let player = self.audio.try_lock().and_then(|slot| slot.as_ref().map(Arc::clone));
        match player {
            Some(player) => player.render(out),
            None => {
                out.fill(0.0);
                0
            }
        }
    }

    /// The audio player itself, for output callbacks that hold on to it.
    pub fn audio_renderer(&self) -> Result<Arc<AudioPlayer>> {
        self.audio_player()
    }

    pub fn audio_stats(&self) -> Option<AudioStats> {
        self.audio.lock().as_ref().map(|player| player.stats())
    }

    fn audio_player(&self) -> Result<Arc<AudioPlayer>> {
        self.audio.lock().as_ref().map(Arc::clone).ok_or_else(|| MediaError::not_initialized("audio player"))
    }

    // Session

    /// End the playback session: clear both queues, release the codec
    /// sessions and reset the clock anchor.
    pub fn stop_playback(&self) {
        if let Some(video) = self.video.lock().take() {
            video.player.stop();
        }
        if let Some(audio) = self.audio.lock().take() {
            audio.stop();
        }
        self.clock.reset();
        info!("playback stopped");
    }

    pub fn clock(&self) -> &Arc<SyncClock> {
        &self.clock
    }

    // Debug surface

    /// Lines recorded by the debug ring.
    ///
    /// The ring only sees pipeline events once its layer is installed on a
    /// subscriber, see [`debug_log`](Self::debug_log).
    pub fn get_debug_logs(&self) -> Vec<String> {
        self.debug_log.lines()
    }

    pub fn clear_debug_logs(&self) {
        self.debug_log.clear();
    }

    /// Ring behind the debug surface, to be attached to the process subscriber
    /// with [`init_tracing`](crate::debug_log::init_tracing).
    pub fn debug_log(&self) -> &DebugLog {
        &self.debug_log
    }
}

impl Drop for MediaBridge {
    fn drop(&mut self) {
        self.stop_playback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        FakeAudioDecoderFactory, FakeCaptureBackend, FakeVideoDecoderFactory, hevc_access_unit,
    };
    use std::time::Duration;

    struct Fixture {
        bridge: MediaBridge,
        video: FakeVideoDecoderFactory,
        _events: CaptureEvents,
    }

    fn fixture() -> Fixture {
        let video = FakeVideoDecoderFactory::default();
        let backends = MediaBackends {
            video_decoder: Arc::new(video.clone()),
            audio_decoder: Arc::new(FakeAudioDecoderFactory::default()),
            capture: Arc::new(FakeCaptureBackend::default()),
        };
        let (bridge, events) =
            MediaBridge::new(backends, PlayoutConfig::default(), CaptureConfig::default()).unwrap();
        Fixture { bridge, video, _events: events }
    }

    #[tokio::test]
    async fn data_before_initialization_is_rejected() {
        let f = fixture();
        let err = f.bridge.decode_frame(hevc_access_unit(1), 1_000).unwrap_err();
        assert!(matches!(err, MediaError::NotInitialized { .. }));
        assert!(f.bridge.push_audio_frame(vec![0xF8], 1_000, 0, 3).is_err());
        assert!(f.bridge.suspend_audio().is_err());
    }

    #[tokio::test]
    async fn unknown_or_video_codec_ids_are_rejected_for_audio() {
        let f = fixture();
        f.bridge.initialize_audio();
        assert!(matches!(
            f.bridge.push_audio_frame(vec![0xF8], 1_000, 0, 9).unwrap_err(),
            MediaError::UnknownCodec { id: 9 }
        ));
        assert!(f.bridge.push_audio_frame(vec![0xF8], 1_000, 0, 1).is_err());
    }

    #[tokio::test]
    async fn audio_round_trip_through_render() {
        let f = fixture();
        f.bridge.initialize_audio();
        f.bridge.initialize_audio();
        f.bridge.push_audio_frame(vec![0xF8, 0x01], 40_000, 0, 3).unwrap();

        let mut out = vec![0.0f32; 960];
        assert_eq!(f.bridge.render_audio(&mut out), 960);
        assert_eq!(f.bridge.audio_stats().map(|s| s.queue.rendered), Some(1));
    }

    #[tokio::test]
    async fn render_without_audio_is_silent() {
        let f = fixture();
        let mut out = vec![1.0f32; 32];
        assert_eq!(f.bridge.render_audio(&mut out), 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn decode_timer_publishes_frames() {
        let f = fixture();
        f.bridge.initialize_decoder();
        f.bridge.decode_frame(hevc_access_unit(1), 2_000_000).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.bridge.latest_video_frame().map(|frame| frame.pts_us), Some(2_000_000));
        assert!(f.bridge.clock().is_anchored());
    }

    #[tokio::test]
    async fn stop_playback_resets_session() {
        let f = fixture();
        let first = f.bridge.initialize_decoder();
        f.bridge.initialize_audio();
        f.bridge.clock().anchor_if_needed(1_000_000, "test");

        f.bridge.stop_playback();
        assert!(!f.bridge.clock().is_anchored());
        assert!(f.bridge.decode_frame(hevc_access_unit(1), 1).is_err());
        assert!(f.bridge.audio_stats().is_none());

        let second = f.bridge.initialize_decoder();
        assert_ne!(first, second);
        assert_eq!(f.video.sessions_created(), 0);
    }

    #[tokio::test]
    async fn capture_controls_are_forwarded() {
        let f = fixture();
        assert!(matches!(f.bridge.stop_capture().await.unwrap_err(), MediaError::NotRunning { .. }));
        f.bridge.start_capture(false).unwrap();
        assert!(f.bridge.is_capturing());
        f.bridge.set_bitrate(500_000).unwrap();
        f.bridge.stop_capture().await.unwrap();
        assert!(!f.bridge.is_capturing());
    }

    #[test]
    fn debug_surface_reads_and_clears() {
        let f = fixture();
        f.bridge.debug_log().push("decoder session created");
        assert_eq!(f.bridge.get_debug_logs(), vec!["decoder session created"]);
        f.bridge.clear_debug_logs();
        assert!(f.bridge.get_debug_logs().is_empty());
    }

    #[test]
    fn pipeline_events_reach_attached_debug_log() {
        use tracing_subscriber::layer::SubscriberExt;

        let f = fixture();
        let subscriber = tracing_subscriber::registry().with(f.bridge.debug_log().layer());
        tracing::subscriber::with_default(subscriber, || {
            f.bridge.clock().anchor_if_needed(1_000_000, "video keyframe");
        });

        let logs = f.bridge.get_debug_logs();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].starts_with("INFO "));
        assert!(logs[0].contains("playback clock anchored"));
        assert!(logs[0].contains("remote_pts_us=1000000"));
    }
}

//! Capture driver spawns and manages the encode task

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{AudioPacketizer, CaptureEvents, CaptureSource, CapturedSample, frame_video_sample};
use crate::codec::{AudioEncodeSession, EncodedVideoSample, SessionRegistry, VideoEncodeSession};
use crate::types::{CaptureConfig, EncodedUnit};

/// Consecutive source errors tolerated before the task gives up.
const MAX_ERRORS: u32 = 10;

/// Devices and codec sessions owned by one capture session.
pub struct CaptureSession {
    pub source: Box<dyn CaptureSource>,
    pub video_encoder: Option<Box<dyn VideoEncodeSession>>,
    pub audio_encoder: Option<Box<dyn AudioEncodeSession>>,
    /// Output of the video encoder's sink
    pub encoded_samples: mpsc::UnboundedReceiver<EncodedVideoSample>,
    /// Registry the encoder sink was issued from
    pub registry: Arc<SessionRegistry>,
}

/// Sending ends of the outbound unit channels.
#[derive(Debug, Clone)]
pub struct CaptureOutputs {
    pub video: mpsc::Sender<EncodedUnit>,
    pub audio: mpsc::Sender<EncodedUnit>,
}

impl CaptureOutputs {
    /// Create both outbound channels with `capacity` slots each.
    pub fn channel(capacity: usize) -> (Self, CaptureEvents) {
        let (video_tx, video_rx) = mpsc::channel(capacity.max(1));
        let (audio_tx, audio_rx) = mpsc::channel(capacity.max(1));
        (Self { video: video_tx, audio: audio_tx }, CaptureEvents { video: video_rx, audio: audio_rx })
    }
}

/// Counters reported when the capture task ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    pub video_frames: u64,
    pub audio_chunks: u64,
    pub video_units: u64,
    pub audio_units: u64,
    /// Units dropped because an outbound channel was full or closed
    pub dropped_units: u64,
    pub encode_failures: u64,
}

/// Control handle of a running capture task.
pub struct DriverHandle {
    cancel: CancellationToken,
    bitrate: watch::Sender<u32>,
    task: Option<JoinHandle<CaptureStats>>,
}

impl DriverHandle {
    /// Forward a new bitrate to the live encoder session.
    pub fn set_bitrate(&self, bps: u32) {
        self.bitrate.send_replace(bps);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel the task and wait for the encoder to flush.
    pub async fn shutdown(self) -> Option<CaptureStats> {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the task to end on its own.
    pub async fn join(mut self) -> Option<CaptureStats> {
        let task = self.task.take()?;
        match task.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!("capture task failed: {}", e);
                None
            }
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawns the capture/encode task.
pub struct CaptureDriver;

impl CaptureDriver {
    /// Spawn the capture task for `session`.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(
        session: CaptureSession,
        config: &CaptureConfig,
        outputs: CaptureOutputs,
        initial_bitrate_bps: u32,
    ) -> DriverHandle {
        let (bitrate_tx, bitrate_rx) = watch::channel(initial_bitrate_bps);
        let cancel = CancellationToken::new();
        let packetizer = AudioPacketizer::new(config);

        let cancel_task = cancel.clone();
        let task = tokio::spawn(async move {
            Self::capture_task(session, packetizer, outputs, bitrate_rx, cancel_task).await
        });

        DriverHandle { cancel, bitrate: bitrate_tx, task: Some(task) }
    }

    async fn capture_task(
        mut session: CaptureSession,
        mut packetizer: AudioPacketizer,
        outputs: CaptureOutputs,
        mut bitrate_rx: watch::Receiver<u32>,
        cancel: CancellationToken,
    ) -> CaptureStats {
        info!(video = session.video_encoder.is_some(), "capture task started");
        let mut stats = CaptureStats::default();
        let mut error_count = 0u32;
        let mut bitrate_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("capture cancelled");
                    break;
                }
                changed = bitrate_rx.changed(), if bitrate_open => {
                    if changed.is_err() {
                        bitrate_open = false;
                        continue;
                    }
                    let bps = *bitrate_rx.borrow_and_update();
                    if let Some(encoder) = session.video_encoder.as_mut() {
                        match encoder.set_bitrate(bps) {
                            Ok(()) => info!(bps, "video bitrate updated"),
                            Err(e) => warn!(bps, "failed to apply bitrate: {}", e),
                        }
                    }
                }
                Some(sample) = session.encoded_samples.recv() => {
                    Self::emit_video(&outputs, &sample, &mut stats);
                }
                result = session.source.next_sample() => match result {
                    Ok(Some(CapturedSample::Video(frame))) => {
                        error_count = 0;
                        stats.video_frames += 1;
                        if let Some(encoder) = session.video_encoder.as_mut()
                            && let Err(e) = encoder.encode(&frame)
                        {
                            stats.encode_failures += 1;
                            warn!(pts_us = frame.pts_us, "video encode failed: {}", e);
                        }
                    }
                    Ok(Some(CapturedSample::Audio(pcm))) => {
                        error_count = 0;
                        let Some(encoder) = session.audio_encoder.as_mut() else {
                            continue;
                        };
                        for chunk in packetizer.push(&pcm) {
                            stats.audio_chunks += 1;
                            match encoder.encode(&chunk) {
                                Ok(packets) => {
                                    for unit in packetizer.packetize(chunk.pts_us(), packets) {
                                        Self::emit(&outputs.audio, unit, &mut stats.audio_units, &mut stats.dropped_units);
                                    }
                                }
                                Err(e) => {
                                    stats.encode_failures += 1;
                                    warn!(pts_us = chunk.pts_us(), "audio encode failed: {}", e);
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        info!("capture source ended");
                        break;
                    }
                    Err(e) => {
                        error_count += 1;
                        error!("Capture source error ({}/{}): {}", error_count, MAX_ERRORS, e);

                        if error_count >= MAX_ERRORS {
                            error!("Too many capture errors, shutting down");
                            break;
                        }

                        // Exponential backoff: 50ms, 100ms, 200ms, ...
                        let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                }
            }
        }

        if let Some(mut encoder) = session.video_encoder.take() {
            encoder.finish_pending();
            while let Ok(sample) = session.encoded_samples.try_recv() {
                Self::emit_video(&outputs, &sample, &mut stats);
            }
            encoder.invalidate();
        }
        session.registry.invalidate();
        session.source.stop();

        info!(
            video_units = stats.video_units,
            audio_units = stats.audio_units,
            dropped = stats.dropped_units,
            "capture task ended"
        );
        stats
    }

    fn emit_video(outputs: &CaptureOutputs, sample: &EncodedVideoSample, stats: &mut CaptureStats) {
        match frame_video_sample(sample) {
            Some(unit) => Self::emit(&outputs.video, unit, &mut stats.video_units, &mut stats.dropped_units),
            None => debug!(pts_us = sample.pts_us, "encoder sample had no NAL units"),
        }
    }

    fn emit(tx: &mpsc::Sender<EncodedUnit>, unit: EncodedUnit, sent: &mut u64, dropped: &mut u64) {
        let pts_us = unit.pts_us();
        match tx.try_send(unit) {
            Ok(()) => {
                *sent += 1;
                trace!(pts_us, "emitted unit");
            }
            Err(TrySendError::Full(_)) => {
                *dropped += 1;
                debug!(pts_us, "outbound channel full, unit dropped");
            }
            Err(TrySendError::Closed(_)) => {
                *dropped += 1;
                trace!(pts_us, "outbound channel closed, unit dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeCaptureBackend, ScriptedSource};
    use crate::capture::CaptureBackend;
    use crate::codec::EncodedSampleSink;
    use crate::types::{PcmChunk, VideoFrame};

    fn session(backend: &FakeCaptureBackend, source: ScriptedSource) -> CaptureSession {
        let registry = SessionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let video_encoder =
            backend.create_video_encoder(64, 48, 1_000_000, 30, EncodedSampleSink::new(registry.begin(), tx)).unwrap();
        let audio_encoder = backend.create_audio_encoder(crate::Codec::Opus, 48_000, 1).unwrap();
        CaptureSession {
            source: Box::new(source),
            video_encoder: Some(video_encoder),
            audio_encoder: Some(audio_encoder),
            encoded_samples: rx,
            registry,
        }
    }

    #[tokio::test]
    async fn frames_and_packets_flow_to_separate_channels() {
        let _ = tracing_subscriber::fmt::try_init();
        let backend = FakeCaptureBackend::default();
        let source = ScriptedSource::new(vec![
            Ok(CapturedSample::Video(VideoFrame::new(33_333, 64, 48, vec![0u8; 16]))),
            Ok(CapturedSample::Audio(PcmChunk::new(40_000, 48_000, 1, vec![0.2; 960]))),
            Ok(CapturedSample::Video(VideoFrame::new(66_666, 64, 48, vec![0u8; 16]))),
        ]);

        let (outputs, mut events) = CaptureOutputs::channel(16);
        let handle = CaptureDriver::spawn(session(&backend, source), &CaptureConfig::default(), outputs, 1_000_000);

        let first = events.video.recv().await.unwrap();
        assert!(first.is_keyframe());
        assert_eq!(first.pts_us(), 33_333);

        let audio = events.audio.recv().await.unwrap();
        assert_eq!(audio.pts_us(), 40_000);
        assert_eq!(audio.frames_per_packet(), Some(960));

        let second = events.video.recv().await.unwrap();
        assert!(!second.is_keyframe());

        let stats = handle.shutdown().await.unwrap();
        assert_eq!(stats.video_units, 2);
        assert_eq!(stats.audio_units, 1);
    }

    #[tokio::test]
    async fn encode_failures_skip_the_sample_and_keep_capturing() {
        let backend = FakeCaptureBackend::default();
        backend.fail_next_video_encodes(1);
        backend.fail_next_audio_encodes(1);
        let source = ScriptedSource::new(vec![
            Ok(CapturedSample::Video(VideoFrame::new(33_333, 64, 48, vec![0u8; 16]))),
            Ok(CapturedSample::Video(VideoFrame::new(66_666, 64, 48, vec![0u8; 16]))),
            Ok(CapturedSample::Audio(PcmChunk::new(40_000, 48_000, 1, vec![0.2; 960]))),
            Ok(CapturedSample::Audio(PcmChunk::new(60_000, 48_000, 1, vec![0.2; 960]))),
        ])
        .hold_open();
        let stopped = source.stopped_flag();

        let (outputs, mut events) = CaptureOutputs::channel(16);
        let handle = CaptureDriver::spawn(session(&backend, source), &CaptureConfig::default(), outputs, 1_000_000);

        let video = events.video.recv().await.unwrap();
        assert_eq!(video.pts_us(), 66_666);
        assert!(video.is_keyframe());
        let audio = events.audio.recv().await.unwrap();
        assert_eq!(audio.pts_us(), 60_000);

        let stats = handle.shutdown().await.unwrap();
        assert_eq!(stats.encode_failures, 2);
        assert_eq!(stats.video_frames, 2);
        assert_eq!(stats.audio_chunks, 2);
        assert_eq!(stats.video_units, 1);
        assert_eq!(stats.audio_units, 1);
        assert_eq!(backend.video_sessions_created(), 1);
        assert!(stopped.load(std::sync::atomic::Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_repeated_source_errors() {
        let backend = FakeCaptureBackend::default();
        let script = (0..MAX_ERRORS).map(|_| Err(crate::MediaError::capture_setup("device lost"))).collect();
        let (outputs, _events) = CaptureOutputs::channel(4);
        let handle = CaptureDriver::spawn(
            session(&backend, ScriptedSource::new(script).hold_open()),
            &CaptureConfig::default(),
            outputs,
            1_000_000,
        );

        let stats = handle.join().await.unwrap();
        assert_eq!(stats.video_frames, 0);
        assert_eq!(backend.video_sessions_invalidated(), 1);
    }

    #[tokio::test]
    async fn bitrate_changes_reach_live_encoder() {
        let backend = FakeCaptureBackend::default();
        let (outputs, _events) = CaptureOutputs::channel(4);
        let handle = CaptureDriver::spawn(
            session(&backend, ScriptedSource::new(Vec::new()).hold_open()),
            &CaptureConfig::default(),
            outputs,
            1_000_000,
        );

        handle.set_bitrate(750_000);
        tokio::time::timeout(Duration::from_secs(1), async {
            while backend.last_bitrate() != Some(750_000) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(backend.video_sessions_created(), 1);
        handle.shutdown().await;
    }
}

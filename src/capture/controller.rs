//! Capture control plane

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{CaptureBackend, CaptureDriver, CaptureEvents, CaptureOutputs, CaptureSession, CaptureSource, DriverHandle};
use crate::codec::{EncodedSampleSink, SessionRegistry};
use crate::types::CaptureConfig;
use crate::{MediaError, Result};

/// Starts and stops capture sessions and forwards bitrate changes.
///
/// The outbound channels outlive individual sessions: units from every
/// session arrive on the same [`CaptureEvents`].
pub struct CaptureController {
    backend: Arc<dyn CaptureBackend>,
    config: CaptureConfig,
    outputs: CaptureOutputs,
    bitrate_bps: AtomicU32,
    running: Mutex<Option<DriverHandle>>,
}

impl CaptureController {
    pub fn new(backend: Arc<dyn CaptureBackend>, config: CaptureConfig) -> Result<(Self, CaptureEvents)> {
        config.validate()?;
        let (outputs, events) = CaptureOutputs::channel(config.event_capacity);
        let controller = Self {
            backend,
            bitrate_bps: AtomicU32::new(config.initial_bitrate_bps),
            config,
            outputs,
            running: Mutex::new(None),
        };
        Ok((controller, events))
    }

    /// Open devices and encoders and start the capture task.
    ///
    /// Starting while already running is a no-op. Setup failures (permission,
    /// missing device, encoder creation) are returned as-is.
    pub fn start_capture(&self, video_enabled: bool) -> Result<()> {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("capture already running");
            return Ok(());
        }

        let mut source = self.backend.open_source(video_enabled)?;
        let session = match self.open_encoders(source.as_ref(), video_enabled) {
            Ok((video_encoder, audio_encoder, encoded_samples, registry)) => CaptureSession {
                source,
                video_encoder,
                audio_encoder: Some(audio_encoder),
                encoded_samples,
                registry,
            },
            Err(e) => {
                source.stop();
                return Err(e);
            }
        };

        let bitrate = self.bitrate_bps.load(Ordering::Acquire);
        *running = Some(CaptureDriver::spawn(session, &self.config, self.outputs.clone(), bitrate));
        info!(video_enabled, bitrate, "capture started");
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn open_encoders(
        &self,
        source: &dyn CaptureSource,
        video_enabled: bool,
    ) -> Result<(
        Option<Box<dyn crate::codec::VideoEncodeSession>>,
        Box<dyn crate::codec::AudioEncodeSession>,
        mpsc::UnboundedReceiver<crate::codec::EncodedVideoSample>,
        Arc<SessionRegistry>,
    )> {
        let registry = SessionRegistry::new();
        let (sample_tx, sample_rx) = mpsc::unbounded_channel();

        let video_encoder = if video_enabled {
            let (width, height) = source
                .video_dimensions()
                .ok_or_else(|| MediaError::DeviceUnavailable { device: "camera".to_string() })?;
            Some(self.backend.create_video_encoder(
                width,
                height,
                self.bitrate_bps.load(Ordering::Acquire),
                self.config.expected_frame_rate,
                EncodedSampleSink::new(registry.begin(), sample_tx),
            )?)
        } else {
            None
        };

        let audio_encoder = self.backend.create_audio_encoder(
            self.config.audio_codec,
            self.config.audio_sample_rate,
            self.config.audio_channels,
        )?;

        Ok((video_encoder, audio_encoder, sample_rx, registry))
    }

    /// Stop the running session and wait for the encoder to flush.
    pub async fn stop_capture(&self) -> Result<()> {
        let Some(handle) = self.running.lock().take() else {
            return Err(MediaError::not_running("capture"));
        };
        let stats = handle.shutdown().await;
        info!(?stats, "capture stopped");
        Ok(())
    }

    /// Change the video bitrate, live if a session is running.
    pub fn set_bitrate(&self, bps: u32) -> Result<()> {
        if bps == 0 {
            return Err(MediaError::config("bitrate must be > 0"));
        }
        self.bitrate_bps.store(bps, Ordering::Release);
        if let Some(handle) = self.running.lock().as_ref() {
            handle.set_bitrate(bps);
        }
        debug!(bps, "bitrate set");
        Ok(())
    }

    pub fn bitrate_bps(&self) -> u32 {
        self.bitrate_bps.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

//! Timer-driven HEVC decode driver

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::VideoStats;
use crate::bitstream::{ParameterSetCache, contains_keyframe, split_annex_b_bytes, to_length_prefixed};
use crate::clock::SyncClock;
use crate::codec::{FrameSink, SessionRegistry, VideoDecodeSession, VideoDecoderFactory};
use crate::queue::{AnchorRule, PlayoutQueue};
use crate::stream::PaceExt;
use crate::types::{EncodedUnit, PlayoutConfig, UpdateRate, VideoFrame};
use crate::{MediaError, Result};

/// Codec presentation timescale used for untimed units.
const SYNTHETIC_TIMESCALE: u64 = 30;

/// Decoder session plus the bitstream state it was built from.
struct DecoderState {
    parameter_sets: ParameterSetCache,
    session: Option<Box<dyn VideoDecodeSession>>,
    presentation_counter: u64,
    submitted: u64,
    failures: u64,
    rebuilds: u64,
}

impl DecoderState {
    fn new() -> Self {
        Self {
            parameter_sets: ParameterSetCache::new(),
            session: None,
            presentation_counter: 0,
            submitted: 0,
            failures: 0,
            rebuilds: 0,
        }
    }
}

struct Shared {
    queue: Mutex<PlayoutQueue<EncodedUnit>>,
    decoder: Mutex<DecoderState>,
    clock: Arc<SyncClock>,
    factory: Arc<dyn VideoDecoderFactory>,
    registry: Arc<SessionRegistry>,
    latest: Arc<watch::Sender<Option<VideoFrame>>>,
}

/// Receive-side video driver.
///
/// Access units are queued on arrival, released against the shared clock by a
/// periodic tick, decoded through the external session and published as a
/// single latest frame.
pub struct VideoPlayer {
    shared: Arc<Shared>,
    poll_interval: Duration,
    frame_rate: f64,
    cancel: CancellationToken,
}

impl VideoPlayer {
    /// Create a player without starting its decode timer.
    ///
    /// Call [`tick`](Self::tick) manually or [`start`](Self::start) the timer.
    pub fn new(config: &PlayoutConfig, clock: Arc<SyncClock>, factory: Arc<dyn VideoDecoderFactory>) -> Self {
        let (latest, _) = watch::channel(None);
        let shared = Shared {
            queue: Mutex::new(PlayoutQueue::new("video", config.video, AnchorRule::KeyframeOnly)),
            decoder: Mutex::new(DecoderState::new()),
            clock,
            factory,
            registry: SessionRegistry::new(),
            latest: Arc::new(latest),
        };

        Self {
            shared: Arc::new(shared),
            poll_interval: Duration::from_millis(config.video_poll_interval_ms),
            frame_rate: config.video_frame_rate,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a player and start its decode timer on the current runtime.
    pub fn spawn(config: &PlayoutConfig, clock: Arc<SyncClock>, factory: Arc<dyn VideoDecoderFactory>) -> Self {
        let player = Self::new(config, clock, factory);
        player.start();
        player
    }

    /// Start the periodic decode task. Must be called within a tokio runtime.
    pub fn start(&self) {
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        let period = self.poll_interval;

        tokio::spawn(async move {
            info!(period_ms = period.as_millis() as u64, "video decode task started");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks = 0u64;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        ticks += 1;
                        shared.tick();
                    }
                }
            }

            info!(ticks, "video decode task ended");
        });
    }

    /// Queue one Annex-B access unit.
    ///
    /// Keyframe status is derived from the NAL types in the payload. Empty
    /// payloads are ignored.
    pub fn push(&self, access_unit: impl Into<Bytes>, pts_us: u64) {
        let payload = access_unit.into();
        if payload.is_empty() {
            return;
        }

        let is_keyframe = contains_keyframe(&payload);
        trace!(pts_us, len = payload.len(), is_keyframe, "queued access unit");
        self.shared.queue.lock().insert(EncodedUnit::video(payload, pts_us, is_keyframe));
    }

    /// Drain playable units and submit them to the decoder.
    ///
    /// Returns the number of access units taken from the queue.
    pub fn tick(&self) -> usize {
        self.shared.tick()
    }

    /// Most recently decoded image.
    pub fn latest_frame(&self) -> Option<VideoFrame> {
        self.shared.latest.borrow().clone()
    }

    /// Decoded frames as a latest-wins stream, optionally paced.
    ///
    /// The stream yields the current frame (if any) immediately.
    pub fn frames(&self, rate: UpdateRate) -> Pin<Box<dyn Stream<Item = VideoFrame> + Send>> {
        let frames = WatchStream::new(self.shared.latest.subscribe()).filter_map(|frame| async move { frame });

        match rate.pacing_interval(self.frame_rate) {
            None => frames.boxed(),
            Some(period) => frames.pace(period).boxed(),
        }
    }

    pub fn stats(&self) -> VideoStats {
        let decoder = self.shared.decoder.lock();
        VideoStats {
            queue: self.shared.queue.lock().stats(),
            submitted: decoder.submitted,
            decode_failures: decoder.failures,
            session_rebuilds: decoder.rebuilds,
        }
    }

    /// Stop the timer, clear the queue and release the decoder session.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.shared.queue.lock().clear();
        {
            let mut decoder = self.shared.decoder.lock();
            self.shared.teardown_session(&mut decoder);
            decoder.parameter_sets.clear();
        }
        self.shared.latest.send_replace(None);
        info!("video player stopped");
    }
}

impl Drop for VideoPlayer {
    fn drop(&mut self) {
        debug!("dropping video player");
        self.cancel.cancel();
    }
}

impl Shared {
    fn tick(&self) -> usize {
        let units = self.queue.lock().drain(&self.clock);
        if units.is_empty() {
            return 0;
        }

        let mut decoder = self.decoder.lock();
        for unit in &units {
            self.decode_access_unit(&mut decoder, unit);
        }
        units.len()
    }

    fn decode_access_unit(&self, decoder: &mut DecoderState, unit: &EncodedUnit) {
        let mut vcl_units = Vec::new();
        for nal in split_annex_b_bytes(unit.payload()) {
            if decoder.parameter_sets.observe(&nal).is_some_and(|kind| kind.is_vcl()) {
                vcl_units.push(nal);
            }
        }

        if vcl_units.is_empty() {
            return;
        }

        if let Err(e) = self.ensure_session(decoder) {
            warn!(pts_us = unit.pts_us(), "decoder setup failed: {}", e);
            return;
        }

        for nal in vcl_units {
            let pts_us = if unit.is_timed() {
                unit.pts_us()
            } else {
                let pts = decoder.presentation_counter * 1_000_000 / SYNTHETIC_TIMESCALE;
                decoder.presentation_counter += 1;
                pts
            };

            let Some(session) = decoder.session.as_mut() else {
                return;
            };
            let result = to_length_prefixed(&nal).and_then(|sample| session.decode(&sample, pts_us));
            match result {
                Ok(()) => decoder.submitted += 1,
                Err(e) => {
                    decoder.failures += 1;
                    warn!(pts_us, "decode failed: {}", e);
                }
            }
        }
    }

    fn ensure_session(&self, decoder: &mut DecoderState) -> Result<()> {
        if decoder.session.is_some() && !decoder.parameter_sets.needs_rebuild() {
            return Ok(());
        }

        let parameter_sets = decoder.parameter_sets.parameter_sets().ok_or(MediaError::MissingParameterSets)?;

        self.teardown_session(decoder);

        let sink = FrameSink::new(self.registry.begin(), Arc::clone(&self.latest));
        let session = self.factory.create_session(&parameter_sets, sink)?;
        decoder.session = Some(session);
        decoder.parameter_sets.mark_rebuilt();
        decoder.rebuilds += 1;
        info!(rebuilds = decoder.rebuilds, "decoder session created");
        Ok(())
    }

    /// Wait for in-flight output, then invalidate; late callbacks are orphaned.
    fn teardown_session(&self, decoder: &mut DecoderState) {
        if let Some(mut session) = decoder.session.take() {
            session.finish_pending();
            session.invalidate();
            debug!("decoder session invalidated");
        }
        self.registry.invalidate();
        decoder.presentation_counter = 0;
    }
}

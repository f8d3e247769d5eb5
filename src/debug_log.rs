//! In-memory debug log ring
//!
//! The application shell has no access to the process log, so the pipeline
//! keeps its most recent lifecycle and warning events in a bounded ring that
//! the bridge hands out on request. The ring is fed by a `tracing` layer and
//! sees the same events as the regular subscriber.
//!
//! ```rust
//! use avsync::debug_log::DebugLog;
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! let log = DebugLog::new();
//! let subscriber = tracing_subscriber::registry().with(log.layer());
//! tracing::subscriber::with_default(subscriber, || {
//!     tracing::info!(bitrate = 2_000_000, "capture started");
//! });
//! let lines = log.lines();
//! assert!(lines[0].starts_with("INFO "));
//! assert!(lines[0].ends_with(": capture started bitrate=2000000"));
//! ```

use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Lines kept before the oldest is discarded.
pub const DEFAULT_CAPACITY: usize = 512;

#[derive(Debug)]
struct Ring {
    lines: VecDeque<String>,
    capacity: usize,
}

/// Bounded, shareable log buffer.
#[derive(Debug, Clone)]
pub struct DebugLog {
    ring: Arc<Mutex<Ring>>,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { ring: Arc::new(Mutex::new(Ring { lines: VecDeque::with_capacity(capacity), capacity })) }
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut ring = self.ring.lock();
        if ring.lines.len() == ring.capacity {
            ring.lines.pop_front();
        }
        ring.lines.push_back(line.into());
    }

    /// Snapshot of the buffered lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.ring.lock().lines.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.ring.lock().lines.clear();
    }

    pub fn len(&self) -> usize {
        self.ring.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().lines.is_empty()
    }

    /// Layer recording every `INFO`-or-above event into this ring.
    pub fn layer(&self) -> DebugLogLayer {
        DebugLogLayer { log: self.clone(), max_level: Level::INFO }
    }
}

/// `tracing` layer that formats events into a [`DebugLog`].
#[derive(Debug, Clone)]
pub struct DebugLogLayer {
    log: DebugLog,
    max_level: Level,
}

impl DebugLogLayer {
    /// Record events up to and including `level` in verbosity.
    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }
}

impl<S: Subscriber> Layer<S> for DebugLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > self.max_level {
            return;
        }

        let mut line = LineVisitor::default();
        event.record(&mut line);
        self.log.push(format!("{} {}: {}{}", metadata.level(), metadata.target(), line.message, line.fields));
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Install the process subscriber: `RUST_LOG` (or `default_filter`), fmt
/// output and the debug ring.
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing(default_filter: &str, log: &DebugLog) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(log.layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, info, warn};

    fn capture(log: &DebugLog, f: impl FnOnce()) {
        let subscriber = tracing_subscriber::registry().with(log.layer());
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn ring_discards_oldest() {
        let log = DebugLog::with_capacity(2);
        log.push("a");
        log.push("b");
        log.push("c");
        assert_eq!(log.lines(), vec!["b", "c"]);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn layer_records_info_and_above() {
        let log = DebugLog::new();
        capture(&log, || {
            debug!("not recorded");
            info!(session = 3, "decoder session created");
            warn!("decode failed: {}", "bad slice");
        });

        let lines = log.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "INFO avsync::debug_log::tests: decoder session created session=3");
        assert!(lines[1].starts_with("WARN"));
        assert!(lines[1].ends_with("decode failed: bad slice"));
    }

    #[test]
    fn max_level_can_be_raised() {
        let log = DebugLog::new();
        let subscriber = tracing_subscriber::registry().with(log.layer().with_max_level(Level::DEBUG));
        tracing::subscriber::with_default(subscriber, || debug!(name = "clip", "queued"));
        assert_eq!(log.lines(), vec!["DEBUG avsync::debug_log::tests: queued name=clip"]);
    }
}

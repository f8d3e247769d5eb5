//! Parameter-set tracking for decoder session lifecycle
//!
//! The decoder format description is derived from the most recent VPS, SPS and
//! PPS. When any of them changes byte-wise the session has to be rebuilt; a
//! repeat of identical parameter sets (sent with every keyframe) must not
//! trigger a rebuild.

use bytes::Bytes;
use tracing::debug;

use super::nal::{NalKind, classify_nal};

/// A complete VPS/SPS/PPS triple, ready to describe a decoder format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcParameterSets {
    pub vps: Bytes,
    pub sps: Bytes,
    pub pps: Bytes,
}

impl HevcParameterSets {
    /// VPS, SPS, PPS in the order format descriptions expect.
    pub fn as_slices(&self) -> [&[u8]; 3] {
        [&self.vps[..], &self.sps[..], &self.pps[..]]
    }
}

#[derive(Debug, Default)]
pub struct ParameterSetCache {
    vps: Option<Bytes>,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    needs_rebuild: bool,
}

impl ParameterSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `nal` and store it if it is a parameter set.
    ///
    /// Returns the classification so callers can route VCL units in the same
    /// pass. Empty payloads return `None`.
    pub fn observe(&mut self, nal: &Bytes) -> Option<NalKind> {
        let kind = classify_nal(nal)?;
        let slot = match kind {
            NalKind::Vps => &mut self.vps,
            NalKind::Sps => &mut self.sps,
            NalKind::Pps => &mut self.pps,
            _ => return Some(kind),
        };

        if slot.as_ref() != Some(nal) {
            debug!(?kind, len = nal.len(), "parameter set changed");
            *slot = Some(nal.clone());
            self.needs_rebuild = true;
        }
        Some(kind)
    }

    pub fn is_complete(&self) -> bool {
        self.vps.is_some() && self.sps.is_some() && self.pps.is_some()
    }

    pub fn parameter_sets(&self) -> Option<HevcParameterSets> {
        Some(HevcParameterSets {
            vps: self.vps.clone()?,
            sps: self.sps.clone()?,
            pps: self.pps.clone()?,
        })
    }

    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// Acknowledge that a session was built from the current parameter sets.
    pub fn mark_rebuilt(&mut self) {
        self.needs_rebuild = false;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

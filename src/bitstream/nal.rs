//! HEVC NAL unit classification

/// NAL unit type of a video parameter set.
pub const NAL_VPS: u8 = 32;
/// NAL unit type of a sequence parameter set.
pub const NAL_SPS: u8 = 33;
/// NAL unit type of a picture parameter set.
pub const NAL_PPS: u8 = 34;

/// Inclusive range of VCL (coded slice) NAL types.
const VCL_TYPES: std::ops::RangeInclusive<u8> = 0..=31;
/// Inclusive range of IRAP (random access point) NAL types: BLA, IDR and CRA.
const IRAP_TYPES: std::ops::RangeInclusive<u8> = 16..=21;

/// What a NAL unit means to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalKind {
    Vps,
    Sps,
    Pps,
    /// Coded slice data; `irap` marks a random access point
    Vcl { irap: bool },
    /// SEI, AUD and anything else the pipeline passes through untouched
    Other(u8),
}

impl NalKind {
    pub fn from_type(nal_type: u8) -> Self {
        match nal_type {
            NAL_VPS => NalKind::Vps,
            NAL_SPS => NalKind::Sps,
            NAL_PPS => NalKind::Pps,
            t if VCL_TYPES.contains(&t) => NalKind::Vcl { irap: IRAP_TYPES.contains(&t) },
            t => NalKind::Other(t),
        }
    }

    pub fn is_parameter_set(self) -> bool {
        matches!(self, NalKind::Vps | NalKind::Sps | NalKind::Pps)
    }

    pub fn is_vcl(self) -> bool {
        matches!(self, NalKind::Vcl { .. })
    }

    pub fn is_irap(self) -> bool {
        matches!(self, NalKind::Vcl { irap: true })
    }
}

/// `(first_byte >> 1) & 0x3F`, or `None` for an empty payload.
pub fn nal_unit_type(nal: &[u8]) -> Option<u8> {
    nal.first().map(|b| (b >> 1) & 0x3F)
}

pub fn classify_nal(nal: &[u8]) -> Option<NalKind> {
    nal_unit_type(nal).map(NalKind::from_type)
}

/// True when any NAL in the Annex-B access unit is an IRAP slice.
pub fn contains_keyframe(access_unit: &[u8]) -> bool {
    super::split_annex_b(access_unit).any(|nal| classify_nal(nal).is_some_and(NalKind::is_irap))
}

//! Bitstream framing for the wire formats
//!
//! Video travels as HEVC Annex-B access units; audio as raw Opus or AAC
//! packets. This module holds the pure byte-level helpers both directions of
//! the pipeline share:
//!
//! - [`annexb`]: start-code splitting, access-unit assembly and the
//!   length-prefixed conversion hardware codecs use
//! - [`nal`]: NAL type classification (parameter sets, VCL, IRAP)
//! - [`parameter_sets`]: VPS/SPS/PPS cache that decides when a decoder session
//!   has to be rebuilt
//! - [`opus`]: packet duration inference from the Opus TOC byte
//!
//! None of these functions fail on malformed input.

pub mod annexb;
pub mod nal;
pub mod opus;
pub mod parameter_sets;

pub use annexb::{
    AnnexBNals, LengthPrefixedNals, START_CODE, assemble_annex_b, find_start_code,
    length_prefixed_nals, split_annex_b, split_annex_b_bytes, to_length_prefixed,
};
pub use nal::{NalKind, classify_nal, contains_keyframe, nal_unit_type};
pub use opus::{MAX_PACKET_SAMPLES, infer_opus_frame_duration};
pub use parameter_sets::{HevcParameterSets, ParameterSetCache};

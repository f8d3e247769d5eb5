//! Encoder output to wire framing

use tracing::trace;

use crate::bitstream::{HevcParameterSets, assemble_annex_b, length_prefixed_nals};
use crate::codec::EncodedVideoSample;
use crate::types::EncodedUnit;

/// Turn one length-prefixed encoder sample into a self-describing Annex-B unit.
///
/// Keyframes are prefixed with VPS, SPS and PPS so a receiver can join at any
/// keyframe. Truncated length fields end the NAL walk; a sample with no usable
/// NAL units yields `None`.
pub fn frame_video_sample(sample: &EncodedVideoSample) -> Option<EncodedUnit> {
    let parameter_sets = sample
        .parameter_sets
        .as_ref()
        .filter(|_| sample.is_keyframe)
        .map(HevcParameterSets::as_slices)
        .into_iter()
        .flatten();

    let mut vcl_units = length_prefixed_nals(&sample.data).peekable();
    vcl_units.peek()?;

    let framed = assemble_annex_b(parameter_sets, vcl_units);
    trace!(pts_us = sample.pts_us, len = framed.len(), is_keyframe = sample.is_keyframe, "framed video sample");
    Some(EncodedUnit::video(framed, sample.pts_us, sample.is_keyframe))
}

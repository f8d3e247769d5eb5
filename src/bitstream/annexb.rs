//! Annex-B byte-stream framing
//!
//! The wire format delimits NAL units with `00 00 01` or `00 00 00 01` start
//! codes. Hardware decoders want the length-prefixed ("AVCC") form instead, and
//! hardware encoders produce it, so both directions of that conversion live here.
//!
//! Every function in this module is total: malformed input yields fewer (or no)
//! NAL units, never an error or a panic.

use bytes::Bytes;

use crate::{MediaError, Result};

/// Four-byte Annex-B start code written in front of every emitted NAL unit.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Size of the big-endian length field in length-prefixed framing.
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Locate the next start code at or after `from`.
///
/// Returns `(index, length)` where `length` is 3 or 4.
pub fn find_start_code(bytes: &[u8], from: usize) -> Option<(usize, usize)> {
    if bytes.len() < 3 || from >= bytes.len() - 2 {
        return None;
    }

    let last_valid = bytes.len() - 3;
    let mut cursor = from;

    while cursor <= last_valid {
        if let [0x00, 0x00, third, rest @ ..] = &bytes[cursor..] {
            if *third == 0x01 {
                return Some((cursor, 3));
            }
            if *third == 0x00 && rest.first() == Some(&0x01) {
                return Some((cursor, 4));
            }
        }
        cursor += 1;
    }

    None
}

/// Iterator over the NAL payloads of an Annex-B stream.
///
/// Each payload spans from just after one start code to just before the next
/// one (or the end of the buffer). Empty payloads are skipped. The iterator is
/// `Clone`, so a stream can be walked more than once without re-scanning from
/// the caller's side.
#[derive(Debug, Clone)]
pub struct AnnexBNals<'a> {
    bytes: &'a [u8],
    search: usize,
}

impl<'a> Iterator for AnnexBNals<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, length) = find_start_code(self.bytes, self.search)?;
            let payload_start = index + length;
            if payload_start >= self.bytes.len() {
                self.search = self.bytes.len();
                return None;
            }

            let payload_end =
                find_start_code(self.bytes, payload_start).map_or(self.bytes.len(), |(i, _)| i);
            self.search = payload_end;

            if payload_end > payload_start {
                return self.bytes.get(payload_start..payload_end);
            }
        }
    }
}

/// Split an Annex-B stream into NAL payloads (start codes stripped).
///
/// Empty input and input without any start code both yield an empty sequence.
pub fn split_annex_b(stream: &[u8]) -> AnnexBNals<'_> {
    AnnexBNals { bytes: stream, search: 0 }
}

/// Zero-copy variant of [`split_annex_b`] for reference-counted payloads.
pub fn split_annex_b_bytes(stream: &Bytes) -> Vec<Bytes> {
    split_annex_b(stream).map(|nal| stream.slice_ref(nal)).collect()
}

/// Frame parameter sets and VCL units as one Annex-B access unit.
///
/// Pass VPS, SPS and PPS (in that order) for keyframes and an empty
/// collection otherwise. Every NAL is prefixed with [`START_CODE`]; empty
/// units are left out.
pub fn assemble_annex_b<P, V>(parameter_sets: P, vcl_units: V) -> Vec<u8>
where
    P: IntoIterator,
    P::Item: AsRef<[u8]>,
    V: IntoIterator,
    V::Item: AsRef<[u8]>,
{
    let mut out = Vec::new();
    for nal in parameter_sets {
        append_nal(&mut out, nal.as_ref());
    }
    for nal in vcl_units {
        append_nal(&mut out, nal.as_ref());
    }
    out
}

fn append_nal(out: &mut Vec<u8>, nal: &[u8]) {
    if nal.is_empty() {
        return;
    }
    out.extend_from_slice(&START_CODE);
    out.extend_from_slice(nal);
}

/// Prefix a NAL with its 4-byte big-endian length for decoder submission.
pub fn to_length_prefixed(nal: &[u8]) -> Result<Vec<u8>> {
    let length = u32::try_from(nal.len()).map_err(|_| {
        MediaError::parse("length-prefixed framing", format!("NAL of {} bytes", nal.len()))
    })?;

    let mut out = Vec::with_capacity(LENGTH_FIELD_SIZE + nal.len());
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(nal);
    Ok(out)
}

/// Iterator over the NAL units of a length-prefixed buffer.
///
/// Stops at the first zero length or at a length that runs past the end of
/// the buffer; the remaining bytes are discarded.
#[derive(Debug, Clone)]
pub struct LengthPrefixedNals<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for LengthPrefixedNals<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let field = self.bytes.get(self.offset..self.offset + LENGTH_FIELD_SIZE)?;
        let length = u32::from_be_bytes([field[0], field[1], field[2], field[3]]) as usize;
        let start = self.offset + LENGTH_FIELD_SIZE;

        match self.bytes.get(start..start.saturating_add(length)) {
            Some(nal) if length > 0 => {
                self.offset = start + length;
                Some(nal)
            }
            _ => {
                self.offset = self.bytes.len();
                None
            }
        }
    }
}

/// Walk a length-prefixed (encoder output) buffer.
pub fn length_prefixed_nals(buffer: &[u8]) -> LengthPrefixedNals<'_> {
    LengthPrefixedNals { bytes: buffer, offset: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn collect(stream: &[u8]) -> Vec<Vec<u8>> {
        split_annex_b(stream).map(<[u8]>::to_vec).collect()
    }

    #[test]
    fn empty_and_start_code_free_input_yield_nothing() {
        assert!(collect(&[]).is_empty());
        assert!(collect(&[0x00, 0x00]).is_empty());
        assert!(collect(&[0x40, 0x01, 0x0C, 0x01, 0xFF]).is_empty());
    }

    #[test]
    fn mixed_start_code_lengths() {
        let stream = [
            0x00, 0x00, 0x00, 0x01, 0x40, 0x01, // VPS, 4-byte code
            0x00, 0x00, 0x01, 0x42, 0x01, 0xAA, // SPS, 3-byte code
            0x00, 0x00, 0x00, 0x01, 0x26, 0x01, 0xBB, 0xCC,
        ];
        assert_eq!(
            collect(&stream),
            vec![vec![0x40, 0x01], vec![0x42, 0x01, 0xAA], vec![0x26, 0x01, 0xBB, 0xCC]]
        );
    }

    #[test]
    fn leading_garbage_and_trailing_start_code_are_ignored() {
        let stream = [0xFF, 0xEE, 0x00, 0x00, 0x01, 0x02, 0x01, 0x00, 0x00, 0x01];
        assert_eq!(collect(&stream), vec![vec![0x02, 0x01]]);
    }

    #[test]
    fn back_to_back_start_codes_skip_empty_payloads() {
        let stream = [0x00, 0x00, 0x01, 0x00, 0x00, 0x01, 0x02, 0x01];
        assert_eq!(collect(&stream), vec![vec![0x02, 0x01]]);
    }

    #[test]
    fn iterator_is_restartable() {
        let stream = assemble_annex_b([[0x40u8, 0x01]], [[0x26u8, 0x01, 0x10]]);
        let nals = split_annex_b(&stream);
        assert_eq!(nals.clone().count(), 2);
        assert_eq!(nals.count(), 2);
    }

    #[test]
    fn zero_copy_split_shares_buffer() {
        let stream = Bytes::from(assemble_annex_b(Vec::<&[u8]>::new(), [&[0x02u8, 0x01, 0x07][..]]));
        let nals = split_annex_b_bytes(&stream);
        assert_eq!(nals.len(), 1);
        assert_eq!(nals[0].as_ref(), &[0x02, 0x01, 0x07]);
        assert_eq!(nals[0].as_ptr(), stream[4..].as_ptr());
    }

    #[test]
    fn assemble_prefixes_parameter_sets_on_keyframes() {
        let vps = [0x40u8, 0x01];
        let sps = [0x42u8, 0x01];
        let pps = [0x44u8, 0x01];
        let idr = [0x26u8, 0x01, 0xAF];

        let framed = assemble_annex_b([&vps[..], &sps[..], &pps[..]], [&idr[..]]);
        assert_eq!(
            framed,
            vec![
                0, 0, 0, 1, 0x40, 0x01, 0, 0, 0, 1, 0x42, 0x01, 0, 0, 0, 1, 0x44, 0x01, 0, 0, 0,
                1, 0x26, 0x01, 0xAF
            ]
        );
    }

    #[test]
    fn length_prefixed_conversion() {
        let nal = [0x02u8, 0x01, 0xD0];
        assert_eq!(to_length_prefixed(&nal).unwrap(), vec![0, 0, 0, 3, 0x02, 0x01, 0xD0]);
    }

    #[test]
    fn length_prefixed_walk_stops_on_truncation() {
        let buffer = [0, 0, 0, 2, 0xAA, 0xBB, 0, 0, 0, 9, 0xCC];
        let nals: Vec<&[u8]> = length_prefixed_nals(&buffer).collect();
        assert_eq!(nals, vec![&[0xAA, 0xBB][..]]);
    }

    #[test]
    fn length_prefixed_walk_stops_on_zero_length() {
        let buffer = [0, 0, 0, 0, 0, 0, 0, 1, 0xAA];
        assert_eq!(length_prefixed_nals(&buffer).count(), 0);
    }

    proptest! {
        #[test]
        fn split_never_panics(stream in prop::collection::vec(any::<u8>(), 0..512)) {
            for nal in split_annex_b(&stream) {
                prop_assert!(!nal.is_empty());
                prop_assert!(nal.len() <= stream.len());
            }
        }

        #[test]
        fn assemble_then_split_recovers_units(
            units in prop::collection::vec(
                // Emulation prevention guarantees no 00 00 0x sequences inside real NALs.
                prop::collection::vec(1u8..=255, 1..64),
                0..16
            )
        ) {
            let framed = assemble_annex_b(Vec::<Vec<u8>>::new(), &units);
            let recovered = collect(&framed);
            prop_assert_eq!(recovered, units);
        }

        #[test]
        fn length_prefixed_round_trip(
            units in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 0..16)
        ) {
            let mut buffer = Vec::new();
            for unit in &units {
                buffer.extend(to_length_prefixed(unit).unwrap());
            }
            let walked: Vec<Vec<u8>> = length_prefixed_nals(&buffer).map(<[u8]>::to_vec).collect();
            prop_assert_eq!(walked, units);
        }
    }
}

//! Length-prefixed framing so a sequence of independently-sized bit chunks
//! (a slice's payload and its stage descriptor, or several slices back to
//! back) can be concatenated and split apart again.

use crate::bitstream::BitStream;
use crate::error::{Error, Result};

/// Concatenates `list` into `[len_0][chunk_0][len_1][chunk_1]...`, where each
/// `len_i` is the bit length of `chunk_i` packed into `width_bytes * 8` bits.
pub fn serialize(list: &[BitStream], width_bytes: usize) -> Result<BitStream> {
    let width_bits = width_bytes * 8;
    let max_len: u128 = if width_bits >= 128 { u128::MAX } else { (1u128 << width_bits) - 1 };
    let mut out = BitStream::new();
    for chunk in list {
        if chunk.len() as u128 > max_len {
            return Err(Error::WidthOverflow { width_bytes });
        }
        out.append(&BitStream::from_uint(chunk.len() as u64, width_bits));
        out.append(chunk);
    }
    Ok(out)
}

/// Inverse of [`serialize`]. Fails if a length prefix claims more bits than
/// remain in `bits`.
pub fn deserialize(bits: &BitStream, width_bytes: usize) -> Result<Vec<BitStream>> {
    let width_bits = width_bytes * 8;
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < bits.len() {
        if bits.len() < offset + width_bits {
            return Err(Error::DeserializationError { reason: "truncated frame length prefix" });
        }
        let len = bits.slice(offset, width_bits).to_u64() as usize;
        offset += width_bits;
        if bits.len() < offset + len {
            return Err(Error::DeserializationError { reason: "truncated frame payload" });
        }
        out.push(bits.slice(offset, len));
        offset += len;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_multiple_chunks_of_uneven_length() {
        let chunks = vec![
            BitStream::from_uint(0b101, 3),
            BitStream::from_uint(0xFF, 8),
            BitStream::new(),
        ];
        let framed = serialize(&chunks, 4).unwrap();
        let parsed = deserialize(&framed, 4).unwrap();
        assert_eq!(parsed, chunks);
    }

    #[test]
    fn rejects_length_that_overflows_width() {
        let huge = BitStream::with_capacity(0);
        let mut chunk = huge;
        for _ in 0..300 {
            chunk.push(true);
        }
        let err = serialize(&[chunk], 1).unwrap_err();
        assert!(matches!(err, Error::WidthOverflow { width_bytes: 1 }));
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut bits = BitStream::from_uint(10, 32);
        bits.append(&BitStream::from_uint(0, 4));
        let err = deserialize(&bits, 4).unwrap_err();
        assert!(matches!(err, Error::DeserializationError { .. }));
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(deserialize(&BitStream::new(), 4).unwrap().is_empty());
    }
}

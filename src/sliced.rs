//! Splits input into independent slices and compresses them in parallel.
//! Each slice trains its own pipeline, so slices never share statistics —
//! this is what makes them safe to encode concurrently. The output file is
//! a frame of two frames: all chain descriptors, then all encoded slices,
//! each sub-frame holding one element per slice in slice order.

use rayon::prelude::*;

use crate::bitstream::BitStream;
use crate::chain::{EncoderChain, StageKind};
use crate::config::{DEF_FRAME_WIDTH, DEF_PROBABILITY_THRESHOLD, DEF_SLICE_COUNT, DEF_SYMBOL_SIZE};
use crate::error::{Error, Result};
use crate::framing;
use crate::huffman::HuffmanTransducer;
use crate::markov::MarkovEncoder;
use crate::padder::{Padder, PaddingMode};

fn build_chain(symbol_size: usize, threshold: f64) -> EncoderChain {
    EncoderChain::new(vec![
        StageKind::Markov(MarkovEncoder::new(symbol_size, threshold)),
        StageKind::Huffman(HuffmanTransducer::new(symbol_size)),
        StageKind::Padder(Padder::new(PaddingMode::WholeBytes)),
    ])
}

/// Splits `input` into `slice_count` equal-length pieces on symbol
/// boundaries, truncating any remainder rather than tacking it onto the
/// last slice. Slices past the total symbol count come back empty.
fn split_into_slices(input: &BitStream, slice_count: usize, symbol_size: usize) -> Vec<BitStream> {
    let slice_count = slice_count.max(1);
    let len = input.len();
    if symbol_size == 0 {
        return vec![input.clone()];
    }
    let total_symbols = len / symbol_size;
    let symbols_per_slice = total_symbols / slice_count;
    let slice_len = symbols_per_slice * symbol_size;

    let mut slices = Vec::with_capacity(slice_count);
    let mut offset = 0;
    for _ in 0..slice_count {
        slices.push(input.slice(offset, slice_len));
        offset += slice_len;
    }
    slices
}

/// Compresses `input` using the default symbol size, Markov threshold, and
/// slice count.
pub fn compress(input: &BitStream) -> Result<BitStream> {
    compress_with(input, DEF_SYMBOL_SIZE, DEF_PROBABILITY_THRESHOLD, DEF_SLICE_COUNT)
}

pub fn compress_with(
    input: &BitStream,
    symbol_size: usize,
    threshold: f64,
    slice_count: usize,
) -> Result<BitStream> {
    let slices = split_into_slices(input, slice_count, symbol_size);
    let results: Vec<Result<(BitStream, BitStream)>> = slices
        .par_iter()
        .map(|slice| {
            if slice.is_empty() {
                // Nothing to train a pipeline on; an empty descriptor makes
                // `EncoderChain::decompress` pass the (also empty) payload
                // through unchanged.
                Ok((BitStream::new(), BitStream::new()))
            } else {
                build_chain(symbol_size, threshold).compress(slice)
            }
        })
        .collect();

    let mut payloads = Vec::with_capacity(results.len());
    let mut descriptors = Vec::with_capacity(results.len());
    for result in results {
        let (payload, descriptor) = result?;
        payloads.push(payload);
        descriptors.push(descriptor);
    }

    let chains_frame = framing::serialize(&descriptors, DEF_FRAME_WIDTH)?;
    let slices_frame = framing::serialize(&payloads, DEF_FRAME_WIDTH)?;
    framing::serialize(&[chains_frame, slices_frame], DEF_FRAME_WIDTH)
}

/// Decompresses a stream produced by [`compress`] or [`compress_with`].
/// Every slice's pipeline is reconstructed purely from its own descriptor,
/// so this needs no knowledge of the symbol size or slice count used to
/// produce it.
pub fn decompress(framed: &BitStream) -> Result<BitStream> {
    let outer = framing::deserialize(framed, DEF_FRAME_WIDTH)?;
    let [chains_frame, slices_frame] = <[BitStream; 2]>::try_from(outer)
        .map_err(|_| Error::DeserializationError { reason: "sliced file must frame exactly two groups" })?;

    let descriptors = framing::deserialize(&chains_frame, DEF_FRAME_WIDTH)?;
    let payloads = framing::deserialize(&slices_frame, DEF_FRAME_WIDTH)?;
    if descriptors.len() != payloads.len() {
        return Err(Error::DeserializationError { reason: "chain count does not match slice count" });
    }

    let decoded: Vec<Result<BitStream>> = payloads
        .par_iter()
        .zip(descriptors.par_iter())
        .map(|(payload, descriptor)| EncoderChain::decompress(payload, descriptor))
        .collect();

    let mut out = BitStream::new();
    for chunk in decoded {
        out.append(&chunk?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(values: &[u64], width: usize) -> BitStream {
        let mut out = BitStream::new();
        for &v in values {
            out.append(&BitStream::from_uint(v, width));
        }
        out
    }

    #[test]
    fn round_trips_across_several_slices() {
        let mut values = Vec::new();
        for i in 0..400u64 {
            values.push(i % 7);
        }
        let input = symbols(&values, 8);
        let compressed = compress_with(&input, 8, 0.1, 4).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, input);
    }

    #[test]
    fn single_slice_matches_plain_chain() {
        let input = symbols(&[1, 2, 3, 1, 2, 3, 1, 2, 3, 1], 8);
        let compressed = compress_with(&input, 8, 0.4, 1).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn empty_input_round_trips() {
        let input = BitStream::new();
        let compressed = compress_with(&input, 8, 0.4, 8).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn remainder_past_the_last_whole_slice_is_truncated() {
        // 401 symbols over 4 slices: 100 symbols/slice, one symbol dropped.
        let mut values: Vec<u64> = (0..401u64).map(|i| i % 7).collect();
        let input = symbols(&values, 8);
        let compressed = compress_with(&input, 8, 0.1, 4).unwrap();
        let decompressed = decompress(&compressed).unwrap();

        values.truncate(400);
        let expected = symbols(&values, 8);
        assert_eq!(decompressed, expected);
        assert_eq!(decompressed.len(), input.len() - 8);
    }
}

//! End-to-end round trip through the sliced parallel driver on a sizable,
//! non-degenerate input — the integration-level counterpart to each
//! module's own unit tests.

use rand::Rng;

use stagecomp::bitstream::BitStream;
use stagecomp::sliced;

fn random_bytes(len: usize, seed_bias: u8) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|i| {
            // Skew the distribution so Markov/Huffman have real structure
            // to exploit instead of uniform noise.
            if i % 3 == 0 {
                seed_bias
            } else {
                rng.gen::<u8>()
            }
        })
        .collect()
}

#[test]
fn sliced_round_trip_on_large_skewed_input() {
    let bytes = random_bytes(64 * 1024, 0x42);
    let input = BitStream::from_bytes(&bytes);

    let compressed = sliced::compress_with(&input, 8, 0.2, 8).unwrap();
    let decompressed = sliced::decompress(&compressed).unwrap();

    assert_eq!(decompressed, input);
    assert_eq!(decompressed.to_bytes(), bytes);
}

#[test]
fn sliced_round_trip_on_highly_repetitive_input() {
    let bytes = vec![0xAAu8; 32 * 1024];
    let input = BitStream::from_bytes(&bytes);

    let compressed = sliced::compress_with(&input, 8, 0.4, 8).unwrap();
    let decompressed = sliced::decompress(&compressed).unwrap();

    assert_eq!(decompressed, input);
    // Highly repetitive input should compress well below its original size.
    assert!(compressed.len() < input.len());
}

#[test]
fn sliced_round_trip_with_sixteen_bit_symbols() {
    let bytes = random_bytes(20_000, 0x7E);
    let input = BitStream::from_bytes(&bytes);

    let compressed = sliced::compress_with(&input, 16, 0.3, 4).unwrap();
    let decompressed = sliced::decompress(&compressed).unwrap();

    assert_eq!(decompressed, input);
}

#[test]
fn default_compress_and_decompress_round_trip() {
    let bytes = random_bytes(10_000, 0x01);
    let input = BitStream::from_bytes(&bytes);

    let compressed = sliced::compress(&input).unwrap();
    let decompressed = sliced::decompress(&compressed).unwrap();

    assert_eq!(decompressed, input);
}

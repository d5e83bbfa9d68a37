//! Byte/even-byte alignment stage. Records the exact padding length at
//! `setup` time so `decode` can undo it later by plain truncation.

use crate::bitstream::BitStream;
use crate::error::Result;
use crate::stage::{Stage, STAGE_ID_PADDER};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaddingMode {
    None = 0,
    WholeBytes = 1,
    EvenBytes = 2,
    OddBytes = 3,
}

impl PaddingMode {
    fn from_u8(v: u8) -> Option<PaddingMode> {
        match v {
            0 => Some(PaddingMode::None),
            1 => Some(PaddingMode::WholeBytes),
            2 => Some(PaddingMode::EvenBytes),
            3 => Some(PaddingMode::OddBytes),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Padder {
    mode: PaddingMode,
    added_bits: u32,
    /// Becomes `true` once `setup` has measured `added_bits` against a real
    /// input length, or once reconstructed by `deserializer`.
    ready: bool,
}

impl Padder {
    pub fn new(mode: PaddingMode) -> Self {
        Padder { mode, added_bits: 0, ready: false }
    }

    fn compute_added_bits(&self, len: usize) -> usize {
        match self.mode {
            PaddingMode::None => 0,
            PaddingMode::WholeBytes => (8 - len % 8) % 8,
            PaddingMode::EvenBytes => (16 - len % 16) % 16,
            PaddingMode::OddBytes => {
                let first_pad = (8 - len % 8) % 8;
                let byte_count = (len + first_pad) / 8;
                let extra_pad = if byte_count % 2 == 0 { 8 } else { 0 };
                first_pad + extra_pad
            }
        }
    }

    /// Parses one stage descriptor off the front of `descriptor` and returns
    /// the leftover bits so a chain can dispatch the next stage in turn.
    pub fn deserializer(descriptor: &BitStream) -> (Padder, BitStream) {
        let header_len = 16 + 8 + 32;
        if descriptor.len() < header_len {
            log::debug!("padder descriptor too short");
            return (Padder::new(PaddingMode::None), BitStream::new());
        }
        let id = descriptor.slice(0, 16).to_u64();
        if id as u16 != STAGE_ID_PADDER {
            log::debug!("padder descriptor has wrong stage id {id:#06x}");
            return (Padder::new(PaddingMode::None), BitStream::new());
        }
        let mode_byte = descriptor.slice(16, 8).to_u64() as u8;
        let mode = match PaddingMode::from_u8(mode_byte) {
            Some(m) => m,
            None => {
                log::debug!("padder descriptor has unknown mode byte {mode_byte}");
                return (Padder::new(PaddingMode::None), BitStream::new());
            }
        };
        let added_bits = descriptor.slice(24, 32).to_u64() as u32;
        let remainder = descriptor.slice(header_len, descriptor.len() - header_len);
        (Padder { mode, added_bits, ready: true }, remainder)
    }
}

impl Stage for Padder {
    /// Measures how many bits `training_bits` would need to reach alignment
    /// and stores it; `encode` later reuses this rather than recomputing it,
    /// so it must be called with the same-length input `encode` will see.
    fn setup(&mut self, training_bits: &BitStream) {
        if self.mode == PaddingMode::None {
            return;
        }
        self.added_bits = self.compute_added_bits(training_bits.len()) as u32;
        self.ready = true;
    }

    fn reset(&mut self) {
        self.added_bits = 0;
        self.ready = false;
    }

    fn is_valid(&self) -> bool {
        self.mode != PaddingMode::None && self.ready
    }

    fn encoder_id(&self) -> u16 {
        STAGE_ID_PADDER
    }

    fn encode(&self, bits: &BitStream) -> BitStream {
        if !self.is_valid() {
            return BitStream::new();
        }
        let mut out = bits.clone();
        for _ in 0..self.added_bits {
            out.push(false);
        }
        out
    }

    fn decode(&self, bits: &BitStream) -> BitStream {
        if !self.is_valid() {
            return BitStream::new();
        }
        let added = self.added_bits as usize;
        let keep = bits.len().saturating_sub(added);
        bits.slice(0, keep)
    }

    fn serialize(&self) -> Result<BitStream> {
        if !self.is_valid() {
            return Err(crate::error::Error::InvalidStage { encoder_id: STAGE_ID_PADDER });
        }
        let mut out = BitStream::new();
        out.append(&BitStream::from_uint(STAGE_ID_PADDER as u64, 16));
        out.append(&BitStream::from_uint(self.mode as u64, 8));
        out.append(&BitStream::from_uint(self.added_bits as u64, 32));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_bytes_already_aligned_adds_nothing() {
        let mut p = Padder::new(PaddingMode::WholeBytes);
        let bits = BitStream::from_uint(0xFF, 8);
        p.setup(&bits);
        let encoded = p.encode(&bits);
        assert_eq!(p.added_bits, 0);
        assert_eq!(encoded, bits);
    }

    #[test]
    fn whole_bytes_pads_to_next_byte() {
        let mut p = Padder::new(PaddingMode::WholeBytes);
        let bits = BitStream::from_uint(0b101, 3);
        p.setup(&bits);
        let encoded = p.encode(&bits);
        assert_eq!(p.added_bits, 5);
        assert_eq!(encoded.len(), 8);
        assert!(p.added_bits < 16);
    }

    #[test]
    fn even_bytes_pads_to_multiple_of_sixteen() {
        let mut p = Padder::new(PaddingMode::EvenBytes);
        let bits = BitStream::from_uint(0, 10);
        p.setup(&bits);
        let encoded = p.encode(&bits);
        assert_eq!(encoded.len() % 16, 0);
        assert!(p.added_bits < 16);
    }

    #[test]
    fn odd_bytes_pads_to_odd_byte_count() {
        let mut p = Padder::new(PaddingMode::OddBytes);
        let bits = BitStream::from_uint(0, 8); // already 1 byte (odd) -> extra byte needed
        p.setup(&bits);
        let encoded = p.encode(&bits);
        assert_eq!((encoded.len() / 8) % 2, 1);
        assert!(p.added_bits < 24);
    }

    #[test]
    fn round_trip() {
        let mut p = Padder::new(PaddingMode::OddBytes);
        let original = BitStream::from_uint(0b1011, 4);
        p.setup(&original);
        let encoded = p.encode(&original);
        let decoded = p.decode(&encoded);
        assert_eq!(decoded, original);
    }

    #[test]
    fn serialize_round_trip() {
        let mut p = Padder::new(PaddingMode::WholeBytes);
        let original = BitStream::from_uint(0b11, 2);
        p.setup(&original);
        let encoded = p.encode(&original);
        let descriptor = p.serialize().unwrap();
        let (p2, remainder) = Padder::deserializer(&descriptor);
        assert_eq!(p2.decode(&encoded), original);
        assert!(remainder.is_empty());
    }

    #[test]
    fn deserializer_never_fails_on_short_input() {
        let garbage = BitStream::from_uint(0xFFFF, 16);
        let (p, _) = Padder::deserializer(&garbage);
        assert!(!p.is_valid());
    }

    #[test]
    fn unready_padder_is_invalid_and_encodes_empty() {
        let p = Padder::new(PaddingMode::WholeBytes);
        assert!(!p.is_valid());
        assert_eq!(p.encode(&BitStream::from_uint(1, 4)), BitStream::new());
    }
}

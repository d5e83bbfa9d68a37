//! First-order Markov substitution encoder. Trains a per-symbol successor
//! map and encodes by XOR or by sentinel substitution.

use std::collections::{BTreeMap, BTreeSet};

use crate::bitstream::BitStream;
use crate::error::Result;
use crate::huffman::find_unused_symbol;
use crate::stage::{Stage, STAGE_ID_MARKOV};
use crate::statistics;

#[derive(Clone, Debug, Default)]
pub struct MarkovEncoder {
    symbol_size: usize,
    threshold: f64,
    encoding_map: BTreeMap<u64, u64>,
    unused_symbol: Option<u64>,
}

impl MarkovEncoder {
    pub fn new(symbol_size: usize, threshold: f64) -> Self {
        MarkovEncoder { symbol_size, threshold, encoding_map: BTreeMap::new(), unused_symbol: None }
    }

    pub fn encoding_map(&self) -> &BTreeMap<u64, u64> {
        &self.encoding_map
    }

    pub fn unused_symbol(&self) -> Option<u64> {
        self.unused_symbol
    }

    fn train(&mut self, training_bits: &BitStream) {
        self.encoding_map.clear();
        self.unused_symbol = None;
        if self.symbol_size == 0 {
            return;
        }
        let freq = match statistics::frequency(training_bits, self.symbol_size) {
            Ok(f) => f,
            Err(_) => return,
        };
        if freq.is_empty() {
            return;
        }
        let observed: BTreeSet<u64> = freq.keys().copied().collect();
        self.unused_symbol = find_unused_symbol(&observed, self.symbol_size);

        let transitions = match statistics::transitions(training_bits, self.symbol_size) {
            Ok(t) => t,
            Err(_) => return,
        };
        for (symbol, row) in transitions {
            let total: u64 = row.values().sum();
            if total == 0 {
                continue;
            }
            // Ascending key iteration + strict `>` keeps the earliest-seen
            // maximum on ties, mirroring the original's stable multimap scan.
            let mut best: Option<(u64, u64)> = None;
            for (successor, count) in row {
                let better = match best {
                    None => true,
                    Some((_, best_count)) => count > best_count,
                };
                if better {
                    best = Some((successor, count));
                }
            }
            if let Some((successor, count)) = best {
                if (count as f64 / total as f64) > self.threshold {
                    self.encoding_map.insert(symbol, successor);
                }
            }
        }
    }

    fn predicted(&self, prev: Option<u64>) -> Option<u64> {
        prev.and_then(|p| self.encoding_map.get(&p).copied())
    }

    fn encode_xor(&self, bits: &BitStream) -> BitStream {
        let count = bits.len() / self.symbol_size;
        let mut out = BitStream::with_capacity(bits.len());
        let mut prev: Option<u64> = None;
        for i in 0..count {
            let cur = bits.slice(i * self.symbol_size, self.symbol_size).to_u64();
            let predicted = self.predicted(prev).unwrap_or(0);
            out.append(&BitStream::from_uint(cur ^ predicted, self.symbol_size));
            prev = Some(cur);
        }
        out
    }

    fn decode_xor(&self, bits: &BitStream) -> BitStream {
        let count = bits.len() / self.symbol_size;
        let mut out = BitStream::with_capacity(bits.len());
        let mut prev: Option<u64> = None;
        for i in 0..count {
            let enc = bits.slice(i * self.symbol_size, self.symbol_size).to_u64();
            let predicted = self.predicted(prev).unwrap_or(0);
            let original = enc ^ predicted;
            out.append(&BitStream::from_uint(original, self.symbol_size));
            prev = Some(original);
        }
        out
    }

    fn encode_sentinel(&self, bits: &BitStream, unused: u64) -> BitStream {
        let count = bits.len() / self.symbol_size;
        let mut out = BitStream::with_capacity(bits.len());
        let mut prev: Option<u64> = None;
        for i in 0..count {
            let cur = bits.slice(i * self.symbol_size, self.symbol_size).to_u64();
            let emitted = if i == 0 {
                cur
            } else if self.predicted(prev) == Some(cur) {
                unused
            } else {
                cur
            };
            out.append(&BitStream::from_uint(emitted, self.symbol_size));
            prev = Some(cur);
        }
        out
    }

    fn decode_sentinel(&self, bits: &BitStream, unused: u64) -> BitStream {
        let count = bits.len() / self.symbol_size;
        let mut out = BitStream::with_capacity(bits.len());
        let mut prev: Option<u64> = None;
        for i in 0..count {
            let enc = bits.slice(i * self.symbol_size, self.symbol_size).to_u64();
            let original = if i == 0 {
                enc
            } else if enc == unused {
                self.predicted(prev).unwrap_or(enc)
            } else {
                enc
            };
            out.append(&BitStream::from_uint(original, self.symbol_size));
            prev = Some(original);
        }
        out
    }

    /// Parses one stage descriptor off the front of `descriptor` and returns
    /// the leftover bits so a chain can dispatch the next stage in turn.
    pub fn deserializer(descriptor: &BitStream) -> (MarkovEncoder, BitStream) {
        let invalid = (MarkovEncoder::default(), BitStream::new());
        let header_bits = 16 + 24 + 8;
        if descriptor.len() < header_bits {
            log::debug!("markov descriptor shorter than header");
            return invalid;
        }
        let id = descriptor.slice(0, 16).to_u64() as u16;
        if id != STAGE_ID_MARKOV {
            log::debug!("markov descriptor has wrong stage id {id:#06x}");
            return invalid;
        }
        let count = descriptor.slice(16, 24).to_u64() as usize;
        let symbol_size = descriptor.slice(40, 8).to_u64() as usize;
        if symbol_size == 0 {
            return invalid;
        }
        let mut offset = header_bits;
        if descriptor.len() < offset + symbol_size {
            return invalid;
        }
        let unused_symbol = descriptor.slice(offset, symbol_size).to_u64();
        offset += symbol_size;

        let entry_width = symbol_size * 2;
        if descriptor.len() < offset + count * entry_width {
            log::debug!("markov descriptor too short for {count} entries");
            return invalid;
        }
        let mut encoding_map = BTreeMap::new();
        for _ in 0..count {
            let key = descriptor.slice(offset, symbol_size).to_u64();
            offset += symbol_size;
            let value = descriptor.slice(offset, symbol_size).to_u64();
            offset += symbol_size;
            encoding_map.insert(key, value);
        }
        let remainder = descriptor.slice(offset, descriptor.len() - offset);
        let m = MarkovEncoder { symbol_size, threshold: 0.0, encoding_map, unused_symbol: Some(unused_symbol) };
        (m, remainder)
    }
}

impl Stage for MarkovEncoder {
    fn setup(&mut self, training_bits: &BitStream) {
        self.train(training_bits);
    }

    fn reset(&mut self) {
        self.encoding_map.clear();
        self.unused_symbol = None;
    }

    fn is_valid(&self) -> bool {
        self.symbol_size > 0 && !self.encoding_map.is_empty() && self.unused_symbol.is_some()
    }

    fn encoder_id(&self) -> u16 {
        STAGE_ID_MARKOV
    }

    fn encode(&self, bits: &BitStream) -> BitStream {
        if !self.is_valid() || self.symbol_size == 0 || bits.len() % self.symbol_size != 0 {
            return BitStream::new();
        }
        match self.unused_symbol {
            Some(unused) => self.encode_sentinel(bits, unused),
            None => self.encode_xor(bits),
        }
    }

    fn decode(&self, bits: &BitStream) -> BitStream {
        if !self.is_valid() || self.symbol_size == 0 || bits.len() % self.symbol_size != 0 {
            return BitStream::new();
        }
        match self.unused_symbol {
            Some(unused) => self.decode_sentinel(bits, unused),
            None => self.decode_xor(bits),
        }
    }

    fn serialize(&self) -> Result<BitStream> {
        if !self.is_valid() {
            return Err(crate::error::Error::InvalidStage { encoder_id: STAGE_ID_MARKOV });
        }
        let mut out = BitStream::new();
        out.append(&BitStream::from_uint(STAGE_ID_MARKOV as u64, 16));
        out.append(&BitStream::from_uint(self.encoding_map.len() as u64, 24));
        out.append(&BitStream::from_uint(self.symbol_size as u64, 8));
        out.append(&BitStream::from_uint(self.unused_symbol.unwrap(), self.symbol_size));
        for (&key, &value) in &self.encoding_map {
            out.append(&BitStream::from_uint(key, self.symbol_size));
            out.append(&BitStream::from_uint(value, self.symbol_size));
        }
        Ok(out)
    }
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
    fn trains_and_round_trips_sentinel_mode() {
        let input = symbols(&[1, 2, 1, 2, 1, 2, 1, 2], 8);
        let mut m = MarkovEncoder::new(8, 0.4);
        m.setup(&input);
        assert!(m.is_valid());
        let encoded = m.encode(&input);
        assert_eq!(m.decode(&encoded), input);
    }

    #[test]
    fn descriptor_round_trip() {
        let input = symbols(&[1, 2, 1, 2, 1, 2, 1, 2, 3], 8);
        let mut m = MarkovEncoder::new(8, 0.4);
        m.setup(&input);
        assert!(m.is_valid());
        let descriptor = m.serialize().unwrap();
        let (m2, remainder) = MarkovEncoder::deserializer(&descriptor);
        assert_eq!(m2.encoding_map(), m.encoding_map());
        let encoded = m.encode(&input);
        assert_eq!(m2.decode(&encoded), input);
        assert!(remainder.is_empty());
    }

    #[test]
    fn low_threshold_rejects_weak_predictors() {
        let input = symbols(&[1, 2, 1, 3, 1, 4], 8);
        let mut m = MarkovEncoder::new(8, 0.9);
        m.setup(&input);
        // no successor of 1 reaches 90% share, so the map should be empty for key 1
        assert!(!m.encoding_map().contains_key(&1));
    }

    #[test]
    fn deserializer_rejects_short_input() {
        let garbage = BitStream::from_uint(STAGE_ID_MARKOV as u64, 16);
        let (m, _) = MarkovEncoder::deserializer(&garbage);
        assert!(!m.is_valid());
    }
}

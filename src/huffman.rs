//! Prefix-code transducer: a binary trie that is simultaneously an encoding
//! table and a streaming decoder state machine, plus its self-describing
//! on-disk table format.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::bitstream::BitStream;
use crate::error::{Error, Result};
use crate::stage::{Stage, STAGE_ID_HUFFMAN};
use crate::statistics;

/// A node in the trie's arena. Leaves ("EndNodes") carry the decoded symbol
/// and the code that was walked to reach them; their conceptual back-edge to
/// the root lives in [`HuffmanTransducer::forward`], not in the node itself.
#[derive(Clone, Debug)]
enum Node {
    Internal { children: [Option<usize>; 2] },
    Leaf { symbol: u64, code: BitStream },
}

#[derive(Clone, Debug, Default)]
pub struct HuffmanTransducer {
    symbol_size: usize,
    nodes: Vec<Node>,
    root: usize,
    leaf_by_symbol: BTreeMap<u64, usize>,
    entropy: f64,
    avg_code_length: f64,
}

impl HuffmanTransducer {
    pub fn new(symbol_size: usize) -> Self {
        HuffmanTransducer { symbol_size, ..Default::default() }
    }

    pub fn symbol_size(&self) -> usize {
        self.symbol_size
    }

    pub fn entropy(&self) -> f64 {
        self.entropy
    }

    pub fn avg_code_length(&self) -> f64 {
        self.avg_code_length
    }

    pub fn table_size(&self) -> usize {
        self.leaf_by_symbol.len()
    }

    pub fn encoding_map(&self) -> BTreeMap<u64, BitStream> {
        self.leaf_by_symbol
            .iter()
            .filter_map(|(&symbol, &idx)| match &self.nodes[idx] {
                Node::Leaf { code, .. } => Some((symbol, code.clone())),
                Node::Internal { .. } => None,
            })
            .collect()
    }

    fn train(&mut self, training_bits: &BitStream) {
        *self = HuffmanTransducer::new(self.symbol_size);
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
        self.build_from_frequency(&freq);
    }

    fn build_from_frequency(&mut self, freq: &BTreeMap<u64, f64>) {
        let mut nodes = vec![Node::Internal { children: [None, None] }];
        let mut leaf_by_symbol = BTreeMap::new();
        let mut pool: Vec<(f64, u64, usize)> = Vec::with_capacity(freq.len());
        let mut seq = 0u64;
        for (&symbol, &prob) in freq {
            let idx = nodes.len();
            nodes.push(Node::Leaf { symbol, code: BitStream::new() });
            leaf_by_symbol.insert(symbol, idx);
            pool.push((prob, seq, idx));
            seq += 1;
        }

        let by_prob_then_seq = |a: &(f64, u64, usize), b: &(f64, u64, usize)| {
            a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1))
        };

        while pool.len() > 2 {
            pool.sort_by(by_prob_then_seq);
            let a = pool.remove(0);
            let b = pool.remove(0);
            let idx = nodes.len();
            nodes.push(Node::Internal { children: [Some(a.2), Some(b.2)] });
            pool.push((a.0 + b.0, seq, idx));
            seq += 1;
        }
        pool.sort_by(by_prob_then_seq);

        let root = 0;
        match pool.len() {
            0 => return,
            1 => nodes[root] = Node::Internal { children: [Some(pool[0].2), Some(pool[0].2)] },
            2 => nodes[root] = Node::Internal { children: [Some(pool[0].2), Some(pool[1].2)] },
            _ => unreachable!("loop invariant keeps pool at 2 once it drops below 3"),
        }

        let mut coded = HashSet::new();
        let mut path = Vec::new();
        Self::assign_codes(&mut nodes, root, &mut path, &mut coded);

        let entropy = freq.values().filter(|&&p| p > 0.0).map(|&p| p * (1.0 / p).log2()).sum();
        let avg_code_length = leaf_by_symbol
            .iter()
            .map(|(sym, &idx)| {
                let len = match &nodes[idx] {
                    Node::Leaf { code, .. } => code.len(),
                    Node::Internal { .. } => 0,
                };
                len as f64 * freq.get(sym).copied().unwrap_or(0.0)
            })
            .sum();

        self.nodes = nodes;
        self.root = root;
        self.leaf_by_symbol = leaf_by_symbol;
        self.entropy = entropy;
        self.avg_code_length = avg_code_length;
    }

    /// Recursive path-based code assignment. The stand-in for the source's
    /// stateful zero/one/visited DFS flags: a plain recursive walk reaches
    /// the same leaves in the same relative order without mutable node
    /// flags. The degenerate single-symbol tree has `children[0] ==
    /// children[1]`, so it is only descended once.
    fn assign_codes(nodes: &mut [Node], idx: usize, path: &mut Vec<bool>, coded: &mut HashSet<usize>) {
        let children = match &nodes[idx] {
            Node::Internal { children } => Some(*children),
            Node::Leaf { .. } => None,
        };
        match children {
            Some(children) => {
                let degenerate = children[0].is_some() && children[0] == children[1];
                if let Some(c0) = children[0] {
                    path.push(false);
                    Self::assign_codes(nodes, c0, path, coded);
                    path.pop();
                }
                if !degenerate {
                    if let Some(c1) = children[1] {
                        path.push(true);
                        Self::assign_codes(nodes, c1, path, coded);
                        path.pop();
                    }
                }
            }
            None => {
                if coded.insert(idx) {
                    if let Node::Leaf { code, .. } = &mut nodes[idx] {
                        *code = path.iter().copied().collect();
                    }
                }
            }
        }
    }

    /// One step of the decoder state machine. Returns `None` if the trie is
    /// incomplete along the requested edge (malformed input).
    fn forward(&self, current: usize, bit: bool, out: &mut Vec<u64>) -> Option<usize> {
        match &self.nodes[current] {
            Node::Internal { children } => children[bit as usize],
            Node::Leaf { symbol, .. } => {
                out.push(*symbol);
                match &self.nodes[self.root] {
                    Node::Internal { children } => children[bit as usize],
                    Node::Leaf { .. } => Some(self.root),
                }
            }
        }
    }

    /// Reconstructs a trie from a `(key, code)` table, as happens after
    /// deserialization. Collisions (an EndNode preempting a would-be
    /// internal node or vice versa) leave the transducer invalid.
    fn from_table(symbol_size: usize, table: &[(u64, BitStream)]) -> HuffmanTransducer {
        if table.is_empty() {
            return HuffmanTransducer::new(symbol_size);
        }
        let mut nodes = vec![Node::Internal { children: [None, None] }];
        let root = 0;
        let mut leaf_by_symbol = BTreeMap::new();
        let mut valid = true;

        'entries: for (key, code) in table {
            if code.is_empty() {
                valid = false;
                break;
            }
            let mut current = root;
            for i in 0..code.len() {
                let bit = code.get(i) as usize;
                let is_last_bit = i + 1 == code.len();
                let existing = match &nodes[current] {
                    Node::Internal { children } => children[bit],
                    Node::Leaf { .. } => {
                        valid = false;
                        break 'entries;
                    }
                };
                match existing {
                    None => {
                        if is_last_bit {
                            let leaf_idx = nodes.len();
                            nodes.push(Node::Leaf { symbol: *key, code: code.clone() });
                            if let Node::Internal { children } = &mut nodes[current] {
                                children[bit] = Some(leaf_idx);
                            }
                            leaf_by_symbol.insert(*key, leaf_idx);
                        } else {
                            let new_idx = nodes.len();
                            nodes.push(Node::Internal { children: [None, None] });
                            if let Node::Internal { children } = &mut nodes[current] {
                                children[bit] = Some(new_idx);
                            }
                            current = new_idx;
                        }
                    }
                    Some(next) => {
                        if is_last_bit {
                            valid = false;
                            break 'entries;
                        }
                        match &nodes[next] {
                            Node::Internal { .. } => current = next,
                            Node::Leaf { .. } => {
                                valid = false;
                                break 'entries;
                            }
                        }
                    }
                }
            }
        }

        if !valid {
            return HuffmanTransducer::new(symbol_size);
        }
        HuffmanTransducer { symbol_size, nodes, root, leaf_by_symbol, entropy: 0.0, avg_code_length: 0.0 }
    }

    /// Parses one stage descriptor off the front of `descriptor` and returns
    /// the leftover bits so a chain can dispatch the next stage in turn.
    pub fn deserializer(descriptor: &BitStream) -> (HuffmanTransducer, BitStream) {
        let invalid = |symbol_size| (HuffmanTransducer::new(symbol_size), BitStream::new());
        let header_fixed = 16 + 24 + 8;
        if descriptor.len() < header_fixed {
            log::debug!("huffman descriptor shorter than fixed header");
            return invalid(0);
        }
        let id = descriptor.slice(0, 16).to_u64() as u16;
        if id != STAGE_ID_HUFFMAN {
            log::debug!("huffman descriptor has wrong stage id {id:#06x}");
            return invalid(0);
        }
        let num_symbols = descriptor.slice(16, 24).to_u64() as usize;
        let symbol_size = descriptor.slice(40, 8).to_u64() as usize;
        if symbol_size == 0 {
            return invalid(0);
        }
        let mut offset = header_fixed;
        if descriptor.len() < offset + symbol_size {
            return invalid(symbol_size);
        }
        let mut current_key = descriptor.slice(offset, symbol_size).to_u64();
        offset += symbol_size;

        let mut table: Vec<(u64, BitStream)> = Vec::with_capacity(num_symbols);
        for idx in 0..num_symbols {
            if descriptor.len() < offset + 3 {
                return invalid(symbol_size);
            }
            let entry_bytes = descriptor.slice(offset, 3).to_u64() as usize;
            offset += 3;
            let body_len = entry_bytes * 8;
            if descriptor.len() < offset + body_len {
                return invalid(symbol_size);
            }
            let body = descriptor.slice(offset, body_len);
            offset += body_len;

            let a_width = body.find_longest_zero_run();
            if a_width >= body_len {
                return invalid(symbol_size);
            }
            let encoded_size = body.slice(0, a_width).to_u64() as usize;

            // The last entry has no successor key to delta-encode, so its
            // body is just `[A][Z]` with nothing after the zero run for a
            // trailing B field to be confused with.
            let is_last = idx + 1 == num_symbols;
            let offset_value = if is_last {
                0
            } else {
                let mut z = 0usize;
                while a_width + z < body_len && !body.get(a_width + z) {
                    z += 1;
                }
                let b_start = a_width + z;
                let b_width = body_len - b_start;
                body.slice(b_start, b_width).reverse().to_u64()
            };

            if descriptor.len() < offset + encoded_size {
                return invalid(symbol_size);
            }
            let code = descriptor.slice(offset, encoded_size);
            offset += encoded_size;

            table.push((current_key, code));
            current_key = current_key.wrapping_add(offset_value);
        }

        let remainder = descriptor.slice(offset, descriptor.len() - offset);
        (Self::from_table(symbol_size, &table), remainder)
    }
}

impl Stage for HuffmanTransducer {
    fn setup(&mut self, training_bits: &BitStream) {
        self.train(training_bits);
    }

    fn reset(&mut self) {
        *self = HuffmanTransducer::new(self.symbol_size);
    }

    fn is_valid(&self) -> bool {
        !self.nodes.is_empty() && !self.leaf_by_symbol.is_empty()
    }

    fn encoder_id(&self) -> u16 {
        STAGE_ID_HUFFMAN
    }

    fn encode(&self, bits: &BitStream) -> BitStream {
        if !self.is_valid() || self.symbol_size == 0 || bits.len() % self.symbol_size != 0 {
            return BitStream::new();
        }
        let count = bits.len() / self.symbol_size;
        let mut out = BitStream::new();
        for i in 0..count {
            let symbol = bits.slice(i * self.symbol_size, self.symbol_size).to_u64();
            if let Some(&leaf_idx) = self.leaf_by_symbol.get(&symbol) {
                if let Node::Leaf { code, .. } = &self.nodes[leaf_idx] {
                    out.append(code);
                }
            }
        }
        out
    }

    fn decode(&self, bits: &BitStream) -> BitStream {
        if !self.is_valid() {
            return BitStream::new();
        }
        let mut current = self.root;
        let mut symbols: Vec<u64> = Vec::new();
        for i in 0..bits.len() {
            match self.forward(current, bits.get(i), &mut symbols) {
                Some(next) => current = next,
                None => return Self::symbols_to_bits(&symbols, self.symbol_size),
            }
        }
        let _ = self.forward(current, false, &mut symbols);
        Self::symbols_to_bits(&symbols, self.symbol_size)
    }

    fn serialize(&self) -> Result<BitStream> {
        if !self.is_valid() {
            return Err(Error::InvalidStage { encoder_id: STAGE_ID_HUFFMAN });
        }
        let map = self.encoding_map();
        let keys: Vec<u64> = map.keys().copied().collect();

        let mut out = BitStream::new();
        out.append(&BitStream::from_uint(STAGE_ID_HUFFMAN as u64, 16));
        out.append(&BitStream::from_uint(map.len() as u64, 24));
        out.append(&BitStream::from_uint(self.symbol_size as u64, 8));
        out.append(&BitStream::from_uint(keys[0], self.symbol_size));

        for (i, &key) in keys.iter().enumerate() {
            let code = &map[&key];
            let is_last = i + 1 == keys.len();

            // The last entry has no successor key, so it carries no B field
            // at all: its body is just `[A][Z]`, avoiding any ambiguity
            // between a zero-valued B bit and an extra bit of Z.
            let b_bits = if is_last {
                None
            } else {
                let next_key = keys[i + 1];
                if next_key < key {
                    return Err(Error::NegativeOffset);
                }
                Some(BitStream::from_uint(next_key - key, 0).reverse())
            };
            let a_bits = BitStream::from_uint(code.len() as u64, 0);

            let mut z = a_bits.count_zeros() + 1;
            if let Some(b) = &b_bits {
                z = z.max(b.count_zeros() + 1);
            }
            let b_len = b_bits.as_ref().map_or(0, BitStream::len);
            let mut total = a_bits.len() + z + b_len;
            while total % 8 != 0 {
                z += 1;
                total += 1;
            }
            let entry_bytes = total / 8;
            if entry_bytes > 7 {
                return Err(Error::DeserializationError {
                    reason: "huffman table entry exceeds the 3-bit entry byte-size field",
                });
            }

            out.append(&BitStream::from_uint(entry_bytes as u64, 3));
            out.append(&a_bits);
            for _ in 0..z {
                out.push(false);
            }
            if let Some(b) = &b_bits {
                out.append(b);
            }
            out.append(code);
        }
        Ok(out)
    }
}

impl HuffmanTransducer {
    fn symbols_to_bits(symbols: &[u64], symbol_size: usize) -> BitStream {
        let mut out = BitStream::with_capacity(symbols.len() * symbol_size);
        for &s in symbols {
            out.append(&BitStream::from_uint(s, symbol_size));
        }
        out
    }
}

/// Scans symbol values of width `symbol_size` from the largest downward and
/// returns the first one absent from `used`. `None` if every value is used.
pub fn find_unused_symbol(used: &BTreeSet<u64>, symbol_size: usize) -> Option<u64> {
    if symbol_size == 0 || symbol_size > 63 {
        return None;
    }
    let max_value: u64 = (1u64 << symbol_size) - 1;
    let mut candidate = max_value;
    loop {
        if !used.contains(&candidate) {
            return Some(candidate);
        }
        if candidate == 0 {
            return None;
        }
        candidate -= 1;
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
    fn round_trip_skewed_alphabet() {
        let input = symbols(&[1, 1, 1, 1, 1, 1, 1, 2, 3], 8);
        let mut h = HuffmanTransducer::new(8);
        h.setup(&input);
        assert!(h.is_valid());
        let encoded = h.encode(&input);
        assert_eq!(h.decode(&encoded), input);
    }

    #[test]
    fn single_symbol_alphabet_gets_one_bit_code() {
        let input = symbols(&[42, 42, 42, 42], 8);
        let mut h = HuffmanTransducer::new(8);
        h.setup(&input);
        assert!(h.is_valid());
        let map = h.encoding_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map[&42].len(), 1);
        let encoded = h.encode(&input);
        assert_eq!(h.decode(&encoded), input);
    }

    #[test]
    fn empty_input_round_trips_to_empty() {
        let mut h = HuffmanTransducer::new(8);
        h.setup(&BitStream::new());
        assert!(!h.is_valid());
        assert_eq!(h.encode(&symbols(&[1], 8)), BitStream::new());
        assert_eq!(h.decode(&BitStream::new()), BitStream::new());
    }

    #[test]
    fn no_code_is_a_prefix_of_another() {
        let input = symbols(&[1, 2, 2, 3, 3, 3, 4, 4, 4, 4], 8);
        let mut h = HuffmanTransducer::new(8);
        h.setup(&input);
        let codes: Vec<BitStream> = h.encoding_map().into_values().collect();
        for (i, a) in codes.iter().enumerate() {
            for (j, b) in codes.iter().enumerate() {
                if i == j {
                    continue;
                }
                if a.len() <= b.len() {
                    assert_ne!(*a, b.slice(0, a.len()), "{a:?} is a prefix of {b:?}");
                }
            }
        }
    }

    #[test]
    fn expected_code_length_meets_entropy_bound() {
        let input = symbols(&[1, 1, 1, 1, 2, 2, 3, 4], 8);
        let mut h = HuffmanTransducer::new(8);
        h.setup(&input);
        assert!(h.avg_code_length() >= h.entropy() - 1e-9);
    }

    #[test]
    fn descriptor_round_trip() {
        let input = symbols(&[1, 1, 1, 1, 1, 2, 2, 3, 4, 5, 6, 7], 8);
        let mut h = HuffmanTransducer::new(8);
        h.setup(&input);
        let descriptor = h.serialize().unwrap();
        let (h2, remainder) = HuffmanTransducer::deserializer(&descriptor);
        assert_eq!(h2.encoding_map(), h.encoding_map());
        assert_eq!(h2.decode(&h.encode(&input)), input);
        assert_eq!(h2.encode(&input), h.encode(&input));
        assert!(remainder.is_empty());
    }

    #[test]
    fn deserializer_rejects_short_input() {
        let garbage = BitStream::from_uint(STAGE_ID_HUFFMAN as u64, 16);
        let (h, _) = HuffmanTransducer::deserializer(&garbage);
        assert!(!h.is_valid());
    }

    #[test]
    fn find_unused_symbol_scans_from_top() {
        let mut used = BTreeSet::new();
        used.insert(255u64);
        used.insert(254u64);
        assert_eq!(find_unused_symbol(&used, 8), Some(253));
    }

    #[test]
    fn find_unused_symbol_none_when_alphabet_saturated() {
        let used: BTreeSet<u64> = (0..=3u64).collect();
        assert_eq!(find_unused_symbol(&used, 2), None);
    }
}

//! Fixed-width symbol frequency and first-order transition counts.

use std::collections::BTreeMap;

use crate::bitstream::BitStream;
use crate::error::{Error, Result};

/// Symbol -> probability, Σ == 1 across the observed alphabet.
pub type FrequencyMap = BTreeMap<u64, f64>;

/// Symbol -> (Symbol -> count).
pub type TransitionMap = BTreeMap<u64, BTreeMap<u64, u64>>;

/// `bits.len() % symbol_size == 0` is required; each probability is
/// `occurrences / (bits.len() / symbol_size)`.
pub fn frequency(bits: &BitStream, symbol_size: usize) -> Result<FrequencyMap> {
    if symbol_size == 0 || bits.len() % symbol_size != 0 {
        return Err(Error::MisalignedInput { len: bits.len(), symbol_size });
    }
    let count = bits.len() / symbol_size;
    if count == 0 {
        return Ok(FrequencyMap::new());
    }
    let mut occurrences: BTreeMap<u64, u64> = BTreeMap::new();
    for i in 0..count {
        let symbol = bits.slice(i * symbol_size, symbol_size).to_u64();
        *occurrences.entry(symbol).or_insert(0) += 1;
    }
    let total = count as f64;
    Ok(occurrences.into_iter().map(|(sym, n)| (sym, n as f64 / total)).collect())
}

/// The first symbol seeds the `prev` cursor, so the first pair counted is
/// `(first, first)`. This is an intentional, documented quirk preserved from
/// the original training behavior.
pub fn transitions(bits: &BitStream, symbol_size: usize) -> Result<TransitionMap> {
    if symbol_size == 0 || bits.len() % symbol_size != 0 {
        return Err(Error::MisalignedInput { len: bits.len(), symbol_size });
    }
    let count = bits.len() / symbol_size;
    let mut result = TransitionMap::new();
    if count == 0 {
        return Ok(result);
    }
    let mut prev = bits.slice(0, symbol_size).to_u64();
    for i in 0..count {
        let current = bits.slice(i * symbol_size, symbol_size).to_u64();
        *result.entry(prev).or_default().entry(current).or_insert(0) += 1;
        prev = current;
    }
    Ok(result)
}

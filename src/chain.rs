//! Composes stages into a pipeline, dispatching on each stage's 16-bit id
//! instead of trait objects so the whole chain stays a plain value.

use crate::bitstream::BitStream;
use crate::error::{Error, Result};
use crate::huffman::HuffmanTransducer;
use crate::markov::MarkovEncoder;
use crate::padder::Padder;
use crate::stage::{Stage, STAGE_ID_CHAIN, STAGE_ID_HUFFMAN, STAGE_ID_MARKOV, STAGE_ID_PADDER};

#[derive(Clone, Debug)]
pub enum StageKind {
    Huffman(HuffmanTransducer),
    Markov(MarkovEncoder),
    Padder(Padder),
    Chain(EncoderChain),
}

impl Stage for StageKind {
    fn setup(&mut self, training_bits: &BitStream) {
        match self {
            StageKind::Huffman(s) => s.setup(training_bits),
            StageKind::Markov(s) => s.setup(training_bits),
            StageKind::Padder(s) => s.setup(training_bits),
            StageKind::Chain(s) => s.setup(training_bits),
        }
    }

    fn reset(&mut self) {
        match self {
            StageKind::Huffman(s) => s.reset(),
            StageKind::Markov(s) => s.reset(),
            StageKind::Padder(s) => s.reset(),
            StageKind::Chain(s) => s.reset(),
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            StageKind::Huffman(s) => s.is_valid(),
            StageKind::Markov(s) => s.is_valid(),
            StageKind::Padder(s) => s.is_valid(),
            StageKind::Chain(s) => s.is_valid(),
        }
    }

    fn encoder_id(&self) -> u16 {
        match self {
            StageKind::Huffman(s) => s.encoder_id(),
            StageKind::Markov(s) => s.encoder_id(),
            StageKind::Padder(s) => s.encoder_id(),
            StageKind::Chain(s) => s.encoder_id(),
        }
    }

    fn encode(&self, bits: &BitStream) -> BitStream {
        match self {
            StageKind::Huffman(s) => s.encode(bits),
            StageKind::Markov(s) => s.encode(bits),
            StageKind::Padder(s) => s.encode(bits),
            StageKind::Chain(s) => s.encode(bits),
        }
    }

    fn decode(&self, bits: &BitStream) -> BitStream {
        match self {
            StageKind::Huffman(s) => s.decode(bits),
            StageKind::Markov(s) => s.decode(bits),
            StageKind::Padder(s) => s.decode(bits),
            StageKind::Chain(s) => s.decode(bits),
        }
    }

    fn serialize(&self) -> Result<BitStream> {
        match self {
            StageKind::Huffman(s) => s.serialize(),
            StageKind::Markov(s) => s.serialize(),
            StageKind::Padder(s) => s.serialize(),
            StageKind::Chain(s) => s.serialize(),
        }
    }
}

/// An ordered pipeline of stages, each trained on first use against the
/// output of the stage before it.
#[derive(Clone, Debug, Default)]
pub struct EncoderChain {
    stages: Vec<StageKind>,
}

impl EncoderChain {
    pub fn new(stages: Vec<StageKind>) -> Self {
        EncoderChain { stages }
    }

    pub fn stages(&self) -> &[StageKind] {
        &self.stages
    }

    /// Threads `bits` through every stage in order, training any stage that
    /// is not yet valid on whatever has reached it so far. Returns the fully
    /// encoded payload plus a descriptor listing every stage's parameters in
    /// the reverse of the order they were applied, so decoding can read the
    /// descriptor front-to-back and undo stages in the right order.
    pub fn compress(&mut self, bits: &BitStream) -> Result<(BitStream, BitStream)> {
        let mut current = bits.clone();
        for stage in self.stages.iter_mut() {
            if !stage.is_valid() {
                stage.setup(&current);
            }
            if !stage.is_valid() {
                return Err(Error::InvalidStage { encoder_id: stage.encoder_id() });
            }
            current = stage.encode(&current);
        }
        let descriptor = self.build_descriptor()?;
        Ok((current, descriptor))
    }

    fn build_descriptor(&self) -> Result<BitStream> {
        let mut parts = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            parts.push(stage.serialize()?);
        }
        let mut out = BitStream::new();
        for part in parts.iter().rev() {
            out.append(part);
        }
        Ok(out)
    }

    /// Reconstructs stages from `descriptor` purely from what it describes
    /// and undoes them against `bits`. Does not need a pre-existing chain:
    /// this is the entry point for the decoding side of a pipeline that
    /// never trained anything itself.
    pub fn decompress(bits: &BitStream, descriptor: &BitStream) -> Result<BitStream> {
        let mut current = bits.clone();
        let mut remaining = descriptor.clone();
        while !remaining.is_empty() {
            if remaining.len() < 16 {
                return Err(Error::DeserializationError { reason: "truncated stage descriptor" });
            }
            let id = remaining.slice(0, 16).to_u64() as u16;
            let (stage, rest) = Self::deserialize_stage(id, &remaining)?;
            current = stage.decode(&current);
            remaining = rest;
        }
        Ok(current)
    }

    fn deserialize_stage(id: u16, descriptor: &BitStream) -> Result<(StageKind, BitStream)> {
        match id {
            STAGE_ID_HUFFMAN => {
                let (s, rest) = HuffmanTransducer::deserializer(descriptor);
                Ok((StageKind::Huffman(s), rest))
            }
            STAGE_ID_MARKOV => {
                let (s, rest) = MarkovEncoder::deserializer(descriptor);
                Ok((StageKind::Markov(s), rest))
            }
            STAGE_ID_PADDER => {
                let (s, rest) = Padder::deserializer(descriptor);
                Ok((StageKind::Padder(s), rest))
            }
            STAGE_ID_CHAIN => Self::deserialize_nested_chain(descriptor),
            other => {
                log::debug!("unknown stage id {other:#06x} in descriptor");
                Err(Error::DeserializationError { reason: "unknown stage id" })
            }
        }
    }

    fn deserialize_nested_chain(descriptor: &BitStream) -> Result<(StageKind, BitStream)> {
        let header = 16 + 8;
        if descriptor.len() < header {
            return Err(Error::DeserializationError { reason: "truncated nested chain header" });
        }
        let count = descriptor.slice(16, 8).to_u64() as usize;
        let mut remaining = descriptor.slice(header, descriptor.len() - header);
        let mut stages = Vec::with_capacity(count);
        for _ in 0..count {
            if remaining.len() < 16 {
                return Err(Error::DeserializationError { reason: "truncated nested chain stage" });
            }
            let inner_id = remaining.slice(0, 16).to_u64() as u16;
            let (stage, rest) = Self::deserialize_stage(inner_id, &remaining)?;
            stages.push(stage);
            remaining = rest;
        }
        // The descriptor lists stages in wire order, i.e. the reverse of the
        // order `self.stages` held them in when `build_descriptor` wrote
        // them out. `Stage::encode`/`Stage::decode` both expect `self.stages`
        // to hold the original encode order (encode walks it forward, decode
        // walks it `.rev()`), so undo that reversal here.
        stages.reverse();
        Ok((StageKind::Chain(EncoderChain { stages }), remaining))
    }
}

impl Stage for EncoderChain {
    fn setup(&mut self, training_bits: &BitStream) {
        let mut current = training_bits.clone();
        for stage in self.stages.iter_mut() {
            if !stage.is_valid() {
                stage.setup(&current);
            }
            current = stage.encode(&current);
        }
    }

    fn reset(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.reset();
        }
    }

    fn is_valid(&self) -> bool {
        !self.stages.is_empty() && self.stages.iter().all(|s| s.is_valid())
    }

    fn encoder_id(&self) -> u16 {
        STAGE_ID_CHAIN
    }

    fn encode(&self, bits: &BitStream) -> BitStream {
        if !self.is_valid() {
            return BitStream::new();
        }
        let mut current = bits.clone();
        for stage in &self.stages {
            current = stage.encode(&current);
        }
        current
    }

    fn decode(&self, bits: &BitStream) -> BitStream {
        if !self.is_valid() {
            return BitStream::new();
        }
        let mut current = bits.clone();
        for stage in self.stages.iter().rev() {
            current = stage.decode(&current);
        }
        current
    }

    fn serialize(&self) -> Result<BitStream> {
        if !self.is_valid() {
            return Err(Error::InvalidStage { encoder_id: STAGE_ID_CHAIN });
        }
        let inner = self.build_descriptor()?;
        let mut out = BitStream::new();
        out.append(&BitStream::from_uint(STAGE_ID_CHAIN as u64, 16));
        out.append(&BitStream::from_uint(self.stages.len() as u64, 8));
        out.append(&inner);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::padder::PaddingMode;

    fn symbols(values: &[u64], width: usize) -> BitStream {
        let mut out = BitStream::new();
        for &v in values {
            out.append(&BitStream::from_uint(v, width));
        }
        out
    }

    fn sample(symbol_size: usize) -> BitStream {
        symbols(&[1, 2, 1, 2, 1, 2, 1, 2, 3, 4, 4, 4, 4, 5], symbol_size)
    }

    #[test]
    fn trains_all_stages_on_first_use() {
        let mut chain = EncoderChain::new(vec![
            StageKind::Markov(MarkovEncoder::new(8, 0.4)),
            StageKind::Huffman(HuffmanTransducer::new(8)),
            StageKind::Padder(Padder::new(PaddingMode::WholeBytes)),
        ]);
        let input = sample(8);
        let (encoded, descriptor) = chain.compress(&input).unwrap();
        assert!(chain.is_valid());
        let decoded = EncoderChain::decompress(&encoded, &descriptor).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn in_memory_round_trip_matches_wire_round_trip() {
        let mut chain = EncoderChain::new(vec![
            StageKind::Markov(MarkovEncoder::new(8, 0.4)),
            StageKind::Huffman(HuffmanTransducer::new(8)),
        ]);
        let input = sample(8);
        let (encoded, descriptor) = chain.compress(&input).unwrap();
        assert_eq!(chain.decode(&encoded), input);
        assert_eq!(EncoderChain::decompress(&encoded, &descriptor).unwrap(), input);
    }

    #[test]
    fn nested_chain_round_trips_through_its_own_descriptor() {
        let inner = EncoderChain::new(vec![
            StageKind::Markov(MarkovEncoder::new(8, 0.4)),
            StageKind::Huffman(HuffmanTransducer::new(8)),
        ]);
        let mut outer = EncoderChain::new(vec![
            StageKind::Chain(inner),
            StageKind::Padder(Padder::new(PaddingMode::WholeBytes)),
        ]);
        let input = sample(8);
        let (encoded, descriptor) = outer.compress(&input).unwrap();
        assert_eq!(EncoderChain::decompress(&encoded, &descriptor).unwrap(), input);
    }

    #[test]
    fn empty_chain_is_invalid() {
        let chain = EncoderChain::new(vec![]);
        assert!(!chain.is_valid());
    }
}

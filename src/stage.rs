//! The common shape every encoding stage implements, dispatched through
//! [`StageKind`] instead of runtime polymorphism.

use crate::bitstream::BitStream;
use crate::error::Result;

pub const STAGE_ID_CHAIN: u16 = 0x0000;
pub const STAGE_ID_HUFFMAN: u16 = 0x0001;
pub const STAGE_ID_MARKOV: u16 = 0x0002;
pub const STAGE_ID_PADDER: u16 = 0x0003;

pub trait Stage {
    /// Trains parameters from a sample; idempotent after `reset`.
    fn setup(&mut self, training_bits: &BitStream);
    fn reset(&mut self);
    fn is_valid(&self) -> bool;
    fn encoder_id(&self) -> u16;
    /// Pure function of parameters and input.
    fn encode(&self, bits: &BitStream) -> BitStream;
    /// Inverse of `encode` under the stored parameters.
    fn decode(&self, bits: &BitStream) -> BitStream;
    /// Produces a stage descriptor; requires valid state.
    fn serialize(&self) -> Result<BitStream>;
}

pub mod bitstream;
pub mod chain;
pub mod config;
pub mod error;
pub mod framing;
pub mod huffman;
pub mod markov;
pub mod padder;
pub mod sliced;
pub mod stage;
pub mod statistics;

pub use bitstream::BitStream;
pub use error::{Error, Result};

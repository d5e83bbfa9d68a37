//! Crate-wide error type.
//!
//! Only top-level entry points (`EncoderChain`, the sliced driver, and the
//! CLI) ever return this. Stage-local `deserializer` constructors never
//! fail with an error value; malformed input just yields a stage whose
//! `is_valid()` is `false`.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("input length {len} is not a multiple of symbol size {symbol_size}")]
    MisalignedInput { len: usize, symbol_size: usize },

    #[error("stage {encoder_id:#06x} is invalid and could not be trained")]
    InvalidStage { encoder_id: u16 },

    #[error("deserialization failed: {reason}")]
    DeserializationError { reason: &'static str },

    #[error("huffman keys out of ascending order during serialization")]
    NegativeOffset,

    #[error("length prefix does not fit in {width_bytes} bytes")]
    WidthOverflow { width_bytes: usize },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

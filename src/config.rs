//! Knobs the original tool hard-coded as preprocessor defines. Kept here as
//! plain `const`s instead.

/// Default symbol width in bits. Does not work for odd byte sizes.
pub const DEF_SYMBOL_SIZE: usize = 16;

/// Markov encoder: a predicted successor is kept only if its share of the
/// row strictly exceeds this threshold.
pub const DEF_PROBABILITY_THRESHOLD: f64 = 0.4;

/// Number of independent slices the sliced driver splits input into.
pub const DEF_SLICE_COUNT: usize = 8;

/// Width, in bytes, of framing length prefixes.
pub const DEF_FRAME_WIDTH: usize = 4;

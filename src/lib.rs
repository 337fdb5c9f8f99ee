/// Trellis keypad driver - HT16K33 based 4x4 LED/button boards over I2C
///
/// A single board is driven through `Trellis`; up to eight boards can be tiled into
/// one logical surface with `TrellisSet`, where board `k` owns the global LED and
/// button indices `16k..16k+16`.

pub mod error;
pub mod pinmap;
pub mod set;
pub mod trellis;

// Re-export main types for convenience
pub use error::Error;
pub use set::{TrellisSet, MAX_BOARDS};
pub use trellis::{SharedTrellis, Trellis, DEFAULT_ADDRESS, KEYS_PER_BOARD};

//! Predefined inline capacities.
//!
//! Each constant is a number of bytes equal to a whole number of machine
//! words, so `S4` on a 64-bit target is 32 bytes. Any other `usize` at least
//! as large as a pointer is a valid capacity too.
//!
//! ```
//! use sized_any::SizedAny;
//! use sized_any::space::S4;
//!
//! let value: SizedAny<S4> = SizedAny::new([1usize, 2, 3, 4]);
//! assert!(!value.is_heap());
//! ```

use core::mem::size_of;

const WORD: usize = size_of::<usize>();

/// One word, the smallest legal capacity.
pub const S1: usize = WORD;
/// Two words.
pub const S2: usize = 2 * WORD;
/// Four words.
pub const S4: usize = 4 * WORD;
/// Eight words.
pub const S8: usize = 8 * WORD;
/// Sixteen words.
pub const S16: usize = 16 * WORD;
/// Thirty-two words.
pub const S32: usize = 32 * WORD;
/// Sixty-four words.
pub const S64: usize = 64 * WORD;

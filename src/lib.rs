//! # SizedAny: `Any` With a Configurable Inline Buffer
//!
//! [`SizedAny<N>`] holds one value of any `'static + Clone` type, chosen at
//! run time, like a `Box<dyn Any>` that remembers how to clone itself. Values
//! up to `N` bytes are stored inline in the container; larger or over-aligned
//! values fall back to a heap allocation.
//!
//! ## Core Concept
//!
//! Each container is a reference to a per-type descriptor plus `N` bytes of
//! storage. The descriptor knows, for any capacity, whether its type lives
//! inline or behind a pointer in those bytes, so containers of *different*
//! capacities can copy, move and swap values between each other without
//! allocating more than they have to.
//!
//! ## Quick Start
//!
//! ```rust
//! use sized_any::SizedAny;
//! use sized_any::space::S4;
//!
//! // Small values are stored inline
//! let mut small: SizedAny<S4> = SizedAny::new(42u32);
//! assert!(!small.is_heap());
//!
//! // Large values automatically use heap allocation
//! let large: SizedAny<S4> = SizedAny::new([0u64; 32]);
//! assert!(large.is_heap());
//!
//! // Typed access
//! assert_eq!(small.downcast_ref::<u32>(), Some(&42));
//! assert_eq!(small.downcast_ref::<u64>(), None);
//!
//! // Replace the value with one of another type
//! *small.emplace(String::from("hello")) += " world";
//! assert_eq!(small.downcast_ref::<String>().unwrap(), "hello world");
//! ```
//!
//! ## Configuration
//!
//! ### Feature Flags
//!
//! - **`std`** (enabled by default)
//!   - Links to the standard library
//!   - Disable for `#![no_std]` environments: `default-features = false`
//!
//! - **`tracing`** (enabled by default)
//!   - Emits `trace` events for heap allocations, frees and block reuse
//!
//! ### Custom Capacities
//!
//! The [`space`] module names common capacities, but any `usize` at least as
//! large as a pointer works:
//!
//! ```rust
//! use sized_any::SizedAny;
//!
//! type MyAny = SizedAny<128>;
//!
//! let value = MyAny::new([0u8; 100]);
//! assert!(!value.is_heap()); // Fits in custom space
//! ```
//!
//! **Important**: the inline buffer is aligned like a `usize`. A value that
//! needs a larger alignment is heap-allocated regardless of size.
//!
//! ## Working Across Capacities
//!
//! ```rust
//! use sized_any::SizedAny;
//!
//! let mut narrow: SizedAny<8> = SizedAny::new([1u64; 2]);
//! let mut wide: SizedAny<32> = SizedAny::new(7u8);
//! assert!(narrow.is_heap());
//!
//! narrow.swap_with(&mut wide);
//! assert_eq!(narrow.downcast_ref::<u8>(), Some(&7));
//! assert_eq!(wide.downcast_ref::<[u64; 2]>(), Some(&[1, 1]));
//! assert!(!wide.is_heap());
//!
//! let moved = SizedAny::<16>::moved_from(&mut wide);
//! assert!(!wide.has_value());
//! assert!(moved.is::<[u64; 2]>());
//! ```
//!
//! ## Sizing to Fit
//!
//! ```rust
//! #[macro_use]
//! extern crate sized_any;
//!
//! # fn main() {
//! let value = sized_any!([u32; 5], [1, 2, 3, 4, 5]);
//! assert_eq!(value.capacity(), 20);
//! assert!(!value.is_heap());
//! # }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![deny(clippy::as_conversions)]

extern crate alloc;

pub mod cast;
mod descriptor;
mod error;
mod sized_any;
pub mod space;
mod storage;
mod trace;

use core::any::Any;
use core::mem::{align_of, size_of};

pub use crate::cast::{any_cast, any_cast_mut, any_cast_owned, any_cast_ptr, any_cast_ptr_mut, any_cast_ref};
pub use crate::error::{AllocError, BadAnyCast};
pub use crate::sized_any::SizedAny;

/// Box a value in a [`SizedAny`] whose capacity is exactly what the value's
/// type needs.
///
/// The capacity is [`fit_capacity::<T>()`](fit_capacity), so `T` is stored
/// inline unless it is over-aligned. With only a type, the value is
/// `T::default()`.
///
/// # Example
///
/// ```
/// #[macro_use]
/// extern crate sized_any;
///
/// # fn main() {
/// let small = sized_any!(u8, b'a');
/// assert_eq!(small.capacity(), std::mem::size_of::<usize>());
///
/// #[derive(Clone, Default)]
/// struct Pair(usize, usize);
///
/// let pair = sized_any!(Pair);
/// assert_eq!(pair.capacity(), 2 * std::mem::size_of::<usize>());
/// assert!(pair.is::<Pair>());
/// # }
/// ```
#[macro_export]
macro_rules! sized_any {
    ($ty:ty, $value:expr) => {
        $crate::SizedAny::<{ $crate::fit_capacity::<$ty>() }>::new::<$ty>($value)
    };
    ($ty:ty) => {
        $crate::SizedAny::<{ $crate::fit_capacity::<$ty>() }>::new::<$ty>(
            <$ty as ::core::default::Default>::default(),
        )
    };
}

/// The smallest capacity at which `T` is stored inline, or the size of a
/// pointer if `T` is smaller than that or has to live on the heap anyway
/// because of its alignment.
pub const fn fit_capacity<T>() -> usize {
    let pointer = size_of::<*const ()>();
    if storage::needs_alloc(0, align_of::<T>(), usize::MAX) || size_of::<T>() < pointer {
        pointer
    } else {
        size_of::<T>()
    }
}

/// Creates a [`SizedAny`] of capacity `N` holding `value`.
///
/// ```
/// let value = sized_any::make_sized_any::<64, _>(vec![1, 2, 3]);
/// assert_eq!(value.capacity(), 64);
/// assert_eq!(value.downcast_ref::<Vec<i32>>().map(Vec::len), Some(3));
/// ```
pub fn make_sized_any<const N: usize, T: Any + Clone>(value: T) -> SizedAny<N> {
    SizedAny::new(value)
}

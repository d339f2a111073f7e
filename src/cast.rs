//! Free-standing typed accessors.
//!
//! These mirror the inherent `downcast*` methods of [`SizedAny`] but report a
//! type mismatch as a [`BadAnyCast`] error instead of `None`, and the pointer
//! forms accept a container that may not be there at all.
//!
//! ```
//! use sized_any::{any_cast, any_cast_ptr, any_cast_ref, SizedAny};
//!
//! let value: SizedAny<16> = SizedAny::new(String::from("hello"));
//!
//! assert_eq!(any_cast_ref::<String, 16>(&value).unwrap(), "hello");
//! assert!(any_cast::<u32, 16>(&value).is_err());
//! assert!(any_cast_ptr::<String, 16>(None).is_none());
//! ```

use core::any::{type_name, Any};

use crate::error::BadAnyCast;
use crate::SizedAny;

fn mismatch<T: Any, const N: usize>(operand: &SizedAny<N>) -> BadAnyCast {
    BadAnyCast::new(type_name::<T>(), operand.type_name())
}

/// Returns a clone of the held value if it is a `T`.
pub fn any_cast<T: Any + Clone, const N: usize>(operand: &SizedAny<N>) -> Result<T, BadAnyCast> {
    any_cast_ref(operand).cloned()
}

/// Returns a reference to the held value if it is a `T`.
pub fn any_cast_ref<T: Any, const N: usize>(operand: &SizedAny<N>) -> Result<&T, BadAnyCast> {
    operand
        .downcast_ref::<T>()
        .ok_or_else(|| mismatch::<T, N>(operand))
}

/// Returns a mutable reference to the held value if it is a `T`.
pub fn any_cast_mut<T: Any, const N: usize>(
    operand: &mut SizedAny<N>,
) -> Result<&mut T, BadAnyCast> {
    let err = mismatch::<T, N>(operand);
    operand.downcast_mut::<T>().ok_or(err)
}

/// Takes the held value out if it is a `T`, consuming the container.
pub fn any_cast_owned<T: Any, const N: usize>(operand: SizedAny<N>) -> Result<T, BadAnyCast> {
    let found = operand.type_name();
    operand
        .downcast::<T>()
        .map_err(|_| BadAnyCast::new(type_name::<T>(), found))
}

/// Returns a reference to the held value if there is a container and it holds
/// a `T`.
pub fn any_cast_ptr<T: Any, const N: usize>(operand: Option<&SizedAny<N>>) -> Option<&T> {
    operand?.downcast_ref::<T>()
}

/// Returns a mutable reference to the held value if there is a container and
/// it holds a `T`.
pub fn any_cast_ptr_mut<T: Any, const N: usize>(operand: Option<&mut SizedAny<N>>) -> Option<&mut T> {
    operand?.downcast_mut::<T>()
}

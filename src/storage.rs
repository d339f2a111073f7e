//! The inline buffer and its typed interpretations.
//!
//! A [`Storage<N>`] is `N` raw bytes aligned like a `usize`. On its own it
//! says nothing about what it holds: the owning container's descriptor decides,
//! for a given capacity, whether a `T` lives directly in the bytes or whether
//! the bytes hold the owning pointer to a heap block. [`Repr`] is that
//! decision made explicit.

use alloc::alloc::{alloc, dealloc, Layout};
use core::mem::{self, align_of, size_of, MaybeUninit};
use core::ptr::NonNull;

use crate::error::AllocError;
use crate::trace::{debug, trace};

/// Alignment every [`Storage`] is guaranteed to have.
pub(crate) const INLINE_ALIGN: usize = align_of::<usize>();

/// Whether a value of size `size` and alignment `align` has to be moved to the
/// heap to be stored in a buffer of `capacity` bytes.
#[inline]
pub(crate) const fn needs_alloc(size: usize, align: usize, capacity: usize) -> bool {
    size > capacity || align > INLINE_ALIGN
}

/// `N` uninitialized, word-aligned bytes.
#[repr(C)]
pub(crate) struct Storage<const N: usize> {
    _align: [usize; 0],
    bytes: [MaybeUninit<u8>; N],
}

impl<const N: usize> Storage<N> {
    #[inline]
    pub(crate) const fn uninit() -> Self {
        Storage {
            _align: [],
            bytes: [MaybeUninit::uninit(); N],
        }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr().cast()
    }

    #[inline]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.bytes.as_mut_ptr().cast()
    }
}

/// A buffer interpreted as holding a `T`.
pub(crate) enum Repr<T> {
    /// The first `size_of::<T>()` bytes of the buffer are a live `T`.
    Inline(NonNull<T>),
    /// The first pointer-sized bytes of the buffer own a heap block holding a
    /// live `T`.
    Heap(NonNull<T>),
}

impl<T> Repr<T> {
    /// Whether `T` is heap-backed in a buffer of `capacity` bytes.
    #[inline]
    pub(crate) const fn needs_alloc(capacity: usize) -> bool {
        needs_alloc(size_of::<T>(), align_of::<T>(), capacity)
    }

    /// Reads the representation of a `T` from `buf`.
    ///
    /// # Safety
    ///
    /// `buf` must be a non-null, word-aligned buffer of `capacity` bytes that
    /// currently holds a `T` laid out for `capacity`.
    #[inline]
    pub(crate) unsafe fn of(buf: *mut u8, capacity: usize) -> Self {
        if Self::needs_alloc(capacity) {
            Repr::Heap(buf.cast::<NonNull<T>>().read())
        } else {
            Repr::Inline(NonNull::new_unchecked(buf.cast::<T>()))
        }
    }

    /// Pointer to the live value, wherever it is.
    #[inline]
    pub(crate) fn value(&self) -> NonNull<T> {
        match *self {
            Repr::Inline(ptr) | Repr::Heap(ptr) => ptr,
        }
    }

    /// Moves `value` into `buf`, allocating a heap block first if `T` needs
    /// one at `capacity`. On failure `value` is dropped and `buf` untouched.
    ///
    /// # Safety
    ///
    /// `buf` must be a word-aligned buffer of `capacity` bytes with no live
    /// contents, and `capacity` must be at least the size of a pointer.
    #[inline]
    pub(crate) unsafe fn init(buf: *mut u8, capacity: usize, value: T) -> Result<Self, AllocError> {
        Self::init_with(buf, capacity, move || value)
    }

    /// Like [`Repr::init`], but builds the value with `f`, directly inside the
    /// heap block when there is one. `f` is not called if allocation fails.
    ///
    /// # Safety
    ///
    /// Same as [`Repr::init`].
    pub(crate) unsafe fn init_with<F>(buf: *mut u8, capacity: usize, f: F) -> Result<Self, AllocError>
    where
        F: FnOnce() -> T,
    {
        if Self::needs_alloc(capacity) {
            let block = place_on_heap(f)?;
            buf.cast::<NonNull<T>>().write(block);
            Ok(Repr::Heap(block))
        } else {
            let slot = buf.cast::<T>();
            slot.write(f());
            Ok(Repr::Inline(NonNull::new_unchecked(slot)))
        }
    }

    /// Moves the value out, freeing its heap block if it has one.
    ///
    /// # Safety
    ///
    /// The value must be live; the buffer is dead afterwards.
    pub(crate) unsafe fn into_value(self) -> T {
        match self {
            Repr::Heap(block) => {
                let value = block.as_ptr().read();
                deallocate(block);
                value
            }
            Repr::Inline(slot) => slot.as_ptr().read(),
        }
    }
}

/// Frees a heap block whose value was never written, if dropped before being
/// forgotten.
struct UnwrittenBlock<T>(NonNull<T>);

impl<T> Drop for UnwrittenBlock<T> {
    fn drop(&mut self) {
        // SAFETY: the block came from `allocate` and holds no live value.
        unsafe { deallocate(self.0) }
    }
}

/// Allocates a block for one `T` and builds the value in it with `f`. If `f`
/// unwinds the block is freed.
pub(crate) fn place_on_heap<T, F>(f: F) -> Result<NonNull<T>, AllocError>
where
    F: FnOnce() -> T,
{
    let block = allocate::<T>()?;
    let guard = UnwrittenBlock(block);
    // SAFETY: `block` is valid for writes of one `T`.
    unsafe { block.as_ptr().write(f()) };
    mem::forget(guard);
    Ok(block)
}

/// Allocates an uninitialized heap block for one `T`.
///
/// Zero-sized types get a dangling, well-aligned pointer and no allocation.
pub(crate) fn allocate<T>() -> Result<NonNull<T>, AllocError> {
    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        return Ok(NonNull::dangling());
    }
    // SAFETY: the layout has a non-zero size.
    let ptr = unsafe { alloc(layout) };
    match NonNull::new(ptr.cast::<T>()) {
        Some(block) => {
            trace!(size = layout.size(), align = layout.align(), "allocated heap block");
            Ok(block)
        }
        None => {
            debug!(size = layout.size(), align = layout.align(), "heap allocation failed");
            Err(AllocError::new(layout))
        }
    }
}

/// Frees a block obtained from [`allocate`]. The value in it must already be
/// dropped or moved out.
///
/// # Safety
///
/// `block` must come from `allocate::<T>()` and not have been freed yet.
pub(crate) unsafe fn deallocate<T>(block: NonNull<T>) {
    let layout = Layout::new::<T>();
    if layout.size() != 0 {
        trace!(size = layout.size(), align = layout.align(), "freed heap block");
        dealloc(block.as_ptr().cast(), layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_alignment() {
        assert_eq!(align_of::<Storage<16>>(), INLINE_ALIGN);
        assert_eq!(size_of::<Storage<16>>(), 16);
        assert_eq!(size_of::<Storage<9>>() % INLINE_ALIGN, 0);
    }

    #[test]
    fn test_needs_alloc() {
        assert!(!Repr::<u8>::needs_alloc(8));
        assert!(!Repr::<[u64; 2]>::needs_alloc(16));
        assert!(Repr::<[u64; 3]>::needs_alloc(16));
        assert!(!Repr::<()>::needs_alloc(8));

        #[repr(align(64))]
        struct Overaligned;
        assert!(Repr::<Overaligned>::needs_alloc(1024));
    }

    #[test]
    fn test_needs_alloc_monotonic() {
        for capacity in 8..64 {
            if !Repr::<[u8; 24]>::needs_alloc(capacity) {
                assert!(!Repr::<[u8; 24]>::needs_alloc(capacity + 1));
            }
        }
    }

    #[test]
    fn test_init_and_read_back() {
        let mut inline = Storage::<16>::uninit();
        let mut heap = Storage::<16>::uninit();
        unsafe {
            let repr = Repr::init(inline.as_mut_ptr(), 16, 7u64).unwrap();
            assert!(matches!(repr, Repr::Inline(_)));
            assert_eq!(*Repr::<u64>::of(inline.as_mut_ptr(), 16).value().as_ptr(), 7);

            let repr = Repr::init(heap.as_mut_ptr(), 16, [3u64; 4]).unwrap();
            assert!(matches!(repr, Repr::Heap(_)));
            let block = Repr::<[u64; 4]>::of(heap.as_mut_ptr(), 16).value();
            assert_eq!(*block.as_ptr(), [3; 4]);
            deallocate(block);
        }
    }
}

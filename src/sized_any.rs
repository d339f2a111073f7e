use core::any::{Any, TypeId};
use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, size_of};

use alloc::alloc::handle_alloc_error;

use crate::descriptor::{replace_with, Descriptor, VOID};
use crate::error::AllocError;
use crate::storage::{Repr, Storage};

/// A type-erased value stored inline when it fits in `N` bytes and on the heap
/// otherwise.
///
/// `N` is the inline capacity in bytes and must be at least the size of a
/// pointer. A value goes to the heap when it is larger than `N` or needs a
/// stricter alignment than `usize`.
///
/// ```
/// use sized_any::SizedAny;
///
/// let mut value: SizedAny<32> = SizedAny::new(42i32);
/// assert_eq!(value.downcast_ref::<i32>(), Some(&42));
/// assert_eq!(value.downcast_ref::<f64>(), None);
///
/// value.set(String::from("hello"));
/// assert!(value.is::<String>());
/// ```
///
/// A capacity smaller than a pointer is rejected at compile time:
///
/// ```compile_fail
/// let tiny = sized_any::SizedAny::<2>::empty();
/// ```
pub struct SizedAny<const N: usize> {
    descriptor: &'static Descriptor,
    storage: Storage<N>,
    _not_send_sync: PhantomData<*const ()>,
}

#[inline]
fn or_abort<T>(result: Result<T, AllocError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => handle_alloc_error(err.layout()),
    }
}

impl<const N: usize> SizedAny<N> {
    /// Inline capacity in bytes.
    pub const CAPACITY: usize = N;

    /// Creates an empty container.
    #[inline]
    pub fn empty() -> Self {
        const {
            assert!(
                N >= size_of::<*const ()>(),
                "`SizedAny` capacity must be able to hold a pointer"
            )
        };
        SizedAny {
            descriptor: &VOID,
            storage: Storage::uninit(),
            _not_send_sync: PhantomData,
        }
    }

    /// Stores `value` inline or on the heap depending on its size.
    ///
    /// # Example
    ///
    /// ```
    /// use sized_any::SizedAny;
    /// use sized_any::space::S4;
    ///
    /// let small: SizedAny<S4> = SizedAny::new([0usize; 2]);
    /// let large: SizedAny<S4> = SizedAny::new([1usize; 8]);
    ///
    /// assert!(!small.is_heap());
    /// assert!(large.is_heap());
    /// ```
    pub fn new<T: Any + Clone>(value: T) -> Self {
        or_abort(Self::try_new(value))
    }

    /// Like [`SizedAny::new`], but reports a failed heap allocation instead of
    /// aborting.
    pub fn try_new<T: Any + Clone>(value: T) -> Result<Self, AllocError> {
        Self::try_new_with(move || value)
    }

    /// Builds the value with `f` directly in its final place.
    ///
    /// ```
    /// use sized_any::SizedAny;
    ///
    /// let value: SizedAny<8> = SizedAny::new_with(|| vec![1u8; 128]);
    /// assert_eq!(value.downcast_ref::<Vec<u8>>().map(Vec::len), Some(128));
    /// ```
    pub fn new_with<T: Any + Clone, F: FnOnce() -> T>(f: F) -> Self {
        or_abort(Self::try_new_with(f))
    }

    /// Like [`SizedAny::new_with`], but reports a failed heap allocation
    /// instead of aborting. `f` is not called in that case.
    pub fn try_new_with<T: Any + Clone, F: FnOnce() -> T>(f: F) -> Result<Self, AllocError> {
        let mut this = Self::empty();
        unsafe {
            Repr::init_with(this.storage.as_mut_ptr(), N, f)?;
        }
        this.descriptor = Descriptor::of::<T>();
        Ok(this)
    }

    /// Clones the value held by a container of any capacity.
    ///
    /// ```
    /// use sized_any::SizedAny;
    ///
    /// let narrow: SizedAny<8> = SizedAny::new([7u64; 3]);
    /// let wide = SizedAny::<32>::copied_from(&narrow);
    /// assert!(narrow.is_heap());
    /// assert!(!wide.is_heap());
    /// assert_eq!(wide.downcast_ref::<[u64; 3]>(), Some(&[7; 3]));
    /// ```
    pub fn copied_from<const M: usize>(source: &SizedAny<M>) -> Self {
        or_abort(Self::try_copied_from(source))
    }

    /// Like [`SizedAny::copied_from`], but reports a failed heap allocation
    /// instead of aborting.
    pub fn try_copied_from<const M: usize>(source: &SizedAny<M>) -> Result<Self, AllocError> {
        let mut this = Self::empty();
        unsafe {
            source
                .descriptor
                .copy(source.storage.as_ptr(), this.storage.as_mut_ptr(), M, N)?;
        }
        this.descriptor = source.descriptor;
        Ok(this)
    }

    /// Moves the value out of a container of any capacity, leaving `source`
    /// empty.
    ///
    /// A value already on the heap keeps its block. This never allocates when
    /// `M <= N`.
    pub fn moved_from<const M: usize>(source: &mut SizedAny<M>) -> Self {
        or_abort(Self::try_moved_from(source))
    }

    /// Like [`SizedAny::moved_from`], but reports a failed heap allocation
    /// instead of aborting. `source` is untouched in that case.
    pub fn try_moved_from<const M: usize>(source: &mut SizedAny<M>) -> Result<Self, AllocError> {
        let mut this = Self::empty();
        unsafe {
            source.descriptor.relocate(
                source.storage.as_mut_ptr(),
                this.storage.as_mut_ptr(),
                M,
                N,
            )?;
        }
        this.descriptor = mem::replace(&mut source.descriptor, &VOID);
        Ok(this)
    }

    /// Moves the value into a container of capacity `M`.
    ///
    /// An inline value goes to the heap if it does not fit in `M` bytes. A
    /// heap-backed value keeps its block while it still does not fit and moves
    /// inline once it does.
    ///
    /// # Example
    ///
    /// ```
    /// use sized_any::SizedAny;
    /// use sized_any::space::{S2, S4};
    ///
    /// let s: SizedAny<S4> = SizedAny::new([0usize; 4]);
    /// let m: SizedAny<S2> = s.resize();
    /// assert!(m.is_heap());
    /// ```
    pub fn resize<const M: usize>(mut self) -> SizedAny<M> {
        SizedAny::moved_from(&mut self)
    }

    /// Replaces the held value with `value`, as [`SizedAny::emplace`] does.
    pub fn set<T: Any + Clone>(&mut self, value: T) {
        self.emplace(value);
    }

    /// Like [`SizedAny::set`], but reports a failed heap allocation instead of
    /// aborting. `self` is untouched in that case.
    pub fn try_set<T: Any + Clone>(&mut self, value: T) -> Result<(), AllocError> {
        self.try_emplace(value).map(drop)
    }

    /// Replaces the held value with a clone of the value in `source`.
    ///
    /// The old heap block is reused when the clone needs one of the same
    /// layout. If `clone` panics, `self` keeps its old value.
    ///
    /// ```compile_fail
    /// use sized_any::SizedAny;
    ///
    /// let mut a: SizedAny<16> = SizedAny::new(1u8);
    /// a.assign_copy(&a);
    /// ```
    pub fn assign_copy<const M: usize>(&mut self, source: &SizedAny<M>) {
        or_abort(self.try_assign_copy(source))
    }

    /// Like [`SizedAny::assign_copy`], but reports a failed heap allocation
    /// instead of aborting. `self` is untouched in that case.
    pub fn try_assign_copy<const M: usize>(&mut self, source: &SizedAny<M>) -> Result<(), AllocError> {
        let incoming = source.descriptor;
        unsafe {
            incoming.replace_copy(
                source.storage.as_ptr(),
                self.storage.as_mut_ptr(),
                M,
                N,
                &mut self.descriptor,
            )?;
        }
        self.descriptor = incoming;
        Ok(())
    }

    /// Replaces the held value with the one in `source`, leaving `source`
    /// empty.
    ///
    /// A heap-backed value that is still heap-backed at `N` keeps its block.
    pub fn assign_moved<const M: usize>(&mut self, source: &mut SizedAny<M>) {
        or_abort(self.try_assign_moved(source))
    }

    /// Like [`SizedAny::assign_moved`], but reports a failed heap allocation
    /// instead of aborting. Both containers are untouched in that case.
    pub fn try_assign_moved<const M: usize>(
        &mut self,
        source: &mut SizedAny<M>,
    ) -> Result<(), AllocError> {
        let incoming = mem::replace(&mut source.descriptor, &VOID);
        let moved = unsafe {
            incoming.replace_move(
                source.storage.as_mut_ptr(),
                self.storage.as_mut_ptr(),
                M,
                N,
                &mut self.descriptor,
            )
        };
        match moved {
            Ok(()) => {
                self.descriptor = incoming;
                Ok(())
            }
            Err(err) => {
                source.descriptor = incoming;
                Err(err)
            }
        }
    }

    /// Replaces the held value with `value` in place and returns a reference
    /// to it.
    ///
    /// If both the old and the new value live on the heap and their types have
    /// the same size and alignment, the old heap block is reused for the new
    /// value. Otherwise the old value is released and the new one stored as
    /// [`SizedAny::new`] would.
    ///
    /// ```
    /// use sized_any::SizedAny;
    ///
    /// let mut value: SizedAny<8> = SizedAny::new([1u64; 4]);
    /// let numbers = value.emplace([2i64; 4]);
    /// numbers[0] = -2;
    /// assert_eq!(value.downcast_ref::<[i64; 4]>(), Some(&[-2, 2, 2, 2]));
    /// ```
    pub fn emplace<T: Any + Clone>(&mut self, value: T) -> &mut T {
        or_abort(self.try_emplace_with(move || value))
    }

    /// Like [`SizedAny::emplace`], but builds the value with `f`.
    pub fn emplace_with<T: Any + Clone, F: FnOnce() -> T>(&mut self, f: F) -> &mut T {
        or_abort(self.try_emplace_with(f))
    }

    /// Like [`SizedAny::emplace`], but reports a failed heap allocation instead
    /// of aborting. `self` is untouched in that case.
    pub fn try_emplace<T: Any + Clone>(&mut self, value: T) -> Result<&mut T, AllocError> {
        self.try_emplace_with(move || value)
    }

    /// Like [`SizedAny::emplace_with`], but reports a failed heap allocation
    /// instead of aborting. `self` is untouched in that case.
    pub fn try_emplace_with<T: Any + Clone, F: FnOnce() -> T>(
        &mut self,
        f: F,
    ) -> Result<&mut T, AllocError> {
        let value = unsafe { replace_with(self.storage.as_mut_ptr(), N, &mut self.descriptor, f)? };
        self.descriptor = Descriptor::of::<T>();
        Ok(unsafe { &mut *value.as_ptr() })
    }

    /// Drops the held value, if any. The container is empty afterwards.
    pub fn reset(&mut self) {
        let current = mem::replace(&mut self.descriptor, &VOID);
        unsafe { current.release(self.storage.as_mut_ptr(), N) }
    }

    /// Exchanges the values of two containers of the same capacity.
    ///
    /// Values are relocated through a temporary buffer, heap-backed ones by
    /// handing over their pointer. Never allocates.
    ///
    /// A container cannot be swapped with itself:
    ///
    /// ```compile_fail
    /// use sized_any::SizedAny;
    ///
    /// let mut a: SizedAny<16> = SizedAny::new(1u8);
    /// a.swap(&mut a);
    /// ```
    pub fn swap(&mut self, other: &mut Self) {
        let mut parked = Storage::<N>::uninit();
        unsafe {
            other
                .descriptor
                .grow(other.storage.as_mut_ptr(), parked.as_mut_ptr(), N, N);
            self.descriptor
                .grow(self.storage.as_mut_ptr(), other.storage.as_mut_ptr(), N, N);
            other
                .descriptor
                .grow(parked.as_mut_ptr(), self.storage.as_mut_ptr(), N, N);
        }
        mem::swap(&mut self.descriptor, &mut other.descriptor);
    }

    /// Exchanges the values of two containers of possibly different capacity.
    ///
    /// Goes through a temporary buffer of the smaller capacity. The only step
    /// that can allocate is moving the value of the larger container into
    /// that buffer, which happens when that value does not fit the smaller
    /// capacity.
    pub fn swap_with<const M: usize>(&mut self, other: &mut SizedAny<M>) {
        or_abort(self.try_swap_with(other))
    }

    /// Like [`SizedAny::swap_with`], but reports a failed heap allocation
    /// instead of aborting. Both containers are untouched in that case.
    pub fn try_swap_with<const M: usize>(&mut self, other: &mut SizedAny<M>) -> Result<(), AllocError> {
        let (mine, theirs) = (self.descriptor, other.descriptor);
        // Only parking the larger container's value can fail; the other two
        // steps grow into a capacity at least as large.
        unsafe {
            if M < N {
                let mut parked = Storage::<M>::uninit();
                mine.relocate(self.storage.as_mut_ptr(), parked.as_mut_ptr(), N, M)?;
                theirs.grow(other.storage.as_mut_ptr(), self.storage.as_mut_ptr(), M, N);
                mine.grow(parked.as_mut_ptr(), other.storage.as_mut_ptr(), M, M);
            } else {
                let mut parked = Storage::<N>::uninit();
                theirs.relocate(other.storage.as_mut_ptr(), parked.as_mut_ptr(), M, N)?;
                mine.grow(self.storage.as_mut_ptr(), other.storage.as_mut_ptr(), N, M);
                theirs.grow(parked.as_mut_ptr(), self.storage.as_mut_ptr(), N, N);
            }
        }
        self.descriptor = theirs;
        other.descriptor = mine;
        Ok(())
    }

    /// Inline capacity in bytes.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Returns true if a value is held.
    #[inline]
    pub fn has_value(&self) -> bool {
        !self.descriptor.is_void()
    }

    /// Returns true if the held value is heap-allocated. An empty container is
    /// never heap-allocated.
    #[inline]
    pub fn is_heap(&self) -> bool {
        self.descriptor.needs_alloc(N)
    }

    /// [`TypeId`] of the held value, or `None` if empty.
    pub fn value_type_id(&self) -> Option<TypeId> {
        self.has_value().then(|| self.descriptor.type_id())
    }

    /// Name of the held value's type, or `None` if empty. For diagnostics only.
    pub fn type_name(&self) -> Option<&'static str> {
        self.has_value().then(|| self.descriptor.type_name())
    }

    /// Returns true if the held value is a `T`.
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.descriptor.is::<T>()
    }

    /// Returns a reference to the held value if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        if self.is::<T>() {
            unsafe {
                let repr = Repr::<T>::of(self.storage.as_ptr().cast_mut(), N);
                Some(&*repr.value().as_ptr())
            }
        } else {
            None
        }
    }

    /// Returns a mutable reference to the held value if it is a `T`.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        if self.is::<T>() {
            unsafe {
                let repr = Repr::<T>::of(self.storage.as_mut_ptr(), N);
                Some(&mut *repr.value().as_ptr())
            }
        } else {
            None
        }
    }

    /// Takes the held value out if it is a `T`, or gives the container back.
    ///
    /// ```
    /// use sized_any::SizedAny;
    ///
    /// let value: SizedAny<16> = SizedAny::new(0x01u32);
    /// let value = value.downcast::<u8>().unwrap_err();
    /// assert_eq!(value.downcast::<u32>().ok(), Some(0x01));
    /// ```
    pub fn downcast<T: Any>(mut self) -> Result<T, Self> {
        if !self.is::<T>() {
            return Err(self);
        }
        self.descriptor = &VOID;
        Ok(unsafe { Repr::<T>::of(self.storage.as_mut_ptr(), N).into_value() })
    }
}

impl<const N: usize> Default for SizedAny<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> Drop for SizedAny<N> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<const N: usize> Clone for SizedAny<N> {
    fn clone(&self) -> Self {
        Self::copied_from(self)
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign_copy(source);
    }
}

impl<const N: usize> fmt::Debug for SizedAny<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SizedAny")
            .field("type", &self.type_name())
            .field("capacity", &N)
            .field("heap", &self.is_heap())
            .finish()
    }
}

//! Per-type operation tables.
//!
//! A [`Descriptor`] is what a [`SizedAny`](crate::SizedAny) keeps next to its
//! buffer instead of the erased type. It is a `&'static` record of function
//! pointers instantiated for one concrete type `T`, so calling through it
//! dispatches to code that knows `T`.
//!
//! # Safety Invariant
//!
//! Every function pointer in a descriptor created by [`Descriptor::of::<T>`]
//! is the `T` instantiation of the matching function below. The only other
//! descriptor is [`VOID`], whose functions do nothing. Callers must only pass
//! buffers whose contents were laid out by the same descriptor for the
//! capacity they pass alongside.

use core::any::{type_name, Any, TypeId};
use core::mem::{self, align_of, size_of};
use core::ptr::{self, NonNull};

use crate::error::AllocError;
use crate::storage::{self, allocate, deallocate, place_on_heap, Repr};
use crate::trace::trace;

/// Uninhabited marker standing for "no value". Not nameable outside this
/// module, so it can never be requested from a container.
enum Vacant {}

/// Function-pointer table driving storage of one erased type.
pub(crate) struct Descriptor {
    type_id: fn() -> TypeId,
    type_name: fn() -> &'static str,
    size: usize,
    align: usize,
    copy: unsafe fn(*const u8, *mut u8, usize, usize) -> Result<(), AllocError>,
    relocate: unsafe fn(*mut u8, *mut u8, usize, usize) -> Result<(), AllocError>,
    grow: unsafe fn(*mut u8, *mut u8, usize, usize),
    replace_copy: unsafe fn(*const u8, *mut u8, usize, usize, &mut &'static Descriptor) -> Result<(), AllocError>,
    replace_move: unsafe fn(*mut u8, *mut u8, usize, usize, &mut &'static Descriptor) -> Result<(), AllocError>,
    destroy_in_place: unsafe fn(*mut u8, usize),
    release: unsafe fn(*mut u8, usize),
}

/// The descriptor of every empty container.
pub(crate) static VOID: Descriptor = Descriptor {
    type_id: TypeId::of::<Vacant>,
    type_name: type_name::<Vacant>,
    size: 0,
    align: 1,
    copy: void_copy,
    relocate: void_relocate,
    grow: void_grow,
    replace_copy: void_replace_copy,
    replace_move: void_replace_move,
    destroy_in_place: void_drop,
    release: void_drop,
};

impl Descriptor {
    /// The descriptor for `T`.
    #[inline]
    pub(crate) const fn of<T: Any + Clone>() -> &'static Descriptor {
        const {
            &Descriptor {
                type_id: TypeId::of::<T>,
                type_name: type_name::<T>,
                size: size_of::<T>(),
                align: align_of::<T>(),
                copy: copy::<T>,
                relocate: relocate::<T>,
                grow: grow::<T>,
                replace_copy: replace_copy::<T>,
                replace_move: replace_move::<T>,
                destroy_in_place: destroy_in_place::<T>,
                release: release::<T>,
            }
        }
    }

    #[inline]
    pub(crate) fn is_void(&'static self) -> bool {
        ptr::eq(self, &VOID)
    }

    #[inline]
    pub(crate) fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    #[inline]
    pub(crate) fn type_name(&self) -> &'static str {
        (self.type_name)()
    }

    #[inline]
    pub(crate) fn is<T: Any>(&self) -> bool {
        self.type_id() == TypeId::of::<T>()
    }

    /// Whether the described type is heap-backed at `capacity`.
    #[inline]
    pub(crate) fn needs_alloc(&self, capacity: usize) -> bool {
        storage::needs_alloc(self.size, self.align, capacity)
    }

    /// Whether a heap block holding the described type can be handed back to
    /// the allocator as a block holding a `T`.
    #[inline]
    pub(crate) fn same_block_layout<T>(&self) -> bool {
        self.size == size_of::<T>() && self.align == align_of::<T>()
    }

    /// Writes a clone of the value in `src` into `dst`.
    ///
    /// # Safety
    ///
    /// `src` holds a value of the described type laid out for `src_cap`;
    /// `dst` is a dead buffer of `dst_cap` bytes. On error `dst` is untouched.
    #[inline]
    pub(crate) unsafe fn copy(
        &self,
        src: *const u8,
        dst: *mut u8,
        src_cap: usize,
        dst_cap: usize,
    ) -> Result<(), AllocError> {
        (self.copy)(src, dst, src_cap, dst_cap)
    }

    /// Relocates the value in `src` into `dst`. On success `src` is dead and
    /// the caller must stop treating it as holding a value; on error both
    /// buffers are untouched. Never fails when `src_cap <= dst_cap`.
    ///
    /// # Safety
    ///
    /// Same as [`Descriptor::copy`], and `src` must be a distinct buffer.
    #[inline]
    pub(crate) unsafe fn relocate(
        &self,
        src: *mut u8,
        dst: *mut u8,
        src_cap: usize,
        dst_cap: usize,
    ) -> Result<(), AllocError> {
        (self.relocate)(src, dst, src_cap, dst_cap)
    }

    /// Relocates into a buffer at least as large as the source, which never
    /// allocates: an inline value stays inline and a heap block is either
    /// handed over or emptied into `dst`.
    ///
    /// # Safety
    ///
    /// Same as [`Descriptor::relocate`], and `src_cap <= dst_cap`.
    #[inline]
    pub(crate) unsafe fn grow(&self, src: *mut u8, dst: *mut u8, src_cap: usize, dst_cap: usize) {
        debug_assert!(src_cap <= dst_cap);
        (self.grow)(src, dst, src_cap, dst_cap)
    }

    /// Replaces the value in `dst`, described by `*current`, with a clone of
    /// the value in `src`, reusing the heap block of the old value when the
    /// clone needs one of the same layout.
    ///
    /// On success `*current` is [`VOID`] and the caller installs `self` as the
    /// descriptor of `dst`. On error, or if `clone` unwinds, `dst` and
    /// `*current` are untouched.
    ///
    /// # Safety
    ///
    /// `src` holds a value of the described type laid out for `src_cap`, and
    /// `dst` holds a value laid out by `*current` for `dst_cap`.
    #[inline]
    pub(crate) unsafe fn replace_copy(
        &self,
        src: *const u8,
        dst: *mut u8,
        src_cap: usize,
        dst_cap: usize,
        current: &mut &'static Descriptor,
    ) -> Result<(), AllocError> {
        (self.replace_copy)(src, dst, src_cap, dst_cap, current)
    }

    /// Like [`Descriptor::replace_copy`], but moves the value out of `src`. A
    /// heap block that is still needed at `dst_cap` is handed over instead.
    /// On success `src` is dead; on error both buffers are untouched.
    ///
    /// # Safety
    ///
    /// Same as [`Descriptor::replace_copy`]. The owner of `src` must already
    /// be marked empty so that an unwinding destructor of the old value in
    /// `dst` cannot lead to a second drop of the moved value.
    #[inline]
    pub(crate) unsafe fn replace_move(
        &self,
        src: *mut u8,
        dst: *mut u8,
        src_cap: usize,
        dst_cap: usize,
        current: &mut &'static Descriptor,
    ) -> Result<(), AllocError> {
        (self.replace_move)(src, dst, src_cap, dst_cap, current)
    }

    /// Drops the value without freeing its heap block.
    ///
    /// # Safety
    ///
    /// `buf` holds a value of the described type laid out for `capacity`. The
    /// value is dead afterwards.
    #[inline]
    pub(crate) unsafe fn destroy_in_place(&self, buf: *mut u8, capacity: usize) {
        (self.destroy_in_place)(buf, capacity)
    }

    /// Drops the value and frees its heap block, if any.
    ///
    /// # Safety
    ///
    /// Same as [`Descriptor::destroy_in_place`].
    #[inline]
    pub(crate) unsafe fn release(&self, buf: *mut u8, capacity: usize) {
        (self.release)(buf, capacity)
    }
}

unsafe fn copy<T: Clone>(
    src: *const u8,
    dst: *mut u8,
    src_cap: usize,
    dst_cap: usize,
) -> Result<(), AllocError> {
    let source = Repr::<T>::of(src.cast_mut(), src_cap).value();
    // `clone` may unwind; nothing has been written to `dst` yet.
    let value = source.as_ref().clone();
    Repr::init(dst, dst_cap, value).map(drop)
}

unsafe fn relocate<T>(
    src: *mut u8,
    dst: *mut u8,
    src_cap: usize,
    dst_cap: usize,
) -> Result<(), AllocError> {
    if let Repr::Inline(slot) = Repr::<T>::of(src, src_cap) {
        if Repr::<T>::needs_alloc(dst_cap) {
            let block = allocate::<T>()?;
            ptr::copy_nonoverlapping(slot.as_ptr(), block.as_ptr(), 1);
            dst.cast::<NonNull<T>>().write(block);
            return Ok(());
        }
    }
    grow::<T>(src, dst, src_cap, dst_cap);
    Ok(())
}

unsafe fn grow<T>(src: *mut u8, dst: *mut u8, src_cap: usize, dst_cap: usize) {
    match (Repr::<T>::of(src, src_cap), Repr::<T>::needs_alloc(dst_cap)) {
        (Repr::Heap(block), true) => dst.cast::<NonNull<T>>().write(block),
        (Repr::Heap(block), false) => {
            let value = block.as_ptr().read();
            deallocate(block);
            dst.cast::<T>().write(value);
        }
        (Repr::Inline(slot), _) => ptr::copy_nonoverlapping(slot.as_ptr(), dst.cast::<T>(), 1),
    }
}

unsafe fn replace_copy<T: Clone>(
    src: *const u8,
    dst: *mut u8,
    src_cap: usize,
    dst_cap: usize,
    current: &mut &'static Descriptor,
) -> Result<(), AllocError> {
    let source = Repr::<T>::of(src.cast_mut(), src_cap).value();
    replace_with(dst, dst_cap, current, || unsafe { source.as_ref() }.clone()).map(drop)
}

unsafe fn replace_move<T>(
    src: *mut u8,
    dst: *mut u8,
    src_cap: usize,
    dst_cap: usize,
    current: &mut &'static Descriptor,
) -> Result<(), AllocError> {
    match Repr::<T>::of(src, src_cap) {
        Repr::Heap(block) if Repr::<T>::needs_alloc(dst_cap) => {
            mem::replace(current, &VOID).release(dst, dst_cap);
            dst.cast::<NonNull<T>>().write(block);
            trace!(to = type_name::<T>(), "handed heap block over");
            Ok(())
        }
        source => replace_with(dst, dst_cap, current, || unsafe { source.into_value() }).map(drop),
    }
}

/// Replaces the value in `dst`, described by `*current`, with the `T` built
/// by `f`, and returns where the new value lives.
///
/// When both the old and the new value are heap-backed at `capacity` and
/// their layouts match, the old block is reused: `f` runs first, then the old
/// value is dropped in place and the new one written over it. Otherwise any
/// new block is allocated (and `f` run into it) before the old value is
/// released. On success `*current` is [`VOID`]; the caller installs the
/// descriptor of `T`. On error `f` has not run and nothing has changed.
///
/// # Safety
///
/// `dst` holds a value laid out by `*current` for `capacity`.
pub(crate) unsafe fn replace_with<T, F>(
    dst: *mut u8,
    capacity: usize,
    current: &mut &'static Descriptor,
    f: F,
) -> Result<NonNull<T>, AllocError>
where
    F: FnOnce() -> T,
{
    if !Repr::<T>::needs_alloc(capacity) {
        let value = f();
        mem::replace(current, &VOID).release(dst, capacity);
        let slot = dst.cast::<T>();
        slot.write(value);
        return Ok(NonNull::new_unchecked(slot));
    }

    let old = *current;
    let reuse = old.needs_alloc(capacity) && old.same_block_layout::<T>();
    let block = if reuse {
        let value = f();
        *current = &VOID;
        old.destroy_in_place(dst, capacity);
        let block = dst.cast::<NonNull<T>>().read();
        block.as_ptr().write(value);
        block
    } else {
        let block = place_on_heap(f)?;
        *current = &VOID;
        old.release(dst, capacity);
        dst.cast::<NonNull<T>>().write(block);
        block
    };
    trace!(
        from = old.type_name(),
        to = type_name::<T>(),
        reused = reuse,
        "replaced heap-backed value"
    );
    Ok(block)
}

unsafe fn destroy_in_place<T>(buf: *mut u8, capacity: usize) {
    ptr::drop_in_place(Repr::<T>::of(buf, capacity).value().as_ptr());
}

unsafe fn release<T>(buf: *mut u8, capacity: usize) {
    match Repr::<T>::of(buf, capacity) {
        Repr::Heap(block) => {
            ptr::drop_in_place(block.as_ptr());
            deallocate(block);
        }
        Repr::Inline(slot) => ptr::drop_in_place(slot.as_ptr()),
    }
}

unsafe fn void_copy(_: *const u8, _: *mut u8, _: usize, _: usize) -> Result<(), AllocError> {
    Ok(())
}

unsafe fn void_relocate(_: *mut u8, _: *mut u8, _: usize, _: usize) -> Result<(), AllocError> {
    Ok(())
}

unsafe fn void_grow(_: *mut u8, _: *mut u8, _: usize, _: usize) {}

unsafe fn void_replace_copy(
    _: *const u8,
    dst: *mut u8,
    _: usize,
    dst_cap: usize,
    current: &mut &'static Descriptor,
) -> Result<(), AllocError> {
    mem::replace(current, &VOID).release(dst, dst_cap);
    Ok(())
}

unsafe fn void_replace_move(
    _: *mut u8,
    dst: *mut u8,
    _: usize,
    dst_cap: usize,
    current: &mut &'static Descriptor,
) -> Result<(), AllocError> {
    mem::replace(current, &VOID).release(dst, dst_cap);
    Ok(())
}

unsafe fn void_drop(_: *mut u8, _: usize) {}

//! Heap traffic checks, run under an allocator that counts allocations and
//! frees made by the current thread and can be told to fail them.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::ptr;

use sized_any::space::*;
use sized_any::{AllocError, SizedAny};

struct Counting;

thread_local! {
    static ALLOCS: Cell<usize> = const { Cell::new(0) };
    static FREES: Cell<usize> = const { Cell::new(0) };
    static FAIL: Cell<bool> = const { Cell::new(false) };
}

unsafe impl GlobalAlloc for Counting {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if FAIL.try_with(Cell::get).unwrap_or(false) {
            return ptr::null_mut();
        }
        let _ = ALLOCS.try_with(|n| n.set(n.get() + 1));
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let _ = FREES.try_with(|n| n.set(n.get() + 1));
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: Counting = Counting;

/// Allocations and frees performed while running `f`.
fn traffic<R>(f: impl FnOnce() -> R) -> (usize, usize, R) {
    let allocs = ALLOCS.with(Cell::get);
    let frees = FREES.with(Cell::get);
    let result = f();
    (
        ALLOCS.with(Cell::get) - allocs,
        FREES.with(Cell::get) - frees,
        result,
    )
}

/// Runs `f` with every allocation on this thread failing.
fn out_of_memory<R>(f: impl FnOnce() -> R) -> R {
    FAIL.with(|fail| fail.set(true));
    let result = f();
    FAIL.with(|fail| fail.set(false));
    result
}

#[test]
fn inline_values_never_allocate() {
    let (allocs, frees, _) = traffic(|| {
        let mut a: SizedAny<S4> = SizedAny::new([1usize; 4]);
        let mut b: SizedAny<S4> = SizedAny::new(2u8);
        a.swap(&mut b);
        let c = a.clone();
        b.emplace(3u16);
        drop(c);
    });
    assert_eq!((allocs, frees), (0, 0));
}

#[test]
fn heap_value_allocates_once_and_frees_once() {
    let (allocs, frees, _) = traffic(|| {
        let a: SizedAny<S1> = SizedAny::new([1u64; 8]);
        drop(a);
    });
    assert_eq!((allocs, frees), (1, 1));
}

#[test]
fn emplace_same_layout_reuses_block() {
    let mut a: SizedAny<S1> = SizedAny::new([1u64; 8]);
    let (allocs, frees, _) = traffic(|| {
        a.emplace([2i64; 8]);
    });
    assert_eq!((allocs, frees), (0, 0));
    assert_eq!(a.downcast_ref::<[i64; 8]>(), Some(&[2; 8]));

    let (allocs, frees, _) = traffic(|| {
        a.set([3u64; 8]);
    });
    assert_eq!((allocs, frees), (0, 0));
    assert_eq!(a.downcast_ref::<[u64; 8]>(), Some(&[3; 8]));

    // Baseline: swapping in a temporary frees the old block and allocates a new one.
    let (allocs, frees, _) = traffic(|| {
        let mut next: SizedAny<S1> = SizedAny::new([4u64; 8]);
        a.swap(&mut next);
    });
    assert_eq!((allocs, frees), (1, 1));
}

#[test]
fn assign_copy_same_layout_reuses_block() {
    let source: SizedAny<S2> = SizedAny::new([2u64; 8]);
    let mut target: SizedAny<S1> = SizedAny::new([1i64; 8]);
    let (allocs, frees, _) = traffic(|| target.assign_copy(&source));
    assert_eq!((allocs, frees), (0, 0));
    assert_eq!(target.downcast_ref::<[u64; 8]>(), Some(&[2; 8]));
    assert!(source.has_value());

    let mut other: SizedAny<S1> = SizedAny::new([5i64; 8]);
    let (allocs, frees, _) = traffic(|| other.clone_from(&target));
    assert_eq!((allocs, frees), (0, 0));
    assert_eq!(other.downcast_ref::<[u64; 8]>(), Some(&[2; 8]));
}

#[test]
fn assign_copy_different_layout_reallocates() {
    let source: SizedAny<S1> = SizedAny::new([2u64; 9]);
    let mut target: SizedAny<S1> = SizedAny::new([1u64; 8]);
    let (allocs, frees, _) = traffic(|| target.assign_copy(&source));
    assert_eq!((allocs, frees), (1, 1));
    assert_eq!(target.downcast_ref::<[u64; 9]>(), Some(&[2; 9]));
}

#[test]
fn assign_moved_hands_heap_block_over() {
    let mut source: SizedAny<S2> = SizedAny::new([2u64; 8]);
    let block: *const [u64; 8] = source.downcast_ref::<[u64; 8]>().unwrap();
    let mut target: SizedAny<S1> = SizedAny::new([1u64; 8]);
    let (allocs, frees, _) = traffic(|| target.assign_moved(&mut source));
    assert_eq!((allocs, frees), (0, 1));
    assert!(!source.has_value());
    let moved: *const [u64; 8] = target.downcast_ref::<[u64; 8]>().unwrap();
    assert_eq!(moved, block);
}

#[test]
fn assign_moved_inline_into_heap_reuses_block() {
    let mut source: SizedAny<S8> = SizedAny::new([2u64; 8]);
    let mut target: SizedAny<S1> = SizedAny::new([1i64; 8]);
    let (allocs, frees, _) = traffic(|| target.assign_moved(&mut source));
    assert_eq!((allocs, frees), (0, 0));
    assert!(!source.has_value());
    assert_eq!(target.downcast_ref::<[u64; 8]>(), Some(&[2; 8]));
}

#[test]
fn emplace_different_size_reallocates() {
    let mut a: SizedAny<S1> = SizedAny::new([1u64; 8]);
    let (allocs, frees, _) = traffic(|| {
        a.emplace([1u64; 9]);
    });
    assert_eq!((allocs, frees), (1, 1));
}

#[test]
fn emplace_over_inline_value_allocates_only_new_block() {
    let mut a: SizedAny<S1> = SizedAny::new(1u8);
    let (allocs, frees, _) = traffic(|| {
        a.emplace([1u64; 8]);
    });
    assert_eq!((allocs, frees), (1, 0));
}

#[test]
fn heap_to_heap_move_and_swap_do_not_allocate() {
    let mut a: SizedAny<S1> = SizedAny::new([1u64; 8]);
    let mut b: SizedAny<S2> = SizedAny::new([2u64; 8]);
    let (allocs, frees, _) = traffic(|| {
        a.swap_with(&mut b);
        let c = SizedAny::<S4>::moved_from(&mut a);
        let mut d: SizedAny<S2> = SizedAny::empty();
        d.swap(&mut b);
        (c, d)
    });
    assert_eq!((allocs, frees), (0, 0));
}

#[test]
fn growing_move_never_allocates() {
    let mut a: SizedAny<S2> = SizedAny::new([1usize; 2]);
    let (allocs, frees, b) = traffic(|| SizedAny::<S4>::moved_from(&mut a));
    assert_eq!((allocs, frees), (0, 0));
    assert!(!b.is_heap());
}

#[test]
fn shrinking_move_allocates_when_value_no_longer_fits() {
    let mut a: SizedAny<S4> = SizedAny::new([1usize; 4]);
    let (allocs, frees, b) = traffic(|| SizedAny::<S2>::moved_from(&mut a));
    assert_eq!((allocs, frees), (1, 0));
    assert!(b.is_heap());
}

#[test]
fn heap_to_inline_move_frees_block() {
    let mut a: SizedAny<S2> = SizedAny::new([1usize; 4]);
    let (allocs, frees, b) = traffic(|| SizedAny::<S4>::moved_from(&mut a));
    assert_eq!((allocs, frees), (0, 1));
    assert!(!b.is_heap());
}

#[test]
fn copy_allocates_for_heap_destination_only() {
    let a: SizedAny<S2> = SizedAny::new([1usize; 4]);
    let (allocs, frees, copies) = traffic(|| {
        let inline = SizedAny::<S4>::copied_from(&a);
        let heap = SizedAny::<S1>::copied_from(&a);
        (inline, heap)
    });
    assert_eq!((allocs, frees), (1, 0));
    assert!(!copies.0.is_heap());
    assert!(copies.1.is_heap());
}

#[test]
fn failed_swap_leaves_both_containers() {
    let mut wide: SizedAny<S8> = SizedAny::new([1usize; 4]);
    let mut narrow: SizedAny<S1> = SizedAny::new(2u8);

    let result = out_of_memory(|| wide.try_swap_with(&mut narrow));

    let err: AllocError = result.unwrap_err();
    assert_eq!(err.layout(), Layout::new::<[usize; 4]>());
    assert_eq!(wide.downcast_ref::<[usize; 4]>(), Some(&[1; 4]));
    assert_eq!(narrow.downcast_ref::<u8>(), Some(&2));
}

#[test]
fn failed_emplace_leaves_container() {
    let mut inline: SizedAny<S1> = SizedAny::new(2u8);
    let mut heap: SizedAny<S1> = SizedAny::new([1usize; 4]);

    assert!(out_of_memory(|| inline.try_emplace([0u64; 8]).is_err()));
    assert!(out_of_memory(|| heap.try_emplace([0u64; 8]).is_err()));
    assert!(out_of_memory(|| heap.try_set([0u64; 8]).is_err()));

    assert_eq!(inline.downcast_ref::<u8>(), Some(&2));
    assert_eq!(heap.downcast_ref::<[usize; 4]>(), Some(&[1; 4]));
}

#[test]
fn failed_copy_and_move_leave_source() {
    let mut source: SizedAny<S4> = SizedAny::new([1usize; 4]);

    assert!(out_of_memory(|| SizedAny::<S1>::try_copied_from(&source)).is_err());
    assert!(out_of_memory(|| SizedAny::<S1>::try_moved_from(&mut source)).is_err());

    assert_eq!(source.downcast_ref::<[usize; 4]>(), Some(&[1; 4]));
    assert!(!source.is_heap());
}

#[test]
fn failed_assignment_leaves_both_containers() {
    let mut source: SizedAny<S4> = SizedAny::new([1usize; 4]);
    let mut target: SizedAny<S1> = SizedAny::new(2u8);

    assert!(out_of_memory(|| target.try_assign_copy(&source)).is_err());
    assert!(out_of_memory(|| target.try_assign_moved(&mut source)).is_err());

    assert_eq!(source.downcast_ref::<[usize; 4]>(), Some(&[1; 4]));
    assert_eq!(target.downcast_ref::<u8>(), Some(&2));

    target.assign_moved(&mut source);
    assert!(!source.has_value());
    assert!(target.is_heap());
}

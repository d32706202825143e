use core::alloc::Layout;
use core::ptr::NonNull;

/// Source of raw memory for a table's slot buffer.
///
/// A table makes exactly one allocation per bucket count: the slot array and
/// the occupancy bitmask share it. Returning `None` from [`allocate`] makes the
/// triggering operation fail with [`Error::OutOfMemory`] (or abort through
/// `handle_alloc_error` for the infallible variants) without touching the
/// table.
///
/// [`allocate`]: Allocator::allocate
/// [`Error::OutOfMemory`]: crate::Error::OutOfMemory
///
/// # Safety
///
/// Implementations must return memory that is valid for reads and writes of
/// `layout.size()` bytes and aligned to `layout.align()`, and that stays valid
/// until it is passed back to [`deallocate`](Allocator::deallocate).
pub unsafe trait Allocator {
    /// Allocates a block described by `layout`. `layout` always has a non-zero
    /// size.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Releases a block obtained from [`allocate`](Allocator::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator with the
    /// same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The global allocator registered for the program.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Global;

// SAFETY: Forwards to the global allocator, which upholds the same contract.
unsafe impl Allocator for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() != 0);
        // SAFETY: Table layouts always contain at least one slot, so the size is
        // non-zero.
        NonNull::new(unsafe { alloc::alloc::alloc(layout) })
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Caller guarantees `ptr` came from `allocate` with `layout`.
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

// SAFETY: Forwards to the referenced allocator.
unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Caller upholds the contract for the referenced allocator.
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

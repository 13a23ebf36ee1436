//! Cache-line-aligned allocator wrappers exposed to hot data structures: a small wrapper type
//! that pads to the platform's cache-line size. Two shapes are used: [`crossbeam_utils::
//! CachePadded`] re-exported for ordinary single hot counters (per-tier unsolved-children
//! counters, per-thread scan cursors), and [`AtomicCounterLine`] — a hand-rolled
//! bucket-of-atomics layout — wherever the padded value itself needs to be a small array of
//! atomics sharing one line, the same shape as a transposition table's bucket type.

use crate::error::{Error, Res};
use std::sync::atomic::AtomicU64;

/// Cache-line size in bytes. Settable at build time via the `cache_line_128` feature; must stay
/// a power of two and a multiple of `size_of::<usize>()` (enforced below).
#[cfg(not(feature = "cache_line_128"))]
pub const CACHE_LINE_SIZE: usize = 64;
#[cfg(feature = "cache_line_128")]
pub const CACHE_LINE_SIZE: usize = 128;

const _: () = assert!(CACHE_LINE_SIZE.is_power_of_two());
const _: () = assert!(CACHE_LINE_SIZE % std::mem::size_of::<usize>() == 0);

pub use crossbeam_utils::CachePadded;

/// A single cache line's worth of atomic counters, padded so no other line shares it. Used by
/// [`crate::graph::TierGraph`] for the packed `(status, num_unsolved_children)` word.
#[cfg_attr(not(feature = "cache_line_128"), repr(align(64)))]
#[cfg_attr(feature = "cache_line_128", repr(align(128)))]
#[derive(Debug, Default)]
pub struct AtomicCounterLine(pub std::sync::atomic::AtomicI64);

const _: () = assert!(std::mem::size_of::<AtomicCounterLine>() == CACHE_LINE_SIZE);

/// An owned `[AtomicU64]` allocation that remembers the exact [`std::alloc::Layout`] it was
/// allocated with, so [`Drop`] can deallocate with that same layout even when it's more strictly
/// aligned than a plain `Box<[AtomicU64]>` (whose own `Drop` always assumes `align_of::<AtomicU64>()`
/// — handing it a pointer allocated at a wider alignment would deallocate with the wrong layout).
pub struct Blocks {
    ptr: std::ptr::NonNull<AtomicU64>,
    len: usize,
    layout: std::alloc::Layout,
}

// SAFETY: `Blocks` owns its allocation exclusively; `AtomicU64` is itself `Send + Sync`.
unsafe impl Send for Blocks {}
unsafe impl Sync for Blocks {}

impl Blocks {
    /// Takes ownership of a boxed slice produced by the ordinary global allocator. Sound because
    /// `Box<[AtomicU64]>`'s own layout (`align_of::<AtomicU64>()`, `len * size_of::<AtomicU64>()`)
    /// is exactly what we record and later deallocate with.
    fn from_boxed_slice(boxed: Box<[AtomicU64]>) -> Self {
        let len = boxed.len();
        let layout = std::alloc::Layout::array::<AtomicU64>(len).expect("boxed slice layout is always valid");
        let raw = Box::into_raw(boxed) as *mut AtomicU64;
        Self { ptr: std::ptr::NonNull::new(raw).expect("Box pointer is never null"), len, layout }
    }

    /// # Safety
    /// `ptr` must point to a live allocation of exactly `layout`, zero-initialized (so every
    /// `AtomicU64` it's reinterpreted as is bit-valid), and not aliased anywhere else.
    #[cfg(feature = "unsafe")]
    unsafe fn from_raw_parts(ptr: *mut u8, len: usize, layout: std::alloc::Layout) -> Self {
        Self { ptr: std::ptr::NonNull::new(ptr.cast::<AtomicU64>()).expect("alloc_zeroed returned null"), len, layout }
    }
}

impl std::ops::Deref for Blocks {
    type Target = [AtomicU64];
    fn deref(&self) -> &[AtomicU64] {
        // SAFETY: `ptr` is valid for `len` elements for the lifetime of `self` (see `Drop`).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl std::ops::DerefMut for Blocks {
    fn deref_mut(&mut self) -> &mut [AtomicU64] {
        // SAFETY: same as `Deref`, with exclusive access via `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for Blocks {
    fn drop(&mut self) {
        if self.layout.size() == 0 {
            return;
        }
        // SAFETY: `self.layout` is exactly the layout used to allocate `self.ptr`, whichever
        // constructor built this `Blocks` (both record the true allocation layout, not the
        // layout a plain `Box<[AtomicU64]>` would assume).
        unsafe { std::alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), self.layout) };
    }
}

impl std::fmt::Debug for Blocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blocks").field("len", &self.len).field("layout", &self.layout).finish()
    }
}

/// Borrowed allocator abstraction used by [`crate::bitset::ConcurrentBitset::create_with_allocator`].
/// The allocator is borrowed, not owned: callers hold whatever concrete allocator they like and
/// pass `&dyn BlockAllocator` down.
pub trait BlockAllocator: Send + Sync {
    fn alloc_u64_blocks(&self, count: usize) -> Res<Blocks>;
}

/// Default allocator: a plain heap `Vec`, zeroed, with a fallible reservation so an
/// allocation failure surfaces as [`Error::OutOfMemory`] instead of aborting the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalAllocator;

impl BlockAllocator for GlobalAllocator {
    fn alloc_u64_blocks(&self, count: usize) -> Res<Blocks> {
        let mut v: Vec<AtomicU64> = Vec::new();
        v.try_reserve_exact(count).map_err(|_| Error::OutOfMemory)?;
        v.resize_with(count, || AtomicU64::new(0));
        Ok(Blocks::from_boxed_slice(v.into_boxed_slice()))
    }
}

/// Cache-line-aligned variant of [`GlobalAllocator`]: the backing buffer's first byte is aligned
/// to [`CACHE_LINE_SIZE`], avoiding false sharing between a bitset and whatever is allocated next
/// to it. Gated behind the `unsafe` feature for the same reason `TTEntry::pack_into` is — a raw
/// `alloc_zeroed` call replaces an ordinary safe `Vec` allocation; the fallback below is simply
/// [`GlobalAllocator`] again, which is always correct, just not guaranteed line-aligned.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheAlignedAllocator;

impl BlockAllocator for CacheAlignedAllocator {
    #[cfg(feature = "unsafe")]
    fn alloc_u64_blocks(&self, count: usize) -> Res<Blocks> {
        use std::alloc::{alloc_zeroed, Layout};
        if count == 0 {
            let layout = Layout::from_size_align(0, CACHE_LINE_SIZE).map_err(|_| Error::IntegerOverflow)?;
            return Ok(unsafe { Blocks::from_raw_parts(std::ptr::NonNull::dangling().as_ptr(), 0, layout) });
        }
        let size = count * std::mem::size_of::<AtomicU64>();
        let layout =
            Layout::from_size_align(size, CACHE_LINE_SIZE).map_err(|_| Error::IntegerOverflow)?;
        // SAFETY: `layout` has non-zero size, `AtomicU64` has the same bit validity and layout
        // as `u64`, and a freshly zeroed allocation is therefore a valid array of `AtomicU64`.
        // `Blocks` records this exact `layout` and deallocates with it, so the alignment mismatch
        // that would make handing this pointer to a plain `Box<[AtomicU64]>` unsound never arises.
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(Error::OutOfMemory);
        }
        Ok(unsafe { Blocks::from_raw_parts(ptr, count, layout) })
    }

    #[cfg(not(feature = "unsafe"))]
    fn alloc_u64_blocks(&self, count: usize) -> Res<Blocks> {
        GlobalAllocator.alloc_u64_blocks(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_allocator_zeroes() {
        let blocks = GlobalAllocator.alloc_u64_blocks(4).unwrap();
        assert!(blocks.iter().all(|b| b.load(std::sync::atomic::Ordering::Relaxed) == 0));
    }

    #[test]
    fn cache_aligned_allocator_matches_global() {
        let blocks = CacheAlignedAllocator.alloc_u64_blocks(16).unwrap();
        assert_eq!(blocks.len(), 16);
        assert!(blocks.iter().all(|b| b.load(std::sync::atomic::Ordering::Relaxed) == 0));
    }

    #[test]
    fn zero_length_allocation_is_fine() {
        let blocks = GlobalAllocator.alloc_u64_blocks(0).unwrap();
        assert_eq!(blocks.len(), 0);
    }
}

//! External Memory Allocator
//!
//! Two-tier allocator: a [`Pool`] over the external memory window is tried
//! first, and anything it cannot satisfy goes to a fallback `GlobalAlloc`
//! (on the board, the internal-RAM `linked_list_allocator::LockedHeap`).
//!
//! # Routing
//! - allocate / allocate_zeroed: pool first, then fallback
//! - release / resize: by address; pool pointers stay in the pool, all
//!   others belong to the fallback
//!
//! Before bring-up (or after a failed one) there is no pool and every call
//! goes straight to the fallback.
//!
//! # Locking
//! The pool's free list sits behind a spinlock, so the facade can be shared
//! between threads and interrupt handlers that never allocate while
//! preempting an allocation on the same core.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use spin::Mutex;

use super::pool::Pool;

/// Pool-first allocator with a generic fallback.
pub struct ExtMemAllocator<F> {
    pool: Mutex<Option<Pool>>,
    fallback: F,
}

impl<F: GlobalAlloc> ExtMemAllocator<F> {
    /// Create the facade with no pool yet.
    pub const fn new(fallback: F) -> Self {
        Self {
            pool: Mutex::new(None),
            fallback,
        }
    }

    /// Install the pool over `size` bytes at `start`.
    ///
    /// Returns `false` (and leaves the existing pool alone) if one is
    /// already installed.
    ///
    /// # Safety
    /// Same contract as [`Pool::new`].
    pub unsafe fn init_pool(&self, start: *mut u8, size: usize) -> bool {
        let mut pool = self.pool.lock();
        if pool.is_some() {
            return false;
        }
        // SAFETY: forwarded from the caller
        *pool = Some(unsafe { Pool::new(start, size) });
        true
    }

    /// Whether a pool is installed.
    pub fn has_pool(&self) -> bool {
        self.pool.lock().is_some()
    }

    /// Size of the pool in bytes, 0 if there is none.
    pub fn pool_size(&self) -> usize {
        self.pool.lock().as_ref().map_or(0, Pool::size)
    }

    /// Bytes allocated from the pool.
    pub fn pool_used(&self) -> usize {
        self.pool.lock().as_ref().map_or(0, Pool::used)
    }

    /// Check whether `ptr` was handed out by the pool.
    pub fn in_pool(&self, ptr: *const u8) -> bool {
        self.pool.lock().as_ref().is_some_and(|pool| pool.contains(ptr))
    }

    /// The fallback allocator.
    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    /// Allocate `layout`, null if both tiers are exhausted.
    pub fn allocate(&self, layout: Layout) -> *mut u8 {
        if let Some(block) = self.pool.lock().as_mut().and_then(|pool| pool.allocate(layout)) {
            return block.as_ptr();
        }
        // SAFETY: GlobalAlloc contract is forwarded by callers; a zero-size
        // layout is the caller's responsibility exactly as with GlobalAlloc
        unsafe { self.fallback.alloc(layout) }
    }

    /// Allocate `count` zero-filled elements of `elem`, null on overflow or
    /// exhaustion.
    pub fn allocate_zeroed(&self, count: usize, elem: Layout) -> *mut u8 {
        match array_layout(count, elem) {
            Some(layout) => self.allocate_zeroed_layout(layout),
            None => ptr::null_mut(),
        }
    }

    fn allocate_zeroed_layout(&self, layout: Layout) -> *mut u8 {
        let block = self.pool.lock().as_mut().and_then(|pool| pool.allocate_zeroed(layout));
        if let Some(block) = block {
            return block.as_ptr();
        }
        // SAFETY: see allocate()
        unsafe { self.fallback.alloc_zeroed(layout) }
    }

    /// Release a block to whichever tier owns it.
    ///
    /// # Safety
    /// `ptr` must come from this allocator with `layout` and not have been
    /// released yet.
    pub unsafe fn release(&self, ptr: *mut u8, layout: Layout) {
        let Some(block) = NonNull::new(ptr) else {
            return;
        };
        let mut pool = self.pool.lock();
        if let Some(pool) = pool.as_mut().filter(|pool| pool.contains(ptr)) {
            // SAFETY: the block is inside the pool, so the pool handed it out
            unsafe { pool.release(block, layout) };
            return;
        }
        drop(pool);
        // SAFETY: not a pool pointer, so it came from the fallback
        unsafe { self.fallback.dealloc(ptr, layout) }
    }

    /// Resize a block inside the tier that owns it.
    ///
    /// Pool blocks relocate within the pool and fail (null, original kept)
    /// when the pool is full; they never migrate to the fallback.
    ///
    /// # Safety
    /// Same contract as [`ExtMemAllocator::release`]; `new_size` rounded up
    /// to `layout.align()` must not overflow `isize`.
    pub unsafe fn resize(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let mut pool = self.pool.lock();
        if let Some(pool) = pool.as_mut().filter(|pool| pool.contains(ptr)) {
            let Some(block) = NonNull::new(ptr) else {
                return ptr::null_mut();
            };
            // SAFETY: the block is inside the pool, so the pool handed it out
            return unsafe { pool.resize(block, layout, new_size) }
                .map_or(ptr::null_mut(), NonNull::as_ptr);
        }
        drop(pool);
        // SAFETY: not a pool pointer, so it came from the fallback
        unsafe { self.fallback.realloc(ptr, layout, new_size) }
    }
}

/// Layout for `count` consecutive `elem`s.
fn array_layout(count: usize, elem: Layout) -> Option<Layout> {
    let stride = elem.pad_to_align().size();
    let size = stride.checked_mul(count)?;
    Layout::from_size_align(size, elem.align()).ok()
}

// SAFETY: allocation routing only ever returns pool blocks or fallback
// blocks, and release/resize send each pointer back to its owner.
unsafe impl<F: GlobalAlloc> GlobalAlloc for ExtMemAllocator<F> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocate(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.allocate_zeroed_layout(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: forwarded GlobalAlloc contract
        unsafe { self.release(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // SAFETY: forwarded GlobalAlloc contract
        unsafe { self.resize(ptr, layout, new_size) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::alloc::System;
    use std::vec;
    use std::vec::Vec;

    /// System allocator that counts calls per entry point.
    #[derive(Default)]
    struct Counting {
        allocs: AtomicUsize,
        zeroed: AtomicUsize,
        frees: AtomicUsize,
        reallocs: AtomicUsize,
    }

    unsafe impl GlobalAlloc for Counting {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            self.allocs.fetch_add(1, Ordering::Relaxed);
            unsafe { System.alloc(layout) }
        }

        unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
            self.zeroed.fetch_add(1, Ordering::Relaxed);
            unsafe { System.alloc_zeroed(layout) }
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            self.frees.fetch_add(1, Ordering::Relaxed);
            unsafe { System.dealloc(ptr, layout) }
        }

        unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
            self.reallocs.fetch_add(1, Ordering::Relaxed);
            unsafe { System.realloc(ptr, layout, new_size) }
        }
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }

    fn with_pool(buf: &mut Vec<u64>) -> ExtMemAllocator<Counting> {
        let alloc = ExtMemAllocator::new(Counting::default());
        // SAFETY: the buffer outlives the allocator in every test
        assert!(unsafe { alloc.init_pool(buf.as_mut_ptr() as *mut u8, buf.len() * 8) });
        alloc
    }

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 8).unwrap()
    }

    #[test]
    fn test_no_pool_uses_fallback() {
        let alloc = ExtMemAllocator::new(Counting::default());
        assert!(!alloc.has_pool());
        let ptr = alloc.allocate(layout(64));
        assert!(!ptr.is_null());
        assert_eq!(count(&alloc.fallback().allocs), 1);
        unsafe { alloc.release(ptr, layout(64)) };
        assert_eq!(count(&alloc.fallback().frees), 1);
    }

    #[test]
    fn test_small_request_served_by_pool() {
        let mut buf = vec![0u64; 1024];
        let alloc = with_pool(&mut buf);
        let ptr = alloc.allocate(layout(128));
        assert!(alloc.in_pool(ptr));
        assert_eq!(count(&alloc.fallback().allocs), 0);
        unsafe { alloc.release(ptr, layout(128)) };
        assert_eq!(count(&alloc.fallback().frees), 0);
        assert_eq!(alloc.pool_used(), 0);
    }

    #[test]
    fn test_oversized_request_routes_to_fallback_and_back() {
        let mut buf = vec![0u64; 1024];
        let alloc = with_pool(&mut buf);
        let big = layout(alloc.pool_size() * 2);
        let ptr = alloc.allocate(big);
        assert!(!ptr.is_null());
        assert!(!alloc.in_pool(ptr));
        assert_eq!(count(&alloc.fallback().allocs), 1);

        unsafe { alloc.release(ptr, big) };
        assert_eq!(count(&alloc.fallback().frees), 1);
    }

    #[test]
    fn test_pool_exhaustion_falls_back() {
        let mut buf = vec![0u64; 1024];
        let alloc = with_pool(&mut buf);
        let first = alloc.allocate(layout(6000));
        assert!(alloc.in_pool(first));
        let second = alloc.allocate(layout(6000));
        assert!(!alloc.in_pool(second));
        unsafe {
            alloc.release(second, layout(6000));
            alloc.release(first, layout(6000));
        }
        assert_eq!(count(&alloc.fallback().frees), 1);
        assert_eq!(alloc.pool_used(), 0);
    }

    #[test]
    fn test_zeroed_on_both_paths() {
        let mut buf = vec![u64::MAX; 1024];
        let alloc = with_pool(&mut buf);
        let elem = Layout::new::<u32>();

        let small = alloc.allocate_zeroed(16, elem);
        assert!(alloc.in_pool(small));
        let bytes = unsafe { core::slice::from_raw_parts(small, 64) };
        assert!(bytes.iter().all(|&b| b == 0));

        let large = alloc.allocate_zeroed(4096, elem);
        assert!(!alloc.in_pool(large));
        assert_eq!(count(&alloc.fallback().zeroed), 1);
        let bytes = unsafe { core::slice::from_raw_parts(large, 4096 * 4) };
        assert!(bytes.iter().all(|&b| b == 0));

        unsafe {
            alloc.release(small, Layout::from_size_align(64, 4).unwrap());
            alloc.release(large, Layout::from_size_align(4096 * 4, 4).unwrap());
        }
    }

    #[test]
    fn test_zeroed_count_overflow_is_null() {
        let alloc = ExtMemAllocator::new(Counting::default());
        assert!(alloc.allocate_zeroed(usize::MAX, Layout::new::<u64>()).is_null());
        assert_eq!(count(&alloc.fallback().zeroed), 0);
    }

    #[test]
    fn test_resize_stays_in_owning_tier() {
        let mut buf = vec![0u64; 1024];
        let alloc = with_pool(&mut buf);

        let pooled = alloc.allocate(layout(32));
        let moved = unsafe { alloc.resize(pooled, layout(32), 256) };
        assert!(alloc.in_pool(moved));
        assert_eq!(count(&alloc.fallback().reallocs), 0);

        let outside = alloc.allocate(layout(16384));
        let grown = unsafe { alloc.resize(outside, layout(16384), 32768) };
        assert!(!alloc.in_pool(grown));
        assert_eq!(count(&alloc.fallback().reallocs), 1);

        unsafe {
            alloc.release(moved, layout(256));
            alloc.release(grown, layout(32768));
        }
    }

    #[test]
    fn test_pool_resize_does_not_migrate() {
        let mut buf = vec![0u64; 1024];
        let alloc = with_pool(&mut buf);
        let pooled = alloc.allocate(layout(32));
        let result = unsafe { alloc.resize(pooled, layout(32), 1 << 20) };
        assert!(result.is_null());
        assert_eq!(count(&alloc.fallback().allocs), 0);
        unsafe { alloc.release(pooled, layout(32)) };
    }

    #[test]
    fn test_second_pool_is_refused() {
        let mut buf = vec![0u64; 1024];
        let mut other = vec![0u64; 64];
        let alloc = with_pool(&mut buf);
        assert!(!unsafe { alloc.init_pool(other.as_mut_ptr() as *mut u8, 512) });
        assert_eq!(alloc.pool_size(), 8192);
    }

    #[test]
    fn test_release_null_is_noop() {
        let alloc = ExtMemAllocator::new(Counting::default());
        unsafe { alloc.release(ptr::null_mut(), layout(8)) };
        assert_eq!(count(&alloc.fallback().frees), 0);
    }
}

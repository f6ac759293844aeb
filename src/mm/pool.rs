//! External Memory Pool
//!
//! A first-fit heap carved over exactly the bytes of a published region,
//! using `linked_list_allocator` like the kernel heap. The pool remembers
//! its own address range so callers can tell its pointers from anyone
//! else's.

use core::alloc::Layout;
use core::ptr::{self, NonNull};

use linked_list_allocator::Heap;

/// Heap over an external memory window.
pub struct Pool {
    heap: Heap,
    start: usize,
    size: usize,
}

impl Pool {
    /// Create a pool managing `size` bytes at `start`.
    ///
    /// # Safety
    /// `start..start + size` must be valid, unused memory for the lifetime
    /// of the pool, and `size` must be large enough to hold the heap's
    /// bookkeeping (a few words).
    pub unsafe fn new(start: *mut u8, size: usize) -> Self {
        Self {
            // SAFETY: forwarded from the caller
            heap: unsafe { Heap::new(start, size) },
            start: start as usize,
            size,
        }
    }

    /// Number of bytes handed to the pool.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Bytes currently allocated.
    #[inline]
    pub fn used(&self) -> usize {
        self.heap.used()
    }

    /// Bytes still free (not necessarily contiguous).
    #[inline]
    pub fn free(&self) -> usize {
        self.heap.free()
    }

    /// Check whether `ptr` points into the pool.
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr >= self.start && addr - self.start < self.size
    }

    /// First-fit allocation; `None` when no hole is big enough.
    pub fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        self.heap.allocate_first_fit(layout).ok()
    }

    /// Allocate and zero-fill.
    pub fn allocate_zeroed(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let block = self.allocate(layout)?;
        // SAFETY: the block was just allocated with at least layout.size() bytes
        unsafe { ptr::write_bytes(block.as_ptr(), 0, layout.size()) };
        Some(block)
    }

    /// Return a block to the free list.
    ///
    /// # Safety
    /// `block` must come from this pool with the same `layout` and must not
    /// have been released already.
    pub unsafe fn release(&mut self, block: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded from the caller
        unsafe { self.heap.deallocate(block, layout) }
    }

    /// Move a block to a new size inside the pool.
    ///
    /// The block always relocates; the old one is released only once the
    /// new one exists, so on failure the original allocation is untouched.
    ///
    /// # Safety
    /// Same contract as [`Pool::release`].
    pub unsafe fn resize(
        &mut self,
        block: NonNull<u8>,
        layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let new_layout = Layout::from_size_align(new_size, layout.align()).ok()?;
        let moved = self.allocate(new_layout)?;
        // SAFETY: both blocks are live, distinct pool allocations of at least
        // the copied length
        unsafe {
            ptr::copy_nonoverlapping(block.as_ptr(), moved.as_ptr(), layout.size().min(new_size));
            self.release(block, layout);
        }
        Some(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;

    fn pool_over(buf: &mut [u64]) -> Pool {
        // SAFETY: the buffer outlives every pool built in these tests
        unsafe { Pool::new(buf.as_mut_ptr() as *mut u8, buf.len() * 8) }
    }

    #[test]
    fn test_pool_reports_exact_size() {
        let mut buf = vec![0u64; 512];
        let pool = pool_over(&mut buf);
        assert_eq!(pool.size(), 4096);
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn test_allocations_stay_inside_range() {
        let mut buf = vec![0u64; 512];
        let mut pool = pool_over(&mut buf);
        let layout = Layout::from_size_align(256, 8).unwrap();
        let block = pool.allocate(layout).unwrap();
        assert!(pool.contains(block.as_ptr()));
        assert!(!pool.contains(buf_end(&buf)));
        assert!(pool.used() >= 256);
        unsafe { pool.release(block, layout) };
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn test_oversized_request_fails() {
        let mut buf = vec![0u64; 512];
        let mut pool = pool_over(&mut buf);
        assert!(pool.allocate(Layout::from_size_align(8192, 8).unwrap()).is_none());
    }

    #[test]
    fn test_zeroed_allocation_clears_reused_memory() {
        let mut buf = vec![0u64; 512];
        let mut pool = pool_over(&mut buf);
        let layout = Layout::from_size_align(64, 8).unwrap();
        let dirty = pool.allocate(layout).unwrap();
        unsafe { ptr::write_bytes(dirty.as_ptr(), 0xAB, 64) };
        unsafe { pool.release(dirty, layout) };

        let clean = pool.allocate_zeroed(layout).unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(clean.as_ptr(), 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_resize_moves_contents() {
        let mut buf = vec![0u64; 512];
        let mut pool = pool_over(&mut buf);
        let layout = Layout::from_size_align(16, 8).unwrap();
        let block = pool.allocate(layout).unwrap();
        unsafe { ptr::copy_nonoverlapping(b"0123456789abcdef".as_ptr(), block.as_ptr(), 16) };

        let grown = unsafe { pool.resize(block, layout, 128) }.unwrap();
        assert!(pool.contains(grown.as_ptr()));
        let bytes = unsafe { core::slice::from_raw_parts(grown.as_ptr(), 16) };
        assert_eq!(bytes, b"0123456789abcdef");
    }

    #[test]
    fn test_failed_resize_keeps_original() {
        let mut buf = vec![0u64; 512];
        let mut pool = pool_over(&mut buf);
        let layout = Layout::from_size_align(16, 8).unwrap();
        let block = pool.allocate(layout).unwrap();
        let used = pool.used();
        assert!(unsafe { pool.resize(block, layout, 1 << 16) }.is_none());
        assert_eq!(pool.used(), used);
        unsafe { pool.release(block, layout) };
    }

    fn buf_end(buf: &[u64]) -> *const u8 {
        buf.as_ptr_range().end as *const u8
    }
}

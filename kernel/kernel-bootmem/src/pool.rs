//! Runtime page pool.
//!
//! Once the heap is up, hotplugged table memory comes from a
//! [`PagePool`]: a spinlocked, bitmap-tracked stretch of page-granular
//! memory. First-fit, zero-on-allocate, reusable after free — everything
//! the one-way boot arena is not.

use core::alloc::Layout;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

use alloc::boxed::Box;
use alloc::vec;
use kernel_page_ext::SectionTableSource;
use kernel_pfn::NodeId;
use log::debug;
use spin::Mutex;

const PAGE_BYTES: usize = kernel_pfn::PAGE_SIZE as usize;

struct PoolInner {
    base: NonNull<u8>,
    pages: usize,
    /// One bit per page, set while allocated.
    bitmap: Box<[u64]>,
}

// SAFETY: `base` points into memory the pool owns exclusively; the
// `Mutex` wrapping serializes every touch of it.
unsafe impl Send for PoolInner {}

impl PoolInner {
    fn bit(&self, index: usize) -> bool {
        self.bitmap[index / 64] & (1 << (index % 64)) != 0
    }

    /// First run of `count` free pages.
    fn find_run(&self, count: usize) -> Option<usize> {
        debug_assert!(count >= 1);
        let mut start = 0;
        let mut run = 0;
        for index in 0..self.pages {
            if self.bit(index) {
                run = 0;
                continue;
            }
            if run == 0 {
                start = index;
            }
            run += 1;
            if run == count {
                return Some(start);
            }
        }
        None
    }

    fn set_run(&mut self, start: usize, count: usize) {
        for index in start..start + count {
            debug_assert!(!self.bit(index));
            self.bitmap[index / 64] |= 1 << (index % 64);
        }
    }

    fn clear_run(&mut self, start: usize, count: usize) {
        for index in start..start + count {
            debug_assert!(self.bit(index), "freeing a page that is not allocated");
            self.bitmap[index / 64] &= !(1 << (index % 64));
        }
    }
}

/// Page-granular allocator over one exclusively owned memory stretch.
///
/// Serves whole pages only, so any layout with page alignment or less
/// fits; callers get zero-filled memory every time, including reuse.
/// The pool has no node affinity — on multi-node machines there is one
/// pool per node and the caller picks.
pub struct PagePool {
    inner: Mutex<PoolInner>,
}

impl PagePool {
    /// Wrap `memory` as a pool.
    ///
    /// The front of the slice is clipped up to the first page boundary
    /// and the tail below the last one; a slice without a whole aligned
    /// page inside yields an empty pool that refuses every allocation.
    #[must_use]
    pub fn new(memory: &'static mut [MaybeUninit<u8>]) -> Self {
        let start = memory.as_mut_ptr() as usize;
        let offset = (start.next_multiple_of(PAGE_BYTES) - start).min(memory.len());
        let pages = (memory.len() - offset) / PAGE_BYTES;
        // SAFETY: `offset` is within (or one past) the slice.
        let base = unsafe { NonNull::new_unchecked(memory.as_mut_ptr().cast::<u8>().add(offset)) };
        debug!("page pool: {pages} pages at {:p}", base.as_ptr());
        Self {
            inner: Mutex::new(PoolInner {
                base,
                pages,
                bitmap: vec![0; pages.div_ceil(64)].into_boxed_slice(),
            }),
        }
    }

    /// Whole pages the pool manages.
    #[must_use]
    pub fn capacity_pages(&self) -> usize {
        self.inner.lock().pages
    }

    /// Pages currently free.
    #[must_use]
    pub fn available_pages(&self) -> usize {
        let inner = self.inner.lock();
        (0..inner.pages).filter(|&index| !inner.bit(index)).count()
    }

    fn pages_for(layout: Layout) -> usize {
        layout.size().div_ceil(PAGE_BYTES).max(1)
    }

    fn alloc_pages(&self, count: usize) -> Option<NonNull<u8>> {
        let mut inner = self.inner.lock();
        let start = inner.find_run(count)?;
        inner.set_run(start, count);
        // SAFETY: `start + count <= pages`, so the run is inside the
        // pool's memory.
        let ptr = unsafe { inner.base.add(start * PAGE_BYTES) };
        // SAFETY: the run was free, so nothing else points at it.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, count * PAGE_BYTES) };
        Some(ptr)
    }

    /// # Safety
    ///
    /// `ptr` must be the start of a run of `count` pages previously
    /// returned by [`Self::alloc_pages`] and not freed since, with no
    /// references into it still alive.
    unsafe fn free_pages(&self, ptr: NonNull<u8>, count: usize) {
        let mut inner = self.inner.lock();
        let offset = ptr.as_ptr() as usize - inner.base.as_ptr() as usize;
        debug_assert_eq!(offset % PAGE_BYTES, 0);
        let start = offset / PAGE_BYTES;
        debug_assert!(start + count <= inner.pages);
        inner.clear_run(start, count);
    }
}

impl SectionTableSource for PagePool {
    fn alloc_contiguous(&self, layout: Layout, _node: NodeId) -> Option<NonNull<u8>> {
        debug_assert!(layout.align() <= PAGE_BYTES);
        self.alloc_pages(Self::pages_for(layout))
    }

    fn alloc_virtual_node(&self, _layout: Layout, _node: NodeId) -> Option<NonNull<u8>> {
        None
    }

    fn alloc_virtual(&self, _layout: Layout) -> Option<NonNull<u8>> {
        None
    }

    unsafe fn free_contiguous(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded from the trait contract.
        unsafe { self.free_pages(ptr, Self::pages_for(layout)) };
    }

    unsafe fn free_virtual(&self, _ptr: NonNull<u8>, _layout: Layout) {
        debug_assert!(false, "a page pool never hands out virtual tables");
    }
}

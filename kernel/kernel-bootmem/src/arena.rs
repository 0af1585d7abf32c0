//! Early-boot carve allocator.
//!
//! Before the frame allocator and the heap exist the kernel only has the
//! raw memory regions the loader handed over. [`BootArena`] collects
//! those regions, tagged with their owning node, and serves one-way
//! allocations from them: a bump cursor per region, node-local regions
//! first, zero-filled on the way out, never freed.

use core::alloc::Layout;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

use kernel_page_ext::BootTableSource;
use kernel_pfn::{align_up, NodeId, PhysAddr};
use log::debug;

use crate::BootMemError;

/// Regions a [`BootArena`] can hold; one per loader memory-map entry of
/// interest.
pub const MAX_BOOT_REGIONS: usize = 16;

struct BootRegion {
    node: NodeId,
    phys: PhysAddr,
    base: NonNull<u8>,
    len: usize,
    /// Next unclaimed byte, relative to `base`.
    cursor: usize,
}

impl BootRegion {
    /// Claim `layout.size()` zeroed bytes at `layout.align()`, or `None`
    /// if the region cannot fit them.
    fn carve(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let base = self.base.as_ptr() as usize;
        let start = align_up((base + self.cursor) as u64, layout.align() as u64) as usize - base;
        let end = start.checked_add(layout.size())?;
        if end > self.len {
            return None;
        }
        // SAFETY: `[start, end)` lies inside the exclusively owned region
        // and past the cursor, so nothing handed out before overlaps it.
        let ptr = unsafe { self.base.add(start) };
        // SAFETY: as above; the bytes may be uninitialized, which a byte
        // fill does not care about.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, layout.size()) };
        self.cursor = end;
        Some(ptr)
    }
}

/// Fixed-capacity set of loader regions serving boot-time table memory.
///
/// Allocations prefer regions on the requested node and fall back to any
/// region with room. There is no deallocation; whatever boot does not
/// claim is handed to the real allocators later, cursor and all.
pub struct BootArena {
    regions: [Option<BootRegion>; MAX_BOOT_REGIONS],
    len: usize,
    /// Physical addresses below this are never handed out.
    floor: PhysAddr,
    allocated: u64,
}

// SAFETY: the regions' memory was transferred in exclusively (via
// `&'static mut`), so the arena is the sole owner of what the raw
// pointers reach.
unsafe impl Send for BootArena {}

impl BootArena {
    /// Empty arena with no reserved floor.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_floor(PhysAddr::zero())
    }

    /// Empty arena that never serves physical addresses below `floor`
    /// (firmware tables, the zero page, and friends live down there).
    #[must_use]
    pub const fn with_floor(floor: PhysAddr) -> Self {
        Self {
            regions: [const { None }; MAX_BOOT_REGIONS],
            len: 0,
            floor,
            allocated: 0,
        }
    }

    /// Hand a loader region to the arena.
    ///
    /// `phys` is the physical address of the first byte of `memory`; the
    /// part of the region below the configured floor is skipped, not
    /// served. Taking the slice by `&'static mut` transfers exclusive
    /// ownership of the bytes to the arena.
    pub fn add_region(
        &mut self,
        node: NodeId,
        phys: PhysAddr,
        memory: &'static mut [MaybeUninit<u8>],
    ) -> Result<(), BootMemError> {
        if self.len == self.regions.len() {
            return Err(BootMemError::TooManyRegions);
        }
        let len = memory.len();
        let skip = self.floor.as_u64().saturating_sub(phys.as_u64());
        let cursor = (skip as usize).min(len);
        debug!("boot arena: {len} bytes on node {node} at {phys}");
        // SAFETY: a slice pointer is never null.
        let base = unsafe { NonNull::new_unchecked(memory.as_mut_ptr().cast::<u8>()) };
        self.regions[self.len] = Some(BootRegion {
            node,
            phys,
            base,
            len,
            cursor,
        });
        self.len += 1;
        Ok(())
    }

    /// Registered regions.
    #[must_use]
    pub const fn region_count(&self) -> usize {
        self.len
    }

    /// Bytes claimed so far, alignment padding not included.
    #[must_use]
    pub const fn allocated_bytes(&self) -> u64 {
        self.allocated
    }

    fn carve_on(&mut self, layout: Layout, node: Option<NodeId>) -> Option<NonNull<u8>> {
        for region in self.regions.iter_mut().flatten() {
            if node.is_some_and(|node| region.node != node) {
                continue;
            }
            if let Some(ptr) = region.carve(layout) {
                self.allocated += layout.size() as u64;
                return Some(ptr);
            }
        }
        None
    }
}

impl Default for BootArena {
    fn default() -> Self {
        Self::new()
    }
}

impl BootTableSource for BootArena {
    fn alloc_node_table(&mut self, layout: Layout, node: NodeId) -> Option<NonNull<u8>> {
        if let Some(ptr) = self.carve_on(layout, Some(node)) {
            return Some(ptr);
        }
        debug!("no node-local boot memory on node {node}, taking any region");
        self.carve_on(layout, None)
    }
}

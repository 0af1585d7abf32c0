//! Provider traits for table memory.
//!
//! The subsystem never allocates table memory itself; it asks one of two
//! narrow providers. Boot-time tables come from a [`BootTableSource`] — a
//! carve-out allocator whose memory is never returned. Hotplug-time section
//! tables come from a [`SectionTableSource`], which distinguishes physically
//! contiguous pages from virtually-mapped fallbacks so each can be freed the
//! way it was allocated.
//!
//! Every allocation method returns memory that is **fully zero-filled** and
//! aligned per the requested layout; a zeroed record table is immediately
//! valid. `None` means the path is exhausted — the caller decides whether
//! that is fatal (boot) or a vetoed transition (hotplug).

use core::alloc::Layout;
use core::ptr::NonNull;

use kernel_pfn::NodeId;

/// Boot-time table memory: zero-filled carve-outs that live forever.
///
/// Boot initialization is single-threaded, so the receiver is mutable and
/// implementations need no interior locking.
pub trait BootTableSource {
    /// Allocate `layout` zero-filled bytes with affinity to `node` when the
    /// provider can manage it, from any node otherwise.
    fn alloc_node_table(&mut self, layout: Layout, node: NodeId) -> Option<NonNull<u8>>;
}

/// Runtime section-table memory for sparse layouts.
///
/// Called from hotplug paths while the subsystem is shared, so the receiver
/// is `&self`; implementations synchronize internally.
pub trait SectionTableSource {
    /// Physically contiguous pages local to `node`, zero-filled.
    fn alloc_contiguous(&self, layout: Layout, node: NodeId) -> Option<NonNull<u8>>;

    /// Virtually-mapped memory with `node` affinity, zero-filled.
    fn alloc_virtual_node(&self, layout: Layout, node: NodeId) -> Option<NonNull<u8>>;

    /// Virtually-mapped memory from anywhere, zero-filled.
    fn alloc_virtual(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return memory obtained from [`Self::alloc_contiguous`].
    ///
    /// # Safety
    ///
    /// `ptr`/`layout` must exactly match one earlier `alloc_contiguous`
    /// success that has not been freed, and nothing may touch the memory
    /// afterwards.
    unsafe fn free_contiguous(&self, ptr: NonNull<u8>, layout: Layout);

    /// Return memory obtained from one of the virtual allocation paths.
    ///
    /// # Safety
    ///
    /// `ptr`/`layout` must exactly match one earlier `alloc_virtual_node`
    /// or `alloc_virtual` success that has not been freed, and nothing may
    /// touch the memory afterwards.
    unsafe fn free_virtual(&self, ptr: NonNull<u8>, layout: Layout);
}

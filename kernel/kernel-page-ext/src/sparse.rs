//! Per-section extension tables for sparse memory layouts.
//!
//! Sparse layouts carve the frame space into fixed power-of-two sections
//! (the [`SectionGeometry`] type parameter) and keep one record table per
//! section that actually has backing memory. Sections are also the grain
//! of memory hotplug, so tables come and go at runtime: allocation happens
//! from a [`SectionTableSource`] through a three-step cascade — contiguous
//! node-local pages, then a node-affine virtual mapping if the node has
//! generally usable memory, then any virtual mapping.
//!
//! ## Publication
//!
//! Each section slot publishes its table through one atomic base pointer,
//! stored *pre-biased*: the section's first frame number is subtracted at
//! publish time, so [`Self::lookup`] is a load plus a single addition. A
//! null pointer means "no table"; the transition null → valid happens only
//! after the zero-filled table is in place (Release), and valid → null
//! strictly before the memory is handed back.

use alloc::boxed::Box;
use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

use kernel_pfn::{FrameRange, NodeId, Pfn, SectionGeometry};
use log::{error, info};

use crate::record::PageExtRecord;
use crate::registry::ExtensionRegistry;
use crate::source::SectionTableSource;
use crate::table::{RecordTable, TableBacking};
use crate::topology::MemoryTopology;
use crate::PageExtError;

struct SectionSlot {
    /// Table base biased by the section's first frame; null while absent.
    published: AtomicPtr<PageExtRecord>,
    table: UnsafeCell<Option<RecordTable>>,
}

impl SectionSlot {
    fn new() -> Self {
        Self {
            published: AtomicPtr::new(ptr::null_mut()),
            table: UnsafeCell::new(None),
        }
    }
}

/// One record table per memory section, hotplug-capable.
///
/// Boot initialization runs exclusively (`&mut self`); afterwards the
/// allocator is shared — lookups from anywhere, hotplug operations under
/// the hotplug framework's serialization (their `# Safety` contracts).
pub struct SparseTables<'a, T: MemoryTopology, S: SectionTableSource, G: SectionGeometry> {
    topology: &'a T,
    source: &'a S,
    registry: ExtensionRegistry,
    sections: Box<[SectionSlot]>,
    usage: AtomicU64,
    enabled: AtomicBool,
    _geometry: PhantomData<G>,
}

// SAFETY: the `table` cells are only touched by `&mut self` boot paths or
// by the unsafe hotplug entry points, whose contracts demand external
// serialization; everything else goes through atomics. Shared table memory
// only ever surfaces as `&PageExtRecord`.
unsafe impl<T, S, G> Sync for SparseTables<'_, T, S, G>
where
    T: MemoryTopology + Sync,
    S: SectionTableSource + Sync,
    G: SectionGeometry,
{
}

// SAFETY: the struct holds shared references and owned tables, none of
// which are tied to a thread.
unsafe impl<T, S, G> Send for SparseTables<'_, T, S, G>
where
    T: MemoryTopology + Sync,
    S: SectionTableSource + Sync,
    G: SectionGeometry,
{
}

impl<'a, T, S, G> SparseTables<'a, T, S, G>
where
    T: MemoryTopology,
    S: SectionTableSource,
    G: SectionGeometry,
{
    /// New allocator with slots for every section below `max_pfn`, all
    /// empty. Allocates only the slot array.
    #[must_use]
    pub fn new(topology: &'a T, source: &'a S, registry: ExtensionRegistry, max_pfn: Pfn) -> Self {
        let count = max_pfn.align_up(G::FRAMES).section::<G>().as_usize();
        let sections = (0..count).map(|_| SectionSlot::new()).collect();
        Self {
            topology,
            source,
            registry,
            sections,
            usage: AtomicU64::new(0),
            enabled: AtomicBool::new(false),
            _geometry: PhantomData,
        }
    }

    /// Number of section slots.
    #[must_use]
    pub const fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Total bytes ever allocated for tables; never decremented. Advisory.
    #[must_use]
    pub fn total_usage(&self) -> u64 {
        self.usage.load(Ordering::Relaxed)
    }

    /// Whether boot initialization completed with the probe positive.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn owning_node(&self, pfn: Pfn) -> Option<NodeId> {
        self.topology.frame_node(pfn)
    }

    fn slot(&self, pfn: Pfn) -> Option<&SectionSlot> {
        self.sections.get(pfn.section::<G>().as_usize())
    }

    /// Bring the subsystem up at boot.
    ///
    /// Evaluates the registry probe; a negative answer allocates nothing
    /// and leaves the allocator inert (hotplug notifications included).
    /// Otherwise every populated section of every node with memory gets a
    /// table, the total byte count is logged, and all registered init
    /// callbacks run once, in registration order.
    ///
    /// Nodes whose spans interleave are handled by ownership: a walk only
    /// claims sections whose first frame its node owns.
    ///
    /// Any allocation failure is unrecoverable: the error propagates and
    /// the caller must halt boot.
    pub fn boot_init(&mut self) -> Result<(), PageExtError> {
        if self.enabled.load(Ordering::Relaxed) {
            return Err(PageExtError::AlreadyInitialized);
        }
        if !self.registry.any_needed() {
            return Ok(());
        }
        for index in 0..self.topology.node_count() {
            let node = NodeId::new(index as u32);
            if !self.topology.node_has_memory(node) {
                continue;
            }
            let Some(span) = self.topology.node_span(node) else {
                continue;
            };
            for pfn in span.section_starts::<G>() {
                if !self.topology.frame_is_populated(pfn) {
                    continue;
                }
                // Interleaved spans: this section belongs to another
                // node's walk.
                if self.topology.frame_node(pfn) != Some(node) {
                    continue;
                }
                // SAFETY: boot runs single-threaded and we hold `&mut self`.
                unsafe { self.allocate_section_table(pfn, node)? };
            }
        }
        self.enabled.store(true, Ordering::Release);
        info!(
            "allocated {} bytes of page extension tables",
            self.usage.load(Ordering::Relaxed)
        );
        self.registry.run_init_callbacks();
        Ok(())
    }

    /// Ensure the section containing `pfn` has a record table, allocating
    /// one on `node` through the cascade if it does not.
    ///
    /// Idempotent: a section that already has a table succeeds without
    /// touching the usage counter.
    ///
    /// # Safety
    ///
    /// Must not run concurrently with itself, [`Self::free_section_table`]
    /// or the range operations — boot holds `&mut self`, hotplug relies on
    /// the framework's serialization.
    pub unsafe fn allocate_section_table(
        &self,
        pfn: Pfn,
        node: NodeId,
    ) -> Result<(), PageExtError> {
        let Some(slot) = self.slot(pfn) else {
            return Err(PageExtError::OutOfSpan(pfn));
        };
        // SAFETY: exclusive access to the cell by this function's contract.
        let table_cell = unsafe { &mut *slot.table.get() };
        if table_cell.is_some() {
            return Ok(());
        }

        let records = G::FRAMES as usize;
        let Some(layout) = RecordTable::layout(records) else {
            return Err(PageExtError::OutOfMemory);
        };
        let (ptr, backing) = if let Some(ptr) = self.source.alloc_contiguous(layout, node) {
            (ptr, TableBacking::Contiguous)
        } else if let Some(ptr) = self.virtual_fallback(layout, node) {
            (ptr, TableBacking::Virtual)
        } else {
            error!(
                "page extension table allocation failed for section {}",
                pfn.section::<G>()
            );
            return Err(PageExtError::OutOfMemory);
        };

        // SAFETY: provider contract — zero-filled memory of exactly
        // `layout`, exclusively ours from here on.
        let table = unsafe { RecordTable::from_raw(ptr, records, backing) };
        let biased = table
            .base_ptr()
            .wrapping_sub(pfn.section_start::<G>().as_usize());
        *table_cell = Some(table);
        self.usage.fetch_add(layout.size() as u64, Ordering::Relaxed);
        // Publish strictly after the zero-filled table is in place.
        slot.published.store(biased, Ordering::Release);
        Ok(())
    }

    fn virtual_fallback(&self, layout: Layout, node: NodeId) -> Option<NonNull<u8>> {
        if self.topology.node_has_normal_memory(node) {
            if let Some(ptr) = self.source.alloc_virtual_node(layout, node) {
                return Some(ptr);
            }
        }
        self.source.alloc_virtual(layout)
    }

    /// Drop the table of the section containing `pfn`, if any.
    ///
    /// Sections without a table (including sections beyond the covered
    /// span) are ignored, so offlining is idempotent and infallible.
    ///
    /// # Safety
    ///
    /// Same serialization as [`Self::allocate_section_table`], and no
    /// reference obtained from [`Self::lookup`] for a frame of this
    /// section may still be alive.
    pub unsafe fn free_section_table(&self, pfn: Pfn) {
        let Some(slot) = self.slot(pfn) else {
            return;
        };
        // SAFETY: exclusive access to the cell by this function's contract.
        let table_cell = unsafe { &mut *slot.table.get() };
        let Some(table) = table_cell.take() else {
            return;
        };
        // Retract before the memory goes back to the source.
        slot.published.store(ptr::null_mut(), Ordering::Release);

        let (memory, records, backing) = table.into_raw();
        let Some(layout) = RecordTable::layout(records) else {
            return;
        };
        match backing {
            // SAFETY: `memory`/`layout` are exactly what the source handed
            // out for this table, freed at most once.
            TableBacking::Contiguous => unsafe { self.source.free_contiguous(memory, layout) },
            // SAFETY: as above.
            TableBacking::Virtual => unsafe { self.source.free_virtual(memory, layout) },
            TableBacking::Boot => debug_assert!(false, "boot tables are never retired"),
        }
    }

    /// Bring tables up for a range coming online.
    ///
    /// The range is grown outward to whole sections; every populated
    /// section in it gets a table on `node`. On any failure the **entire**
    /// aligned range is torn down — including tables that existed before
    /// this call — and the error is returned so the caller can veto the
    /// transition.
    ///
    /// # Safety
    ///
    /// Hotplug serialization as for [`Self::allocate_section_table`];
    /// additionally, because rollback may retire pre-existing tables, no
    /// lookup reference into the aligned range may outlive this call when
    /// it fails.
    pub unsafe fn online_range(&self, range: FrameRange, node: NodeId) -> Result<(), PageExtError> {
        let aligned = range.align_to_sections::<G>();
        for pfn in aligned.section_starts::<G>() {
            if !self.topology.frame_is_populated(pfn) {
                continue;
            }
            // SAFETY: forwarded from this function's contract.
            if let Err(err) = unsafe { self.allocate_section_table(pfn, node) } {
                // SAFETY: likewise.
                unsafe { self.offline_range(range) };
                return Err(err);
            }
        }
        Ok(())
    }

    /// Drop the tables of every section overlapped by `range`.
    ///
    /// Always succeeds; sections without tables are skipped, so the
    /// operation is idempotent.
    ///
    /// # Safety
    ///
    /// Same contract as [`Self::free_section_table`], for every section of
    /// the outward-aligned range.
    pub unsafe fn offline_range(&self, range: FrameRange) {
        let aligned = range.align_to_sections::<G>();
        for pfn in aligned.section_starts::<G>() {
            // SAFETY: forwarded from this function's contract.
            unsafe { self.free_section_table(pfn) };
        }
    }

    /// The record for `pfn`, or `None` when its section has no published
    /// table (before boot, after offline, or outside the covered span).
    ///
    /// One atomic load and one addition; never locks, never allocates.
    #[must_use]
    pub fn lookup(&self, pfn: Pfn) -> Option<&PageExtRecord> {
        let slot = self.slot(pfn)?;
        let base = slot.published.load(Ordering::Acquire);
        if base.is_null() {
            return None;
        }
        // SAFETY: a published pointer is the table base biased by the
        // section-aligned frame number, so adding any frame of this
        // section lands inside the live table; the Acquire load pairs with
        // the Release publish, making the zero-fill visible, and retiring
        // the table requires (per the free contracts) that no such
        // reference is still in use.
        Some(unsafe { &*base.wrapping_add(pfn.as_usize()) })
    }
}

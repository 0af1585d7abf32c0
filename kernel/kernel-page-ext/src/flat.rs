//! Per-node extension tables for flat memory layouts.
//!
//! With a flat layout every node's frames form one contiguous span, so one
//! record table per node covers everything. The table spans the node's
//! frame range *padded outward* to the buddy allocator's maximal block
//! granularity: the buddy algorithm checks neighbouring frames of the same
//! maximal block when merging, and those neighbours can sit in the
//! alignment padding just outside the node's real span. Padding records
//! are allocated, zeroed and served like any other.
//!
//! Flat layouts know nothing of hotplug; tables are built once at boot from
//! a [`BootTableSource`] and never freed.

use alloc::boxed::Box;

use kernel_pfn::{NodeId, Pfn};
use log::{error, info};

use crate::record::PageExtRecord;
use crate::registry::ExtensionRegistry;
use crate::source::BootTableSource;
use crate::table::{RecordTable, TableBacking};
use crate::topology::MemoryTopology;
use crate::PageExtError;

struct NodeSlot {
    table: Option<RecordTable>,
    /// First frame the table covers (span start aligned down).
    start: Pfn,
}

/// One record table per memory node.
///
/// Construction is cheap and allocates nothing; [`Self::boot_init`] decides
/// (via the registry probe) whether tables exist at all. Lookups are plain
/// shared reads — after boot the structure is immutable.
pub struct FlatTables<'a, T: MemoryTopology> {
    topology: &'a T,
    registry: ExtensionRegistry,
    block_frames: u64,
    nodes: Box<[NodeSlot]>,
    usage: u64,
    enabled: bool,
}

impl<'a, T: MemoryTopology> FlatTables<'a, T> {
    /// New allocator over `topology` with all node slots unset.
    ///
    /// `block_frames` is the padding granularity, normally
    /// [`kernel_pfn::MAX_ORDER_FRAMES`]; it must be a power of two.
    #[must_use]
    pub fn new(topology: &'a T, registry: ExtensionRegistry, block_frames: u64) -> Self {
        debug_assert!(block_frames.is_power_of_two());
        let nodes = (0..topology.node_count())
            .map(|_| NodeSlot {
                table: None,
                start: Pfn::new(0),
            })
            .collect();
        Self {
            topology,
            registry,
            block_frames,
            nodes,
            usage: 0,
            enabled: false,
        }
    }

    /// Allocate the node's table over its padded span.
    ///
    /// Nodes without a span (or with an empty one) succeed without
    /// allocating, as does a node that already has its table.
    pub fn init_node<B: BootTableSource>(
        &mut self,
        source: &mut B,
        node: NodeId,
    ) -> Result<(), PageExtError> {
        let Some(slot) = self.nodes.get_mut(node.as_usize()) else {
            return Err(PageExtError::UnknownNode);
        };
        if slot.table.is_some() {
            return Ok(());
        }
        let Some(span) = self.topology.node_span(node) else {
            return Ok(());
        };
        if span.is_empty() {
            return Ok(());
        }

        let start = span.start.align_down(self.block_frames);
        let end = span.end.align_up(self.block_frames);
        let records = (end.as_u64() - start.as_u64()) as usize;
        let Some(layout) = RecordTable::layout(records) else {
            return Err(PageExtError::OutOfMemory);
        };
        let Some(ptr) = source.alloc_node_table(layout, node) else {
            error!("page extension table allocation failed for node {node}");
            return Err(PageExtError::OutOfMemory);
        };
        // SAFETY: provider contract — zero-filled memory of exactly
        // `layout`, exclusively ours from here on.
        let table = unsafe { RecordTable::from_raw(ptr, records, TableBacking::Boot) };
        self.usage += table.size_bytes() as u64;
        *slot = NodeSlot {
            table: Some(table),
            start,
        };
        Ok(())
    }

    /// Bring the subsystem up at boot.
    ///
    /// Evaluates the registry probe; a negative answer allocates nothing
    /// and leaves the allocator inert. Otherwise every online node gets
    /// its table, the total byte count is logged, and all registered init
    /// callbacks run once, in registration order.
    ///
    /// Any allocation failure is unrecoverable: the error propagates and
    /// the caller must halt boot.
    pub fn boot_init<B: BootTableSource>(&mut self, source: &mut B) -> Result<(), PageExtError> {
        if self.enabled {
            return Err(PageExtError::AlreadyInitialized);
        }
        if !self.registry.any_needed() {
            return Ok(());
        }
        for index in 0..self.topology.node_count() {
            let node = NodeId::new(index as u32);
            if !self.topology.node_is_online(node) {
                continue;
            }
            self.init_node(source, node)?;
        }
        self.enabled = true;
        info!("allocated {} bytes of page extension tables", self.usage);
        self.registry.run_init_callbacks();
        Ok(())
    }

    /// The record for `pfn`, or `None` when the frame is not served: no
    /// owning node, the node's table was never allocated, or the frame
    /// lies outside the padded table span.
    #[must_use]
    pub fn lookup(&self, pfn: Pfn) -> Option<&PageExtRecord> {
        let node = self.topology.frame_node(pfn)?;
        let slot = self.nodes.get(node.as_usize())?;
        let table = slot.table.as_ref()?;
        let offset = pfn.checked_offset_from(slot.start)?;
        table.record(offset as usize)
    }

    /// Total bytes ever allocated for tables. Advisory.
    #[inline]
    #[must_use]
    pub const fn total_usage(&self) -> u64 {
        self.usage
    }

    /// Whether boot initialization completed with the probe positive.
    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

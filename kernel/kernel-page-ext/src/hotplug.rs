//! Memory-hotplug notifications.
//!
//! The hotplug framework announces range transitions as [`MemoryEvent`]s;
//! [`SparseTables::memory_notify`] is the subscriber. Routing:
//!
//! | Event | Action | Can veto |
//! |---------------------------------------|--------------------------|----------|
//! | [`GoingOnline`]                       | bring up section tables  | yes      |
//! | [`Offline`], [`CancelOnline`]         | tear down section tables | no       |
//! | [`Online`], [`GoingOffline`], [`CancelOffline`] | none           | no       |
//!
//! Tables must exist before the first frame of a range is handed out and
//! must survive until the last one is gone, hence bring-up on the *pre*
//! transition and teardown on the *post* transition. A failed bring-up
//! (or an aborted one, via [`CancelOnline`]) is undone in full.
//!
//! [`GoingOnline`]: MemoryEventKind::GoingOnline
//! [`Online`]: MemoryEventKind::Online
//! [`GoingOffline`]: MemoryEventKind::GoingOffline
//! [`Offline`]: MemoryEventKind::Offline
//! [`CancelOnline`]: MemoryEventKind::CancelOnline
//! [`CancelOffline`]: MemoryEventKind::CancelOffline

use kernel_pfn::{FrameRange, NodeId, SectionGeometry};

use crate::source::SectionTableSource;
use crate::sparse::SparseTables;
use crate::topology::MemoryTopology;
use crate::PageExtError;

/// The transition a [`MemoryEvent`] announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryEventKind {
    /// A range is about to come online.
    GoingOnline,
    /// A range finished coming online.
    Online,
    /// A range is about to go offline.
    GoingOffline,
    /// A range finished going offline; its frames are gone.
    Offline,
    /// An announced online transition was aborted.
    CancelOnline,
    /// An announced offline transition was aborted.
    CancelOffline,
}

/// One hotplug notification.
#[derive(Debug, Clone, Copy)]
pub struct MemoryEvent {
    pub kind: MemoryEventKind,
    /// The transitioning frame range; grown outward to whole sections by
    /// the handler.
    pub range: FrameRange,
    /// The owning node, when the framework knows it.
    pub node: Option<NodeId>,
}

impl MemoryEvent {
    #[must_use]
    pub const fn new(kind: MemoryEventKind, range: FrameRange, node: Option<NodeId>) -> Self {
        Self { kind, range, node }
    }
}

impl<T, S, G> SparseTables<'_, T, S, G>
where
    T: MemoryTopology,
    S: SectionTableSource,
    G: SectionGeometry,
{
    /// Handle one hotplug notification.
    ///
    /// Inert (always `Ok`) until [`Self::boot_init`] has completed with a
    /// positive probe. An `Err` from a [`GoingOnline`] event vetoes the
    /// transition: the framework must not bring the range online, and no
    /// tables remain allocated for it. Events without a node fall back to
    /// the topology's owner of the range's first frame; if neither knows
    /// the node, the transition is vetoed with
    /// [`PageExtError::UnknownNode`].
    ///
    /// # Safety
    ///
    /// Same serialization contract as [`Self::online_range`] and
    /// [`Self::offline_range`]: notifications must not run concurrently
    /// with each other, and teardown events must not race live lookup
    /// references into the affected range.
    ///
    /// [`GoingOnline`]: MemoryEventKind::GoingOnline
    pub unsafe fn memory_notify(&self, event: MemoryEvent) -> Result<(), PageExtError> {
        if !self.is_enabled() {
            return Ok(());
        }
        match event.kind {
            MemoryEventKind::GoingOnline => {
                let node = event
                    .node
                    .or_else(|| self.owning_node(event.range.start))
                    .ok_or(PageExtError::UnknownNode)?;
                // SAFETY: forwarded from this function's contract.
                unsafe { self.online_range(event.range, node) }
            }
            MemoryEventKind::Offline | MemoryEventKind::CancelOnline => {
                // SAFETY: forwarded from this function's contract.
                unsafe { self.offline_range(event.range) };
                Ok(())
            }
            MemoryEventKind::Online
            | MemoryEventKind::GoingOffline
            | MemoryEventKind::CancelOffline => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ExtensionOps, ExtensionRegistry};
    use crate::source::fake::HeapSource;
    use crate::topology::fake::TestTopology;
    use kernel_pfn::{Pfn, Section16K};

    fn need_yes() -> bool {
        true
    }

    fn needing_registry() -> ExtensionRegistry {
        static OPS: [ExtensionOps; 1] = [ExtensionOps {
            name: "guard",
            need: Some(need_yes),
            init: None,
        }];
        ExtensionRegistry::new(&OPS)
    }

    fn range(start: u64, end: u64) -> FrameRange {
        FrameRange::new(Pfn::new(start), Pfn::new(end))
    }

    /// Enabled allocator with an empty section array for `[0, 8)` and a
    /// hot-addable node owning it.
    fn booted<'a>(
        topology: &'a TestTopology,
        source: &'a HeapSource,
    ) -> SparseTables<'a, TestTopology, HeapSource, Section16K> {
        let mut tables = SparseTables::new(topology, source, needing_registry(), Pfn::new(8));
        tables.boot_init().unwrap();
        assert!(tables.is_enabled());
        assert_eq!(source.total_allocs(), 0);
        tables
    }

    fn hot_add_topology() -> TestTopology {
        TestTopology::new()
            .node(range(0, 8))
            .memoryless(NodeId::ZERO)
    }

    #[test]
    fn notifications_are_inert_before_boot() {
        let topology = hot_add_topology();
        let source = HeapSource::new();
        let tables: SparseTables<'_, _, _, Section16K> =
            SparseTables::new(&topology, &source, needing_registry(), Pfn::new(8));

        let event = MemoryEvent::new(MemoryEventKind::GoingOnline, range(0, 4), None);
        // SAFETY: no concurrent table operations in this test.
        assert_eq!(unsafe { tables.memory_notify(event) }, Ok(()));
        assert_eq!(source.total_allocs(), 0);
        assert!(tables.lookup(Pfn::new(0)).is_none());
    }

    #[test]
    fn going_online_brings_tables_up() {
        let topology = hot_add_topology();
        let source = HeapSource::new();
        let tables = booted(&topology, &source);

        let event = MemoryEvent::new(
            MemoryEventKind::GoingOnline,
            range(0, 4),
            Some(NodeId::ZERO),
        );
        // SAFETY: no concurrent table operations in this test.
        assert_eq!(unsafe { tables.memory_notify(event) }, Ok(()));
        assert!(tables.lookup(Pfn::new(3)).is_some());
    }

    #[test]
    fn missing_node_is_resolved_from_the_topology() {
        let topology = hot_add_topology();
        let source = HeapSource::new();
        let tables = booted(&topology, &source);

        let event = MemoryEvent::new(MemoryEventKind::GoingOnline, range(4, 8), None);
        // SAFETY: no concurrent table operations in this test.
        assert_eq!(unsafe { tables.memory_notify(event) }, Ok(()));
        assert_eq!(source.last_node(), Some(NodeId::ZERO));
        assert!(tables.lookup(Pfn::new(4)).is_some());
    }

    #[test]
    fn unresolvable_node_vetoes_the_transition() {
        // Frames [4, 8) are populated but no node owns them.
        let topology = TestTopology::new()
            .node(range(0, 4))
            .memoryless(NodeId::ZERO)
            .orphan_frames(range(4, 8));
        let source = HeapSource::new();
        let tables = booted(&topology, &source);

        let event = MemoryEvent::new(MemoryEventKind::GoingOnline, range(4, 8), None);
        // SAFETY: no concurrent table operations in this test.
        let result = unsafe { tables.memory_notify(event) };
        assert_eq!(result, Err(PageExtError::UnknownNode));
        assert_eq!(source.total_allocs(), 0);
    }

    #[test]
    fn failed_bring_up_vetoes_with_the_allocation_error() {
        let topology = hot_add_topology();
        let source = HeapSource::new()
            .deny_contiguous()
            .deny_virtual_node()
            .deny_virtual();
        let tables = booted(&topology, &source);

        let event = MemoryEvent::new(
            MemoryEventKind::GoingOnline,
            range(0, 8),
            Some(NodeId::ZERO),
        );
        // SAFETY: no concurrent table operations in this test.
        let result = unsafe { tables.memory_notify(event) };
        assert_eq!(result, Err(PageExtError::OutOfMemory));
        assert!(tables.lookup(Pfn::new(0)).is_none());
        assert_eq!(source.live_tables(), 0);
    }

    #[test]
    fn offline_event_tears_tables_down() {
        let topology = hot_add_topology();
        let source = HeapSource::new();
        let tables = booted(&topology, &source);

        // SAFETY: no concurrent table operations in this test; the lookup
        // reference is dead before the teardown event.
        unsafe {
            let up = MemoryEvent::new(
                MemoryEventKind::GoingOnline,
                range(0, 8),
                Some(NodeId::ZERO),
            );
            tables.memory_notify(up).unwrap();
            assert!(tables.lookup(Pfn::new(5)).is_some());

            let down = MemoryEvent::new(MemoryEventKind::Offline, range(0, 8), None);
            assert_eq!(tables.memory_notify(down), Ok(()));
        }
        assert!(tables.lookup(Pfn::new(5)).is_none());
        assert_eq!(source.live_tables(), 0);
    }

    #[test]
    fn cancelled_online_is_undone_like_an_offline() {
        let topology = hot_add_topology();
        let source = HeapSource::new();
        let tables = booted(&topology, &source);

        // SAFETY: no concurrent table operations in this test.
        unsafe {
            let up = MemoryEvent::new(
                MemoryEventKind::GoingOnline,
                range(0, 4),
                Some(NodeId::ZERO),
            );
            tables.memory_notify(up).unwrap();

            let cancel = MemoryEvent::new(MemoryEventKind::CancelOnline, range(0, 4), None);
            assert_eq!(tables.memory_notify(cancel), Ok(()));
        }
        assert!(tables.lookup(Pfn::new(0)).is_none());
        assert_eq!(source.live_tables(), 0);
    }

    #[test]
    fn remaining_events_change_nothing() {
        let topology = hot_add_topology();
        let source = HeapSource::new();
        let tables = booted(&topology, &source);

        // SAFETY: no concurrent table operations in this test.
        unsafe {
            let up = MemoryEvent::new(
                MemoryEventKind::GoingOnline,
                range(0, 4),
                Some(NodeId::ZERO),
            );
            tables.memory_notify(up).unwrap();

            for kind in [
                MemoryEventKind::Online,
                MemoryEventKind::GoingOffline,
                MemoryEventKind::CancelOffline,
            ] {
                let event = MemoryEvent::new(kind, range(0, 4), None);
                assert_eq!(tables.memory_notify(event), Ok(()));
            }
        }
        assert!(tables.lookup(Pfn::new(0)).is_some(), "tables untouched");
        assert_eq!(source.total_allocs(), 1);
        assert_eq!(source.live_tables(), 1);
    }
}

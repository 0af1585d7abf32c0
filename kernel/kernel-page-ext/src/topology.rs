//! Memory-topology queries the allocators depend on.
//!
//! The subsystem does not own the machine's memory map; it interrogates it
//! through this trait. Implementations sit on whatever the platform
//! provides — firmware tables at boot, the hotplug framework's bookkeeping
//! later. All queries are read-only and must be cheap: `frame_node` in
//! particular sits on the flat lookup path.

use kernel_pfn::{FrameRange, NodeId, Pfn};

/// Read-only view of nodes, spans and frame ownership.
///
/// Node ids are dense: `0..node_count()`.
pub trait MemoryTopology {
    /// Number of nodes the machine can have; ids above are invalid.
    fn node_count(&self) -> usize;

    /// Whether the node is online (flat layouts table every online node).
    fn node_is_online(&self, node: NodeId) -> bool;

    /// Whether the node has any managed memory (sparse layouts walk only
    /// these at boot).
    fn node_has_memory(&self, node: NodeId) -> bool;

    /// Whether the node has generally usable memory for node-affine
    /// virtual allocations; gates the node-local virtual fallback of the
    /// sparse allocation cascade.
    fn node_has_normal_memory(&self, node: NodeId) -> bool;

    /// The node's frame span, `None` if it has none. Spans of different
    /// nodes may interleave; [`Self::frame_node`] disambiguates.
    fn node_span(&self, node: NodeId) -> Option<FrameRange>;

    /// Whether backing memory physically exists for this frame.
    fn frame_is_populated(&self, pfn: Pfn) -> bool;

    /// The node whose tables serve this frame, `None` if nobody's do.
    ///
    /// Flat layouts require this to follow the per-frame bookkeeping
    /// array: frames inside a node's *padded* table span (including the
    /// alignment padding around the real span) report that node, so the
    /// buddy allocator's adjacency checks resolve.
    fn frame_node(&self, pfn: Pfn) -> Option<NodeId>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! A literal-span topology for the allocator tests.

    use super::{FrameRange, MemoryTopology, NodeId, Pfn};

    pub(crate) struct TestTopology {
        spans: Vec<FrameRange>,
        online: Vec<bool>,
        has_memory: Vec<bool>,
        has_normal: Vec<bool>,
        owned: Vec<(FrameRange, NodeId)>,
        populated: Vec<FrameRange>,
        holes: Vec<FrameRange>,
    }

    impl TestTopology {
        pub(crate) fn new() -> Self {
            Self {
                spans: Vec::new(),
                online: Vec::new(),
                has_memory: Vec::new(),
                has_normal: Vec::new(),
                owned: Vec::new(),
                populated: Vec::new(),
                holes: Vec::new(),
            }
        }

        /// Add a node owning and populating its whole span.
        pub(crate) fn node(mut self, span: FrameRange) -> Self {
            let id = NodeId::new(self.spans.len() as u32);
            self.spans.push(span);
            self.online.push(true);
            self.has_memory.push(!span.is_empty());
            self.has_normal.push(true);
            self.owned.push((span, id));
            self.populated.push(span);
            self
        }

        /// Add a node whose span is `span` but which only owns (and
        /// populates) the given subranges — interleaved layouts.
        pub(crate) fn node_with_owned(mut self, span: FrameRange, owned: &[FrameRange]) -> Self {
            let id = NodeId::new(self.spans.len() as u32);
            self.spans.push(span);
            self.online.push(true);
            self.has_memory.push(true);
            self.has_normal.push(true);
            for &range in owned {
                self.owned.push((range, id));
                self.populated.push(range);
            }
            self
        }

        /// Declare extra frames served by `node`'s tables without backing
        /// memory of their own (flat padding frames).
        pub(crate) fn extend_owned(mut self, range: FrameRange, node: NodeId) -> Self {
            self.owned.push((range, node));
            self
        }

        /// Declare frames populated without any owning node.
        pub(crate) fn orphan_frames(mut self, range: FrameRange) -> Self {
            self.populated.push(range);
            self
        }

        /// Punch an unpopulated hole into previously declared ranges.
        pub(crate) fn hole(mut self, range: FrameRange) -> Self {
            self.holes.push(range);
            self
        }

        pub(crate) fn offline(mut self, node: NodeId) -> Self {
            self.online[node.as_usize()] = false;
            self
        }

        /// Model a node whose memory is not managed yet (hot-added later).
        pub(crate) fn memoryless(mut self, node: NodeId) -> Self {
            self.has_memory[node.as_usize()] = false;
            self
        }

        pub(crate) fn without_normal_memory(mut self, node: NodeId) -> Self {
            self.has_normal[node.as_usize()] = false;
            self
        }
    }

    impl MemoryTopology for TestTopology {
        fn node_count(&self) -> usize {
            self.spans.len()
        }

        fn node_is_online(&self, node: NodeId) -> bool {
            self.online.get(node.as_usize()).copied().unwrap_or(false)
        }

        fn node_has_memory(&self, node: NodeId) -> bool {
            self.has_memory.get(node.as_usize()).copied().unwrap_or(false)
        }

        fn node_has_normal_memory(&self, node: NodeId) -> bool {
            self.has_normal.get(node.as_usize()).copied().unwrap_or(false)
        }

        fn node_span(&self, node: NodeId) -> Option<FrameRange> {
            self.spans.get(node.as_usize()).copied()
        }

        fn frame_is_populated(&self, pfn: Pfn) -> bool {
            self.populated.iter().any(|range| range.contains(pfn))
                && !self.holes.iter().any(|range| range.contains(pfn))
        }

        fn frame_node(&self, pfn: Pfn) -> Option<NodeId> {
            self.owned
                .iter()
                .find(|(range, _)| range.contains(pfn))
                .map(|&(_, node)| node)
        }
    }
}

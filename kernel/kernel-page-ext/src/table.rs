//! Record tables and their backing memory.
//!
//! A [`RecordTable`] owns one dense array of [`PageExtRecord`]s carved out
//! of provider memory. The table remembers which provider path produced it
//! ([`TableBacking`]) so teardown can hand the memory back the same way —
//! the address itself is never inspected to guess where it came from.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::record::PageExtRecord;

/// Where a table's memory came from; selects the matching free path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableBacking {
    /// Boot-time carve-out; never returned.
    Boot,
    /// Contiguous pages from a [`SectionTableSource`](crate::SectionTableSource).
    Contiguous,
    /// Virtually-mapped memory from a [`SectionTableSource`](crate::SectionTableSource).
    Virtual,
}

/// An owned dense array of extension records.
pub struct RecordTable {
    base: NonNull<PageExtRecord>,
    len: usize,
    backing: TableBacking,
}

// SAFETY: the table exclusively owns its memory; records themselves are
// `Send + Sync` (atomic flags, contract-guarded owner payload).
unsafe impl Send for RecordTable {}
// SAFETY: as above; shared access only hands out `&PageExtRecord`.
unsafe impl Sync for RecordTable {}

impl RecordTable {
    /// Memory layout of a table of `records` records.
    ///
    /// `None` if the byte count overflows `isize`, which no real table
    /// reaches; callers treat it as allocation failure.
    #[must_use]
    pub fn layout(records: usize) -> Option<Layout> {
        Layout::array::<PageExtRecord>(records).ok()
    }

    /// Adopt provider memory as a table of `records` records.
    ///
    /// # Safety
    ///
    /// `ptr` must point to memory of the layout [`Self::layout`]`(records)`
    /// computes, fully zero-filled, exclusively owned by the new table, and
    /// live until [`Self::into_raw`] hands it back.
    #[must_use]
    pub const unsafe fn from_raw(ptr: NonNull<u8>, records: usize, backing: TableBacking) -> Self {
        Self {
            base: ptr.cast(),
            len: records,
            backing,
        }
    }

    /// Number of records.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes behind the table.
    #[inline]
    #[must_use]
    pub const fn size_bytes(&self) -> usize {
        self.len * size_of::<PageExtRecord>()
    }

    #[inline]
    #[must_use]
    pub const fn backing(&self) -> TableBacking {
        self.backing
    }

    /// First record; the reference point for biased publication.
    #[inline]
    #[must_use]
    pub const fn base_ptr(&self) -> *mut PageExtRecord {
        self.base.as_ptr()
    }

    /// The record at `index`, or `None` past the end.
    #[inline]
    #[must_use]
    pub fn record(&self, index: usize) -> Option<&PageExtRecord> {
        if index < self.len {
            // SAFETY: in-bounds of the exclusively owned allocation, and a
            // zero-filled record is valid.
            Some(unsafe { &*self.base.as_ptr().add(index) })
        } else {
            None
        }
    }

    /// Give the memory back for the owner to free through the path matching
    /// [`Self::backing`].
    #[must_use]
    pub fn into_raw(self) -> (NonNull<u8>, usize, TableBacking) {
        (self.base.cast(), self.len, self.backing)
    }
}

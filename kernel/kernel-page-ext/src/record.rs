//! The per-frame extension record.
//!
//! One [`PageExtRecord`] is conceptually attached to every page frame a
//! table covers. The subsystem itself never interprets a record beyond
//! zero-filling it; the capabilities that requested tables do. What the
//! struct *contains* is decided at build time: the flags word is always
//! present, and the `page-owner` Cargo feature appends the owner-tracking
//! payload, so every extension record in a build has the same size and the
//! tables stay plain dense arrays.
//!
//! A record of all zero bytes is valid and inert — freshly allocated tables
//! come up in exactly that state.

#[cfg(feature = "page-owner")]
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Bits of the per-frame flags word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExtensionFlags: u64 {
        /// The frame's contents are filled with the poison pattern while it
        /// sits on a free list, to be verified on reallocation.
        const POISONED = 1 << 0;

        /// The frame is a debugging guard page; the physical allocator must
        /// keep it out of merges and fault on access.
        const GUARD = 1 << 1;

        /// Owner tracking captured the allocation that handed out this
        /// frame; the owner payload is meaningful.
        #[cfg(feature = "page-owner")]
        const OWNER_TRACKED = 1 << 2;
    }
}

/// Call-chain slots captured per owned allocation.
#[cfg(feature = "page-owner")]
pub const OWNER_CALL_CHAIN_CAPACITY: usize = 8;

/// Owner-tracking payload appended to every record by the `page-owner`
/// feature.
///
/// Written by the owner-tracking capability when a frame is handed out;
/// read back when dumping the owners of leaked or corrupted frames.
#[cfg(feature = "page-owner")]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerData {
    /// Buddy order of the allocation that claimed the frame.
    pub order: u32,
    /// Allocation-context bits the request carried.
    pub alloc_context: u32,
    /// Valid entries in `call_chain`.
    pub depth: u32,
    /// Return addresses of the allocating call chain, innermost first.
    pub call_chain: [usize; OWNER_CALL_CHAIN_CAPACITY],
}

#[cfg(feature = "page-owner")]
impl OwnerData {
    const ZEROED: Self = Self {
        order: 0,
        alloc_context: 0,
        depth: 0,
        call_chain: [0; OWNER_CALL_CHAIN_CAPACITY],
    };
}

/// Out-of-line metadata for one page frame.
///
/// Records live in dense tables and are addressed by frame-number offset;
/// consumers receive shared references and use the atomic flag operations
/// (or, with `page-owner`, the owner payload under their own
/// serialization).
#[repr(C)]
#[derive(Debug)]
pub struct PageExtRecord {
    flags: AtomicU64,
    #[cfg(feature = "page-owner")]
    owner: UnsafeCell<OwnerData>,
}

// SAFETY: the flags word is atomic; the owner payload is an `UnsafeCell`
// whose accessor contract forbids aliasing mutable references.
unsafe impl Sync for PageExtRecord {}
// SAFETY: no thread affinity in any field.
unsafe impl Send for PageExtRecord {}

impl PageExtRecord {
    /// A record in the inert all-zeroes state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            flags: AtomicU64::new(0),
            #[cfg(feature = "page-owner")]
            owner: UnsafeCell::new(OwnerData::ZEROED),
        }
    }

    /// Current flag bits.
    #[inline]
    #[must_use]
    pub fn flags(&self) -> ExtensionFlags {
        ExtensionFlags::from_bits_retain(self.flags.load(Ordering::Relaxed))
    }

    /// Whether all of `flags` are set.
    #[inline]
    #[must_use]
    pub fn test_flags(&self, flags: ExtensionFlags) -> bool {
        self.flags().contains(flags)
    }

    /// Set `flags`, leaving other bits untouched.
    #[inline]
    pub fn set_flags(&self, flags: ExtensionFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::Relaxed);
    }

    /// Clear `flags`, leaving other bits untouched.
    #[inline]
    pub fn clear_flags(&self, flags: ExtensionFlags) {
        self.flags.fetch_and(!flags.bits(), Ordering::Relaxed);
    }

    /// Raw access to the owner payload.
    ///
    /// # Safety
    ///
    /// The owner-tracking capability serializes its record writers
    /// externally; the caller must guarantee no two mutable accesses to the
    /// same record's payload overlap.
    #[cfg(feature = "page-owner")]
    #[inline]
    #[must_use]
    pub const unsafe fn owner_data(&self) -> *mut OwnerData {
        self.owner.get()
    }
}

impl Default for PageExtRecord {
    fn default() -> Self {
        Self::new()
    }
}

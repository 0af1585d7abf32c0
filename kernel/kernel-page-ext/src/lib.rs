//! # Page Extension Tables
//!
//! Out-of-line metadata records for physical page frames.
//!
//! Debugging and tracking capabilities (guard-page tracking, allocation-owner
//! tracking, page poisoning) all want a few bytes of state per page frame.
//! Growing the core per-frame structure for them would tax every kernel,
//! including the vast majority that never enables any of them. This crate
//! keeps that state in separate *extension records*, allocated in dense
//! per-range tables only when some compiled-in capability asks for them at
//! boot, and resolved from a frame number in O(1) with no locks.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 ExtensionRegistry                    │
//! │   build-time list of capability descriptors          │
//! │   • need() probes gate all allocation                │
//! │   • init() callbacks run once after boot tables      │
//! └────────────────────────┬─────────────────────────────┘
//!                          │ gates
//!          ┌───────────────┴───────────────┐
//! ┌────────▼─────────┐          ┌──────────▼───────────┐
//! │    FlatTables    │          │     SparseTables     │
//! │ one table per    │          │ one table per memory │
//! │ memory node      │          │ section, hotpluggable│
//! └────────┬─────────┘          └──────────┬───────────┘
//!          │ alloc via                     │ alloc/free via
//! ┌────────▼─────────┐          ┌──────────▼───────────┐
//! │  BootTableSource │          │  SectionTableSource  │
//! │ boot carve-outs, │          │ contiguous pages or  │
//! │ never freed      │          │ virtual fallbacks    │
//! └──────────────────┘          └──────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! | Component | Type | Description |
//! |:-----------|:------|:-------------|
//! | Registry | [`ExtensionRegistry`], [`ExtensionOps`] | Immutable capability descriptors with optional `need`/`init` callbacks. |
//! | Record | [`PageExtRecord`], [`ExtensionFlags`] | The per-frame metadata block; composed at build time by Cargo features. |
//! | Flat layout | [`FlatTables`] | One record table per node spanning its padded frame range. |
//! | Sparse layout | [`SparseTables`] | One record table per section; supports memory hotplug. |
//! | Hotplug | [`MemoryEvent`], [`SparseTables::memory_notify`] | Routes hotplug lifecycle notifications onto section tables. |
//! | Providers | [`BootTableSource`], [`SectionTableSource`] | Where table memory comes from. |
//! | Topology | [`MemoryTopology`] | Node spans, frame population and frame ownership queries. |
//!
//! ## Boot flow
//!
//! Both layouts follow the same shape: evaluate the registry's `need` probes
//! (short-circuit OR); if nobody asks, allocate nothing and stay inert
//! forever. Otherwise allocate zero-filled tables for every relevant range,
//! log the total byte count, and run every registered `init` callback once,
//! in registration order. Boot-time allocation failure is unrecoverable —
//! the error propagates out of `boot_init` and the caller halts boot.
//!
//! ## Hotplug flow (sparse only)
//!
//! A range coming online gets tables for every populated section it overlaps
//! (rounded outward to whole sections); failure rolls the whole aligned
//! range back and vetoes the transition. A range going offline drops its
//! tables unconditionally. Hotplugged records stay zeroed; `init` callbacks
//! are a boot-only affair.
//!
//! ## Lookup and concurrency
//!
//! A table becomes visible through one published base pointer per slot,
//! stored only after the memory is fully zero-filled. Lookups perform a
//! single Acquire load of that pointer plus pure arithmetic — no locks, no
//! allocation, safe from any context that can read memory. Every miss
//! (before boot, after offline, outside the covered span) reports "not
//! present" instead of touching memory. Hotplug operations mutate the slots
//! and are therefore `unsafe` entry points whose contracts require the
//! external serialization the hotplug framework already provides.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod flat;
pub mod hotplug;
pub mod record;
pub mod registry;
pub mod source;
pub mod sparse;
pub mod table;
pub mod topology;

pub use crate::flat::FlatTables;
pub use crate::hotplug::{MemoryEvent, MemoryEventKind};
#[cfg(feature = "page-owner")]
pub use crate::record::OwnerData;
pub use crate::record::{ExtensionFlags, PageExtRecord};
pub use crate::registry::{ExtensionOps, ExtensionRegistry};
pub use crate::source::{BootTableSource, SectionTableSource};
pub use crate::sparse::SparseTables;
pub use crate::table::{RecordTable, TableBacking};
pub use crate::topology::MemoryTopology;

use kernel_pfn::Pfn;

/// Errors reported by table allocation and hotplug handling.
///
/// `OutOfMemory` is fatal when it escapes `boot_init` — there is no partial
/// boot — and a veto when it comes out of a hotplug path, where the
/// subsystem has already rolled itself back to a consistent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PageExtError {
    /// Every allocation path for a record table was exhausted.
    #[error("out of memory for extension tables")]
    OutOfMemory,
    /// `boot_init` already ran on this allocator.
    #[error("extension tables already initialized")]
    AlreadyInitialized,
    /// A section operation addressed a frame beyond the covered span.
    #[error("frame {0} is outside the covered physical span")]
    OutOfSpan(Pfn),
    /// No owning node could be resolved for a range coming online.
    #[error("no owning node for the range coming online")]
    UnknownNode,
}

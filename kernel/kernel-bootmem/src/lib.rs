//! # Boot and Runtime Memory Providers
//!
//! The per-frame extension tables in `kernel-page-ext` do not allocate
//! memory themselves; they ask a provider. This crate supplies the two
//! providers the kernel actually wires in:
//!
//! | Provider | Stage | Character |
//! |----------------------|-----------|---------------------------------------------|
//! | [`arena::BootArena`] | early boot| node-tagged loader regions, carve-only |
//! | [`pool::PagePool`] | runtime | spinlocked page bitmap, free and reuse |
//!
//! The split mirrors the table lifecycles: boot-time flat tables live
//! forever, so the arena never learns to free; hotplugged section tables
//! come and go with their memory, so the pool tracks every page.
//!
//! Both providers hand out zero-filled memory, which is what makes a
//! freshly allocated table's records valid without further ceremony.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod arena;
pub mod pool;

pub use crate::arena::{BootArena, MAX_BOOT_REGIONS};
pub use crate::pool::PagePool;

/// Errors of the provider layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BootMemError {
    /// A [`BootArena`] was offered more loader regions than it can hold.
    #[error("boot arena cannot hold more regions")]
    TooManyRegions,
}

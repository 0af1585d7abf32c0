//! # Page-Frame Numbers, Nodes and Sections
//!
//! Strongly typed wrappers for the units physical-memory management code
//! counts in: page frames, frame ranges, memory nodes and memory sections.
//!
//! ## Overview
//!
//! Physical memory is managed as an array of fixed-size page frames. Code
//! that walks this array mixes three kinds of small integers — frame
//! numbers, node ids and section indices — which are all too easy to swap
//! in arithmetic. This crate wraps each in a zero-cost newtype:
//!
//! | Concept | Generic | Description |
//! |----------|----------|-------------|
//! | [`Pfn`] | – | A page-frame number (physical address divided by the page size). |
//! | [`PhysAddr`] | – | A raw 64-bit physical byte address. |
//! | [`NodeId`] | – | A dense small-integer memory-node (NUMA) id. |
//! | [`FrameRange`] | – | A half-open range of frames `[start, end)`. |
//! | [`SectionIndex`] | – | The ordinal of a fixed-size section of frames. |
//!
//! ## Section Geometries
//!
//! Sparse memory models carve the frame space into power-of-two sections.
//! The section size is a property of the build, not of a value, so it is
//! expressed as a marker type implementing [`SectionGeometry`]:
//!
//! - [`Section128M`] — 32768 frames (128 MiB), the conventional grain
//! - [`Section2M`] — 512 frames (2 MiB)
//! - [`Section16K`] — 4 frames (16 KiB), small enough for exhaustive tests
//!
//! The trait defines constants [`FRAMES`](SectionGeometry::FRAMES) and
//! [`SHIFT`](SectionGeometry::SHIFT) used throughout the helpers.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_pfn::*;
//! let pfn = Pfn::new(0x12345);
//!
//! // Which section holds this frame, and where does that section start?
//! let idx = pfn.section::<Section2M>();
//! assert_eq!(idx.first_frame::<Section2M>().as_u64(), 0x12200);
//!
//! // Frame numbers and physical addresses convert both ways.
//! assert_eq!(pfn.base_addr(), PhysAddr::new(0x12345 << PAGE_SHIFT));
//! assert_eq!(PhysAddr::new(0x12345678).frame().as_u64(), 0x12345);
//! ```
//!
//! ## Design Notes
//!
//! - All wrappers are `#[repr(transparent)]` over their integer and
//!   implement `Copy`, `Eq`, `Ord` and `Hash`.
//! - Alignment math is `const fn` and zero-cost in release builds.
//! - The geometry marker `G` carries the section size at the type level, so
//!   flat code and sparse code cannot accidentally exchange indices
//!   computed for different grains.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

use core::fmt;
use core::hash::Hash;
use core::ops::{Add, AddAssign};

const _: () = assert!(
    size_of::<usize>() == size_of::<u64>(),
    "frame arithmetic assumes a 64-bit target"
);

/// Width of a page frame in bits.
pub const PAGE_SHIFT: u32 = 12;

/// Size of a page frame in bytes.
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Number of buddy orders the physical allocator manages.
pub const MAX_ORDER: u32 = 11;

/// Frames in a maximal buddy block, the conventional granularity for
/// padding per-node table spans.
pub const MAX_ORDER_FRAMES: u64 = 1 << (MAX_ORDER - 1);

/// Round `value` down to a multiple of `align`.
///
/// `align` must be a power of two.
///
/// ```rust
/// # use kernel_pfn::align_down;
/// assert_eq!(align_down(1000, 64), 960);
/// assert_eq!(align_down(960, 64), 960);
/// ```
#[inline]
#[must_use]
pub const fn align_down(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

/// Round `value` up to a multiple of `align`.
///
/// `align` must be a power of two.
///
/// ```rust
/// # use kernel_pfn::align_up;
/// assert_eq!(align_up(1050, 64), 1088);
/// assert_eq!(align_up(1088, 64), 1088);
/// ```
#[inline]
#[must_use]
pub const fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Sealed trait pattern to restrict `SectionGeometry` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for supported section sizes.
pub trait SectionGeometry:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Display + fmt::Debug
{
    /// Frames per section (power of two).
    const FRAMES: u64;
    /// log2(FRAMES), i.e., number of low frame-number bits inside a section.
    const SHIFT: u32;

    fn as_str() -> &'static str;
}

/// 128 MiB section (32768 frames).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Section128M;
impl sealed::Sealed for Section128M {}
impl SectionGeometry for Section128M {
    const FRAMES: u64 = 32768;
    const SHIFT: u32 = 15;

    fn as_str() -> &'static str {
        "128M"
    }
}

/// 2 MiB section (512 frames).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Section2M;
impl sealed::Sealed for Section2M {}
impl SectionGeometry for Section2M {
    const FRAMES: u64 = 512;
    const SHIFT: u32 = 9;

    fn as_str() -> &'static str {
        "2M"
    }
}

/// 16 KiB section (4 frames). Useful where a handful of frames must span
/// several sections, e.g. exhaustive hotplug tests.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Section16K;
impl sealed::Sealed for Section16K {}
impl SectionGeometry for Section16K {
    const FRAMES: u64 = 4;
    const SHIFT: u32 = 2;

    fn as_str() -> &'static str {
        "16K"
    }
}

impl fmt::Display for Section128M {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(Self::as_str())
    }
}

impl fmt::Display for Section2M {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(Self::as_str())
    }
}

impl fmt::Display for Section16K {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(Self::as_str())
    }
}

impl fmt::Debug for Section128M {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self, f)
    }
}

impl fmt::Debug for Section2M {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self, f)
    }
}

impl fmt::Debug for Section16K {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self, f)
    }
}

/// A page-frame number.
///
/// Frame `n` covers physical bytes `[n << PAGE_SHIFT, (n + 1) << PAGE_SHIFT)`.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Pfn(u64);

impl Pfn {
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// First byte of this frame.
    #[inline]
    #[must_use]
    pub const fn base_addr(self) -> PhysAddr {
        PhysAddr::new(self.0 << PAGE_SHIFT)
    }

    /// The section of geometry `G` that contains this frame.
    #[inline]
    #[must_use]
    pub const fn section<G: SectionGeometry>(self) -> SectionIndex {
        SectionIndex(self.0 >> G::SHIFT)
    }

    /// First frame of the section of geometry `G` that contains this frame.
    #[inline]
    #[must_use]
    pub const fn section_start<G: SectionGeometry>(self) -> Self {
        Self(align_down(self.0, G::FRAMES))
    }

    /// Round down to a multiple of `frames` (a power of two).
    #[inline]
    #[must_use]
    pub const fn align_down(self, frames: u64) -> Self {
        Self(align_down(self.0, frames))
    }

    /// Round up to a multiple of `frames` (a power of two).
    #[inline]
    #[must_use]
    pub const fn align_up(self, frames: u64) -> Self {
        Self(align_up(self.0, frames))
    }

    /// Frames between `other` and `self`, `None` if `other` is above `self`.
    #[inline]
    #[must_use]
    pub const fn checked_offset_from(self, other: Self) -> Option<u64> {
        self.0.checked_sub(other.0)
    }
}

impl fmt::Debug for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pfn({:#x})", self.0)
    }
}

impl fmt::Display for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Add<u64> for Pfn {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for Pfn {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl From<u64> for Pfn {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<Pfn> for u64 {
    #[inline]
    fn from(pfn: Pfn) -> Self {
        pfn.as_u64()
    }
}

/// A raw physical byte address.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysAddr(u64);

impl PhysAddr {
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The frame that contains this address (truncates the in-frame offset).
    #[inline]
    #[must_use]
    pub const fn frame(self) -> Pfn {
        Pfn(self.0 >> PAGE_SHIFT)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl Add<u64> for PhysAddr {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl From<u64> for PhysAddr {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

/// A dense memory-node (NUMA) id, `0..node_count`.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// The first node; the only one on non-NUMA machines.
    pub const ZERO: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

/// The ordinal of a section within the frame space.
///
/// Only meaningful together with the [`SectionGeometry`] it was computed
/// for; see [`Pfn::section`].
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SectionIndex(u64);

impl SectionIndex {
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// First frame of this section under geometry `G`.
    #[inline]
    #[must_use]
    pub const fn first_frame<G: SectionGeometry>(self) -> Pfn {
        Pfn(self.0 << G::SHIFT)
    }
}

impl fmt::Debug for SectionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SectionIndex({})", self.0)
    }
}

impl fmt::Display for SectionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A half-open range of page frames `[start, end)`.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct FrameRange {
    pub start: Pfn,
    pub end: Pfn,
}

impl FrameRange {
    #[inline]
    #[must_use]
    pub const fn new(start: Pfn, end: Pfn) -> Self {
        Self { start, end }
    }

    /// The range `[start, start + frames)`.
    #[inline]
    #[must_use]
    pub const fn from_start_len(start: Pfn, frames: u64) -> Self {
        Self {
            start,
            end: Pfn::new(start.as_u64() + frames),
        }
    }

    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            start: Pfn::new(0),
            end: Pfn::new(0),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.start.as_u64() >= self.end.as_u64()
    }

    /// Number of frames in the range.
    #[inline]
    #[must_use]
    pub const fn len(self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.end.as_u64() - self.start.as_u64()
        }
    }

    #[inline]
    #[must_use]
    pub const fn contains(self, pfn: Pfn) -> bool {
        self.start.as_u64() <= pfn.as_u64() && pfn.as_u64() < self.end.as_u64()
    }

    /// Grow the range outward to section boundaries of geometry `G`: the
    /// start is rounded down, the end rounded up.
    #[inline]
    #[must_use]
    pub const fn align_to_sections<G: SectionGeometry>(self) -> Self {
        Self {
            start: self.start.align_down(G::FRAMES),
            end: self.end.align_up(G::FRAMES),
        }
    }

    /// Visit one frame per section overlapped by the range: the (possibly
    /// unaligned) `start` itself, then every following section boundary
    /// below `end`.
    ///
    /// ```rust
    /// # use kernel_pfn::*;
    /// let walked: Vec<u64> = FrameRange::new(Pfn::new(5), Pfn::new(14))
    ///     .section_starts::<Section16K>()
    ///     .map(Pfn::as_u64)
    ///     .collect();
    /// assert_eq!(walked, [5, 8, 12]);
    /// ```
    #[inline]
    #[must_use]
    pub const fn section_starts<G: SectionGeometry>(self) -> SectionStarts {
        SectionStarts {
            next: self.start.as_u64(),
            end: self.end.as_u64(),
            step: G::FRAMES,
        }
    }
}

impl fmt::Debug for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameRange({:#x}..{:#x})", self.start.as_u64(), self.end.as_u64())
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start.as_u64(), self.end.as_u64())
    }
}

/// Iterator returned by [`FrameRange::section_starts`].
#[derive(Copy, Clone, Debug)]
pub struct SectionStarts {
    next: u64,
    end: u64,
    step: u64,
}

impl Iterator for SectionStarts {
    type Item = Pfn;

    #[inline]
    fn next(&mut self) -> Option<Pfn> {
        if self.next >= self.end {
            return None;
        }
        let current = self.next;
        self.next = align_up(current + 1, self.step);
        Some(Pfn::new(current))
    }
}

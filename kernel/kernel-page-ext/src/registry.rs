//! Capability descriptors and the build-time extension registry.
//!
//! Capabilities that want per-frame records describe themselves with an
//! [`ExtensionOps`] value; a kernel assembles the ones it compiled in into
//! one `static` slice and hands it to the allocators as an
//! [`ExtensionRegistry`]. The set is fixed at build time — there is no
//! runtime registration, so the registry can be probed and dispatched
//! without any synchronization.

/// One capability's hooks into the page-extension subsystem.
///
/// Both callbacks are optional:
/// - a missing `need` means the capability never requests records by
///   itself (it may still use them if another capability brings the
///   tables up);
/// - a missing `init` means there is nothing to set up once tables exist.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionOps {
    /// Short name for diagnostics.
    pub name: &'static str,
    /// Does this capability need extension records in this boot?
    /// Typically consults command-line switches or build-time state.
    pub need: Option<fn() -> bool>,
    /// One-time setup, run after boot tables exist.
    pub init: Option<fn()>,
}

/// The immutable, build-time list of capability descriptors.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionRegistry {
    ops: &'static [ExtensionOps],
}

impl ExtensionRegistry {
    /// A registry with no capabilities; probes false, dispatches nothing.
    pub const EMPTY: Self = Self::new(&[]);

    #[inline]
    #[must_use]
    pub const fn new(ops: &'static [ExtensionOps]) -> Self {
        Self { ops }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether any capability requests extension records.
    ///
    /// Probes are evaluated in registration order and the first positive
    /// answer wins; later probes are not consulted.
    #[must_use]
    pub fn any_needed(&self) -> bool {
        self.ops
            .iter()
            .any(|ops| ops.need.is_some_and(|need| need()))
    }

    /// Run every registered `init` callback, in registration order.
    ///
    /// Every descriptor with a callback is dispatched, not only the ones
    /// whose probe fired — a capability may piggyback on tables another
    /// one requested.
    pub fn run_init_callbacks(&self) {
        for ops in self.ops {
            if let Some(init) = ops.init {
                init();
            }
        }
    }
}

//! Stable identities for objects, universes, and branches.
//!
//! Every branching object, universe generation, and live branch is identified
//! by a niche-optimized `NonZeroU64` newtype drawn from a process-wide atomic
//! allocator. Ids are globally unique, so merging two universe families never
//! needs to remap anything.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident, $counter:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(NonZeroU64);

        static $counter: AtomicU64 = AtomicU64::new(1);

        impl $name {
            /// Allocate a fresh id. Monotonically increasing, never reused.
            pub(crate) fn fresh() -> Self {
                let raw = $counter.fetch_add(1, Ordering::Relaxed);
                // 2^64 allocations would be required to wrap.
                $name(NonZeroU64::new(raw).expect("id space exhausted"))
            }

            /// Get the underlying `u64` value.
            pub fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Unique identity of a branching object.
    ///
    /// Uses `NonZeroU64` so that `Option<ObjectId>` is the same size as
    /// `ObjectId`. Object identity in a given universe is the pair
    /// `(ObjectId, BranchId)`.
    ObjectId,
    NEXT_OBJECT,
    "obj"
);

id_type!(
    /// Identity of a single universe generation (live tip or frozen snapshot).
    GenId,
    NEXT_GEN,
    "gen"
);

id_type!(
    /// Identity of a live branch: one mutable lineage of universe generations.
    BranchId,
    NEXT_BRANCH,
    "branch"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_niche_optimized() {
        assert_eq!(
            std::mem::size_of::<Option<ObjectId>>(),
            std::mem::size_of::<ObjectId>()
        );
    }

    #[test]
    fn fresh_ids_are_distinct() {
        let a = ObjectId::fresh();
        let b = ObjectId::fresh();
        assert_ne!(a, b);
        assert!(a.get() < b.get());
    }

    #[test]
    fn display_includes_kind_prefix() {
        let g = GenId::fresh();
        assert!(g.to_string().starts_with("gen:"));
    }
}

//! Branching object store: copy-on-write universes with O(1) forking.
//!
//! State lives in *generations*, side tables mapping `ObjectId` to an
//! insertion-ordered attribute map, linked by base pointers into a DAG.
//! A *branch* is a live lineage with a single mutable tip generation;
//! forking freezes the tip and hangs two fresh tips off it, so every
//! object keeps its identity and no per-object work is done.
//!
//! Unrelated objects start in their own universe families. Storing a value
//! that references an object of a foreign family merges the families
//! union-by-size, with union-find forwarding so stale handles keep working.

mod dict;
mod object;
mod universe;
mod value;

pub use dict::OrdDict;
pub use object::{Ctx, Obj};
pub use universe::StoreRef;
pub use value::{Key, Scalar, Value};

pub(crate) use value::{Stored, StoredKey};

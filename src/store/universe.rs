//! Universe generations, branches, and the related-family store.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{StoreError, WorldResult};
use crate::ids::{BranchId, GenId, ObjectId};
use crate::store::{Stored, StoredKey};
use crate::typedef::TypeDef;

/// One universe generation: a frozen snapshot or the live tip of a branch.
///
/// An object's attribute map, once present in a generation, is complete for
/// that point in history: writes materialize the nearest base copy into the
/// tip before mutating. Lookup therefore stops at the first generation that
/// holds a map for the object.
pub(crate) struct Generation {
    /// Predecessor generations, searched in order. More than one entry only
    /// appears when a foreign universe family was merged into this branch.
    bases: Vec<GenId>,
    frozen: bool,
    attrs: HashMap<ObjectId, IndexMap<StoredKey, Stored>>,
}

impl Generation {
    fn live(bases: Vec<GenId>) -> Self {
        Generation {
            bases,
            frozen: false,
            attrs: HashMap::new(),
        }
    }
}

/// A related-universe family: generations, branch tips, and object kinds.
///
/// This is the shared mutation domain: all objects that can reference each
/// other live in one `Store`, and a fork snapshots the whole family at once
/// (by freezing the single tip generation that holds all of its live
/// writes).
pub(crate) struct Store {
    gens: HashMap<GenId, Generation>,
    tips: HashMap<BranchId, GenId>,
    /// Branches retired by a family merge forward to their adoptive branch.
    redirects: HashMap<BranchId, BranchId>,
    kinds: HashMap<ObjectId, &'static TypeDef>,
    /// Set when this store was drained into another by a family merge.
    moved_to: Option<StoreRef>,
}

/// Shared handle to a [`Store`], with union-find forwarding across merges.
#[derive(Clone)]
pub struct StoreRef(pub(crate) Rc<RefCell<Store>>);

impl StoreRef {
    /// Create a store containing a single live branch and one object.
    pub(crate) fn for_new_object(id: ObjectId, kind: &'static TypeDef) -> (StoreRef, BranchId) {
        let root_gen = GenId::fresh();
        let branch = BranchId::fresh();
        let mut generation = Generation::live(Vec::new());
        generation.attrs.insert(id, IndexMap::new());
        let mut store = Store {
            gens: HashMap::new(),
            tips: HashMap::new(),
            redirects: HashMap::new(),
            kinds: HashMap::new(),
            moved_to: None,
        };
        store.gens.insert(root_gen, generation);
        store.tips.insert(branch, root_gen);
        store.kinds.insert(id, kind);
        (StoreRef(Rc::new(RefCell::new(store))), branch)
    }

    /// Follow `moved_to` forwarding to the live store for this family.
    pub(crate) fn resolve(&self) -> StoreRef {
        let mut cur = self.clone();
        loop {
            let next = cur.0.borrow().moved_to.clone();
            match next {
                None => return cur,
                Some(n) => {
                    // Path-compress so long forwarding chains stay short.
                    if let Some(nn) = n.0.borrow().moved_to.clone() {
                        cur.0.borrow_mut().moved_to = Some(nn.clone());
                        cur = nn;
                    } else {
                        cur = n;
                    }
                }
            }
        }
    }

    pub(crate) fn same_family(&self, other: &StoreRef) -> bool {
        Rc::ptr_eq(&self.resolve().0, &other.resolve().0)
    }

    /// Resolve a possibly-retired branch to its live successor.
    pub(crate) fn resolve_branch(&self, branch: BranchId) -> BranchId {
        let store = self.resolve();
        let store = store.0.borrow();
        let mut cur = branch;
        while let Some(&next) = store.redirects.get(&cur) {
            cur = next;
        }
        cur
    }

    pub(crate) fn kind_of(&self, id: ObjectId) -> &'static TypeDef {
        let store = self.resolve();
        let store = store.0.borrow();
        store.kinds.get(&id).copied().unwrap_or_else(|| {
            panic!("object {id} has no registered kind");
        })
    }

    /// Register a freshly created object in an existing family tip.
    pub(crate) fn add_object(&self, branch: BranchId, id: ObjectId, kind: &'static TypeDef) {
        let store = self.resolve();
        let branch = store.resolve_branch(branch);
        let mut store = store.0.borrow_mut();
        let tip = store.tips[&branch];
        store.kinds.insert(id, kind);
        store
            .gens
            .get_mut(&tip)
            .expect("branch tip must exist")
            .attrs
            .insert(id, IndexMap::new());
    }

    /// Read one attribute by walking the base DAG from the branch tip.
    pub(crate) fn lookup(&self, branch: BranchId, id: ObjectId, key: &StoredKey) -> Option<Stored> {
        let store = self.resolve();
        let branch = store.resolve_branch(branch);
        let store = store.0.borrow();
        let map = store.find_attrs(branch, id)?;
        map.get(key).cloned()
    }

    /// Write one attribute, materializing the object's map in the tip first.
    pub(crate) fn put(
        &self,
        branch: BranchId,
        id: ObjectId,
        key: StoredKey,
        value: Stored,
    ) -> WorldResult<()> {
        let store = self.resolve();
        let branch = store.resolve_branch(branch);
        let mut store = store.0.borrow_mut();
        let tip = store.materialize(branch, id)?;
        store
            .gens
            .get_mut(&tip)
            .expect("tip generation must exist")
            .attrs
            .get_mut(&id)
            .expect("materialized map must exist")
            .insert(key, value);
        Ok(())
    }

    /// Delete one attribute. Errors if it is absent anywhere in the history.
    pub(crate) fn delete(&self, branch: BranchId, id: ObjectId, key: &StoredKey) -> WorldResult<Stored> {
        let store = self.resolve();
        let branch = store.resolve_branch(branch);
        let mut store = store.0.borrow_mut();
        let tip = store.materialize(branch, id)?;
        store
            .gens
            .get_mut(&tip)
            .expect("tip generation must exist")
            .attrs
            .get_mut(&id)
            .expect("materialized map must exist")
            .shift_remove(key)
            .ok_or_else(|| {
                StoreError::NoSuchAttribute {
                    key: key.to_string(),
                }
                .into()
            })
    }

    /// Fork a branch: freeze the tip, hang two fresh live tips off it.
    ///
    /// The forking branch keeps its identity (existing handles now read
    /// through the frozen snapshot); the returned branch is the copy.
    pub(crate) fn fork(&self, branch: BranchId) -> BranchId {
        let store = self.resolve();
        let branch = store.resolve_branch(branch);
        let mut store = store.0.borrow_mut();
        let old_tip = store.tips[&branch];
        store
            .gens
            .get_mut(&old_tip)
            .expect("branch tip must exist")
            .frozen = true;

        let continued = GenId::fresh();
        store.gens.insert(continued, Generation::live(vec![old_tip]));
        store.tips.insert(branch, continued);

        let copy_tip = GenId::fresh();
        store.gens.insert(copy_tip, Generation::live(vec![old_tip]));
        let copy = BranchId::fresh();
        store.tips.insert(copy, copy_tip);
        copy
    }

    /// Merge the family of `(other, other_branch)` into `(target, target_branch)`.
    ///
    /// The smaller store is drained into the larger (union by size) and left
    /// forwarding to it; the foreign branch's tip is frozen and becomes an
    /// additional base of the target tip, and the foreign branch forwards to
    /// the target branch. Merging two distinct branches of one family fails
    /// as an external-object error: two forked versions of an object cannot
    /// share a universe.
    pub(crate) fn merge(
        target: &StoreRef,
        target_branch: BranchId,
        other: &StoreRef,
        other_branch: BranchId,
    ) -> WorldResult<()> {
        let target_store = target.resolve();
        let other_store = other.resolve();

        if Rc::ptr_eq(&target_store.0, &other_store.0) {
            let tb = target_store.resolve_branch(target_branch);
            let ob = target_store.resolve_branch(other_branch);
            if tb == ob {
                return Ok(());
            }
            return Err(StoreError::ExternalObject.into());
        }

        let target_bigger = {
            let t = target_store.0.borrow();
            let o = other_store.0.borrow();
            t.kinds.len() >= o.kinds.len()
        };
        let (survivor, drained) = if target_bigger {
            (target_store.clone(), other_store.clone())
        } else {
            (other_store.clone(), target_store.clone())
        };

        {
            let mut s = survivor.0.borrow_mut();
            let mut d = drained.0.borrow_mut();
            s.gens.extend(d.gens.drain());
            s.tips.extend(d.tips.drain());
            s.redirects.extend(d.redirects.drain());
            s.kinds.extend(d.kinds.drain());
            d.moved_to = Some(survivor.clone());
        }

        // Rebase: the foreign branch's state becomes part of the target
        // branch. An unforked foreign family (a lone baseless tip, the
        // common schema-construction case) is folded flat into the target
        // tip; anything with real history is frozen and linked as a base.
        let tb = survivor.resolve_branch(target_branch);
        let ob = survivor.resolve_branch(other_branch);
        let mut s = survivor.0.borrow_mut();
        let foreign_tip = s.tips[&ob];
        let target_tip = s.tips[&tb];
        let flat = s.gens[&foreign_tip].bases.is_empty();
        if flat {
            let moved = s
                .gens
                .remove(&foreign_tip)
                .expect("foreign tip must exist");
            s.gens
                .get_mut(&target_tip)
                .expect("target tip must exist")
                .attrs
                .extend(moved.attrs);
        } else {
            s.gens
                .get_mut(&foreign_tip)
                .expect("foreign tip must exist")
                .frozen = true;
            s.gens
                .get_mut(&target_tip)
                .expect("target tip must exist")
                .bases
                .push(foreign_tip);
        }
        s.tips.remove(&ob);
        s.redirects.insert(ob, tb);
        Ok(())
    }
}

impl Store {
    /// Depth-first search of the base DAG for the object's attribute map.
    fn find_attrs(&self, branch: BranchId, id: ObjectId) -> Option<&IndexMap<StoredKey, Stored>> {
        let mut stack = vec![self.tips[&branch]];
        let mut visited: HashSet<GenId> = HashSet::new();
        while let Some(gen_id) = stack.pop() {
            if !visited.insert(gen_id) {
                continue;
            }
            let generation = self.gens.get(&gen_id)?;
            if let Some(map) = generation.attrs.get(&id) {
                return Some(map);
            }
            // Search bases in declaration order.
            for &b in generation.bases.iter().rev() {
                stack.push(b);
            }
        }
        None
    }

    /// Ensure the object's attribute map lives in the branch tip, copying the
    /// nearest base map if needed. Returns the tip generation id.
    fn materialize(&mut self, branch: BranchId, id: ObjectId) -> WorldResult<GenId> {
        let tip = self.tips[&branch];
        let tip_gen = self.gens.get(&tip).expect("branch tip must exist");
        debug_assert!(!tip_gen.frozen, "branch tips are never frozen");
        if tip_gen.frozen {
            return Err(StoreError::FrozenUniverse.into());
        }
        if !tip_gen.attrs.contains_key(&id) {
            let copied = self
                .find_attrs(branch, id)
                .cloned()
                .ok_or(StoreError::ExternalObject)?;
            self.gens
                .get_mut(&tip)
                .expect("branch tip must exist")
                .attrs
                .insert(id, copied);
        }
        Ok(tip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typedef::OBJECT;

    fn stored_int(n: i64) -> Stored {
        Stored::Int(n)
    }

    fn name(s: &str) -> StoredKey {
        StoredKey::Name(s.into())
    }

    #[test]
    fn put_then_lookup() {
        let id = ObjectId::fresh();
        let (store, branch) = StoreRef::for_new_object(id, &OBJECT);
        store.put(branch, id, name("sdf"), stored_int(2)).unwrap();
        assert_eq!(store.lookup(branch, id, &name("sdf")), Some(stored_int(2)));
        assert_eq!(store.lookup(branch, id, &name("jkl")), None);
    }

    #[test]
    fn fork_isolates_both_sides() {
        let id = ObjectId::fresh();
        let (store, branch) = StoreRef::for_new_object(id, &OBJECT);
        store.put(branch, id, name("sdf"), stored_int(2)).unwrap();

        let copy = store.fork(branch);
        store.put(copy, id, name("jkl"), stored_int(3)).unwrap();
        store.put(branch, id, name("qwe"), stored_int(4)).unwrap();

        assert_eq!(store.lookup(copy, id, &name("sdf")), Some(stored_int(2)));
        assert_eq!(store.lookup(copy, id, &name("jkl")), Some(stored_int(3)));
        assert_eq!(store.lookup(branch, id, &name("qwe")), Some(stored_int(4)));
        assert_eq!(store.lookup(copy, id, &name("qwe")), None);
        assert_eq!(store.lookup(branch, id, &name("jkl")), None);
    }

    #[test]
    fn delete_is_local_to_the_branch() {
        let id = ObjectId::fresh();
        let (store, branch) = StoreRef::for_new_object(id, &OBJECT);
        store.put(branch, id, name("x"), stored_int(1)).unwrap();
        let copy = store.fork(branch);
        store.delete(copy, id, &name("x")).unwrap();
        assert_eq!(store.lookup(copy, id, &name("x")), None);
        assert_eq!(store.lookup(branch, id, &name("x")), Some(stored_int(1)));
    }

    #[test]
    fn merge_makes_foreign_state_readable() {
        let a = ObjectId::fresh();
        let (sa, ba) = StoreRef::for_new_object(a, &OBJECT);
        sa.put(ba, a, name("x"), stored_int(1)).unwrap();

        let b = ObjectId::fresh();
        let (sb, bb) = StoreRef::for_new_object(b, &OBJECT);
        sb.put(bb, b, name("y"), stored_int(2)).unwrap();

        StoreRef::merge(&sa, ba, &sb, bb).unwrap();
        // Both handles now reach both objects through the merged family.
        assert_eq!(sa.lookup(ba, b, &name("y")), Some(stored_int(2)));
        assert_eq!(sb.lookup(bb, a, &name("x")), Some(stored_int(1)));
        assert!(sa.same_family(&sb));
    }

    #[test]
    fn merging_fork_siblings_is_external() {
        let a = ObjectId::fresh();
        let (sa, ba) = StoreRef::for_new_object(a, &OBJECT);
        let sibling = sa.fork(ba);
        let err = StoreRef::merge(&sa, ba, &sa, sibling).unwrap_err();
        assert!(matches!(
            err,
            crate::error::WorldError::Store(StoreError::ExternalObject)
        ));
    }
}

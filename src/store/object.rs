//! The `Obj` handle: identity plus a view into one branch of the store.

use crate::error::{StoreError, WorldResult};
use crate::ids::{BranchId, ObjectId};
use crate::store::universe::StoreRef;
use crate::store::value::{
    Key, Value, key_handles, lower_key, lower_value, raise_value, value_handles,
};
use crate::typedef::{OBJECT, TypeDef};

/// Handle to a branching object in a particular universe branch.
///
/// Handles are cheap to clone. Identity is `(ObjectId, BranchId)`: the same
/// object read through two forks compares unequal, while repeated lookups in
/// one universe always compare equal. Hashing uses the object id alone so
/// that equality stays consistent across family merges.
#[derive(Clone)]
pub struct Obj {
    pub(crate) store: StoreRef,
    pub(crate) id: ObjectId,
    pub(crate) branch: BranchId,
}

impl Obj {
    /// Create an object of the given type in a fresh universe family.
    pub fn new(kind: &'static TypeDef) -> Obj {
        let id = ObjectId::fresh();
        let (store, branch) = StoreRef::for_new_object(id, kind);
        Obj { store, id, branch }
    }

    /// Create an object directly in `owner`'s universe family and branch.
    pub fn new_in(owner: &Obj, kind: &'static TypeDef) -> Obj {
        let id = ObjectId::fresh();
        owner.store.add_object(owner.branch, id, kind);
        Obj {
            store: owner.store.resolve(),
            id,
            branch: owner.branch,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn kind(&self) -> &'static TypeDef {
        self.store.kind_of(self.id)
    }

    /// The evaluation context of this handle: its family and branch.
    pub fn ctx(&self) -> Ctx {
        Ctx {
            store: self.store.resolve(),
            branch: self.store.resolve_branch(self.branch),
        }
    }

    /// Read an attribute, walking base universes until found.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = lower_key(&key.into());
        let stored = self.store.lookup(self.branch, self.id, &key)?;
        Some(raise_value(&stored, &self.ctx()))
    }

    /// Read a required attribute; absence is a usage error.
    pub fn req(&self, key: impl Into<Key>) -> WorldResult<Value> {
        let key = key.into();
        self.get(key.clone()).ok_or_else(|| {
            StoreError::NoSuchAttribute {
                key: lower_key(&key).to_string(),
            }
            .into()
        })
    }

    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = lower_key(&key.into());
        self.store.lookup(self.branch, self.id, &key).is_some()
    }

    /// Write an attribute.
    ///
    /// Any object referenced by the key or value is pulled into this
    /// object's universe family first (the related-universes merge). Game
    /// objects additionally run the tree attribute hook, which auto-parents
    /// unparented object values.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> WorldResult<()> {
        let key = key.into();
        let value = value.into();
        let mut handles = Vec::new();
        key_handles(&key, &mut handles);
        value_handles(&value, &mut handles);
        for h in handles {
            StoreRef::merge(&self.store, self.branch, &h.store, h.branch)?;
        }
        if self.kind().is_a(&OBJECT) {
            crate::tree::attr_set_hook(self, &key, &value)?;
        }
        self.store
            .put(self.branch, self.id, lower_key(&key), lower_value(&value))
    }

    /// Delete an attribute. Game objects run the tree hook, which
    /// auto-unparents a child stored under its own name.
    pub fn del(&self, key: impl Into<Key>) -> WorldResult<()> {
        let key = key.into();
        if self.kind().is_a(&OBJECT) {
            crate::tree::attr_del_hook(self, &key)?;
        }
        self.store
            .delete(self.branch, self.id, &lower_key(&key))
            .map(|_| ())
    }

    /// Fork this object's whole universe family.
    ///
    /// The current handle stays valid and mutable; the returned handle views
    /// an equally mutable copy, and the shared pre-fork state is frozen
    /// between them.
    pub fn fork(&self) -> Obj {
        let branch = self.store.fork(self.branch);
        Obj {
            store: self.store.resolve(),
            id: self.id,
            branch,
        }
    }

    // -- typed accessors ---------------------------------------------------

    pub fn bool_attr(&self, key: impl Into<Key>, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn int_attr(&self, key: impl Into<Key>) -> Option<i64> {
        self.get(key).and_then(|v| v.as_int())
    }

    pub fn obj_attr(&self, key: impl Into<Key>) -> Option<Obj> {
        match self.get(key) {
            Some(Value::Object(o)) => Some(o),
            _ => None,
        }
    }

    pub fn cond_attr(&self, key: impl Into<Key>) -> Option<crate::cond::Cond> {
        match self.get(key) {
            Some(Value::Cond(c)) => Some(c),
            _ => None,
        }
    }
}

impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.store.resolve_branch(self.branch) == other.store.resolve_branch(other.branch)
    }
}

impl Eq for Obj {}

impl std::hash::Hash for Obj {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for Obj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} {}>", self.kind().name, self.id)
    }
}

/// Evaluation context: a universe family plus the branch to read it through.
///
/// Condition terms store bare object ids; a `Ctx` turns them back into
/// handles relative to whichever branch is being deduced.
#[derive(Clone)]
pub struct Ctx {
    pub(crate) store: StoreRef,
    pub(crate) branch: BranchId,
}

impl Ctx {
    pub fn obj(&self, id: ObjectId) -> Obj {
        Obj {
            store: self.store.clone(),
            id,
            branch: self.branch,
        }
    }
}

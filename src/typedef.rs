//! Type tags and behavior hooks for branching objects.
//!
//! Objects carry no vtable of their own; each one is stamped with a static
//! [`TypeDef`] at creation. A `TypeDef` names the type, points at its base
//! type, and carries the [`TypeHooks`] implementation the engine dispatches
//! into (`fast_deduce`, choice hooks, constraint tests). Schemas declare
//! their own `TypeDef` statics and explicit constructors; there is no
//! prototype forking.

use crate::error::WorldResult;
use crate::store::{Obj, Value};

/// Static description of an object type: a tag plus behavior.
///
/// Identity is pointer identity; two types are the same type iff they are the
/// same static. `base` forms a single-inheritance chain used by [`TypeDef::is_a`]
/// and by the port open-cache, which indexes ports under every type between
/// their concrete type and `Choice`.
pub struct TypeDef {
    /// Type name; also the default object name in the tree.
    pub name: &'static str,
    /// Base type, if any.
    pub base: Option<&'static TypeDef>,
    /// Behavior dispatched by the engine for objects of this type.
    pub hooks: &'static dyn TypeHooks,
}

impl TypeDef {
    /// Whether this type is `other` or inherits from it.
    pub fn is_a(&'static self, other: &'static TypeDef) -> bool {
        let mut cur = Some(self);
        while let Some(t) = cur {
            if std::ptr::eq(t, other) {
                return true;
            }
            cur = t.base;
        }
        false
    }

    /// Whether this type is exactly `other`.
    pub fn is(&'static self, other: &'static TypeDef) -> bool {
        std::ptr::eq(self, other)
    }
}

impl std::fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeDef({})", self.name)
    }
}

/// Copyable, hashable handle to a static [`TypeDef`].
///
/// Compares and hashes by pointer, so it can serve as a dictionary key in the
/// branching store (the port open-cache indexes by type).
#[derive(Clone, Copy)]
pub struct TypeRef(pub &'static TypeDef);

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for TypeRef {}

impl std::hash::Hash for TypeRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self.0 as *const TypeDef as usize).hash(state);
    }
}

impl std::fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

/// Behavior attached to a [`TypeDef`].
///
/// Every method has a no-op default; types override only what they need.
/// `fast_deduce` is the only hook permitted to return a
/// [`LogicError`](crate::error::LogicError).
pub trait TypeHooks: Sync {
    /// Local O(1) deduction step. May enqueue further deductions and may
    /// raise `LogicError` on contradiction.
    fn fast_deduce(&self, _obj: &Obj) -> WorldResult<()> {
        Ok(())
    }

    /// Called on a parent object when a child choice's value is set.
    fn on_choice(&self, _obj: &Obj, _choice: &Obj) -> WorldResult<()> {
        Ok(())
    }

    /// Called on a choice after its value is stored.
    fn on_set(&self, _choice: &Obj, _value: &Value) -> WorldResult<()> {
        Ok(())
    }

    /// Called before a choice value is stored; reject invalid values.
    fn test_constraints(&self, _choice: &Obj, _value: &Value) -> WorldResult<()> {
        Ok(())
    }

    /// Objects whose updates should re-queue this one for deduction.
    fn collect_dependencies(&self, _obj: &Obj) -> WorldResult<Vec<Obj>> {
        Ok(Vec::new())
    }
}

/// The shared no-op hook set.
pub struct BaseHooks;

impl TypeHooks for BaseHooks {}

/// Root type of every game object in the tree.
pub static OBJECT: TypeDef = TypeDef {
    name: "Object",
    base: None,
    hooks: &BaseHooks,
};

/// Branching ordered dictionary. Not a game object; carries no tree state.
pub static ORDERED_DICT: TypeDef = TypeDef {
    name: "OrderedDict",
    base: None,
    hooks: &BaseHooks,
};

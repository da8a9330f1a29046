//! Object tree: parent/child structure, paths, and dependency edges.
//!
//! Every game object carries a `children` ordered dictionary, a `parent`
//! back-reference, and the `_dependencies`/`_dependents` edge dictionaries
//! that drive fast-deduction re-queueing. All of it lives in the branching
//! store, so the tree forks with the universe.

use std::sync::Arc;

use crate::error::{TreeError, WorldResult};
use crate::store::{Key, Obj, OrdDict, StoreRef, Value};
use crate::typedef::{OBJECT, TypeDef};

/// Create a game object with tree and dependency state initialized.
pub fn new_object(kind: &'static TypeDef) -> WorldResult<Obj> {
    let obj = Obj::new(kind);
    obj.set("children", OrdDict::new_in(&obj).value())?;
    obj.set("_dependencies", OrdDict::new_in(&obj).value())?;
    obj.set("_dependents", OrdDict::new_in(&obj).value())?;
    Ok(obj)
}

fn dict_attr(obj: &Obj, name: &str) -> Option<OrdDict> {
    obj.obj_attr(name).map(OrdDict::from_obj)
}

impl Obj {
    /// The object's name: explicit if set, else its type name.
    pub fn name(&self) -> Arc<str> {
        match self.get("_name") {
            Some(Value::Str(s)) => s,
            _ => self.kind().name.into(),
        }
    }

    /// Rename the object. Forbidden while it has a parent.
    pub fn set_name(&self, name: &str) -> WorldResult<()> {
        if self.parent().is_some() {
            return Err(TreeError::RenameWhileParented.into());
        }
        self.set("_name", name)
    }

    pub fn parent(&self) -> Option<Obj> {
        self.obj_attr("parent")
    }

    pub fn children(&self) -> Option<OrdDict> {
        dict_attr(self, "children")
    }

    /// Path from the root, as name segments. Cached per universe.
    pub fn path(&self) -> Vec<Arc<str>> {
        if let Some(Value::Tuple(parts)) = self.get("_path") {
            return parts
                .into_iter()
                .filter_map(|v| match v {
                    Value::Str(s) => Some(s),
                    _ => None,
                })
                .collect();
        }
        let mut path = match self.parent() {
            Some(parent) => parent.path(),
            None => Vec::new(),
        };
        path.push(self.name());
        let cached = Value::Tuple(path.iter().map(|s| Value::Str(s.clone())).collect());
        let _ = self.set("_path", cached);
        path
    }

    /// Dotted path string; the stable identity used in RNG tags.
    pub fn string_path(&self) -> String {
        self.path().join(".")
    }

    /// Add a child, picking a unique name (`name`, else `name2`, `name3`, …).
    ///
    /// Re-adding an existing child is a no-op; a child parented elsewhere is
    /// moved. The child's universe family is merged into this one.
    pub fn add_child(&self, child: &Obj, name: Option<&str>) -> WorldResult<()> {
        if !child.kind().is_a(&OBJECT) {
            return Err(TreeError::NotAGameObject.into());
        }
        StoreRef::merge(&self.store, self.branch, &child.store, child.branch)?;
        if child.parent().as_ref() == Some(self) {
            return Ok(());
        }
        if let Some(old) = child.parent() {
            old.remove_child(child)?;
        }
        let children = self.children().ok_or(TreeError::NotAGameObject)?;
        let mut name = match name {
            Some(n) => n.to_string(),
            None => child.name().to_string(),
        };
        if children.contains(&Key::name(&name)) {
            let mut i = 2;
            while children.contains(&Key::name(&format!("{name}{i}"))) {
                i += 1;
            }
            name = format!("{name}{i}");
        }
        child.set_name(&name)?;
        children.insert(Key::name(&name), Value::Object(child.clone()))?;
        child.set("parent", Value::Object(self.clone()))?;
        if child.has("_path") {
            child.del("_path")?;
        }
        Ok(())
    }

    /// Detach a child. Errors when called on a non-child.
    pub fn remove_child(&self, child: &Obj) -> WorldResult<()> {
        if !child.kind().is_a(&OBJECT) {
            return Err(TreeError::NotAGameObject.into());
        }
        if child.parent().as_ref() != Some(self) {
            return Err(TreeError::NotAChild.into());
        }
        let children = self.children().ok_or(TreeError::NotAGameObject)?;
        children.remove(&Key::Name(child.name()))?;
        child.del("parent")?;
        if child.has("_path") {
            child.del("_path")?;
        }
        Ok(())
    }

    /// Resolve a path to an object.
    ///
    /// Absolute paths start at the outermost ancestor whose name matches the
    /// first segment; relative paths descend from this object directly.
    pub fn object_from_path<S: AsRef<str>>(&self, path: &[S], relative: bool) -> WorldResult<Obj> {
        let (mut cur, mut pos) = if relative {
            (self.clone(), 0)
        } else {
            let first = match path.first() {
                Some(s) => s.as_ref(),
                None => {
                    return Err(TreeError::PathNotFound {
                        path: String::new(),
                    }
                    .into());
                }
            };
            let mut found = None;
            let mut walk = Some(self.clone());
            while let Some(obj) = walk {
                if &*obj.name() == first {
                    found = Some(obj.clone());
                }
                walk = obj.parent();
            }
            let root = found.ok_or(TreeError::RootNotFound {
                name: first.to_string(),
            })?;
            (root, 1)
        };
        while pos < path.len() {
            let segment = path[pos].as_ref();
            let next = cur
                .children()
                .and_then(|c| c.get(&Key::name(segment)))
                .and_then(|v| v.as_object().cloned());
            cur = next.ok_or_else(|| TreeError::PathNotFound {
                path: path.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join("."),
            })?;
            pos += 1;
        }
        Ok(cur)
    }

    /// The enclosing world, if this object is attached to one.
    pub fn get_world(&self) -> Option<Obj> {
        let mut cur = Some(self.clone());
        while let Some(obj) = cur {
            if obj.kind().is_a(&crate::world::WORLD) {
                return Some(obj);
            }
            cur = obj.parent();
        }
        None
    }

    /// All descendants of the given type, pre-order.
    pub fn descendants_by_type(&self, t: &'static TypeDef) -> Vec<Obj> {
        let mut out = Vec::new();
        if let Some(children) = self.children() {
            for (_, value) in children.iter() {
                if let Value::Object(child) = value {
                    if child.kind().is_a(t) {
                        out.push(child.clone());
                    }
                    out.extend(child.descendants_by_type(t));
                }
            }
        }
        out
    }

    /// Queue this object for `fast_deduce` once generation has started.
    pub fn mark_fast_deduction(&self) -> WorldResult<()> {
        let Some(world) = self.get_world() else {
            return Ok(());
        };
        if !world.bool_attr("started_generation", false) {
            return Ok(());
        }
        let queue = dict_attr(&world, "_deduction_queue").ok_or(TreeError::NotAGameObject)?;
        queue.insert(Key::Object(self.clone()), Value::None)
    }

    /// Re-queue dependents and refresh this object's dependency edges.
    pub fn updated(&self) -> WorldResult<()> {
        if let Some(dependents) = dict_attr(self, "_dependents") {
            for key in dependents.keys() {
                if let Key::Object(dep) = key {
                    dep.mark_fast_deduction()?;
                }
            }
        }
        let Some(deps) = dict_attr(self, "_dependencies") else {
            return Ok(());
        };
        let prev: Vec<Obj> = deps
            .keys()
            .into_iter()
            .filter_map(|k| match k {
                Key::Object(o) => Some(o),
                _ => None,
            })
            .collect();
        let mut new: Vec<Obj> = Vec::new();
        for obj in self.kind().hooks.collect_dependencies(self)? {
            if !new.contains(&obj) {
                new.push(obj);
            }
        }
        for old in &prev {
            if !new.contains(old) {
                deps.remove(&Key::Object(old.clone()))?;
                if let Some(their_dependents) = dict_attr(old, "_dependents") {
                    their_dependents.remove(&Key::Object(self.clone()))?;
                }
            }
        }
        for obj in &new {
            if !prev.contains(obj) {
                deps.insert(Key::Object(obj.clone()), Value::None)?;
                if let Some(their_dependents) = dict_attr(obj, "_dependents") {
                    their_dependents.insert(Key::Object(self.clone()), Value::None)?;
                }
            }
        }
        Ok(())
    }
}

/// Attribute-set hook: auto-parent an unparented object value under the
/// attribute's name. The `parent` key itself is exempt.
pub(crate) fn attr_set_hook(obj: &Obj, key: &Key, value: &Value) -> WorldResult<()> {
    if let Value::Object(child) = value {
        let is_parent_key = matches!(key, Key::Name(n) if &**n == "parent");
        if !is_parent_key
            && child.kind().is_a(&OBJECT)
            && child.parent().is_none()
            && obj.children().is_some()
        {
            obj.add_child(child, Some(&key.display_name()))?;
        }
    }
    Ok(())
}

/// Attribute-delete hook: unparent a child stored under its own name.
pub(crate) fn attr_del_hook(obj: &Obj, key: &Key) -> WorldResult<()> {
    if let Some(Value::Object(child)) = obj.get(key.clone()) {
        if child.kind().is_a(&OBJECT)
            && child.parent().as_ref() == Some(obj)
            && *child.name() == *key.display_name()
        {
            obj.remove_child(&child)?;
        }
    }
    Ok(())
}

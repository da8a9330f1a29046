//! Attribute keys and values.
//!
//! The public [`Value`]/[`Key`] enums carry live [`Obj`] handles so the store
//! can merge universe families at the `set` boundary. The stored forms carry
//! bare [`ObjectId`]s, so a value crossing from a base universe into a live
//! one needs no translation: the mapping is the identity, trivially
//! idempotent and equality-preserving.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cond::Cond;
use crate::ids::ObjectId;
use crate::store::object::{Ctx, Obj};
use crate::strategy::Strategy;
use crate::typedef::TypeRef;

/// A plain scalar: the value payload strategies may carry.
///
/// Kept object-free so strategies and elimination tokens stay plain data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
}

/// An attribute value as seen by callers.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    Tuple(Vec<Value>),
    Object(Obj),
    Cond(Cond),
    Strategy(Arc<Strategy>),
    Type(TypeRef),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Obj> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_cond(&self) -> Option<&Cond> {
        match self {
            Value::Cond(c) => Some(c),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<&Obj> for Value {
    fn from(o: &Obj) -> Self {
        Value::Object(o.clone())
    }
}

impl From<Cond> for Value {
    fn from(c: Cond) -> Self {
        Value::Cond(c)
    }
}

impl From<Strategy> for Value {
    fn from(s: Strategy) -> Self {
        Value::Strategy(Arc::new(s))
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::None => Value::None,
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(n) => Value::Int(n),
            Scalar::Str(s) => Value::Str(s.into()),
        }
    }
}

/// An attribute key as seen by callers.
///
/// Keys may be names, integers, objects, types, or tuples of keys. The
/// branching ordered dictionary and the grid schema key by tuples and
/// objects, and the port open-cache keys by type.
#[derive(Clone, Debug, PartialEq)]
pub enum Key {
    Name(Arc<str>),
    Int(i64),
    Object(Obj),
    Type(TypeRef),
    Tuple(Vec<Key>),
}

impl Key {
    pub fn name(s: &str) -> Key {
        Key::Name(s.into())
    }

    /// Render the key the way child names are derived from attribute keys.
    pub fn display_name(&self) -> String {
        lower_key(self).to_string()
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(s.into())
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<&Obj> for Key {
    fn from(o: &Obj) -> Self {
        Key::Object(o.clone())
    }
}

// ---------------------------------------------------------------------------
// Stored forms
// ---------------------------------------------------------------------------

/// The stored form of a value: object references are bare ids.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Stored {
    None,
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    Tuple(Arc<[Stored]>),
    Object(ObjectId),
    Cond(Cond),
    Strategy(Arc<Strategy>),
    Type(TypeRef),
}

/// The stored form of a key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum StoredKey {
    Name(Arc<str>),
    Int(i64),
    Object(ObjectId),
    Type(TypeRef),
    Tuple(Arc<[StoredKey]>),
}

impl std::fmt::Display for StoredKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoredKey::Name(s) => write!(f, "{s}"),
            StoredKey::Int(n) => write!(f, "{n}"),
            StoredKey::Object(id) => write!(f, "{id}"),
            StoredKey::Type(t) => write!(f, "{}", t.0.name),
            StoredKey::Tuple(parts) => {
                write!(f, "(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
        }
    }
}

pub(crate) fn lower_value(v: &Value) -> Stored {
    match v {
        Value::None => Stored::None,
        Value::Bool(b) => Stored::Bool(*b),
        Value::Int(n) => Stored::Int(*n),
        Value::Str(s) => Stored::Str(s.clone()),
        Value::Tuple(items) => Stored::Tuple(items.iter().map(lower_value).collect()),
        Value::Object(o) => Stored::Object(o.id()),
        Value::Cond(c) => Stored::Cond(c.clone()),
        Value::Strategy(s) => Stored::Strategy(s.clone()),
        Value::Type(t) => Stored::Type(*t),
    }
}

pub(crate) fn lower_key(k: &Key) -> StoredKey {
    match k {
        Key::Name(s) => StoredKey::Name(s.clone()),
        Key::Int(n) => StoredKey::Int(*n),
        Key::Object(o) => StoredKey::Object(o.id()),
        Key::Type(t) => StoredKey::Type(*t),
        Key::Tuple(items) => StoredKey::Tuple(items.iter().map(lower_key).collect()),
    }
}

/// Collect every live handle referenced by a value, for family merging.
pub(crate) fn value_handles<'a>(v: &'a Value, out: &mut Vec<&'a Obj>) {
    match v {
        Value::Object(o) => out.push(o),
        Value::Tuple(items) => {
            for item in items {
                value_handles(item, out);
            }
        }
        _ => {}
    }
}

pub(crate) fn key_handles<'a>(k: &'a Key, out: &mut Vec<&'a Obj>) {
    match k {
        Key::Object(o) => out.push(o),
        Key::Tuple(items) => {
            for item in items {
                key_handles(item, out);
            }
        }
        _ => {}
    }
}

pub(crate) fn raise_value(s: &Stored, cx: &Ctx) -> Value {
    match s {
        Stored::None => Value::None,
        Stored::Bool(b) => Value::Bool(*b),
        Stored::Int(n) => Value::Int(*n),
        Stored::Str(v) => Value::Str(v.clone()),
        Stored::Tuple(items) => Value::Tuple(items.iter().map(|i| raise_value(i, cx)).collect()),
        Stored::Object(id) => Value::Object(cx.obj(*id)),
        Stored::Cond(c) => Value::Cond(c.clone()),
        Stored::Strategy(st) => Value::Strategy(st.clone()),
        Stored::Type(t) => Value::Type(*t),
    }
}

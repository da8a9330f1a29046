//! Branching ordered dictionary.
//!
//! An object with no direct map field: `_first`, `_last`, `(_valuefor, k)`,
//! `(_prevfor, k)`, `(_nextfor, k)` and `_count` attributes encode a
//! doubly-linked ordered map inside the universe store, so forking the
//! dictionary is free: it branches with everything else.

use crate::error::{StoreError, WorldResult};
use crate::store::object::Obj;
use crate::store::value::{Key, Value};
use crate::typedef::ORDERED_DICT;

/// Ordered map view over an [`Obj`] of kind `OrderedDict`.
#[derive(Clone, PartialEq)]
pub struct OrdDict {
    obj: Obj,
}

fn valuefor(k: &Key) -> Key {
    Key::Tuple(vec![Key::name("_valuefor"), k.clone()])
}

fn prevfor(k: &Key) -> Key {
    Key::Tuple(vec![Key::name("_prevfor"), k.clone()])
}

fn nextfor(k: &Key) -> Key {
    Key::Tuple(vec![Key::name("_nextfor"), k.clone()])
}

fn key_to_value(k: &Key) -> Value {
    match k {
        Key::Name(s) => Value::Str(s.clone()),
        Key::Int(n) => Value::Int(*n),
        Key::Object(o) => Value::Object(o.clone()),
        Key::Type(t) => Value::Type(*t),
        Key::Tuple(items) => Value::Tuple(items.iter().map(key_to_value).collect()),
    }
}

fn value_to_key(v: &Value) -> Key {
    match v {
        Value::Str(s) => Key::Name(s.clone()),
        Value::Int(n) => Key::Int(*n),
        Value::Object(o) => Key::Object(o.clone()),
        Value::Type(t) => Key::Type(*t),
        Value::Tuple(items) => Key::Tuple(items.iter().map(value_to_key).collect()),
        other => panic!("value {other:?} cannot serve as an ordered dictionary key"),
    }
}

impl OrdDict {
    /// Create an empty dictionary in a fresh universe family.
    pub fn new() -> OrdDict {
        OrdDict {
            obj: Obj::new(&ORDERED_DICT),
        }
    }

    /// Create an empty dictionary inside `owner`'s universe family.
    pub fn new_in(owner: &Obj) -> OrdDict {
        OrdDict {
            obj: Obj::new_in(owner, &ORDERED_DICT),
        }
    }

    /// View an existing `OrderedDict` object as a dictionary.
    pub fn from_obj(obj: Obj) -> OrdDict {
        debug_assert!(obj.kind().is(&ORDERED_DICT), "not an ordered dictionary");
        OrdDict { obj }
    }

    pub fn obj(&self) -> &Obj {
        &self.obj
    }

    /// The dictionary as an attribute value.
    pub fn value(&self) -> Value {
        Value::Object(self.obj.clone())
    }

    pub fn len(&self) -> i64 {
        self.obj.int_attr("_count").unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.obj.has(valuefor(key))
    }

    pub fn get(&self, key: &Key) -> Option<Value> {
        self.obj.get(valuefor(key))
    }

    /// Insert or replace. New keys append to the iteration order.
    pub fn insert(&self, key: Key, value: Value) -> WorldResult<()> {
        if self.contains(&key) {
            return self.obj.set(valuefor(&key), value);
        }
        let key_val = key_to_value(&key);
        match self.obj.get("_last") {
            None => {
                self.obj.set("_first", key_val.clone())?;
                self.obj.set("_last", key_val)?;
            }
            Some(last_val) => {
                let last = value_to_key(&last_val);
                self.obj.set(nextfor(&last), key_val.clone())?;
                self.obj.set(prevfor(&key), last_val)?;
                self.obj.set("_last", key_val)?;
            }
        }
        self.obj.set(valuefor(&key), value)?;
        self.obj.set("_count", self.len() + 1)
    }

    fn take(&self, key: &Key) -> WorldResult<Option<Value>> {
        if !self.obj.has(key.clone()) {
            return Ok(None);
        }
        let value = self.obj.get(key.clone());
        self.obj.del(key.clone())?;
        Ok(value)
    }

    /// Remove a key, relinking its neighbors. Errors when absent.
    pub fn remove(&self, key: &Key) -> WorldResult<Value> {
        let value = self.take(&valuefor(key))?.ok_or(StoreError::NoSuchAttribute {
            key: format!("{key:?}"),
        })?;
        match self.take(&prevfor(key))? {
            None => match self.take(&nextfor(key))? {
                None => {
                    debug_assert!(self.len() == 1, "linked list out of sync with _count");
                    self.obj.del("_first")?;
                    self.obj.del("_last")?;
                }
                Some(next_val) => {
                    let next = value_to_key(&next_val);
                    self.obj.set("_first", next_val)?;
                    self.obj.del(prevfor(&next))?;
                }
            },
            Some(prev_val) => {
                let prev = value_to_key(&prev_val);
                match self.take(&nextfor(key))? {
                    None => {
                        self.obj.set("_last", prev_val)?;
                        self.obj.del(nextfor(&prev))?;
                    }
                    Some(next_val) => {
                        let next = value_to_key(&next_val);
                        self.obj.set(nextfor(&prev), next_val)?;
                        self.obj.set(prevfor(&next), prev_val)?;
                    }
                }
            }
        }
        self.obj.set("_count", self.len() - 1)?;
        Ok(value)
    }

    pub fn first_key(&self) -> Option<Key> {
        self.obj.get("_first").map(|v| value_to_key(&v))
    }

    /// Remove and return the entry at the head of the iteration order.
    pub fn pop_first(&self) -> WorldResult<Option<(Key, Value)>> {
        match self.first_key() {
            None => Ok(None),
            Some(key) => {
                let value = self.remove(&key)?;
                Ok(Some((key, value)))
            }
        }
    }

    pub fn clear(&self) -> WorldResult<()> {
        while self.pop_first()?.is_some() {}
        Ok(())
    }

    /// Iterate entries in insertion order.
    ///
    /// Panics if the dictionary changes size mid-iteration; that always
    /// indicates a generation bug mutating state it is currently scanning.
    pub fn iter(&self) -> Iter {
        Iter {
            dict: self.clone(),
            next: None,
            expected: None,
        }
    }

    pub fn keys(&self) -> Vec<Key> {
        self.iter().map(|(k, _)| k).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.iter().map(|(_, v)| v).collect()
    }

    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.iter().collect()
    }
}

impl Default for OrdDict {
    fn default() -> Self {
        OrdDict::new()
    }
}

impl std::fmt::Debug for OrdDict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrdDict(len={})", self.len())
    }
}

/// Lazy iterator over an [`OrdDict`].
pub struct Iter {
    dict: OrdDict,
    next: Option<Key>,
    expected: Option<i64>,
}

impl Iterator for Iter {
    type Item = (Key, Value);

    fn next(&mut self) -> Option<(Key, Value)> {
        let key = match self.expected {
            None => {
                self.expected = Some(self.dict.len());
                self.dict.first_key()?
            }
            Some(expected) => {
                if self.dict.len() != expected {
                    panic!("ordered dictionary changed size during iteration");
                }
                self.next.take()?
            }
        };
        let value = self
            .dict
            .get(&key)
            .expect("linked-list key must have a value");
        self.next = self.dict.obj.get(nextfor(&key)).map(|v| value_to_key(&v));
        Some((key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let d = OrdDict::new();
        assert_eq!(d.len(), 0);
        d.insert(Key::Int(1), Value::Int(2)).unwrap();
        assert_eq!(d.get(&Key::Int(1)), Some(Value::Int(2)));
        assert_eq!(d.len(), 1);
        assert_eq!(d.remove(&Key::Int(1)).unwrap(), Value::Int(2));
        assert_eq!(d.len(), 0);
        assert!(d.first_key().is_none());
    }

    #[test]
    fn fork_preserves_order_and_isolation() {
        let d1 = OrdDict::new();
        d1.insert(Key::Int(1), Value::Int(2)).unwrap();
        let d2 = OrdDict::from_obj(d1.obj().fork());
        assert_eq!(d2.get(&Key::Int(1)), Some(Value::Int(2)));
        d2.insert(Key::Int(2), Value::Int(4)).unwrap();
        d2.insert(Key::Int(3), Value::Int(6)).unwrap();
        d2.insert(Key::Int(4), Value::Int(8)).unwrap();

        let items: Vec<i64> = d2.iter().map(|(_, v)| v.as_int().unwrap()).collect();
        assert_eq!(items, vec![2, 4, 6, 8]);
        // The parent still iterates its pre-fork content.
        let parent: Vec<i64> = d1.iter().map(|(_, v)| v.as_int().unwrap()).collect();
        assert_eq!(parent, vec![2]);
    }

    #[test]
    fn removal_relinks_every_position() {
        let d = OrdDict::new();
        for n in 1..=4 {
            d.insert(Key::Int(n), Value::Int(n * 2)).unwrap();
        }
        d.remove(&Key::Int(2)).unwrap();
        let keys: Vec<i64> = d.iter().map(|(k, _)| match k {
            Key::Int(n) => n,
            _ => unreachable!(),
        }).collect();
        assert_eq!(keys, vec![1, 3, 4]);
        d.remove(&Key::Int(1)).unwrap();
        d.remove(&Key::Int(4)).unwrap();
        d.remove(&Key::Int(3)).unwrap();
        assert!(d.is_empty());
    }

    #[test]
    fn replacing_a_value_keeps_position() {
        let d = OrdDict::new();
        d.insert(Key::name("a"), Value::Int(1)).unwrap();
        d.insert(Key::name("b"), Value::Int(2)).unwrap();
        d.insert(Key::name("a"), Value::Int(9)).unwrap();
        let items: Vec<i64> = d.iter().map(|(_, v)| v.as_int().unwrap()).collect();
        assert_eq!(items, vec![9, 2]);
        assert_eq!(d.len(), 2);
    }

    #[test]
    #[should_panic(expected = "changed size during iteration")]
    fn mutation_during_iteration_panics() {
        let d = OrdDict::new();
        d.insert(Key::Int(1), Value::Int(1)).unwrap();
        d.insert(Key::Int(2), Value::Int(2)).unwrap();
        for (k, _) in d.iter() {
            if k == Key::Int(1) {
                d.insert(Key::Int(3), Value::Int(3)).unwrap();
            }
        }
    }

    #[test]
    fn pop_first_drains_in_order() {
        let d = OrdDict::new();
        d.insert(Key::name("x"), Value::Int(1)).unwrap();
        d.insert(Key::name("y"), Value::Int(2)).unwrap();
        let (k, v) = d.pop_first().unwrap().unwrap();
        assert_eq!(k, Key::name("x"));
        assert_eq!(v, Value::Int(1));
        let (k, _) = d.pop_first().unwrap().unwrap();
        assert_eq!(k, Key::name("y"));
        assert!(d.pop_first().unwrap().is_none());
    }
}

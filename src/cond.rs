//! Condition terms: the logic lattice over vertices, choices, and ports.
//!
//! A condition is a closed tagged union; `simplify`, `substitute`, and the
//! vertex-enumeration hooks are explicit arms, no reflection. Terms are
//! immutable and share children through `Arc`, so rewriting returns a new
//! term and leaves the original untouched. Truth is three-valued: a term is
//! known true, known false, or undetermined.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::WorldResult;
use crate::ids::ObjectId;
use crate::store::{Ctx, Obj};

/// A logic term over vertex reachability, choice values, and placeholders.
#[derive(Clone, Debug, PartialEq)]
pub enum Cond {
    True,
    False,
    /// At least `count` of `conds` hold. `Any` is count 1, `All` is count n.
    AtLeast {
        count: usize,
        conds: Arc<[Cond]>,
    },
    /// The vertex is reachable.
    Vertex(ObjectId),
    /// The enum choice's value is one of `allowed`.
    Enum {
        choice: ObjectId,
        allowed: Arc<[Arc<str>]>,
    },
    /// A named hole, substitutable within `base`'s conditions.
    Placeholder {
        name: Arc<str>,
        base: Option<ObjectId>,
    },
    /// The entrance of the movement port can be reached.
    PortReachable(ObjectId),
}

/// A substitution target: placeholders by name, vertices by identity.
#[derive(Clone, Copy, Debug)]
pub enum Target<'a> {
    Name(&'a str),
    Vertex(ObjectId),
}

/// `AtLeast(count, conds)` with the degenerate cases folded away.
pub fn at_least(count: i64, conds: Vec<Cond>) -> Cond {
    if count <= 0 {
        return Cond::True;
    }
    let count = count as usize;
    if count > conds.len() {
        return Cond::False;
    }
    if count == 1 && conds.len() == 1 {
        return conds.into_iter().next().expect("one condition");
    }
    Cond::AtLeast {
        count,
        conds: conds.into(),
    }
}

/// Disjunction. Nested disjunctions are flattened into one term.
pub fn any(conds: Vec<Cond>) -> Cond {
    let mut flat = Vec::with_capacity(conds.len());
    for c in conds {
        match c {
            Cond::AtLeast { count: 1, conds } => flat.extend(conds.iter().cloned()),
            other => flat.push(other),
        }
    }
    at_least(1, flat)
}

/// Conjunction. Nested conjunctions are flattened into one term.
pub fn all(conds: Vec<Cond>) -> Cond {
    let mut flat = Vec::with_capacity(conds.len());
    for c in conds {
        match c {
            Cond::AtLeast { count, conds } if count == conds.len() => {
                flat.extend(conds.iter().cloned())
            }
            other => flat.push(other),
        }
    }
    let count = flat.len() as i64;
    at_least(count, flat)
}

impl Cond {
    /// Reachability of a vertex object.
    pub fn vertex(v: &Obj) -> Cond {
        Cond::Vertex(v.id())
    }

    /// Reachability of a movement port's entrance.
    pub fn port_reachable(port: &Obj) -> Cond {
        Cond::PortReachable(port.id())
    }

    pub fn placeholder(name: &str) -> Cond {
        Cond::Placeholder {
            name: name.into(),
            base: None,
        }
    }

    pub fn placeholder_for(name: &str, base: &Obj) -> Cond {
        Cond::Placeholder {
            name: name.into(),
            base: Some(base.id()),
        }
    }

    // -- evaluation --------------------------------------------------------

    pub fn is_known_true(&self, cx: &Ctx) -> bool {
        match self {
            Cond::True => true,
            Cond::AtLeast { count, conds } => {
                let mut known_true = 0;
                let mut remaining = conds.len();
                for c in conds.iter() {
                    if c.is_known_true(cx) {
                        known_true += 1;
                        if known_true >= *count {
                            return true;
                        }
                    }
                    remaining -= 1;
                    if known_true + remaining < *count {
                        return false;
                    }
                }
                false
            }
            Cond::Vertex(id) => {
                let v = cx.obj(*id);
                crate::vertex::is_known(&v) && crate::vertex::known_access(&v)
            }
            Cond::Enum { choice, allowed } => {
                let c = cx.obj(*choice);
                crate::choice::known(&c)
                    && match crate::choice::value_str(&c) {
                        Some(v) => allowed.iter().any(|a| **a == *v),
                        None => false,
                    }
            }
            _ => false,
        }
    }

    pub fn is_known_false(&self, cx: &Ctx) -> bool {
        match self {
            Cond::False => true,
            Cond::AtLeast { count, conds } => {
                let mut remaining = conds.len();
                let mut possibly_true = conds.len();
                for c in conds.iter() {
                    if c.is_known_false(cx) {
                        possibly_true -= 1;
                        if possibly_true < *count {
                            return true;
                        }
                    }
                    remaining -= 1;
                    if possibly_true - remaining >= *count {
                        return false;
                    }
                }
                false
            }
            Cond::Vertex(id) => {
                let v = cx.obj(*id);
                crate::vertex::is_known(&v) && !crate::vertex::known_access(&v)
            }
            Cond::Enum { choice, allowed } => {
                let c = cx.obj(*choice);
                crate::choice::known(&c)
                    && match crate::choice::value_str(&c) {
                        Some(v) => !allowed.iter().any(|a| **a == *v),
                        None => true,
                    }
            }
            _ => false,
        }
    }

    pub fn is_known(&self, cx: &Ctx) -> bool {
        self.is_known_true(cx) || self.is_known_false(cx)
    }

    /// Reduce toward `True`/`False` under current knowledge.
    ///
    /// `AtLeast` drops decided children and lowers its count; `Enum` drops
    /// impossible values; `Vertex` collapses through equivalences; a known
    /// movement port expands into the disjunction over its peers.
    pub fn simplify(&self, cx: &Ctx) -> WorldResult<Cond> {
        match self {
            Cond::True | Cond::False => Ok(self.clone()),
            Cond::AtLeast { count, conds } => {
                let mut kept = Vec::with_capacity(conds.len());
                let mut trues = 0i64;
                let mut changed = false;
                for c in conds.iter() {
                    let s = c.simplify(cx)?;
                    match s {
                        Cond::True => {
                            trues += 1;
                            changed = true;
                        }
                        Cond::False => {
                            changed = true;
                        }
                        s => {
                            if s != *c {
                                changed = true;
                            }
                            kept.push(s);
                        }
                    }
                }
                if changed {
                    Ok(at_least(*count as i64 - trues, kept))
                } else {
                    Ok(self.clone())
                }
            }
            Cond::Vertex(id) => {
                let v = cx.obj(*id);
                if crate::vertex::is_known(&v) {
                    return Ok(if crate::vertex::known_access(&v) {
                        Cond::True
                    } else {
                        Cond::False
                    });
                }
                if let Some(eq) = crate::vertex::equivalent_to(&v) {
                    return Cond::Vertex(eq.id()).simplify(cx);
                }
                Ok(self.clone())
            }
            Cond::Enum { choice, allowed } => {
                let c = cx.obj(*choice);
                if crate::choice::known(&c) {
                    return Ok(if self.is_known_true(cx) {
                        Cond::True
                    } else {
                        Cond::False
                    });
                }
                let impossible = crate::choice::impossible_values(&c);
                let kept: Vec<Arc<str>> = allowed
                    .iter()
                    .filter(|a| !impossible.iter().any(|i| i.as_ref() == a.as_ref()))
                    .cloned()
                    .collect();
                if kept.len() == allowed.len() {
                    return Ok(self.clone());
                }
                if kept.is_empty() {
                    return Ok(Cond::False);
                }
                Ok(Cond::Enum {
                    choice: *choice,
                    allowed: kept.into(),
                })
            }
            Cond::Placeholder { .. } => Ok(self.clone()),
            Cond::PortReachable(id) => {
                let port = cx.obj(*id);
                if !crate::choice::known(&port) {
                    return Ok(self.clone());
                }
                let connections = crate::port::committed_connections(&port)?;
                let mut arms = Vec::new();
                for peer in connections.keys() {
                    let crate::store::Key::Object(peer) = peer else {
                        continue;
                    };
                    let can_exit = peer.req("can_exit")?;
                    let exit_cond = match can_exit.as_object() {
                        Some(v) => Cond::Vertex(v.id()),
                        None => Cond::False,
                    };
                    let access = match peer.parent() {
                        Some(parent) => crate::position::access_any_state(&parent)?,
                        None => Cond::False,
                    };
                    arms.push(all(vec![exit_cond, access]));
                }
                any(arms).simplify(cx)
            }
        }
    }

    // -- rewriting ---------------------------------------------------------

    /// Rewrite matching placeholders (or a vertex) with `replacement`.
    pub fn substitute(&self, target: Target<'_>, replacement: &Cond, base: Option<ObjectId>) -> Cond {
        match self {
            Cond::AtLeast { count, conds } => {
                let rewritten: Vec<Cond> = conds
                    .iter()
                    .map(|c| c.substitute(target, replacement, base))
                    .collect();
                if rewritten.iter().zip(conds.iter()).all(|(a, b)| a == b) {
                    self.clone()
                } else {
                    Cond::AtLeast {
                        count: *count,
                        conds: rewritten.into(),
                    }
                }
            }
            Cond::Placeholder { name, base: own } => match target {
                Target::Name(n) if **name == *n && (own.is_none() || *own == base) => {
                    replacement.clone()
                }
                _ => self.clone(),
            },
            Cond::Vertex(id) => match target {
                Target::Vertex(v) if v == *id && base.is_none() => replacement.clone(),
                _ => self.clone(),
            },
            _ => self.clone(),
        }
    }

    /// Bind free placeholders to a vertex.
    pub fn set_base(&self, base: ObjectId) -> Cond {
        match self {
            Cond::AtLeast { count, conds } => {
                let rewritten: Vec<Cond> = conds.iter().map(|c| c.set_base(base)).collect();
                if rewritten.iter().zip(conds.iter()).all(|(a, b)| a == b) {
                    self.clone()
                } else {
                    Cond::AtLeast {
                        count: *count,
                        conds: rewritten.into(),
                    }
                }
            }
            Cond::Placeholder { name, base: None } => Cond::Placeholder {
                name: name.clone(),
                base: Some(base),
            },
            _ => self.clone(),
        }
    }

    // -- vertex enumeration ------------------------------------------------

    /// Vertices that must be reachable for this term to hold.
    ///
    /// For `AtLeast(n, m)` a vertex qualifies when it is necessary for at
    /// least `m - n + 1` children.
    pub fn find_necessary_vertices(&self) -> Vec<ObjectId> {
        match self {
            Cond::Vertex(id) => vec![*id],
            Cond::AtLeast { count, conds } => {
                let mut counts: IndexMap<ObjectId, usize> = IndexMap::new();
                let required = conds.len() - *count + 1;
                for c in conds.iter() {
                    for v in c.find_necessary_vertices() {
                        *counts.entry(v).or_insert(0) += 1;
                    }
                }
                counts
                    .into_iter()
                    .filter(|(_, n)| *n >= required)
                    .map(|(v, _)| v)
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Vertices whose reachability alone makes this term hold.
    ///
    /// For `AtLeast(n, m)` a vertex qualifies when it is sufficient for at
    /// least `n` children.
    pub fn find_sufficient_vertices(&self) -> Vec<ObjectId> {
        match self {
            Cond::Vertex(id) => vec![*id],
            Cond::AtLeast { count, conds } => {
                let mut counts: IndexMap<ObjectId, usize> = IndexMap::new();
                for c in conds.iter() {
                    for v in c.find_sufficient_vertices() {
                        *counts.entry(v).or_insert(0) += 1;
                    }
                }
                counts
                    .into_iter()
                    .filter(|(_, n)| *n >= *count)
                    .map(|(v, _)| v)
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Every vertex, choice, and port this term reads.
    pub fn collect_dependencies(&self) -> Vec<ObjectId> {
        match self {
            Cond::Vertex(id) | Cond::PortReachable(id) | Cond::Enum { choice: id, .. } => {
                vec![*id]
            }
            Cond::AtLeast { conds, .. } => {
                let mut out = Vec::new();
                for c in conds.iter() {
                    for id in c.collect_dependencies() {
                        if !out.contains(&id) {
                            out.push(id);
                        }
                    }
                }
                out
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typedef::OBJECT;

    fn cx() -> Ctx {
        Obj::new(&OBJECT).ctx()
    }

    fn unknown(tag: &str) -> Cond {
        Cond::placeholder(tag)
    }

    #[test]
    fn constants() {
        let cx = cx();
        assert!(Cond::True.is_known_true(&cx));
        assert!(Cond::False.is_known_false(&cx));
        assert!(!Cond::True.is_known_false(&cx));
        assert!(!Cond::False.is_known_true(&cx));
    }

    #[test]
    fn at_least_boundaries() {
        assert_eq!(at_least(0, vec![]), Cond::True);
        assert_eq!(at_least(1, vec![]), Cond::False);
        assert_eq!(at_least(-2, vec![unknown("x")]), Cond::True);
        assert_eq!(at_least(1, vec![unknown("x")]), unknown("x"));
        assert_eq!(at_least(3, vec![unknown("x"), unknown("y")]), Cond::False);
    }

    #[test]
    fn at_least_truth_table() {
        let cx = cx();
        let mix = |n| at_least(n, vec![Cond::False, unknown("u"), Cond::True]);
        assert!(mix(1).is_known_true(&cx));
        assert!(!mix(1).is_known_false(&cx));
        assert!(!mix(2).is_known_true(&cx));
        assert!(!mix(2).is_known_false(&cx));
        assert!(!mix(3).is_known_true(&cx));
        assert!(mix(3).is_known_false(&cx));
    }

    #[test]
    fn any_flattens_associatively() {
        let a = unknown("a");
        let b = unknown("b");
        let c = unknown("c");
        let nested = any(vec![any(vec![a.clone(), b.clone()]), c.clone()]);
        let flat = any(vec![a, b, c]);
        assert_eq!(nested, flat);
    }

    #[test]
    fn all_flattens_associatively() {
        let a = unknown("a");
        let b = unknown("b");
        let c = unknown("c");
        let nested = all(vec![all(vec![a.clone(), b.clone()]), c.clone()]);
        let flat = all(vec![a, b, c]);
        assert_eq!(nested, flat);
    }

    #[test]
    fn substitution_rewrites_matching_placeholders() {
        let cx = cx();
        let c = any(vec![
            Cond::placeholder("one"),
            Cond::False,
            Cond::placeholder("three"),
        ]);
        let t = c.substitute(Target::Name("one"), &Cond::True, None);
        assert!(t.is_known_true(&cx));
        let f = c.substitute(Target::Name("one"), &Cond::False, None);
        assert!(!f.is_known_false(&cx)); // "three" is still open
        let same = c.substitute(Target::Name("bogus"), &Cond::True, None);
        assert_eq!(same, c);
    }

    #[test]
    fn based_placeholders_only_match_their_base() {
        let holder = Obj::new(&OBJECT);
        let other = Obj::new(&OBJECT);
        let c = Cond::placeholder_for("exact", &holder);
        let hit = c.substitute(Target::Name("exact"), &Cond::True, Some(holder.id()));
        assert_eq!(hit, Cond::True);
        let miss = c.substitute(Target::Name("exact"), &Cond::True, Some(other.id()));
        assert_eq!(miss, c);
    }

    #[test]
    fn simplify_folds_decided_children() {
        let cx = cx();
        let c = at_least(2, vec![Cond::True, unknown("u"), Cond::False]);
        let s = c.simplify(&cx).unwrap();
        assert_eq!(s, unknown("u"));
        // Idempotence: simplifying a simplified term is a no-op.
        assert_eq!(s.simplify(&cx).unwrap(), s);
    }

    #[test]
    fn necessary_and_sufficient_counting() {
        let v1 = ObjectId::fresh();
        let v2 = ObjectId::fresh();
        // Any(v1, v1&v2-ish): a vertex appearing in every child is necessary.
        let c = Cond::AtLeast {
            count: 1,
            conds: vec![
                Cond::Vertex(v1),
                all(vec![Cond::Vertex(v1), Cond::Vertex(v2)]),
            ]
            .into(),
        };
        assert_eq!(c.find_necessary_vertices(), vec![v1]);
        // For Any, any vertex sufficient for one child is sufficient.
        assert_eq!(c.find_sufficient_vertices(), vec![v1]);

        let conj = all(vec![Cond::Vertex(v1), Cond::Vertex(v2)]);
        assert_eq!(conj.find_necessary_vertices(), vec![v1, v2]);
        assert_eq!(conj.find_sufficient_vertices(), Vec::<ObjectId>::new());
    }
}

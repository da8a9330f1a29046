//! Vertex engine: necessary/sufficient condition tracking and loop detection.
//!
//! A vertex is a reachability atom. It carries an exact condition, a
//! necessary condition, and a sufficient condition (all initially
//! placeholders bound to the vertex itself), plus the resolved states
//! `is_known`/`known_access` and `equivalent_to`. `fast_deduce`
//! simplifies the terms, then hunts for necessity loops (every member is
//! forced unreachable) and sufficiency loops (every member is merged into
//! one equivalence class), repeating until nothing changes.

use crate::cond::{Cond, Target, all, any};
use crate::error::{VertexError, WorldResult};
use crate::store::{Key, Obj, OrdDict, Value};
use crate::typedef::{OBJECT, TypeDef, TypeHooks};

pub struct VertexHooks;

impl TypeHooks for VertexHooks {
    fn fast_deduce(&self, obj: &Obj) -> WorldResult<()> {
        fast_deduce(obj)
    }

    fn collect_dependencies(&self, obj: &Obj) -> WorldResult<Vec<Obj>> {
        Ok(collect_dependencies(obj))
    }
}

/// A reachability atom.
pub static VERTEX: TypeDef = TypeDef {
    name: "Vertex",
    base: Some(&OBJECT),
    hooks: &VertexHooks,
};

/// Create a fresh vertex with placeholder conditions bound to itself.
pub fn new() -> WorldResult<Obj> {
    new_of(&VERTEX)
}

/// Create a vertex of a subtype, sharing the vertex initialization.
pub fn new_of(kind: &'static TypeDef) -> WorldResult<Obj> {
    let obj = crate::tree::new_object(kind)?;
    init(&obj)?;
    Ok(obj)
}

pub(crate) fn init(obj: &Obj) -> WorldResult<()> {
    obj.set("_necessary_vertices", OrdDict::new_in(obj).value())?;
    obj.set("_sufficient_vertices", OrdDict::new_in(obj).value())?;
    obj.set("condition", Cond::placeholder_for("exact", obj))?;
    obj.set("necessary_condition", Cond::placeholder_for("necessary", obj))?;
    obj.set("sufficient_condition", Cond::placeholder_for("sufficient", obj))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// State accessors
// ---------------------------------------------------------------------------

pub fn is_known(v: &Obj) -> bool {
    v.bool_attr("is_known", false)
}

pub fn known_access(v: &Obj) -> bool {
    v.bool_attr("known_access", false)
}

pub fn equivalent_to(v: &Obj) -> Option<Obj> {
    v.obj_attr("equivalent_to")
}

pub fn condition_fixed(v: &Obj) -> bool {
    v.bool_attr("condition_fixed", false)
}

/// The exact condition, read through the equivalence chain.
pub fn condition(v: &Obj) -> Cond {
    match equivalent_to(v) {
        Some(eq) => condition(&eq),
        None => raw_condition(v),
    }
}

pub(crate) fn raw_condition(v: &Obj) -> Cond {
    v.cond_attr("condition").unwrap_or(Cond::True)
}

pub fn necessary_condition(v: &Obj) -> Cond {
    v.cond_attr("necessary_condition").unwrap_or(Cond::True)
}

pub fn sufficient_condition(v: &Obj) -> Cond {
    v.cond_attr("sufficient_condition").unwrap_or(Cond::False)
}

fn memo_dict(v: &Obj, name: &str) -> Option<OrdDict> {
    v.obj_attr(name).map(OrdDict::from_obj)
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

/// Assign the exact condition.
///
/// Before the first `fast_deduce` this replaces the condition outright.
/// Afterwards only the untouched initial placeholder may be refined, via
/// `substitute("exact", …)`; anything else is a usage error.
pub fn set_condition(v: &Obj, cond: Cond) -> WorldResult<()> {
    if !condition_fixed(v) {
        v.set("condition", cond.set_base(v.id()))?;
        return v.updated();
    }
    let current = raw_condition(v);
    let untouched = matches!(
        &current,
        Cond::Placeholder { name, base: Some(b) } if &**name == "exact" && *b == v.id()
    );
    if !untouched {
        return Err(VertexError::ConditionFixed {
            path: v.string_path(),
        }
        .into());
    }
    substitute(v, "exact", &cond)?;
    Ok(())
}

/// Rewrite a named placeholder in all three conditions.
///
/// Applies at the end of the equivalence chain, with this vertex as the
/// substitution base. Returns whether anything changed.
pub fn substitute(v: &Obj, name: &str, cond: &Cond) -> WorldResult<bool> {
    let cond = cond.set_base(v.id());
    let mut base = v.clone();
    while let Some(eq) = equivalent_to(&base) {
        base = eq;
    }
    let target = Target::Name(name);
    let necessary = necessary_condition(&base).substitute(target, &cond, Some(v.id()));
    let exact = raw_condition(&base).substitute(target, &cond, Some(v.id()));
    let sufficient = sufficient_condition(&base).substitute(target, &cond, Some(v.id()));

    let changed = necessary != necessary_condition(&base)
        || exact != raw_condition(&base)
        || sufficient != sufficient_condition(&base);
    if changed {
        base.set("necessary_condition", necessary)?;
        base.set("condition", exact)?;
        base.set("sufficient_condition", sufficient)?;
        base.updated()?;
    }
    Ok(changed)
}

/// Freeze the vertex as known (un)reachable and collapse its conditions.
pub(crate) fn set_known_access(v: &Obj, value: bool) -> WorldResult<()> {
    if is_known(v) {
        debug_assert_eq!(known_access(v), value, "known access contradicted");
        return Ok(());
    }
    v.set("known_access", value)?;
    v.set("is_known", true)?;
    let constant = if value { Cond::True } else { Cond::False };
    v.set("condition", constant.clone())?;
    v.set("necessary_condition", constant.clone())?;
    v.set("sufficient_condition", constant)?;
    v.updated()
}

/// Point this vertex at an equivalent one, short-cutting chains.
///
/// A chain that loops back to this vertex is a necessity loop: the vertex
/// becomes known unreachable. A chain ending in a known vertex inherits
/// that knowledge.
pub(crate) fn set_equivalent_to(v: &Obj, vertex: &Obj) -> WorldResult<()> {
    let mut eq = vertex.clone();
    loop {
        if eq == *v {
            if v.has("equivalent_to") {
                v.del("equivalent_to")?;
            }
            return set_known_access(v, false);
        }
        if is_known(&eq) {
            if v.has("equivalent_to") {
                v.del("equivalent_to")?;
            }
            return set_known_access(v, known_access(&eq));
        }
        match equivalent_to(&eq) {
            None => break,
            Some(next) => eq = next,
        }
    }
    v.set("equivalent_to", Value::Object(eq))?;
    v.updated()
}

// ---------------------------------------------------------------------------
// Simplification
// ---------------------------------------------------------------------------

fn simplify_conditions(v: &Obj) -> WorldResult<bool> {
    let cx = v.ctx();
    let mut result = false;

    let simplified = raw_condition(v).simplify(&cx)?;
    if simplified == Cond::True || simplified == Cond::False {
        set_known_access(v, simplified == Cond::True)?;
        return Ok(true);
    }
    if simplified != raw_condition(v) {
        v.set("condition", simplified)?;
        result = true;
    }
    if let Cond::Vertex(id) = raw_condition(v) {
        set_equivalent_to(v, &cx.obj(id))?;
        return Ok(true);
    }

    let necessary = necessary_condition(v).simplify(&cx)?;
    if necessary == Cond::False {
        set_known_access(v, false)?;
        return Ok(true);
    }
    if necessary != necessary_condition(v) {
        v.set("necessary_condition", necessary)?;
        result = true;
    }

    let sufficient = sufficient_condition(v).simplify(&cx)?;
    if sufficient == Cond::True {
        set_known_access(v, true)?;
        return Ok(true);
    }
    if sufficient != sufficient_condition(v) {
        v.set("sufficient_condition", sufficient)?;
        result = true;
    }
    Ok(result)
}

fn maybe_simplify(v: &Obj) -> WorldResult<bool> {
    if is_known(v) {
        return Ok(false);
    }
    if let Some(eq) = equivalent_to(v) {
        if is_known(&eq) {
            set_known_access(v, known_access(&eq))?;
            return Ok(true);
        }
        if equivalent_to(&eq).is_some() {
            set_equivalent_to(v, &eq)?;
            return Ok(true);
        }
        return Ok(false);
    }
    simplify_conditions(v)
}

// ---------------------------------------------------------------------------
// Loop detection
// ---------------------------------------------------------------------------

fn memo_keys(dict: &OrdDict) -> Vec<Obj> {
    dict.keys()
        .into_iter()
        .filter_map(|k| match k {
            Key::Object(o) => Some(o),
            _ => None,
        })
        .collect()
}

fn extend_necessary_memo(v: &Obj) -> WorldResult<bool> {
    let Some(dict) = memo_dict(v, "_necessary_vertices") else {
        return Ok(false);
    };
    let cx = v.ctx();
    let mut found = false;
    let scan = all(vec![raw_condition(v), necessary_condition(v)]);
    for id in scan.find_necessary_vertices() {
        let key = Key::Object(cx.obj(id));
        if !dict.contains(&key) {
            dict.insert(key, Value::None)?;
            found = true;
        }
    }
    Ok(found)
}

fn extend_sufficient_memo(v: &Obj) -> WorldResult<bool> {
    let Some(dict) = memo_dict(v, "_sufficient_vertices") else {
        return Ok(false);
    };
    let cx = v.ctx();
    let mut found = false;
    let scan = any(vec![raw_condition(v), sufficient_condition(v)]);
    for id in scan.find_sufficient_vertices() {
        let key = Key::Object(cx.obj(id));
        if !dict.contains(&key) {
            dict.insert(key, Value::None)?;
            found = true;
        }
    }
    Ok(found)
}

/// DFS through memoized necessary-vertex sets.
///
/// Revisiting a vertex on the current stack means every stacked vertex
/// transitively requires the cycle: all of them become known unreachable.
fn check_for_necessity_loops(v: &Obj) -> WorldResult<bool> {
    if !extend_necessary_memo(v)? {
        return Ok(false);
    }

    let mut visited: Vec<Obj> = vec![v.clone()];
    let mut stack: Vec<Obj> = vec![v.clone()];
    let mut pending: Vec<Vec<Obj>> = vec![memo_dict(v, "_necessary_vertices")
        .map(|d| memo_keys(&d))
        .unwrap_or_default()];

    while let Some(list) = pending.last_mut() {
        let Some(necessary_vertex) = list.pop() else {
            stack.pop();
            pending.pop();
            continue;
        };
        let current = stack.last().cloned().expect("stack tracks pending");

        if visited.contains(&necessary_vertex) {
            if stack.contains(&necessary_vertex) {
                // Necessity loop: each requires the next, circularly.
                for item in &stack {
                    set_known_access(item, false)?;
                }
                return Ok(true);
            }
            continue;
        }

        maybe_simplify(&necessary_vertex)?;
        if is_known(&necessary_vertex) {
            if known_access(&necessary_vertex) {
                if let Some(dict) = memo_dict(&current, "_necessary_vertices") {
                    dict.remove(&Key::Object(necessary_vertex.clone()))?;
                }
                continue;
            }
            for item in &stack {
                set_known_access(item, false)?;
            }
            return Ok(true);
        }

        extend_necessary_memo(&necessary_vertex)?;
        visited.push(necessary_vertex.clone());
        stack.push(necessary_vertex.clone());
        let keys = memo_dict(&necessary_vertex, "_necessary_vertices")
            .map(|d| memo_keys(&d))
            .unwrap_or_default();
        pending.push(keys);
    }
    Ok(false)
}

/// DFS through memoized sufficient-vertex sets.
///
/// Revisiting a vertex on the current stack means every vertex in the
/// back-edge cycle is sufficient for the next: the cycle is one
/// equivalence class and gets merged.
fn check_for_sufficiency_loops(v: &Obj) -> WorldResult<bool> {
    if !extend_sufficient_memo(v)? {
        return Ok(false);
    }

    let mut visited: Vec<Obj> = vec![v.clone()];
    let mut stack: Vec<Obj> = vec![v.clone()];
    let mut pending: Vec<Vec<Obj>> = vec![memo_dict(v, "_sufficient_vertices")
        .map(|d| memo_keys(&d))
        .unwrap_or_default()];

    while let Some(list) = pending.last_mut() {
        let Some(sufficient_vertex) = list.pop() else {
            stack.pop();
            pending.pop();
            continue;
        };
        let current = stack.last().cloned().expect("stack tracks pending");

        if visited.contains(&sufficient_vertex) {
            if let Some(index) = stack.iter().position(|s| *s == sufficient_vertex) {
                let cycle: Vec<Obj> = stack[index..].to_vec();
                combine_equivalent_vertices(&cycle)?;
                return Ok(true);
            }
            continue;
        }

        maybe_simplify(&sufficient_vertex)?;
        if is_known(&sufficient_vertex) {
            if known_access(&sufficient_vertex) {
                for item in &stack {
                    set_known_access(item, true)?;
                }
                return Ok(true);
            }
            if let Some(dict) = memo_dict(&current, "_sufficient_vertices") {
                dict.remove(&Key::Object(sufficient_vertex.clone()))?;
            }
            continue;
        }

        extend_sufficient_memo(&sufficient_vertex)?;
        visited.push(sufficient_vertex.clone());
        stack.push(sufficient_vertex.clone());
        let keys = memo_dict(&sufficient_vertex, "_sufficient_vertices")
            .map(|d| memo_keys(&d))
            .unwrap_or_default();
        pending.push(keys);
    }
    Ok(false)
}

/// Merge a sufficiency cycle into one equivalence class.
///
/// The class's conditions become the disjunction of the members' conditions
/// with every member vertex substituted by `False` (a member cannot also be
/// a condition of the merged class); every non-base member then points at
/// the base.
fn combine_equivalent_vertices(vertices: &[Obj]) -> WorldResult<()> {
    let cx = vertices[0].ctx();
    let mut class: Vec<Obj> = Vec::new();
    let mut last = vertices[0].clone();
    for vertex in vertices {
        let mut end = vertex.clone();
        while let Some(eq) = equivalent_to(&end) {
            end = eq;
        }
        if !class.contains(&end) {
            class.push(end.clone());
        }
        last = end;
    }
    debug_assert!(!class.is_empty());

    if class.len() == 1 {
        // Degenerate case: a vertex sufficient for itself drops out of its
        // own conditions.
        let vertex = vertices[0].clone();
        let target = Target::Vertex(vertex.id());
        let necessary = necessary_condition(&vertex)
            .substitute(target, &Cond::False, None)
            .simplify(&cx)?;
        let exact = raw_condition(&vertex)
            .substitute(target, &Cond::False, None)
            .simplify(&cx)?;
        let sufficient = sufficient_condition(&vertex)
            .substitute(target, &Cond::False, None)
            .simplify(&cx)?;
        vertex.set("necessary_condition", necessary)?;
        vertex.set("condition", exact)?;
        vertex.set("sufficient_condition", sufficient)?;
        return Ok(());
    }

    let base_vertex = last;
    let mut necessary = any(class
        .iter()
        .map(|m| necessary_condition(m).set_base(m.id()))
        .collect());
    let mut exact = any(class
        .iter()
        .map(|m| raw_condition(m).set_base(m.id()))
        .collect());
    let mut sufficient = any(class
        .iter()
        .map(|m| sufficient_condition(m).set_base(m.id()))
        .collect());
    for member in &class {
        let target = Target::Vertex(member.id());
        necessary = necessary.substitute(target, &Cond::False, None);
        exact = exact.substitute(target, &Cond::False, None);
        sufficient = sufficient.substitute(target, &Cond::False, None);
    }
    base_vertex.set("necessary_condition", necessary.simplify(&cx)?)?;
    base_vertex.set("condition", exact.simplify(&cx)?)?;
    base_vertex.set("sufficient_condition", sufficient.simplify(&cx)?)?;

    for vertex in vertices {
        if *vertex == base_vertex {
            continue;
        }
        set_equivalent_to(vertex, &base_vertex)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Deduction entry points
// ---------------------------------------------------------------------------

/// One vertex deduction pass: simplify, then loop-detect until fixpoint.
pub fn fast_deduce(v: &Obj) -> WorldResult<()> {
    v.set("condition_fixed", true)?;
    let mut changed = maybe_simplify(v)?;

    while equivalent_to(v).is_none() && !is_known(v) {
        let progressed = check_for_necessity_loops(v)? || check_for_sufficiency_loops(v)?;
        if !progressed {
            break;
        }
        changed = true;
        maybe_simplify(v)?;
    }
    if changed {
        v.updated()?;
    }
    Ok(())
}

pub fn collect_dependencies(v: &Obj) -> Vec<Obj> {
    if is_known(v) {
        return Vec::new();
    }
    if let Some(eq) = equivalent_to(v) {
        return vec![eq];
    }
    let cx = v.ctx();
    let mut out: Vec<Obj> = Vec::new();
    for cond in [
        raw_condition(v),
        sufficient_condition(v),
        necessary_condition(v),
    ] {
        for id in cond.collect_dependencies() {
            let obj = cx.obj(id);
            if !out.contains(&obj) {
                out.push(obj);
            }
        }
    }
    out
}

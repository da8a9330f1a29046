//! Positions: places a player can be, and their reachability vertices.
//!
//! Access to a position may depend on transient state, so the position is
//! not itself a vertex; `access_any_state` materializes one lazily from the
//! position's movement ports. The starting position is always accessible
//! and owns the world's start port.

use crate::cond::{Cond, all, any};
use crate::error::WorldResult;
use crate::store::{Obj, Value};
use crate::typedef::{BaseHooks, OBJECT, TypeDef};
use crate::vertex::VertexHooks;

/// A place a player can occupy or pass through.
pub static POSITION: TypeDef = TypeDef {
    name: "Position",
    base: Some(&OBJECT),
    hooks: &BaseHooks,
};

/// The world's entry position. Always reachable.
pub static STARTING_POSITION: TypeDef = TypeDef {
    name: "StartingPosition",
    base: Some(&POSITION),
    hooks: &BaseHooks,
};

/// The vertex flavor backing `access_any_state`.
pub static POSITION_VERTEX: TypeDef = TypeDef {
    name: "PositionVertex",
    base: Some(&crate::vertex::VERTEX),
    hooks: &VertexHooks,
};

pub fn new() -> WorldResult<Obj> {
    crate::tree::new_object(&POSITION)
}

/// The starting position, with its unlimited conservative start port.
pub fn starting_position() -> WorldResult<Obj> {
    let p = crate::tree::new_object(&STARTING_POSITION)?;
    p.set("start_port", Value::Object(crate::port::start_port()?))?;
    Ok(p)
}

/// The condition that this position is reachable in at least one state.
///
/// For ordinary positions this materializes a vertex child on first use,
/// whose condition is the disjunction over movement ports of
/// `can_enter ∧ port-entrance-reachable`. The starting position is simply
/// `True`.
pub fn access_any_state(pos: &Obj) -> WorldResult<Cond> {
    if pos.kind().is_a(&STARTING_POSITION) {
        return Ok(Cond::True);
    }
    if let Some(existing) = pos.obj_attr("access_any_state") {
        return Ok(Cond::Vertex(existing.id()));
    }
    let vertex = crate::vertex::new_of(&POSITION_VERTEX)?;
    pos.set("access_any_state", Value::Object(vertex.clone()))?;

    let mut arms = Vec::new();
    if let Some(children) = pos.children() {
        for (_, value) in children.iter() {
            let Value::Object(child) = value else {
                continue;
            };
            if !child.kind().is_a(&crate::port::MOVEMENT_PORT) {
                continue;
            }
            let enter = match child.obj_attr("can_enter") {
                Some(v) => Cond::Vertex(v.id()),
                None => Cond::False,
            };
            arms.push(all(vec![enter, Cond::port_reachable(&child)]));
        }
    }
    crate::vertex::set_condition(&vertex, any(arms))?;
    vertex.mark_fast_deduction()?;
    Ok(Cond::Vertex(vertex.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port;

    #[test]
    fn starting_position_is_always_reachable() {
        let start = starting_position().unwrap();
        assert_eq!(access_any_state(&start).unwrap(), Cond::True);
        let sp = start.obj_attr("start_port").unwrap();
        assert!(sp.kind().is_a(&port::START_PORT));
        assert_eq!(port::max_connections(&sp), None);
        assert_eq!(port::min_connections(&sp), 0);
    }

    #[test]
    fn access_vertex_is_created_once() {
        let pos = new().unwrap();
        pos.set("East", Value::Object(port::movement().unwrap()))
            .unwrap();
        let first = access_any_state(&pos).unwrap();
        let second = access_any_state(&pos).unwrap();
        assert_eq!(first, second);
        let vertex = pos.obj_attr("access_any_state").unwrap();
        assert_eq!(vertex.parent(), Some(pos.clone()));
        // The condition gates on the port's enter vertex.
        let cond = crate::vertex::condition(&vertex);
        assert_ne!(cond, Cond::False);
    }

    #[test]
    fn position_without_ports_is_unreachable() {
        let pos = new().unwrap();
        let cond = access_any_state(&pos).unwrap();
        let vertex = pos.obj_attr("access_any_state").unwrap();
        crate::vertex::fast_deduce(&vertex).unwrap();
        let cx = pos.ctx();
        assert!(cond.is_known_false(&cx));
    }
}

//! Goals and the world-level goal vertices.
//!
//! A goal is a vertex paired with a `Configuration` enum choice
//! (`Required`/`Optional`/`Ignore`). The world aggregates goals through two
//! derived vertices: `RequiredGoals` (every Required goal reachable) and
//! `OptionalGoals` (every non-Ignored goal reachable). Their conditions are
//! built from all goal descendants on first deduction. An unreachable
//! `RequiredGoals` is a contradiction the driver must backtrack out of.

use crate::choice;
use crate::cond::{Cond, all, any};
use crate::error::{LogicError, WorldResult};
use crate::store::{Obj, Value};
use crate::typedef::{TypeDef, TypeHooks};
use crate::vertex::{self, VertexHooks};

pub struct RequiredGoalsHooks;

impl TypeHooks for RequiredGoalsHooks {
    fn fast_deduce(&self, obj: &Obj) -> WorldResult<()> {
        build_condition(obj, GoalFilter::Required)?;
        vertex::fast_deduce(obj)?;
        if vertex::is_known(obj) && !vertex::known_access(obj) {
            return Err(LogicError::GoalsUnreachable.into());
        }
        Ok(())
    }

    fn collect_dependencies(&self, obj: &Obj) -> WorldResult<Vec<Obj>> {
        Ok(vertex::collect_dependencies(obj))
    }
}

pub struct OptionalGoalsHooks;

impl TypeHooks for OptionalGoalsHooks {
    fn fast_deduce(&self, obj: &Obj) -> WorldResult<()> {
        build_condition(obj, GoalFilter::Optional)?;
        vertex::fast_deduce(obj)
    }

    fn collect_dependencies(&self, obj: &Obj) -> WorldResult<Vec<Obj>> {
        Ok(vertex::collect_dependencies(obj))
    }
}

/// A vertex the player is meant to reach, with a Required/Optional/Ignore
/// configuration choice.
pub static GOAL: TypeDef = TypeDef {
    name: "Goal",
    base: Some(&vertex::VERTEX),
    hooks: &VertexHooks,
};

/// All goals configured Required are reachable.
pub static REQUIRED_GOALS: TypeDef = TypeDef {
    name: "RequiredGoals",
    base: Some(&vertex::VERTEX),
    hooks: &RequiredGoalsHooks,
};

/// All goals not configured Ignore are reachable.
pub static OPTIONAL_GOALS: TypeDef = TypeDef {
    name: "OptionalGoals",
    base: Some(&vertex::VERTEX),
    hooks: &OptionalGoalsHooks,
};

/// Create a goal vertex with its `Configuration` choice.
pub fn new() -> WorldResult<Obj> {
    let goal = vertex::new_of(&GOAL)?;
    let config = choice::enumeration(&["Required", "Optional", "Ignore"])?;
    goal.set("Configuration", Value::Object(config))?;
    Ok(goal)
}

enum GoalFilter {
    Required,
    Optional,
}

/// Derive the aggregate condition from every goal in the world, once.
fn build_condition(v: &Obj, filter: GoalFilter) -> WorldResult<()> {
    if vertex::condition_fixed(v) {
        return Ok(());
    }
    let Some(world) = v.get_world() else {
        return Ok(());
    };
    let mut conds = Vec::new();
    for goal in world.descendants_by_type(&GOAL) {
        let config = goal.req("Configuration")?;
        let Some(config) = config.as_object() else {
            continue;
        };
        let escape = match filter {
            GoalFilter::Required => choice::is_not_values(config, &["Required"])?,
            GoalFilter::Optional => choice::is_values(config, &["Ignore"])?,
        };
        conds.push(any(vec![escape, Cond::vertex(&goal)]));
    }
    let cx = v.ctx();
    vertex::set_condition(v, all(conds).simplify(&cx)?)
}

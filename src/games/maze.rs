//! The maze game: a grid map whose interior edges carry obstacle choices.
//!
//! Every interior edge gets a `MazeObstacle` enum choice (`Nothing`/`Wall`,
//! weighted toward walls) gating the `can_enter`/`can_exit` vertices of the
//! port on the far side, so reachability of each cell flows from the
//! obstacle choices. The `AllPositions` goal aggregates every cell's
//! `access_any_state` vertex.

use crate::choice;
use crate::cond::all;
use crate::error::WorldResult;
use crate::games::grid;
use crate::goal;
use crate::position;
use crate::store::{Key, Obj, Value};
use crate::strategy::{Pick, Strategy};
use crate::typedef::{TypeDef, TypeHooks};
use crate::vertex;
use crate::world;

pub struct MazeHooks;

impl TypeHooks for MazeHooks {
    fn fast_deduce(&self, obj: &Obj) -> WorldResult<()> {
        grid::connect_pass(obj)
    }

    fn on_choice(&self, obj: &Obj, choice_made: &Obj) -> WorldResult<()> {
        grid::on_choice(obj, choice_made)?;
        wire_all_positions(obj, choice_made)
    }
}

/// A grid map with per-edge obstacle choices.
pub static MAZE_MAP: TypeDef = TypeDef {
    name: "MazeMap",
    base: Some(&grid::GRID_MAP),
    hooks: &MazeHooks,
};

/// One edge's obstacle: nothing, or a wall.
pub static MAZE_OBSTACLE: TypeDef = TypeDef {
    name: "MazeObstacle",
    base: Some(&choice::ENUM_CHOICE),
    hooks: &choice::EnumHooks,
};

/// The maze game object.
pub static MAZE_GAME: TypeDef = TypeDef {
    name: "MazeGame",
    base: Some(&world::GAME),
    hooks: &crate::typedef::BaseHooks,
};

/// A maze game with its map and the `AllPositions` goal.
pub fn new_game() -> WorldResult<Obj> {
    let game = crate::tree::new_object(&MAZE_GAME)?;
    game.set("map", Value::Object(grid::new_of(&MAZE_MAP)?))?;
    let all_positions = goal::new()?;
    game.set("AllPositions", Value::Object(all_positions.clone()))?;
    let config = all_positions
        .obj_attr("Configuration")
        .expect("goals carry a Configuration choice");
    config.set("default", "Optional")?;
    Ok(game)
}

fn obstacle_default() -> Strategy {
    Strategy::Weighted(vec![
        (3.0, Pick::Value(crate::store::Scalar::Str("Wall".into()))),
        (0.5, Pick::Value(crate::store::Scalar::Str("Nothing".into()))),
        (0.5, Pick::Strategy(Strategy::EnumEven)),
    ])
}

fn new_obstacle(cell_a: &Obj, cell_b: &Obj) -> WorldResult<Obj> {
    let obstacle = choice::enumeration_of(&MAZE_OBSTACLE, &["Nothing", "Wall"])?;
    obstacle.set("default", Value::from(obstacle_default()))?;
    obstacle.set(
        "cells",
        Value::Tuple(vec![
            Value::Object(cell_a.clone()),
            Value::Object(cell_b.clone()),
        ]),
    )?;
    Ok(obstacle)
}

/// Gate a port's enter/exit vertices on an obstacle being absent.
fn gate_port(port: &Obj, obstacle: &Obj) -> WorldResult<()> {
    let open = choice::is_values(obstacle, &["Nothing"])?;
    for gate in ["can_enter", "can_exit"] {
        let v = port.req(gate)?;
        if let Some(v) = v.as_object() {
            vertex::set_condition(v, open.clone())?;
        }
    }
    Ok(())
}

/// Install the obstacle for the edge between two horizontal neighbors.
pub(crate) fn prepare_horizontal(
    maze: &Obj,
    west: &Obj,
    east: &Obj,
    x: i64,
    y: i64,
) -> WorldResult<()> {
    let name = format!("EastObstacle({x},{y})");
    if maze.has(Key::name(&name)) {
        return Ok(());
    }
    let obstacle = new_obstacle(west, east)?;
    maze.set(Key::name(&name), Value::Object(obstacle.clone()))?;
    let gated = east.req("West")?;
    if let Some(p) = gated.as_object() {
        gate_port(p, &obstacle)?;
    }
    Ok(())
}

/// Install the obstacle for the edge between two vertical neighbors.
pub(crate) fn prepare_vertical(
    maze: &Obj,
    north: &Obj,
    south: &Obj,
    x: i64,
    y: i64,
) -> WorldResult<()> {
    let name = format!("SouthObstacle({x},{y})");
    if maze.has(Key::name(&name)) {
        return Ok(());
    }
    let obstacle = new_obstacle(north, south)?;
    maze.set(Key::name(&name), Value::Object(obstacle.clone()))?;
    let gated = south.req("North")?;
    if let Some(p) = gated.as_object() {
        gate_port(p, &obstacle)?;
    }
    Ok(())
}

/// Drop the obstacle bookkeeping for an edge that became a border.
pub(crate) fn drop_edge_obstacle(
    maze: &Obj,
    direction: &str,
    x: i64,
    y: i64,
) -> WorldResult<()> {
    let name = match direction {
        "East" => format!("EastObstacle({x},{y})"),
        "South" => format!("SouthObstacle({x},{y})"),
        _ => return Ok(()),
    };
    if maze.has(Key::name(&name)) {
        maze.del(Key::name(&name))?;
    }
    Ok(())
}

/// Point the game's `AllPositions` goal at every cell's access vertex.
fn wire_all_positions(maze: &Obj, choice_made: &Obj) -> WorldResult<()> {
    let (Some(width), Some(height)) = (maze.obj_attr("Width"), maze.obj_attr("Height")) else {
        return Ok(());
    };
    if *choice_made != width && *choice_made != height {
        return Ok(());
    }
    if !choice::known(&width) || !choice::known(&height) {
        return Ok(());
    }
    let Some(game) = maze.parent() else {
        return Ok(());
    };
    let Some(all_positions) = game.obj_attr("AllPositions") else {
        return Ok(());
    };
    let mut conds = Vec::new();
    for cell in maze.descendants_by_type(&position::POSITION) {
        conds.push(position::access_any_state(&cell)?);
    }
    vertex::set_condition(&all_positions, all(conds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maze_world(w: i64, h: i64) -> (Obj, Obj) {
        let root = world::new().unwrap();
        let game = new_game().unwrap();
        world::add_game(&root, &game).unwrap();
        let map = game.obj_attr("map").unwrap();
        choice::set_value(&map.obj_attr("Width").unwrap(), w).unwrap();
        choice::set_value(&map.obj_attr("Height").unwrap(), h).unwrap();
        (root, map)
    }

    #[test]
    fn connect_pass_installs_obstacles() {
        let (_root, map) = maze_world(2, 2);
        grid::connect_pass(&map).unwrap();
        assert!(map.has(Key::name("EastObstacle(0,0)")));
        assert!(map.has(Key::name("EastObstacle(0,1)")));
        assert!(map.has(Key::name("SouthObstacle(0,0)")));
        assert!(map.has(Key::name("SouthObstacle(1,0)")));
        // Border edges carry no obstacle.
        assert!(!map.has(Key::name("EastObstacle(1,0)")));
    }

    #[test]
    fn obstacle_gates_the_far_ports() {
        let (_root, map) = maze_world(2, 1);
        grid::connect_pass(&map).unwrap();
        let obstacle = map.obj_attr(Key::name("EastObstacle(0,0)")).unwrap();
        choice::set_value(&obstacle, "Wall").unwrap();
        let west_port = grid::cell(&map, 1, 0).unwrap().obj_attr("West").unwrap();
        let enter = west_port.obj_attr("can_enter").unwrap();
        let cx = map.ctx();
        assert!(vertex::condition(&enter).is_known_false(&cx));
    }

    #[test]
    fn all_positions_goal_tracks_every_cell() {
        let (_root, map) = maze_world(2, 2);
        let game = map.parent().unwrap();
        let goal_vertex = game.obj_attr("AllPositions").unwrap();
        let cond = vertex::condition(&goal_vertex);
        // Four cells, each contributing one access vertex.
        assert!(matches!(
            cond,
            crate::cond::Cond::AtLeast { count: 4, .. }
        ));
    }
}

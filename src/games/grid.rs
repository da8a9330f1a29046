//! Grid maps: a Width×Height matrix of positions with movement ports.
//!
//! Cells are children keyed by `(x,y)`. Once Width and Height are known the
//! cell matrix is (re)built; during generation the connect pass links each
//! interior edge symmetrically and commits it, and terminates the border
//! ports. The pass is idempotent: committed ports are skipped.

use crate::choice;
use crate::error::WorldResult;
use crate::port;
use crate::position;
use crate::store::{Key, Obj, Value};
use crate::typedef::{OBJECT, TypeDef, TypeHooks};

pub struct GridHooks;

impl TypeHooks for GridHooks {
    fn fast_deduce(&self, obj: &Obj) -> WorldResult<()> {
        connect_pass(obj)
    }

    fn on_choice(&self, obj: &Obj, choice: &Obj) -> WorldResult<()> {
        on_choice(obj, choice)
    }
}

/// A rectangular map of positions.
pub static GRID_MAP: TypeDef = TypeDef {
    name: "GridMap",
    base: Some(&OBJECT),
    hooks: &GridHooks,
};

pub fn new() -> WorldResult<Obj> {
    new_of(&GRID_MAP)
}

/// Grid constructor shared with grid subtypes.
pub fn new_of(kind: &'static TypeDef) -> WorldResult<Obj> {
    let grid = crate::tree::new_object(kind)?;
    grid.set(
        "Width",
        Value::Object(choice::integer(Some(1), None, Some(10))?),
    )?;
    grid.set(
        "Height",
        Value::Object(choice::integer(Some(1), None, Some(10))?),
    )?;
    Ok(grid)
}

fn cell_key(x: i64, y: i64) -> Key {
    Key::Tuple(vec![Key::Int(x), Key::Int(y)])
}

/// The cell at `(x, y)`, if present.
pub fn cell(grid: &Obj, x: i64, y: i64) -> Option<Obj> {
    grid.obj_attr(cell_key(x, y))
}

fn dimensions(grid: &Obj) -> Option<(i64, i64)> {
    let width = grid.obj_attr("Width")?;
    let height = grid.obj_attr("Height")?;
    if !choice::known(&width) || !choice::known(&height) {
        return None;
    }
    let w = choice::value(&width).ok()?.as_int()?;
    let h = choice::value(&height).ok()?.as_int()?;
    Some((w, h))
}

fn new_cell(x: i64, y: i64) -> WorldResult<Obj> {
    let pos = position::new()?;
    pos.set("x", x)?;
    pos.set("y", y)?;
    pos.set("North", Value::Object(port::movement()?))?;
    pos.set("South", Value::Object(port::movement()?))?;
    pos.set("East", Value::Object(port::movement()?))?;
    pos.set("West", Value::Object(port::movement()?))?;
    Ok(pos)
}

/// React to Width/Height becoming known by rebuilding the cell matrix.
pub(crate) fn on_choice(grid: &Obj, choice_made: &Obj) -> WorldResult<()> {
    let (Some(width), Some(height)) = (grid.obj_attr("Width"), grid.obj_attr("Height")) else {
        return Ok(());
    };
    if *choice_made != width && *choice_made != height {
        return Ok(());
    }
    if !choice::known(&width) || !choice::known(&height) {
        return Ok(());
    }
    resize(grid)?;
    grid.mark_fast_deduction()
}

/// Create missing cells inside the new bounds, drop cells outside them.
fn resize(grid: &Obj) -> WorldResult<()> {
    let Some((width, height)) = dimensions(grid) else {
        return Ok(());
    };
    let mut x = 0;
    while x < width || grid.has(cell_key(x, 0)) {
        let mut y = 0;
        while y < height || grid.has(cell_key(x, y)) {
            if x < width && y < height {
                if !grid.has(cell_key(x, y)) {
                    grid.set(cell_key(x, y), Value::Object(new_cell(x, y)?))?;
                }
            } else if grid.has(cell_key(x, y)) {
                grid.del(cell_key(x, y))?;
            }
            y += 1;
        }
        x += 1;
    }
    Ok(())
}

/// Link interior edges, terminate border ports. Skips committed ports.
pub(crate) fn connect_pass(grid: &Obj) -> WorldResult<()> {
    let Some((width, height)) = dimensions(grid) else {
        return Ok(());
    };
    for x in 0..width {
        for y in 0..height {
            let Some(here) = cell(grid, x, y) else {
                continue;
            };
            if x + 1 < width {
                if let Some(east) = cell(grid, x + 1, y) {
                    connect_cells_horizontal(grid, &here, &east, x, y)?;
                }
            } else {
                connect_cell_edge(grid, &here, "East", x, y)?;
            }
            if x == 0 {
                connect_cell_edge(grid, &here, "West", x, y)?;
            }
            if y + 1 < height {
                if let Some(south) = cell(grid, x, y + 1) {
                    connect_cells_vertical(grid, &here, &south, x, y)?;
                }
            } else {
                connect_cell_edge(grid, &here, "South", x, y)?;
            }
            if y == 0 {
                connect_cell_edge(grid, &here, "North", x, y)?;
            }
        }
    }
    Ok(())
}

fn connect_cells_horizontal(
    grid: &Obj,
    west: &Obj,
    east: &Obj,
    x: i64,
    y: i64,
) -> WorldResult<()> {
    let a = west.req("East")?;
    let b = east.req("West")?;
    let (Some(a), Some(b)) = (a.as_object(), b.as_object()) else {
        return Ok(());
    };
    if choice::known(a) || choice::known(b) {
        return Ok(());
    }
    if grid.kind().is_a(&crate::games::maze::MAZE_MAP) {
        crate::games::maze::prepare_horizontal(grid, west, east, x, y)?;
    }
    port::connect(a, b, 1)?;
    port::commit(a)?;
    port::commit(b)
}

fn connect_cells_vertical(grid: &Obj, north: &Obj, south: &Obj, x: i64, y: i64) -> WorldResult<()> {
    let a = north.req("South")?;
    let b = south.req("North")?;
    let (Some(a), Some(b)) = (a.as_object(), b.as_object()) else {
        return Ok(());
    };
    if choice::known(a) || choice::known(b) {
        return Ok(());
    }
    if grid.kind().is_a(&crate::games::maze::MAZE_MAP) {
        crate::games::maze::prepare_vertical(grid, north, south, x, y)?;
    }
    port::connect(a, b, 1)?;
    port::commit(a)?;
    port::commit(b)
}

/// Terminate a border port: its value commits to no connections.
fn connect_cell_edge(grid: &Obj, cell: &Obj, direction: &str, x: i64, y: i64) -> WorldResult<()> {
    let Some(p) = cell.obj_attr(direction) else {
        return Ok(());
    };
    if !choice::known(&p) {
        port::commit(&p)?;
    }
    if grid.kind().is_a(&crate::games::maze::MAZE_MAP) {
        crate::games::maze::drop_edge_obstacle(grid, direction, x, y)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world;

    fn sized_grid(w: i64, h: i64) -> (Obj, Obj) {
        let root = world::new().unwrap();
        let game = world::new_game().unwrap();
        world::add_game(&root, &game).unwrap();
        let grid = new().unwrap();
        game.set("grid", Value::Object(grid.clone())).unwrap();
        choice::set_value(&grid.obj_attr("Width").unwrap(), w).unwrap();
        choice::set_value(&grid.obj_attr("Height").unwrap(), h).unwrap();
        (root, grid)
    }

    #[test]
    fn resize_builds_the_cell_matrix() {
        let (_root, grid) = sized_grid(3, 4);
        assert!(cell(&grid, 0, 0).is_some());
        assert!(cell(&grid, 2, 3).is_some());
        assert!(cell(&grid, 3, 0).is_none());
        // Children are named by their coordinates.
        assert_eq!(&*cell(&grid, 2, 3).unwrap().name(), "(2,3)");
    }

    #[test]
    fn resize_grows_and_shrinks() {
        let (_root, grid) = sized_grid(3, 4);
        choice::set_value(&grid.obj_attr("Width").unwrap(), 5).unwrap();
        choice::set_value(&grid.obj_attr("Height").unwrap(), 2).unwrap();
        assert!(cell(&grid, 2, 1).is_some());
        assert!(cell(&grid, 1, 2).is_none());
        choice::set_value(&grid.obj_attr("Width").unwrap(), 2).unwrap();
        choice::set_value(&grid.obj_attr("Height").unwrap(), 5).unwrap();
        assert!(cell(&grid, 1, 2).is_some());
        assert!(cell(&grid, 2, 1).is_none());
    }

    #[test]
    fn connect_pass_links_neighbors_symmetrically() {
        let (_root, grid) = sized_grid(2, 1);
        connect_pass(&grid).unwrap();
        let a = cell(&grid, 0, 0).unwrap().obj_attr("East").unwrap();
        let b = cell(&grid, 1, 0).unwrap().obj_attr("West").unwrap();
        assert!(choice::known(&a));
        assert!(choice::known(&b));
        assert_eq!(port::connections(&a), vec![(b.clone(), 1)]);
        assert_eq!(port::connections(&b), vec![(a.clone(), 1)]);
        // Re-running the pass on committed ports is a no-op.
        connect_pass(&grid).unwrap();
    }

    #[test]
    fn single_cell_grid_terminates_all_edges() {
        let (_root, grid) = sized_grid(1, 1);
        connect_pass(&grid).unwrap();
        let only = cell(&grid, 0, 0).unwrap();
        for direction in ["North", "South", "East", "West"] {
            let p = only.obj_attr(direction).unwrap();
            assert!(choice::known(&p));
            assert!(port::connections(&p).is_empty());
        }
    }
}

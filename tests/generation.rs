//! End-to-end generation tests: forking, maze generation, determinism,
//! and backtracking out of contradictions.

use worldloom::games::{grid, maze};
use worldloom::store::{Obj, Value};
use worldloom::strategy::{Pick, Strategy};
use worldloom::{choice, goal, port, position, vertex, world};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn maze_world() -> Obj {
    init_tracing();
    let root = world::new().unwrap();
    let game = maze::new_game().unwrap();
    world::add_game(&root, &game).unwrap();
    root
}

fn sized_maze_world(w: i64, h: i64) -> Obj {
    let root = maze_world();
    let map = root
        .object_from_path(&["World", "MazeGame", "map"], false)
        .unwrap();
    let width = map.obj_attr("Width").unwrap();
    let height = map.obj_attr("Height").unwrap();
    width.set("default", w).unwrap();
    height.set("default", h).unwrap();
    root
}

fn obstacle_values(generated: &Obj) -> Vec<(String, String)> {
    let map = generated
        .object_from_path(&["World", "MazeGame", "map"], false)
        .unwrap();
    let mut out = Vec::new();
    for obstacle in map.descendants_by_type(&maze::MAZE_OBSTACLE) {
        let value = match choice::value(&obstacle).unwrap() {
            Value::Str(s) => s.to_string(),
            other => panic!("obstacle resolved to {other:?}"),
        };
        out.push((obstacle.name().to_string(), value));
    }
    out.sort();
    out
}

#[test]
fn basic_fork_isolation() {
    let obj = worldloom::tree::new_object(&worldloom::typedef::OBJECT).unwrap();
    obj.set("sdf", 2).unwrap();
    let obj2 = obj.fork();
    obj2.set("jkl", 3).unwrap();
    obj.set("qwe", 4).unwrap();

    assert_eq!(obj2.get("sdf"), Some(Value::Int(2)));
    assert_eq!(obj2.get("jkl"), Some(Value::Int(3)));
    assert_eq!(obj.get("qwe"), Some(Value::Int(4)));
    assert!(!obj2.has("qwe"));
    assert!(!obj.has("jkl"));
}

#[test]
fn maze_generation_completes_with_every_choice_known() {
    let root = sized_maze_world(3, 3);
    let generated = world::generate(&root, Some("test seed".into())).unwrap();

    let unresolved: Vec<String> = generated
        .descendants_by_type(&choice::CHOICE)
        .iter()
        .filter(|c| !choice::known(c))
        .map(|c| c.string_path())
        .collect();
    assert!(unresolved.is_empty(), "unresolved choices: {unresolved:?}");

    // The start port committed conservatively, with no connections.
    let start_port = generated
        .object_from_path(&["World", "start_position", "start_port"], false)
        .unwrap();
    assert!(choice::known(&start_port));
    assert!(port::connections(&start_port).is_empty());

    // The source world is untouched by generation.
    let original_width = root
        .object_from_path(&["World", "MazeGame", "map", "Width"], false)
        .unwrap();
    assert!(!choice::known(&original_width));
}

#[test]
fn maze_generation_is_deterministic() {
    let first = world::generate(&sized_maze_world(5, 5), Some("test seed".into())).unwrap();
    let second = world::generate(&sized_maze_world(5, 5), Some("test seed".into())).unwrap();
    let a = obstacle_values(&first);
    let b = obstacle_values(&second);
    assert!(!a.is_empty());
    assert_eq!(a, b);

    let other = world::generate(&sized_maze_world(5, 5), Some("another seed".into())).unwrap();
    assert_ne!(a, obstacle_values(&other));
}

#[test]
fn maze_access_conditions_do_not_read_undetermined_choices() {
    let root = sized_maze_world(4, 4);
    let generated = world::generate(&root, Some("test seed".into())).unwrap();
    let map = generated
        .object_from_path(&["World", "MazeGame", "map"], false)
        .unwrap();
    let cx = map.ctx();

    for cell in map.descendants_by_type(&position::POSITION) {
        let access = cell
            .obj_attr("access_any_state")
            .expect("generation materializes every cell's access vertex");
        let simplified = vertex::condition(&access).simplify(&cx).unwrap();
        // Every choice the simplified condition still references is known.
        for id in simplified.collect_dependencies() {
            let dep = cx.obj(id);
            if dep.kind().is_a(&choice::CHOICE) {
                assert!(choice::known(&dep), "undetermined {}", dep.string_path());
            }
        }
    }
}

#[test]
fn grid_ports_stay_symmetric_and_bounded() {
    let root = sized_maze_world(3, 3);
    let generated = world::generate(&root, Some("test seed".into())).unwrap();
    let map = generated
        .object_from_path(&["World", "MazeGame", "map"], false)
        .unwrap();

    for x in 0..3 {
        for y in 0..3 {
            let cell = grid::cell(&map, x, y).unwrap();
            for direction in ["North", "South", "East", "West"] {
                let p = cell.obj_attr(direction).unwrap();
                let total: i64 = port::connections(&p).iter().map(|(_, n)| n).sum();
                if let Some(max) = port::max_connections(&p) {
                    assert!(total <= max);
                }
                for (peer, count) in port::connections(&p) {
                    let back = port::connections(&peer);
                    assert!(back.contains(&(p.clone(), count)));
                }
            }
        }
    }
}

#[test]
fn backtracking_recovers_from_a_required_goal() {
    let root = world::new().unwrap();
    let game = world::new_game().unwrap();
    world::add_game(&root, &game).unwrap();

    let pick = choice::enumeration(&["A", "B"]).unwrap();
    game.set("Pick", Value::Object(pick.clone())).unwrap();
    // Weight the wrong value so heavily that it is tried first.
    pick.set(
        "strategy",
        Value::from(Strategy::Weighted(vec![
            (1_000_000.0, Pick::Value(worldloom::store::Scalar::Str("B".into()))),
            (1.0, Pick::Value(worldloom::store::Scalar::Str("A".into()))),
        ])),
    )
    .unwrap();

    let must_be_a = goal::new().unwrap();
    game.set("MustBeA", Value::Object(must_be_a.clone())).unwrap();
    let config = must_be_a.obj_attr("Configuration").unwrap();
    choice::set_value(&config, "Required").unwrap();
    vertex::set_condition(&must_be_a, choice::is_values(&pick, &["A"]).unwrap()).unwrap();

    let generated = world::generate(&root, Some("test seed".into())).unwrap();
    let resolved = generated
        .object_from_path(&["World", "Game", "Pick"], false)
        .unwrap();
    assert_eq!(choice::value(&resolved).unwrap(), Value::Str("A".into()));
}

#[test]
fn unsatisfiable_required_goal_surfaces_logic_error() {
    let root = world::new().unwrap();
    let game = world::new_game().unwrap();
    world::add_game(&root, &game).unwrap();

    let doomed = goal::new().unwrap();
    game.set("Doomed", Value::Object(doomed.clone())).unwrap();
    let config = doomed.obj_attr("Configuration").unwrap();
    choice::set_value(&config, "Required").unwrap();
    vertex::set_condition(&doomed, worldloom::cond::Cond::False).unwrap();

    let err = world::generate(&root, Some("test seed".into())).unwrap_err();
    assert!(err.is_logic(), "expected a logic error, got {err}");
}

#[test]
fn sealed_positions_raise_logic_error_when_required() {
    // Two positions joined by a committed corridor whose gates are walls on
    // both sides: neither position is reachable in any state.
    let root = world::new().unwrap();
    let game = world::new_game().unwrap();
    world::add_game(&root, &game).unwrap();

    let a = position::new().unwrap();
    game.set("A", Value::Object(a.clone())).unwrap();
    let b = position::new().unwrap();
    game.set("B", Value::Object(b.clone())).unwrap();
    a.set("East", Value::Object(port::movement().unwrap())).unwrap();
    b.set("West", Value::Object(port::movement().unwrap())).unwrap();
    let east = a.obj_attr("East").unwrap();
    let west = b.obj_attr("West").unwrap();

    let wall = choice::enumeration(&["Nothing", "Wall"]).unwrap();
    game.set("Barrier", Value::Object(wall.clone())).unwrap();
    for p in [&east, &west] {
        for gate in ["can_enter", "can_exit"] {
            let v = p.obj_attr(gate).unwrap();
            vertex::set_condition(&v, choice::is_values(&wall, &["Nothing"]).unwrap()).unwrap();
        }
    }
    choice::set_value(&wall, "Wall").unwrap();
    port::connect(&east, &west, 1).unwrap();
    port::commit(&east).unwrap();
    port::commit(&west).unwrap();

    let trapped = goal::new().unwrap();
    game.set("ReachB", Value::Object(trapped.clone())).unwrap();
    let config = trapped.obj_attr("Configuration").unwrap();
    choice::set_value(&config, "Required").unwrap();
    vertex::set_condition(&trapped, position::access_any_state(&b).unwrap()).unwrap();

    let err = world::generate(&root, Some("test seed".into())).unwrap_err();
    assert!(err.is_logic(), "expected a logic error, got {err}");
}

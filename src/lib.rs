//! # worldloom
//!
//! A deterministic procedural game-world generator. A world is a tree of
//! branching objects containing choices (unknown configuration values),
//! vertices (reachability atoms), and ports (linkable connection
//! endpoints); generation deterministically produces a concrete world
//! satisfying every declared constraint, seeded by a user-supplied key.
//!
//! ## Architecture
//!
//! - **Branching store** (`store`): copy-on-write universes with O(1)
//!   snapshot forking and union-find family merging
//! - **Object tree** (`tree`): parent/child structure, paths, dependency
//!   edges driving fast-deduction re-queueing
//! - **Conditions** (`cond`): a closed tagged union of logic terms with
//!   simplify/substitute and necessary/sufficient vertex scans
//! - **Vertex engine** (`vertex`): reachability deduction with necessity-
//!   and sufficiency-loop detection
//! - **Choices, strategies, ports** (`choice`, `strategy`, `port`):
//!   seeded resolution with plain-data elimination tokens
//! - **Driver** (`world`): the generation loop with snapshot backtracking
//!
//! ## Library usage
//!
//! ```no_run
//! use worldloom::games::maze;
//! use worldloom::{choice, world};
//!
//! let root = world::new().unwrap();
//! let game = maze::new_game().unwrap();
//! world::add_game(&root, &game).unwrap();
//!
//! let generated = world::generate(&root, Some("test seed".into())).unwrap();
//! assert!(
//!     generated
//!         .descendants_by_type(&choice::CHOICE)
//!         .iter()
//!         .all(choice::known)
//! );
//! ```

pub mod choice;
pub mod cond;
pub mod error;
pub mod games;
pub mod goal;
pub mod ids;
pub mod port;
pub mod position;
pub mod rng;
pub mod store;
pub mod strategy;
pub mod tree;
pub mod typedef;
pub mod vertex;
pub mod world;

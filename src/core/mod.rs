//! Core logic: interning, patterns, the interpreter, recipes, graph
//! resolution and the walk, cookbooks and the cook run.

pub mod compiler;
pub mod cookbook;
pub mod diag;
pub mod error;
pub mod executor;
pub mod flags;
pub mod fs;
pub mod graph;
pub mod id;
pub mod interp;
pub mod matcher;
pub mod opcode;
pub mod planner;
pub mod pool;
pub mod position;
pub mod recipe;
pub mod state;
pub mod store;
pub mod symtab;

//! CK-032: Dependency graph: file nodes, recipe instances, statistics.
//!
//! Nodes live in two arenas addressed by index. A file node knows the
//! recipe instance that produces it and the instances that consume it; a
//! recipe instance knows its input and output files. No node owns another.

pub mod build;
pub mod walk;

use super::diag::Diagnostics;
use super::fs::FileSystem;
use super::interp::{Env, OpcodeContext};
use super::matcher::{Captures, CompiledPattern};
use super::pool::{Istr, StrList, StringPool};
use super::recipe::{EdgeType, RecipeDef, RecipeId};
use super::store::RecipeStore;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone)]
pub struct FileNode {
    pub path: Istr,
    /// Recipe instance that builds this file. `None` for a leaf.
    pub producer: Option<NodeId>,
    /// Recipe instances that need this file.
    pub consumers: Vec<NodeId>,
    /// Requested directly by the user.
    pub primary: bool,
}

/// One recipe applied to one match.
#[derive(Debug, Clone)]
pub struct RecipeNode {
    pub def: Arc<RecipeDef>,
    /// The target pattern that matched.
    pub pattern: Arc<CompiledPattern>,
    pub captures: Captures,
    pub inputs: Vec<(FileId, EdgeType)>,
    pub outputs: Vec<FileId>,
    /// Mutual-exclusion groups this instance holds while it runs.
    pub single_thread: StrList,
    /// Host the body runs on, when bound.
    pub host: Option<String>,
}

/// Outcome of resolving one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Success(FileId),
    /// No candidate applies. The caller may try something else.
    Backtrack,
    /// Something went wrong that trying alternatives will not fix.
    Error,
}

/// Resolver counters. Monotonic for the life of one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub backtrack_bad_path: u64,
    pub backtrack_by_ingredient: u64,
    pub backtrack_cache: u64,
    pub error_by_ingredient: u64,
    pub error_cache: u64,
    pub error_in_expr: u64,
    pub explicit_applicable: u64,
    pub explicit_ingredients_applicable: u64,
    pub explicit_ingredients_not_applicable: u64,
    pub explicit_not_applicable: u64,
    pub implicit_applicable: u64,
    pub implicit_ingredients_applicable: u64,
    pub implicit_ingredients_not_applicable: u64,
    pub implicit_not_applicable: u64,
    pub infinite_loop: u64,
    pub inhibit_self_recursion: u64,
    pub leaf_backtrack: u64,
    pub leaf_error: u64,
    pub leaf_exists: u64,
    pub pattern_match_query: u64,
    pub phony: u64,
    pub precondition_rejection: u64,
    pub success: u64,
    pub success_reuse: u64,
    pub weak_ignored: u64,
}

impl Statistics {
    /// Candidates abandoned for another one.
    pub fn backtracks(&self) -> u64 {
        self.backtrack_by_ingredient + self.precondition_rejection + self.backtrack_bad_path
    }
}

/// Values of the interpreter variables `target`, `targets`, `need` and
/// `younger` for one program run.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    pub target: StrList,
    pub targets: StrList,
    pub need: StrList,
    pub younger: StrList,
}

impl Bindings {
    pub fn bind(&self, pool: &StringPool, ctx: &mut OpcodeContext) {
        ctx.bind(pool.intern("target"), self.target.clone());
        ctx.bind(pool.intern("targets"), self.targets.clone());
        ctx.bind(pool.intern("need"), self.need.clone());
        ctx.bind(pool.intern("younger"), self.younger.clone());
    }
}

/// Services the resolver and the walk run against.
#[derive(Clone, Copy)]
pub struct Cx<'a> {
    pub pool: &'a StringPool,
    pub store: &'a RecipeStore,
    pub diag: &'a Diagnostics,
    pub fs: &'a dyn FileSystem,
}

impl<'a> Cx<'a> {
    pub fn env(&self) -> Env<'a> {
        Env {
            pool: self.pool,
            globals: &self.store.globals,
            diag: self.diag,
            fs: self.fs,
        }
    }
}

#[derive(Debug, Default)]
pub struct Graph {
    pub files: Vec<FileNode>,
    pub nodes: Vec<RecipeNode>,
    pub stats: Statistics,
    /// Rejected candidates for the target being resolved, for messages.
    pub try_list: Vec<String>,
    /// Resolution memo per (path, implicit recipes allowed).
    already: FxHashMap<(Istr, bool), Resolution>,
    /// Instance memo per (recipe, captures). `None` remembers a rejection.
    already_recipe: FxHashMap<(RecipeId, Captures), Option<NodeId>>,
    file_index: FxHashMap<Istr, FileId>,
    in_progress: FxHashSet<Istr>,
    /// How many times each recipe is on the active resolution stack.
    active: FxHashMap<RecipeId, usize>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, id: FileId) -> &FileNode {
        &self.files[id.0]
    }

    pub fn node(&self, id: NodeId) -> &RecipeNode {
        &self.nodes[id.0]
    }

    pub fn file_id(&self, path: &Istr) -> Option<FileId> {
        self.file_index.get(path).copied()
    }

    /// The node for `path`, created on first reference.
    fn file_for(&mut self, path: &Istr) -> FileId {
        if let Some(id) = self.file_index.get(path) {
            return *id;
        }
        let id = FileId(self.files.len());
        self.files.push(FileNode {
            path: path.clone(),
            producer: None,
            consumers: Vec::new(),
            primary: false,
        });
        self.file_index.insert(path.clone(), id);
        id
    }

    pub fn primaries(&self) -> impl Iterator<Item = FileId> + '_ {
        self.files
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary)
            .map(|(i, _)| FileId(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ck032_file_nodes_unique_per_path() {
        let pool = StringPool::new();
        let mut g = Graph::new();
        let a = g.file_for(&pool.intern("a.o"));
        let b = g.file_for(&pool.intern("b.o"));
        assert_ne!(a, b);
        assert_eq!(g.file_for(&pool.intern("a.o")), a);
        assert_eq!(g.files.len(), 2);
        assert_eq!(g.file_id(&pool.intern("b.o")), Some(b));
    }

    #[test]
    fn test_ck032_backtracks_sum() {
        let s = Statistics {
            backtrack_by_ingredient: 2,
            precondition_rejection: 1,
            backtrack_bad_path: 1,
            backtrack_cache: 9,
            ..Default::default()
        };
        assert_eq!(s.backtracks(), 4);
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"weak_ignored\":0"));
    }
}

//! CK-031: Recipe store.
//!
//! Holds every recipe definition plus the cookbook-wide state the resolver
//! needs: global variables, global flags, cascade ingredients, default
//! targets and hosts. Candidates for a filename come back explicit first,
//! then implicit; within each kind gate-first recipes lead and declaration
//! order breaks ties.

use super::flags::FlagSet;
use super::id::{Builtin, Id};
use super::pool::{Istr, StrList, StringPool};
use super::recipe::{Host, RecipeDef, RecipeId};
use super::symtab::SymbolTable;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct RecipeStore {
    recipes: Vec<Arc<RecipeDef>>,
    explicit: Vec<RecipeId>,
    implicit: Vec<RecipeId>,
    explicit_index: FxHashMap<Istr, Vec<RecipeId>>,
    pub global_flags: FlagSet,
    pub globals: SymbolTable<Id>,
    pub cascades: FxHashMap<Istr, StrList>,
    pub defaults: StrList,
    pub hosts: IndexMap<String, Host>,
}

impl RecipeStore {
    /// An empty store whose global table already knows the builtins.
    pub fn new(pool: &StringPool) -> Self {
        let mut globals = SymbolTable::new();
        for (name, b) in Builtin::all() {
            globals.assign(pool.intern(name), Id::Builtin(b));
        }
        Self {
            recipes: Vec::new(),
            explicit: Vec::new(),
            implicit: Vec::new(),
            explicit_index: FxHashMap::default(),
            global_flags: FlagSet::new(),
            globals,
            cascades: FxHashMap::default(),
            defaults: StrList::new(),
            hosts: IndexMap::new(),
        }
    }

    /// The id the next added recipe will get.
    pub fn next_id(&self) -> RecipeId {
        RecipeId(self.recipes.len())
    }

    /// Add a recipe. Its flags are completed from the global flags, so set
    /// those first.
    pub fn add(&mut self, pool: &StringPool, mut def: RecipeDef) -> RecipeId {
        let id = self.next_id();
        def.id = id;
        def.flags = def.flags.inherit(&self.global_flags);
        if def.is_explicit() {
            for t in &def.targets {
                if let Some(name) = t.literal() {
                    let ids = self.explicit_index.entry(pool.intern(name)).or_default();
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
            self.explicit.push(id);
        } else {
            self.implicit.push(id);
        }
        self.recipes.push(Arc::new(def));
        id
    }

    pub fn get(&self, id: RecipeId) -> Option<&Arc<RecipeDef>> {
        self.recipes.get(id.0)
    }

    pub fn recipes(&self) -> &[Arc<RecipeDef>] {
        &self.recipes
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    fn ordered(&self, ids: &[RecipeId]) -> Vec<Arc<RecipeDef>> {
        let mut defs: Vec<Arc<RecipeDef>> = ids
            .iter()
            .filter_map(|id| self.get(*id).cloned())
            .collect();
        // stable: declaration order survives within each group
        defs.sort_by_key(|d| !d.flags.gate_first());
        defs
    }

    /// Explicit recipes naming `name` as a target.
    pub fn explicit_for(&self, name: &Istr) -> Vec<Arc<RecipeDef>> {
        match self.explicit_index.get(name) {
            Some(ids) => self.ordered(ids),
            None => Vec::new(),
        }
    }

    /// Every implicit recipe, in trial order. The caller runs the match.
    pub fn implicit_candidates(&self) -> Vec<Arc<RecipeDef>> {
        self.ordered(&self.implicit)
    }

    /// Extra ingredients cascaded onto `name`.
    pub fn cascade_for(&self, name: &Istr) -> Option<&StrList> {
        self.cascades.get(name)
    }

    pub fn add_cascade(&mut self, file: Istr, extra: &StrList) {
        let entry = self.cascades.entry(file).or_default();
        for w in extra {
            entry.append_unique(w.clone());
        }
    }

    /// Targets to cook when none are named: the cookbook's `default` list
    /// and recipes flagged `default`, else the first explicit recipe.
    pub fn default_targets(&self, pool: &StringPool) -> StrList {
        let mut out = self.defaults.clone();
        for id in &self.explicit {
            if let Some(def) = self.get(*id) {
                if def.flags.is_default() {
                    for t in &def.targets {
                        if let Some(name) = t.literal() {
                            out.append_unique(pool.intern(name));
                        }
                    }
                }
            }
        }
        if out.is_empty() {
            if let Some(def) = self.explicit.first().and_then(|id| self.get(*id)) {
                for t in &def.targets {
                    if let Some(name) = t.literal() {
                        out.push(pool.intern(name));
                    }
                }
            }
        }
        out
    }
}

//! CK-033: Graph resolver: backtracking search for a derivation.
//!
//! For each requested path the explicit recipes naming it are tried first,
//! then (when allowed) the implicit recipes whose pattern matches it. A
//! candidate applies only if every immediate and deferred ingredient
//! resolves and its precondition holds. A rejected candidate is a
//! backtrack: the next one is tried. A path no recipe applies to is a leaf,
//! fine if the file exists.
//!
//! Results are memoized per (path, implicit allowed) and per (recipe,
//! captures), so each path and each recipe instance is derived once.
//! Rejections that depended on the current resolution stack (a cycle or a
//! self-recursion guard) are not memoized.

use super::{Bindings, Cx, FileId, Graph, NodeId, RecipeNode, Resolution, Statistics};
use crate::core::diag::SubContext;
use crate::core::error::CookError;
use crate::core::interp::OpcodeContext;
use crate::core::matcher::{Captures, CompiledPattern};
use crate::core::opcode::OpcodeList;
use crate::core::pool::{Istr, StrList};
use crate::core::recipe::{EdgeType, IngredientSpec, RecipeDef};
use std::sync::Arc;
use tracing::{debug, trace};

/// Outcome of trying one candidate recipe.
enum Attempt {
    Applied(NodeId),
    NotApplicable,
    Error,
}

/// Outcome of resolving one ingredient list.
enum Ingredients {
    Resolved,
    Backtrack,
    Error,
}

impl Statistics {
    fn applicable(&mut self, explicit: bool) {
        if explicit {
            self.explicit_applicable += 1;
        } else {
            self.implicit_applicable += 1;
        }
    }

    fn not_applicable(&mut self, explicit: bool) {
        if explicit {
            self.explicit_not_applicable += 1;
        } else {
            self.implicit_not_applicable += 1;
        }
    }

    fn ingredients_applicable(&mut self, explicit: bool) {
        if explicit {
            self.explicit_ingredients_applicable += 1;
        } else {
            self.implicit_ingredients_applicable += 1;
        }
    }

    fn ingredients_not_applicable(&mut self, explicit: bool) {
        if explicit {
            self.explicit_ingredients_not_applicable += 1;
        } else {
            self.implicit_ingredients_not_applicable += 1;
        }
    }
}

/// The recipe instance being derived.
struct Instance<'d> {
    def: &'d Arc<RecipeDef>,
    pattern: Arc<CompiledPattern>,
    captures: Captures,
    outputs: Vec<Istr>,
    explicit: bool,
}

impl Graph {
    /// Resolve every requested target. Targets that cannot be derived are
    /// reported with the candidates that were tried.
    pub fn resolve_targets(
        &mut self,
        cx: &Cx<'_>,
        targets: &StrList,
    ) -> Result<Vec<(Istr, Resolution)>, CookError> {
        let mut out = Vec::with_capacity(targets.len());
        for target in targets {
            self.try_list.clear();
            let res = self.resolve_file(cx, target, true)?;
            let mut scp = SubContext::new();
            scp.set_string("File_Name", target.as_str());
            match res {
                Resolution::Success(id) => self.files[id.0].primary = true,
                Resolution::Backtrack => {
                    self.stats.leaf_error += 1;
                    cx.diag.report(None, &scp, "$filename: don't know how to cook");
                    for tried in &self.try_list {
                        let mut line = SubContext::new();
                        line.set_string("MeSsaGe", tried.as_str());
                        cx.diag.warn(None, &line, "    tried $message");
                    }
                }
                Resolution::Error => {
                    cx.diag.report(
                        None,
                        &scp,
                        "$filename: not derived due to errors deriving ingredients",
                    );
                }
            }
            out.push((target.clone(), res));
        }
        Ok(out)
    }

    /// Resolve one path. `implicit_allowed` false restricts candidates to
    /// explicit recipes.
    pub fn resolve_file(
        &mut self,
        cx: &Cx<'_>,
        path: &Istr,
        implicit_allowed: bool,
    ) -> Result<Resolution, CookError> {
        trace!(path = %path, implicit_allowed, "resolve");
        let key = (path.clone(), implicit_allowed);
        if let Some(res) = self.already.get(&key).copied() {
            match res {
                Resolution::Backtrack => self.stats.backtrack_cache += 1,
                Resolution::Error => self.stats.error_cache += 1,
                Resolution::Success(_) => {}
            }
            return Ok(res);
        }
        if self.in_progress.contains(path) {
            self.stats.infinite_loop += 1;
            let mut scp = SubContext::new();
            scp.set_string("File_Name", path.as_str());
            cx.diag
                .warn(None, &scp, "$filename: infinite loop, the file depends on itself");
            return Ok(Resolution::Backtrack);
        }

        self.in_progress.insert(path.clone());
        let taint = self.taint();
        let res = self.resolve_candidates(cx, path, implicit_allowed);
        self.in_progress.remove(path);
        let res = res?;
        if matches!(res, Resolution::Success(_)) || self.taint() == taint {
            self.already.insert(key, res);
        }
        Ok(res)
    }

    /// Counters that move when a result depended on the resolution stack.
    fn taint(&self) -> u64 {
        self.stats.infinite_loop + self.stats.inhibit_self_recursion
    }

    fn resolve_candidates(
        &mut self,
        cx: &Cx<'_>,
        path: &Istr,
        implicit_allowed: bool,
    ) -> Result<Resolution, CookError> {
        // already produced as a sibling output of another instance
        if let Some(id) = self.file_id(path) {
            if self.files[id.0].producer.is_some() {
                self.stats.success_reuse += 1;
                return Ok(Resolution::Success(id));
            }
        }
        self.stats.pattern_match_query += 1;

        let mut candidates = cx.store.explicit_for(path);
        if implicit_allowed {
            candidates.extend(cx.store.implicit_candidates());
        }
        for def in &candidates {
            let Some((which, captures)) = def.matches(path.as_str(), cx.pool) else {
                continue;
            };
            debug!(recipe = %def, path = %path, "trying candidate");
            match self.try_recipe(cx, def, which, captures, path)? {
                Attempt::Applied(_) => {
                    let id = self.file_for(path);
                    return Ok(Resolution::Success(id));
                }
                Attempt::NotApplicable => continue,
                Attempt::Error => return Ok(Resolution::Error),
            }
        }

        if cx.fs.exists(path.as_str()) {
            self.stats.leaf_exists += 1;
            return Ok(Resolution::Success(self.file_for(path)));
        }
        self.stats.leaf_backtrack += 1;
        Ok(Resolution::Backtrack)
    }

    fn try_recipe(
        &mut self,
        cx: &Cx<'_>,
        def: &Arc<RecipeDef>,
        which: usize,
        captures: Captures,
        path: &Istr,
    ) -> Result<Attempt, CookError> {
        let key = (def.id, captures.clone());
        if let Some(memo) = self.already_recipe.get(&key).copied() {
            return Ok(match memo {
                Some(node) => {
                    self.stats.success_reuse += 1;
                    Attempt::Applied(node)
                }
                None => {
                    self.stats.backtrack_cache += 1;
                    Attempt::NotApplicable
                }
            });
        }
        let explicit = def.is_explicit();
        if self.active.get(&def.id).copied().unwrap_or(0) > 0 && !def.flags.recurse() {
            self.stats.inhibit_self_recursion += 1;
            self.stats.not_applicable(explicit);
            self.try_list
                .push(format!("{}: already in use for another target", def));
            return Ok(Attempt::NotApplicable);
        }

        let inst = Instance {
            def,
            pattern: Arc::clone(&def.targets[which]),
            outputs: def
                .outputs(&captures)
                .iter()
                .map(|o| cx.pool.intern(o))
                .collect(),
            captures,
            explicit,
        };
        *self.active.entry(def.id).or_insert(0) += 1;
        let taint = self.taint();
        let res = self.instantiate(cx, &inst, path);
        if let Some(n) = self.active.get_mut(&def.id) {
            *n -= 1;
        }
        let res = res?;
        match res {
            Attempt::Applied(node) => {
                self.already_recipe.insert(key, Some(node));
            }
            Attempt::NotApplicable if self.taint() == taint => {
                self.already_recipe.insert(key, None);
            }
            _ => {}
        }
        Ok(res)
    }

    fn instantiate(
        &mut self,
        cx: &Cx<'_>,
        inst: &Instance<'_>,
        path: &Istr,
    ) -> Result<Attempt, CookError> {
        let def = inst.def;
        let mut vars = Bindings {
            target: inst.outputs.iter().take(1).cloned().collect(),
            targets: inst.outputs.iter().cloned().collect(),
            ..Bindings::default()
        };

        if def.flags.gate_first() {
            if let Some(attempt) = self.precondition(cx, inst, &vars)? {
                return Ok(attempt);
            }
        }

        let mut inputs: Vec<(FileId, EdgeType)> = Vec::new();
        for (stage, specs) in [&def.need1, &def.need2].into_iter().enumerate() {
            match self.ingredients(cx, inst, specs, &vars, &mut inputs)? {
                Ingredients::Resolved => {}
                Ingredients::Backtrack => {
                    self.stats.backtrack_by_ingredient += 1;
                    self.stats.ingredients_not_applicable(inst.explicit);
                    self.stats.not_applicable(inst.explicit);
                    debug!(recipe = %def, path = %path, "rejected: ingredients");
                    return Ok(Attempt::NotApplicable);
                }
                Ingredients::Error => return Ok(Attempt::Error),
            }
            if stage == 0 {
                // deferred ingredients see the immediate ones as `need`
                vars.need = inputs.iter().map(|(f, _)| self.files[f.0].path.clone()).collect();
            }
        }
        vars.need = inputs.iter().map(|(f, _)| self.files[f.0].path.clone()).collect();
        self.stats.ingredients_applicable(inst.explicit);

        if !def.flags.gate_first() {
            if let Some(attempt) = self.precondition(cx, inst, &vars)? {
                return Ok(attempt);
            }
        }

        let single_thread = match &def.single_thread {
            Some(prog) => match self.eval(cx, inst, prog, &vars)? {
                Some(groups) => groups,
                None => {
                    self.stats.error_in_expr += 1;
                    return Ok(Attempt::Error);
                }
            },
            None => StrList::new(),
        };
        let host = match &def.host_binding {
            Some(prog) => match self.eval(cx, inst, prog, &vars)? {
                Some(words) => match words.first() {
                    Some(name) if cx.store.hosts.contains_key(name.as_str()) => {
                        Some(name.to_string())
                    }
                    Some(name) => {
                        let mut scp = SubContext::new();
                        scp.set_string("Name", name.as_str());
                        cx.diag
                            .report(Some(&def.pos), &scp, "host \"$name\" is not defined");
                        return Ok(Attempt::Error);
                    }
                    None => None,
                },
                None => {
                    self.stats.error_in_expr += 1;
                    return Ok(Attempt::Error);
                }
            },
            None => None,
        };

        Ok(Attempt::Applied(self.add_node(
            inst,
            inputs,
            single_thread,
            host,
        )))
    }

    /// Evaluate the precondition. `None` means it holds (or there is none).
    fn precondition(
        &mut self,
        cx: &Cx<'_>,
        inst: &Instance<'_>,
        vars: &Bindings,
    ) -> Result<Option<Attempt>, CookError> {
        let Some(prog) = &inst.def.precondition else {
            return Ok(None);
        };
        match self.eval(cx, inst, prog, vars)? {
            Some(value) if value.is_true() => Ok(None),
            Some(_) => {
                self.stats.precondition_rejection += 1;
                self.stats.not_applicable(inst.explicit);
                self.try_list
                    .push(format!("{}: precondition rejected", inst.def));
                debug!(recipe = %inst.def, "rejected: precondition");
                Ok(Some(Attempt::NotApplicable))
            }
            None => {
                self.stats.error_in_expr += 1;
                Ok(Some(Attempt::Error))
            }
        }
    }

    fn ingredients(
        &mut self,
        cx: &Cx<'_>,
        inst: &Instance<'_>,
        specs: &[IngredientSpec],
        vars: &Bindings,
        inputs: &mut Vec<(FileId, EdgeType)>,
    ) -> Result<Ingredients, CookError> {
        let flags = inst.def.flags;
        for spec in specs {
            let Some(words) = self.eval(cx, inst, &spec.program, vars)? else {
                self.stats.error_in_expr += 1;
                return Ok(Ingredients::Error);
            };
            let edge = match spec.edge {
                EdgeType::Strict if flags.shallow() => EdgeType::Exists,
                e => e,
            };
            for word in &words {
                let name = if flags.stripdot() {
                    strip_dot(word.as_str())
                } else {
                    word.as_str()
                };
                if name.is_empty() || inst.outputs.iter().any(|o| o.as_str() == name) {
                    self.stats.backtrack_bad_path += 1;
                    self.try_list.push(format!(
                        "{}: ingredient \"{}\" is not a usable file name",
                        inst.def, word
                    ));
                    return Ok(Ingredients::Backtrack);
                }
                let name = cx.pool.intern(name);
                match self.ingredient(cx, inst, &name, edge, inputs)? {
                    Ingredients::Resolved => {}
                    other => return Ok(other),
                }
                if flags.cascade() {
                    if let Some(extra) = cx.store.cascade_for(&name) {
                        for more in extra {
                            match self.ingredient(cx, inst, more, edge, inputs)? {
                                Ingredients::Resolved => {}
                                other => return Ok(other),
                            }
                        }
                    }
                }
            }
        }
        Ok(Ingredients::Resolved)
    }

    fn ingredient(
        &mut self,
        cx: &Cx<'_>,
        inst: &Instance<'_>,
        name: &Istr,
        edge: EdgeType,
        inputs: &mut Vec<(FileId, EdgeType)>,
    ) -> Result<Ingredients, CookError> {
        match self.resolve_file(cx, name, inst.def.flags.implicit_allowed())? {
            Resolution::Success(id) => {
                if !inputs.iter().any(|(f, _)| *f == id) {
                    inputs.push((id, edge));
                }
                Ok(Ingredients::Resolved)
            }
            Resolution::Backtrack if edge == EdgeType::Weak => {
                self.stats.weak_ignored += 1;
                debug!(recipe = %inst.def, ingredient = %name, "weak ingredient ignored");
                Ok(Ingredients::Resolved)
            }
            Resolution::Backtrack => {
                self.try_list.push(format!(
                    "{}: no way to make ingredient \"{}\"",
                    inst.def, name
                ));
                Ok(Ingredients::Backtrack)
            }
            Resolution::Error => {
                self.stats.error_by_ingredient += 1;
                Ok(Ingredients::Error)
            }
        }
    }

    fn eval(
        &self,
        cx: &Cx<'_>,
        inst: &Instance<'_>,
        prog: &Arc<OpcodeList>,
        vars: &Bindings,
    ) -> Result<Option<StrList>, CookError> {
        let mut ctx = OpcodeContext::new(Arc::clone(prog))
            .with_match(Arc::clone(&inst.pattern), inst.captures.clone());
        vars.bind(cx.pool, &mut ctx);
        ctx.evaluate(&cx.env())
    }

    fn add_node(
        &mut self,
        inst: &Instance<'_>,
        inputs: Vec<(FileId, EdgeType)>,
        single_thread: StrList,
        host: Option<String>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let outputs: Vec<FileId> = inst.outputs.iter().map(|o| self.file_for(o)).collect();
        for out in &outputs {
            let file = &mut self.files[out.0];
            if file.producer.is_none() {
                file.producer = Some(id);
            }
        }
        for (input, _) in &inputs {
            self.files[input.0].consumers.push(id);
        }
        let def = inst.def;
        if def.out_of_date.is_trivial() && def.up_to_date.is_none() {
            self.stats.phony += 1;
        }
        self.stats.success += 1;
        self.stats.applicable(inst.explicit);
        debug!(recipe = %def, node = id.0, "recipe instance created");
        self.nodes.push(RecipeNode {
            def: Arc::clone(def),
            pattern: Arc::clone(&inst.pattern),
            captures: inst.captures.clone(),
            inputs,
            outputs,
            single_thread,
            host,
        });
        id
    }
}

/// Drop leading `./` components.
fn strip_dot(mut name: &str) -> &str {
    while let Some(rest) = name.strip_prefix("./") {
        name = rest.trim_start_matches('/');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cookbook::store_from_str;
    use crate::core::diag::Diagnostics;
    use crate::core::fs::MemFs;
    use crate::core::pool::StringPool;
    use crate::core::store::RecipeStore;

    struct Fixture {
        pool: StringPool,
        store: RecipeStore,
        diag: Diagnostics,
        fs: MemFs,
    }

    impl Fixture {
        fn new(yaml: &str, files: &[&str]) -> Self {
            let pool = StringPool::new();
            let store = store_from_str(&pool, yaml).unwrap();
            let fs = MemFs::new();
            for f in files {
                fs.write(f, *f);
            }
            Self {
                pool,
                store,
                diag: Diagnostics::new(),
                fs,
            }
        }

        fn cx(&self) -> Cx<'_> {
            Cx {
                pool: &self.pool,
                store: &self.store,
                diag: &self.diag,
                fs: &self.fs,
            }
        }

        fn resolve(&self, targets: &[&str]) -> (Graph, Vec<Resolution>) {
            let mut g = Graph::new();
            let res = g
                .resolve_targets(&self.cx(), &self.pool.list(targets.iter().copied()))
                .unwrap();
            (g, res.into_iter().map(|(_, r)| r).collect())
        }
    }

    fn inputs_of(g: &Graph, target: &str, pool: &StringPool) -> Vec<String> {
        let id = g.file_id(&pool.intern(target)).unwrap();
        let node = g.node(g.file(id).producer.unwrap());
        node.inputs
            .iter()
            .map(|(f, _)| g.file(*f).path.to_string())
            .collect()
    }

    const APP: &str = r#"
version: "1.0"
name: app
recipes:
  - targets: app
    need: app.o
    body: ["gcc -o app app.o"]
  - targets: app.o
    need: app.c
    body: ["gcc -c app.c"]
"#;

    #[test]
    fn test_ck033_explicit_chain() {
        let fx = Fixture::new(APP, &["app.c"]);
        let (g, res) = fx.resolve(&["app"]);
        assert!(matches!(res[0], Resolution::Success(_)));
        assert_eq!(g.stats.success, 2);
        assert_eq!(g.stats.explicit_applicable, 2);
        assert_eq!(g.stats.leaf_exists, 1);
        assert_eq!(g.stats.backtracks(), 0);
        assert_eq!(inputs_of(&g, "app", &fx.pool), vec!["app.o"]);
        assert_eq!(inputs_of(&g, "app.o", &fx.pool), vec!["app.c"]);
        assert_eq!(g.primaries().count(), 1);
    }

    #[test]
    fn test_ck033_backtrack_to_second_implicit_recipe() {
        let yaml = r#"
version: "1.0"
name: lang
recipes:
  - targets: "%.o"
    need: "%.f"
    body: ["f77 -c %.f"]
  - targets: "%.o"
    need: "%.c"
    body: ["cc -c %.c"]
"#;
        let fx = Fixture::new(yaml, &["main.c"]);
        let (g, res) = fx.resolve(&["main.o"]);
        assert!(matches!(res[0], Resolution::Success(_)));
        assert_eq!(g.stats.backtrack_by_ingredient, 1);
        assert_eq!(g.stats.implicit_not_applicable, 1);
        assert_eq!(g.stats.implicit_applicable, 1);
        assert_eq!(inputs_of(&g, "main.o", &fx.pool), vec!["main.c"]);
    }

    #[test]
    fn test_ck033_precondition_rejection_is_one_backtrack() {
        let yaml = r#"
version: "1.0"
name: pre
recipes:
  - targets: out
    if: "[exists never-there]"
    body: ["echo first"]
  - targets: out
    body: ["echo second"]
"#;
        let fx = Fixture::new(yaml, &[]);
        let (g, res) = fx.resolve(&["out"]);
        assert!(matches!(res[0], Resolution::Success(_)));
        assert_eq!(g.stats.precondition_rejection, 1);
        assert_eq!(g.stats.backtracks(), 1);
        let id = g.file_id(&fx.pool.intern("out")).unwrap();
        assert_eq!(g.node(g.file(id).producer.unwrap()).def.id.0, 1);
    }

    #[test]
    fn test_ck033_cycle_terminates() {
        let yaml = r#"
version: "1.0"
name: cycle
recipes:
  - targets: a
    need: b
  - targets: b
    need: a
"#;
        let fx = Fixture::new(yaml, &[]);
        let (g, res) = fx.resolve(&["a"]);
        assert_eq!(res[0], Resolution::Backtrack);
        assert!(g.stats.infinite_loop >= 1);
        assert_eq!(g.stats.leaf_error, 1);
        assert!(fx
            .diag
            .messages()
            .iter()
            .any(|m| m.text.contains("infinite loop")));
        assert!(fx
            .diag
            .messages()
            .iter()
            .any(|m| m.text.contains("don't know how to cook")));
    }

    #[test]
    fn test_ck033_cycle_with_alternative_succeeds() {
        let yaml = r#"
version: "1.0"
name: cycle
recipes:
  - targets: a
    need: b
  - targets: b
    need: a
  - targets: b
    need: seed
"#;
        let fx = Fixture::new(yaml, &["seed"]);
        let (g, res) = fx.resolve(&["a"]);
        assert!(matches!(res[0], Resolution::Success(_)));
        assert_eq!(g.stats.infinite_loop, 1);
        assert_eq!(inputs_of(&g, "b", &fx.pool), vec!["seed"]);
    }

    #[test]
    fn test_ck033_weak_and_exists_ingredients() {
        let yaml = r#"
version: "1.0"
name: weak
recipes:
  - targets: w
    need: w.c
    weak: missing.h
  - targets: e
    need: e.c
    exists: missing.stamp
"#;
        let fx = Fixture::new(yaml, &["w.c", "e.c"]);
        let (g, res) = fx.resolve(&["w", "e"]);
        assert!(matches!(res[0], Resolution::Success(_)));
        assert_eq!(res[1], Resolution::Backtrack);
        assert_eq!(g.stats.weak_ignored, 1);
        assert_eq!(inputs_of(&g, "w", &fx.pool), vec!["w.c"]);
    }

    #[test]
    fn test_ck033_shared_ingredient_memoized() {
        let yaml = r#"
version: "1.0"
name: memo
recipes:
  - targets: app
    need: a.o b.o
  - targets: "%.o"
    need: "%.c common.h"
  - targets: common.h
    need: common.in
"#;
        let fx = Fixture::new(yaml, &["a.c", "b.c", "common.in"]);
        let (g, res) = fx.resolve(&["app", "a.o"]);
        assert!(matches!(res[0], Resolution::Success(_)));
        assert!(matches!(res[1], Resolution::Success(_)));
        // app, a.o, b.o, common.h: common.h derived once
        assert_eq!(g.stats.success, 4);
        assert_eq!(g.nodes.len(), 4);
        let common = g.file_id(&fx.pool.intern("common.h")).unwrap();
        assert_eq!(g.file(common).consumers.len(), 2);
    }

    #[test]
    fn test_ck033_failed_path_memoized() {
        let yaml = r#"
version: "1.0"
name: memo
recipes:
  - targets: x
    need: gone
  - targets: x
    need: gone y
  - targets: y
"#;
        let fx = Fixture::new(yaml, &[]);
        let (g, _) = fx.resolve(&["x"]);
        assert!(g.stats.backtrack_cache >= 1);
        // "gone" once, then "x" itself
        assert_eq!(g.stats.leaf_backtrack, 2);
    }

    #[test]
    fn test_ck033_multi_target_instance_shared() {
        let yaml = r#"
version: "1.0"
name: yacc
recipes:
  - targets: "%.tab.c %.tab.h"
    need: "%.y"
    body: ["yacc -d %.y"]
"#;
        let fx = Fixture::new(yaml, &["gram.y"]);
        let (g, res) = fx.resolve(&["gram.tab.c", "gram.tab.h"]);
        assert!(res.iter().all(|r| matches!(r, Resolution::Success(_))));
        assert_eq!(g.nodes.len(), 1);
        assert_eq!(g.node(NodeId(0)).outputs.len(), 2);
        assert_eq!(g.primaries().count(), 2);
    }

    #[test]
    fn test_ck033_regex_multi_target_instance_shared() {
        let yaml = r#"
version: "1.0"
name: yacc
recipes:
  - targets: ['(.*)\.tab\.c', '(.*)\.tab\.h']
    set: [match-mode-regex]
    need: '\1.y'
    body: ["yacc -d \\1.y"]
"#;
        let fx = Fixture::new(yaml, &["gram.y"]);
        let (g, res) = fx.resolve(&["gram.tab.h", "gram.tab.c"]);
        assert!(res.iter().all(|r| matches!(r, Resolution::Success(_))));
        assert_eq!(g.nodes.len(), 1);
        let outputs: Vec<String> = g
            .node(NodeId(0))
            .outputs
            .iter()
            .map(|f| g.file(*f).path.to_string())
            .collect();
        assert_eq!(outputs, vec!["gram.tab.c", "gram.tab.h"]);
        assert_eq!(inputs_of(&g, "gram.tab.h", &fx.pool), vec!["gram.y"]);
    }

    #[test]
    fn test_ck033_dropping_graph_frees_pool_entries() {
        let yaml = r#"
version: "1.0"
name: objs
recipes:
  - targets: "%.o"
    need: "%.c"
"#;
        let fx = Fixture::new(yaml, &["main.c"]);
        let (g, _) = fx.resolve(&["main.o"]);
        fx.pool.purge();
        let with_graph = fx.pool.len();
        drop(g);
        // main.o, main.c and the capture "main"
        assert!(fx.pool.purge() >= 2);
        assert!(fx.pool.len() < with_graph);
        assert_eq!(fx.pool.intern("main.o").as_str(), "main.o");
    }

    #[test]
    fn test_ck033_gate_first_tried_first() {
        let yaml = r#"
version: "1.0"
name: gate
recipes:
  - targets: "%.o"
    need: "%.c"
  - targets: "%.o"
    set: [gate-first]
    if: "[exists fast-path]"
    need: "%.c"
"#;
        let fx = Fixture::new(yaml, &["m.c", "fast-path"]);
        let (g, _) = fx.resolve(&["m.o"]);
        let id = g.file_id(&fx.pool.intern("m.o")).unwrap();
        assert_eq!(g.node(g.file(id).producer.unwrap()).def.id.0, 1);
        assert_eq!(g.stats.precondition_rejection, 0);
    }

    #[test]
    fn test_ck033_self_recursion_inhibited() {
        let yaml = r#"
version: "1.0"
name: rec
recipes:
  - targets: "%.gz"
    need: "%"
"#;
        let fx = Fixture::new(yaml, &[]);
        let (g, res) = fx.resolve(&["a.gz.gz"]);
        assert_eq!(res[0], Resolution::Backtrack);
        assert_eq!(g.stats.inhibit_self_recursion, 1);
    }

    #[test]
    fn test_ck033_deferred_ingredients_see_need() {
        let yaml = r#"
version: "1.0"
name: deferred
recipes:
  - targets: lib.a
    need: x.o
    deferred: "[fromto \"%.o\" \"%.d\" [need]]"
  - targets: "%.o"
    need: "%.c"
"#;
        let fx = Fixture::new(yaml, &["x.c", "x.d"]);
        let (g, res) = fx.resolve(&["lib.a"]);
        assert!(matches!(res[0], Resolution::Success(_)));
        assert_eq!(inputs_of(&g, "lib.a", &fx.pool), vec!["x.o", "x.d"]);
    }

    #[test]
    fn test_ck033_cascade_and_stripdot() {
        let yaml = r#"
version: "1.0"
name: cascade
cascades:
  parse.c: [parse.h]
recipes:
  - targets: parse.o
    need: ./parse.c
"#;
        let fx = Fixture::new(yaml, &["parse.c", "parse.h"]);
        let (g, _) = fx.resolve(&["parse.o"]);
        assert_eq!(inputs_of(&g, "parse.o", &fx.pool), vec!["parse.c", "parse.h"]);
    }

    #[test]
    fn test_ck033_unknown_host_is_error() {
        let yaml = r#"
version: "1.0"
name: hosts
hosts:
  builder: { addr: 10.0.0.9 }
recipes:
  - targets: remote
    host: builder
  - targets: lost
    host: "[head nowhere]"
"#;
        let fx = Fixture::new(yaml, &[]);
        let (g, res) = fx.resolve(&["remote", "lost"]);
        assert!(matches!(res[0], Resolution::Success(_)));
        assert_eq!(res[1], Resolution::Error);
        let id = g.file_id(&fx.pool.intern("remote")).unwrap();
        assert_eq!(
            g.node(g.file(id).producer.unwrap()).host.as_deref(),
            Some("builder")
        );
    }

    #[test]
    fn test_ck033_strip_dot() {
        assert_eq!(strip_dot("./a.c"), "a.c");
        assert_eq!(strip_dot("././/b"), "b");
        assert_eq!(strip_dot("c/./d"), "c/./d");
    }
}

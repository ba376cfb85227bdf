//! CK-034: Graph walk: runs out-of-date recipe instances in dependency order.
//!
//! Only instances reachable from the primary targets are visited. An
//! instance becomes ready once every instance producing one of its inputs
//! has finished. Ready instances start in node order while a job slot is
//! free and none of their single-thread groups is held. Commands run
//! through a [`JobRunner`]; the walk itself stays on one thread and drives
//! each instance's interpreter through suspend and resume.

use super::{Bindings, Cx, FileId, Graph, NodeId};
use crate::core::diag::SubContext;
use crate::core::error::CookError;
use crate::core::flags::FingerprintMode;
use crate::core::fs::{parent_dir, Mtime};
use crate::core::interp::{OpcodeContext, Status, Step};
use crate::core::opcode::OpcodeList;
use crate::core::pool::{Istr, StrList};
use crate::core::recipe::EdgeType;
use crate::core::state::FingerprintCache;
use crate::fingerprint::eventlog::{BuildEvent, EventSink};
use crate::fingerprint::hasher;
use crate::transport::{Job, JobResult, JobRunner};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// Job slots.
    pub jobs: usize,
    pub keep_going: bool,
    pub force: bool,
    pub dry_run: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            keep_going: false,
            force: false,
            dry_run: false,
        }
    }
}

/// A recipe instance a dry run would execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedRecipe {
    pub recipe: String,
    pub targets: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WalkReport {
    /// Commands started, in start order.
    pub executed: Vec<String>,
    pub ran: u32,
    pub up_to_date: u32,
    pub failed: u32,
    /// Instances not run because an ingredient failed.
    pub skipped: u32,
    pub failed_targets: Vec<String>,
    pub plan: Vec<PlannedRecipe>,
    /// Scheduling stopped after a failure.
    pub stopped: bool,
}

impl WalkReport {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Where the walk sends commands, fingerprints and events.
pub struct WalkIo<'a> {
    pub runner: &'a mut dyn JobRunner,
    pub cache: &'a mut FingerprintCache,
    pub events: &'a mut dyn EventSink,
    pub run_id: String,
}

#[derive(Debug, Clone, Copy, Default)]
struct FileState {
    failed: bool,
    /// Rebuilt in this walk with different contents (or planned to be).
    changed: bool,
    /// A dry run would build it.
    planned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    OutOfDate,
    UpToDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    /// Never ran: an ingredient failed or is missing.
    Skipped,
    /// A body ran and failed.
    Ran(Body),
}

struct Running {
    node: NodeId,
    ctx: OpcodeContext,
    body: Body,
    started: Instant,
}

pub struct Walker<'a> {
    graph: &'a Graph,
    cx: Cx<'a>,
    opts: WalkOptions,
    io: WalkIo<'a>,
    files: Vec<FileState>,
    pending: Vec<usize>,
    dependents: Vec<Vec<NodeId>>,
    ready: BTreeSet<NodeId>,
    running: FxHashMap<usize, Running>,
    held: FxHashSet<Istr>,
    started: Vec<bool>,
    report: WalkReport,
}

impl<'a> Walker<'a> {
    pub fn new(graph: &'a Graph, cx: Cx<'a>, opts: WalkOptions, io: WalkIo<'a>) -> Self {
        Self {
            graph,
            cx,
            opts,
            io,
            files: vec![FileState::default(); graph.files.len()],
            pending: vec![0; graph.nodes.len()],
            dependents: vec![Vec::new(); graph.nodes.len()],
            ready: BTreeSet::new(),
            running: FxHashMap::default(),
            held: FxHashSet::default(),
            started: vec![false; graph.nodes.len()],
            report: WalkReport::default(),
        }
    }

    /// Instances reachable from the primary targets.
    fn wanted(&self) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeId> = self
            .graph
            .primaries()
            .filter_map(|f| self.graph.file(f).producer)
            .collect();
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            for (input, _) in &self.graph.node(n).inputs {
                if let Some(p) = self.graph.file(*input).producer {
                    stack.push(p);
                }
            }
        }
        seen
    }

    pub fn run(mut self) -> Result<WalkReport, CookError> {
        let wanted = self.wanted();
        for &n in &wanted {
            let mut producers: Vec<NodeId> = self
                .graph
                .node(n)
                .inputs
                .iter()
                .filter_map(|(f, _)| self.graph.file(*f).producer)
                .filter(|p| *p != n && wanted.contains(p))
                .collect();
            producers.sort();
            producers.dedup();
            self.pending[n.0] = producers.len();
            for p in producers {
                self.dependents[p.0].push(n);
            }
            if self.pending[n.0] == 0 {
                self.ready.insert(n);
            }
        }
        info!(instances = wanted.len(), jobs = self.opts.jobs, "walk started");

        loop {
            self.schedule()?;
            if self.running.is_empty() {
                break;
            }
            let result = self.io.runner.wait().map_err(CookError::Io)?;
            self.job_finished(result)?;
        }
        for &n in &wanted {
            if !self.started[n.0] {
                self.never_started(n);
            }
        }
        info!(
            ran = self.report.ran,
            up_to_date = self.report.up_to_date,
            failed = self.report.failed,
            "walk finished"
        );
        Ok(self.report)
    }

    fn schedule(&mut self) -> Result<(), CookError> {
        while !self.report.stopped && self.running.len() < self.opts.jobs.max(1) {
            let Some(node) = self.next_ready() else {
                break;
            };
            self.ready.remove(&node);
            self.start(node)?;
        }
        Ok(())
    }

    fn next_ready(&self) -> Option<NodeId> {
        self.ready.iter().copied().find(|n| {
            self.graph
                .node(*n)
                .single_thread
                .iter()
                .all(|g| !self.held.contains(g))
        })
    }

    fn istr(&self, file: FileId) -> &'a Istr {
        let graph: &'a Graph = self.graph;
        &graph.file(file).path
    }

    fn path(&self, file: FileId) -> &'a str {
        self.istr(file).as_str()
    }

    fn start(&mut self, node: NodeId) -> Result<(), CookError> {
        self.started[node.0] = true;
        let graph = self.graph;
        let rn = graph.node(node);
        for &(input, edge) in &rn.inputs {
            let state = self.files[input.0];
            let path = self.path(input);
            match edge {
                EdgeType::Weak => {}
                _ if state.failed => {
                    return self.fail(
                        node,
                        &format!("ingredient {} failed", path),
                        Failure::Skipped,
                    );
                }
                EdgeType::Exists if !state.planned && !self.cx.fs.exists(path) => {
                    return self.fail(
                        node,
                        &format!("ingredient {} does not exist", path),
                        Failure::Skipped,
                    );
                }
                _ => {}
            }
        }

        let (reason, younger) = self.staleness(node)?;
        let def = &rn.def;
        match reason {
            None => match (&def.up_to_date, self.opts.dry_run) {
                (Some(body), false) => self.begin(node, body, Body::UpToDate, StrList::new()),
                _ => self.finish(node, Status::Success, Body::UpToDate, Instant::now()),
            },
            Some(reason) if self.opts.dry_run => {
                self.report.plan.push(PlannedRecipe {
                    recipe: def.to_string(),
                    targets: rn.outputs.iter().map(|o| self.path(*o).to_string()).collect(),
                    reason,
                });
                for out in &rn.outputs {
                    let st = &mut self.files[out.0];
                    st.planned = true;
                    st.changed = true;
                }
                self.release_dependents(node);
                Ok(())
            }
            Some(reason) => {
                info!(recipe = %def, reason = %reason, "cooking");
                for out in &rn.outputs {
                    let path = self.path(*out);
                    if def.flags.unlink() {
                        self.cx.fs.remove_file(path).map_err(CookError::Io)?;
                    }
                    if def.flags.mkdir() {
                        if let Some(dir) = parent_dir(path) {
                            self.cx.fs.mkdir_recursive(dir).map_err(CookError::Io)?;
                        }
                    }
                }
                let target = rn.outputs.first().map(|o| self.path(*o).to_string());
                self.io.events.emit(BuildEvent::RecipeStarted {
                    run_id: self.io.run_id.clone(),
                    recipe: def.name(),
                    target: target.unwrap_or_default(),
                });
                self.begin(node, &def.out_of_date, Body::OutOfDate, younger)
            }
        }
    }

    /// Why `node` must run, and its strict ingredients newer than its
    /// oldest output. No reason means up to date.
    fn staleness(&mut self, node: NodeId) -> Result<(Option<String>, StrList), CookError> {
        let graph = self.graph;
        let rn = graph.node(node);
        let flags = rn.def.flags;
        let mut younger = StrList::new();
        if self.opts.force || flags.force() {
            return Ok((Some("forced".to_string()), younger));
        }

        let mut oldest: Option<Mtime> = None;
        for out in &rn.outputs {
            match self.mtime(*out, flags.fingerprint_mode())? {
                Some(t) => oldest = Some(oldest.map_or(t, |o| o.min(t))),
                None => {
                    return Ok((Some(format!("{} does not exist", self.path(*out))), younger));
                }
            }
        }
        let oldest = oldest.unwrap_or_default();

        let mut reason = None;
        for &(input, edge) in &rn.inputs {
            if edge != EdgeType::Strict {
                continue;
            }
            let path = self.path(input);
            let mode = graph
                .file(input)
                .producer
                .map_or(flags.fingerprint_mode(), |p| {
                    graph.node(p).def.flags.fingerprint_mode()
                });
            let why = if self.files[input.0].changed {
                Some(format!("{} was rebuilt", path))
            } else {
                match self.mtime(input, mode)? {
                    None => Some(format!("{} does not exist", path)),
                    Some(t) if t > oldest => Some(format!("{} is younger", path)),
                    Some(_) => None,
                }
            };
            if let Some(why) = why {
                younger.push(self.istr(input).clone());
                reason.get_or_insert(why);
            }
        }

        if reason.is_none() && flags.ingredients_fingerprint() {
            let hash = self.ingredients_hash(node);
            let first = rn.outputs.first().map(|o| self.path(*o));
            if first.and_then(|p| self.io.cache.ingredients_hash(p)) != Some(hash.as_str()) {
                reason = Some("ingredient list changed".to_string());
            }
        }
        Ok((reason, younger))
    }

    fn ingredients_hash(&self, node: NodeId) -> String {
        let names: Vec<&str> = self
            .graph
            .node(node)
            .inputs
            .iter()
            .map(|(f, _)| self.path(*f))
            .collect();
        hasher::ingredients_hash(&names)
    }

    /// Effective mtime, through the fingerprint cache when fingerprinting.
    fn mtime(&mut self, file: FileId, mode: FingerprintMode) -> Result<Option<Mtime>, CookError> {
        let path = self.path(file);
        let Some(stat) = self.cx.fs.stat(path) else {
            return Ok(None);
        };
        match mode {
            FingerprintMode::Off => Ok(Some(stat.mtime)),
            _ => {
                let eff = self
                    .io
                    .cache
                    .effective(self.cx.fs, path, stat, mode == FingerprintMode::On)
                    .map_err(CookError::Io)?;
                Ok(Some(eff.mtime))
            }
        }
    }

    fn begin(
        &mut self,
        node: NodeId,
        program: &Arc<OpcodeList>,
        body: Body,
        younger: StrList,
    ) -> Result<(), CookError> {
        let graph = self.graph;
        let rn = graph.node(node);
        for group in &rn.single_thread {
            self.held.insert(group.clone());
        }
        let mut ctx = OpcodeContext::new(Arc::clone(program))
            .with_match(Arc::clone(&rn.pattern), rn.captures.clone())
            .with_errok(rn.def.flags.errok());
        let outputs: StrList = rn.outputs.iter().map(|o| self.istr(*o).clone()).collect();
        Bindings {
            target: outputs.iter().take(1).cloned().collect(),
            targets: outputs,
            need: rn.inputs.iter().map(|(f, _)| self.istr(*f).clone()).collect(),
            younger,
        }
        .bind(self.cx.pool, &mut ctx);
        self.advance(node, ctx, body, Instant::now())
    }

    /// Run an instance's program until it suspends on a command or ends.
    fn advance(
        &mut self,
        node: NodeId,
        mut ctx: OpcodeContext,
        body: Body,
        started: Instant,
    ) -> Result<(), CookError> {
        let env = self.cx.env();
        match ctx.run(&env)? {
            Step::Finished(status) => self.finish(node, status, body, started),
            Step::Suspended(req) => {
                let graph = self.graph;
                let rn = graph.node(node);
                if !req.silent && !rn.def.flags.silent() {
                    if rn.def.flags.tell_position() {
                        println!("{}: {}", req.pos, req.command);
                    } else {
                        println!("{}", req.command);
                    }
                }
                self.report.executed.push(req.command.clone());
                let host = rn
                    .host
                    .as_ref()
                    .and_then(|h| self.cx.store.hosts.get(h))
                    .cloned();
                let job = Job {
                    id: node.0,
                    command: req.command,
                    host,
                };
                if let Err(e) = self.io.runner.start(job) {
                    warn!(recipe = %rn.def, "cannot start command: {}", e);
                    ctx.resume(-1, &env)?;
                    return self.advance(node, ctx, body, started);
                }
                self.running.insert(
                    node.0,
                    Running {
                        node,
                        ctx,
                        body,
                        started,
                    },
                );
                Ok(())
            }
        }
    }

    fn job_finished(&mut self, result: JobResult) -> Result<(), CookError> {
        let Some(mut running) = self.running.remove(&result.id) else {
            return Err(CookError::Io(format!("result for unknown job {}", result.id)));
        };
        if !result.output.stdout.is_empty() {
            print!("{}", result.output.stdout);
        }
        if !result.output.stderr.is_empty() {
            eprint!("{}", result.output.stderr);
        }
        running
            .ctx
            .resume(result.output.exit_code, &self.cx.env())?;
        self.advance(running.node, running.ctx, running.body, running.started)
    }

    fn finish(
        &mut self,
        node: NodeId,
        status: Status,
        body: Body,
        started: Instant,
    ) -> Result<(), CookError> {
        let graph = self.graph;
        let rn = graph.node(node);
        let def = &rn.def;
        for group in &rn.single_thread {
            self.held.remove(group);
        }
        let secs = started.elapsed().as_secs_f64();
        if def.flags.meter() {
            println!("{}: {:.3}s", def.name(), secs);
        }
        if status == Status::Failure {
            let message = match body {
                Body::OutOfDate => "recipe body failed",
                Body::UpToDate => "up-to-date body failed",
            };
            return self.fail(node, message, Failure::Ran(body));
        }

        match body {
            Body::UpToDate => {
                self.report.up_to_date += 1;
            }
            Body::OutOfDate => {
                let mode = def.flags.fingerprint_mode();
                for out in &rn.outputs {
                    let changed = self.output_changed(*out, mode)?;
                    self.files[out.0].changed = changed;
                }
                if def.flags.ingredients_fingerprint() {
                    let hash = self.ingredients_hash(node);
                    for out in &rn.outputs {
                        let path = self.path(*out);
                        if let Some(stat) = self.cx.fs.stat(path) {
                            if self.io.cache.get(path).is_none() {
                                self.io
                                    .cache
                                    .effective(self.cx.fs, path, stat, true)
                                    .map_err(CookError::Io)?;
                            }
                            self.io.cache.set_ingredients_hash(path, hash.clone());
                        }
                    }
                }
                self.report.ran += 1;
                info!(recipe = %def, seconds = secs, "cooked");
                let target = rn.outputs.first().map(|o| self.path(*o).to_string());
                self.io.events.emit(BuildEvent::RecipeSucceeded {
                    run_id: self.io.run_id.clone(),
                    recipe: def.name(),
                    target: target.unwrap_or_default(),
                    duration_seconds: secs,
                });
            }
        }
        self.release_dependents(node);
        Ok(())
    }

    /// Did a freshly built output change? Without fingerprints, yes.
    fn output_changed(&mut self, file: FileId, mode: FingerprintMode) -> Result<bool, CookError> {
        let path = self.path(file);
        let Some(stat) = self.cx.fs.stat(path) else {
            return Ok(true);
        };
        match mode {
            FingerprintMode::Off => Ok(true),
            _ => Ok(self
                .io
                .cache
                .effective(self.cx.fs, path, stat, mode == FingerprintMode::On)
                .map_err(CookError::Io)?
                .changed),
        }
    }

    fn fail(&mut self, node: NodeId, message: &str, why: Failure) -> Result<(), CookError> {
        let graph = self.graph;
        let rn = graph.node(node);
        let def = &rn.def;
        let rebuilt = why == Failure::Ran(Body::OutOfDate);
        for out in &rn.outputs {
            let path = self.path(*out);
            if rebuilt && !def.flags.precious() && self.cx.fs.exists(path) {
                if let Err(e) = self.cx.fs.remove_file(path) {
                    warn!("{}", e);
                }
                self.io.cache.forget(path);
            }
            self.files[out.0].failed = true;
            self.report.failed_targets.push(path.to_string());
        }
        let target = rn
            .outputs
            .first()
            .map(|o| self.path(*o).to_string())
            .unwrap_or_default();
        let mut scp = SubContext::new();
        scp.set_string("Target", target.as_str());
        scp.set_string("MeSsaGe", message);
        if why != Failure::Skipped {
            self.report.failed += 1;
            self.cx.diag.report(Some(&def.pos), &scp, "$target: $message");
        } else {
            self.report.skipped += 1;
            warn!(recipe = %def, target = %target, "{}", message);
        }
        self.io.events.emit(BuildEvent::RecipeFailed {
            run_id: self.io.run_id.clone(),
            recipe: def.name(),
            target,
            error: message.to_string(),
        });
        if !self.opts.keep_going {
            self.report.stopped = true;
        }
        self.release_dependents(node);
        Ok(())
    }

    /// A wanted instance the walk stopped before reaching.
    fn never_started(&mut self, node: NodeId) {
        let graph = self.graph;
        let rn = graph.node(node);
        for out in &rn.outputs {
            self.files[out.0].failed = true;
            self.report.failed_targets.push(self.path(*out).to_string());
        }
        self.report.skipped += 1;
        warn!(recipe = %rn.def, "not started after an earlier failure");
    }

    fn release_dependents(&mut self, node: NodeId) {
        for d in &self.dependents[node.0] {
            let n = &mut self.pending[d.0];
            *n = n.saturating_sub(1);
            if *n == 0 {
                self.ready.insert(*d);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cookbook::store_from_str;
    use crate::core::diag::Diagnostics;
    use crate::core::fs::{FileSystem, MemFs};
    use crate::core::pool::StringPool;
    use crate::core::store::RecipeStore;
    use crate::fingerprint::eventlog::MemorySink;
    use crate::transport::ExecOutput;
    use std::collections::VecDeque;

    /// Applies a tiny command language to a [`MemFs`]:
    /// `touch F...` writes fresh contents, `write F TEXT` writes fixed
    /// contents, `absent F` fails if F exists, `fail` fails.
    struct ScriptRunner<'f> {
        fs: &'f MemFs,
        done: VecDeque<JobResult>,
        serial: u32,
        max_in_flight: usize,
        /// Address of every job sent to a host.
        remote: Vec<String>,
    }

    impl<'f> ScriptRunner<'f> {
        fn new(fs: &'f MemFs) -> Self {
            Self {
                fs,
                done: VecDeque::new(),
                serial: 0,
                max_in_flight: 0,
                remote: Vec::new(),
            }
        }

        fn exec(&mut self, command: &str) -> i32 {
            let words: Vec<&str> = command.split_whitespace().collect();
            match words.as_slice() {
                ["touch", files @ ..] => {
                    for f in files {
                        self.serial += 1;
                        self.fs.write(f, format!("{} {}", f, self.serial));
                    }
                    0
                }
                ["write", f, text @ ..] => {
                    self.fs.write(f, text.join(" "));
                    0
                }
                ["absent", f] => i32::from(self.fs.exists(f)),
                ["fail", ..] => 1,
                _ => 0,
            }
        }
    }

    impl JobRunner for ScriptRunner<'_> {
        fn start(&mut self, job: Job) -> Result<(), String> {
            if let Some(host) = &job.host {
                self.remote.push(host.addr.clone());
            }
            let exit_code = self.exec(&job.command);
            self.done.push_back(JobResult {
                id: job.id,
                output: ExecOutput {
                    exit_code,
                    stdout: String::new(),
                    stderr: String::new(),
                },
            });
            self.max_in_flight = self.max_in_flight.max(self.done.len());
            Ok(())
        }

        fn wait(&mut self) -> Result<JobResult, String> {
            self.done.pop_front().ok_or_else(|| "nothing running".to_string())
        }
    }

    struct Kitchen {
        pool: StringPool,
        store: RecipeStore,
        diag: Diagnostics,
        fs: MemFs,
        cache: FingerprintCache,
        remote: Vec<String>,
    }

    impl Kitchen {
        fn new(yaml: &str, files: &[&str]) -> Self {
            let pool = StringPool::new();
            let store = store_from_str(&pool, yaml).unwrap();
            let fs = MemFs::new();
            for f in files {
                fs.write(f, format!("{} source", f));
            }
            Self {
                pool,
                store,
                diag: Diagnostics::new(),
                fs,
                cache: FingerprintCache::new(),
                remote: Vec::new(),
            }
        }

        fn reload(&mut self, yaml: &str) {
            self.store = store_from_str(&self.pool, yaml).unwrap();
        }

        fn cook(&mut self, targets: &[&str], opts: WalkOptions) -> (WalkReport, usize) {
            let cx = Cx {
                pool: &self.pool,
                store: &self.store,
                diag: &self.diag,
                fs: &self.fs,
            };
            let mut graph = Graph::new();
            graph
                .resolve_targets(&cx, &self.pool.list(targets.iter().copied()))
                .unwrap();
            let mut runner = ScriptRunner::new(&self.fs);
            let mut events = MemorySink::default();
            let io = WalkIo {
                runner: &mut runner,
                cache: &mut self.cache,
                events: &mut events,
                run_id: "r-test".to_string(),
            };
            let report = Walker::new(&graph, cx, opts, io).run().unwrap();
            self.remote = std::mem::take(&mut runner.remote);
            (report, runner.max_in_flight)
        }
    }

    const APP: &str = r#"
version: "1.0"
name: app
recipes:
  - targets: app
    need: app.o
    body: ["touch [target]"]
  - targets: "%.o"
    need: "%.c"
    body: ["touch %.o"]
"#;

    #[test]
    fn test_ck034_builds_in_dependency_order() {
        let mut k = Kitchen::new(APP, &["app.c"]);
        let (report, _) = k.cook(&["app"], WalkOptions::default());
        assert_eq!(report.executed, vec!["touch app.o", "touch app"]);
        assert_eq!(report.ran, 2);
        assert!(report.success());
        assert!(k.fs.exists("app"));
    }

    #[test]
    fn test_ck034_second_run_is_up_to_date() {
        let mut k = Kitchen::new(APP, &["app.c"]);
        k.cook(&["app"], WalkOptions::default());
        let (report, _) = k.cook(&["app"], WalkOptions::default());
        assert!(report.executed.is_empty());
        assert_eq!(report.up_to_date, 2);
    }

    #[test]
    fn test_ck034_newer_source_rebuilds_chain() {
        let mut k = Kitchen::new(APP, &["app.c"]);
        k.cook(&["app"], WalkOptions::default());
        k.fs.write("app.c", "edited");
        let (report, _) = k.cook(&["app"], WalkOptions::default());
        assert_eq!(report.executed, vec!["touch app.o", "touch app"]);
    }

    #[test]
    fn test_ck034_force_rebuilds_everything() {
        let mut k = Kitchen::new(APP, &["app.c"]);
        k.cook(&["app"], WalkOptions::default());
        let opts = WalkOptions {
            force: true,
            ..WalkOptions::default()
        };
        let (report, _) = k.cook(&["app"], opts);
        assert_eq!(report.ran, 2);
    }

    const TWO: &str = r#"
version: "1.0"
name: two
recipes:
  - targets: all
    need: x y
  - targets: x
    body: ["fail"]
  - targets: y
    body: ["touch y"]
"#;

    #[test]
    fn test_ck034_first_failure_stops_scheduling() {
        let mut k = Kitchen::new(TWO, &[]);
        let (report, _) = k.cook(&["all"], WalkOptions::default());
        assert_eq!(report.executed, vec!["fail"]);
        assert_eq!(report.failed, 1);
        assert!(report.stopped);
        assert!(!k.fs.exists("y"));
        assert_eq!(k.diag.error_count(), 2);
        // y and all were never reached
        assert_eq!(report.skipped, 2);
        let mut failed = report.failed_targets.clone();
        failed.sort();
        assert_eq!(failed, vec!["all", "x", "y"]);
        assert!(!report.success());
    }

    #[test]
    fn test_ck034_keep_going_builds_independent_work() {
        let mut k = Kitchen::new(TWO, &[]);
        let opts = WalkOptions {
            keep_going: true,
            ..WalkOptions::default()
        };
        let (report, _) = k.cook(&["all"], opts);
        assert_eq!(report.executed, vec!["fail", "touch y"]);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed_targets, vec!["x", "all"]);
        assert!(k.fs.exists("y"));
    }

    #[test]
    fn test_ck034_errok_and_precious() {
        let yaml = r#"
version: "1.0"
name: flags
recipes:
  - targets: lenient
    body:
      - { command: "fail", errok: true }
      - "touch lenient"
  - targets: kept
    set: [precious]
    body: ["fail"]
  - targets: removed
    body: ["fail"]
"#;
        let mut k = Kitchen::new(yaml, &[]);
        k.fs.write("kept", "old");
        k.fs.write("removed", "old");
        let opts = WalkOptions {
            keep_going: true,
            force: true,
            ..WalkOptions::default()
        };
        let (report, _) = k.cook(&["lenient", "kept", "removed"], opts);
        assert_eq!(report.failed, 2);
        assert!(k.fs.exists("lenient"));
        assert!(k.fs.exists("kept"));
        assert!(!k.fs.exists("removed"));
    }

    #[test]
    fn test_ck034_unlink_and_mkdir() {
        let yaml = r#"
version: "1.0"
name: fresh
recipes:
  - targets: out/gen/table.c
    need: table.def
    set: [unlink, mkdir]
    body: ["absent out/gen/table.c", "touch out/gen/table.c"]
"#;
        let mut k = Kitchen::new(yaml, &[]);
        k.fs.write("out/gen/table.c", "stale");
        k.fs.write("table.def", "new");
        let (report, _) = k.cook(&["out/gen/table.c"], WalkOptions::default());
        assert!(report.success());
        assert_eq!(report.ran, 1);
        assert_eq!(k.fs.dirs(), vec!["out/gen"]);
    }

    #[test]
    fn test_ck034_single_thread_groups_serialize() {
        let grouped = r#"
version: "1.0"
name: st
recipes:
  - targets: all
    need: a b
  - targets: a
    single_thread: db
    body: ["touch a"]
  - targets: b
    single_thread: db
    body: ["touch b"]
"#;
        let opts = WalkOptions {
            jobs: 4,
            ..WalkOptions::default()
        };
        let mut k = Kitchen::new(grouped, &[]);
        let (report, max) = k.cook(&["all"], opts);
        // a, b and the bodiless "all"
        assert_eq!(report.ran, 3);
        assert_eq!(max, 1);

        let free = grouped.replace("    single_thread: db\n", "");
        let mut k = Kitchen::new(&free, &[]);
        let (_, max) = k.cook(&["all"], opts);
        assert_eq!(max, 2);
    }

    #[test]
    fn test_ck034_dry_run_plans_without_running() {
        let mut k = Kitchen::new(APP, &["app.c"]);
        let opts = WalkOptions {
            dry_run: true,
            ..WalkOptions::default()
        };
        let (report, _) = k.cook(&["app"], opts);
        assert!(report.executed.is_empty());
        let targets: Vec<_> = report.plan.iter().map(|p| p.targets[0].as_str()).collect();
        assert_eq!(targets, vec!["app.o", "app"]);
        assert_eq!(report.plan[1].reason, "app does not exist");
        assert!(!k.fs.exists("app.o"));
    }

    #[test]
    fn test_ck034_identical_regeneration_keeps_dependents_fresh() {
        let yaml = r#"
version: "1.0"
name: fp
recipes:
  - targets: gen.h
    need: gen.in
    set: [fingerprint]
    body: ["write gen.h same text"]
  - targets: user.o
    need: gen.h
    body: ["touch user.o"]
"#;
        let mut k = Kitchen::new(yaml, &["gen.in"]);
        let (first, _) = k.cook(&["user.o"], WalkOptions::default());
        assert_eq!(first.ran, 2);
        k.fs.write("gen.in", "edited");
        let (second, _) = k.cook(&["user.o"], WalkOptions::default());
        assert_eq!(second.executed, vec!["write gen.h same text"]);
        assert_eq!(second.up_to_date, 1);
        assert!(k.cache.get("gen.h").is_some());
    }

    #[test]
    fn test_ck034_changed_ingredient_list_rebuilds() {
        let before = r#"
version: "1.0"
name: ifp
recipes:
  - targets: lib.a
    need: a.o
    set: [ingredients-fingerprint]
    body: ["touch lib.a"]
"#;
        let mut k = Kitchen::new(before, &["a.o", "b.o"]);
        k.cook(&["lib.a"], WalkOptions::default());
        let (same, _) = k.cook(&["lib.a"], WalkOptions::default());
        assert_eq!(same.ran, 0);
        k.reload(&before.replace("need: a.o", "need: a.o b.o"));
        let (changed, _) = k.cook(&["lib.a"], WalkOptions::default());
        assert_eq!(changed.ran, 1);
    }

    #[test]
    fn test_ck034_events_recorded() {
        let k = Kitchen::new(APP, &["app.c"]);
        let cx = Cx {
            pool: &k.pool,
            store: &k.store,
            diag: &k.diag,
            fs: &k.fs,
        };
        let mut graph = Graph::new();
        graph.resolve_targets(&cx, &k.pool.list(["app.o"])).unwrap();
        let mut runner = ScriptRunner::new(&k.fs);
        let mut events = MemorySink::default();
        let mut cache = FingerprintCache::new();
        let io = WalkIo {
            runner: &mut runner,
            cache: &mut cache,
            events: &mut events,
            run_id: "r-1".to_string(),
        };
        Walker::new(&graph, cx, WalkOptions::default(), io)
            .run()
            .unwrap();
        assert!(matches!(
            &events.events[..],
            [BuildEvent::RecipeStarted { target, .. }, BuildEvent::RecipeSucceeded { .. }]
                if target == "app.o"
        ));
    }

    #[test]
    fn test_ck034_fresh_chain_runs_nothing() {
        let yaml = r#"
version: "1.0"
name: app
recipes:
  - targets: app
    need: app.o
    body: ["link"]
  - targets: app.o
    need: app.c
    body: ["compile"]
"#;
        let mut k = Kitchen::new(yaml, &[]);
        k.fs.write_at("app.c", "int main;", 10);
        k.fs.write_at("app.o", "obj", 20);
        k.fs.write_at("app", "exe", 30);
        let (report, _) = k.cook(&["app"], WalkOptions::default());
        assert!(report.executed.is_empty());
        assert_eq!(report.up_to_date, 2);
        assert_eq!(report.ran, 0);
        assert!(report.success());
    }

    #[test]
    fn test_ck034_regex_multi_target_runs_once() {
        let yaml = r#"
version: "1.0"
name: yacc
recipes:
  - targets: ['(.*)\.tab\.c', '(.*)\.tab\.h']
    set: [match-mode-regex]
    body: ["touch [targets]"]
"#;
        let mut k = Kitchen::new(yaml, &[]);
        let (report, _) = k.cook(&["gram.tab.c", "gram.tab.h"], WalkOptions::default());
        assert_eq!(report.executed, vec!["touch gram.tab.c gram.tab.h"]);
        assert_eq!(report.ran, 1);
        assert!(k.fs.exists("gram.tab.h"));
    }

    #[test]
    fn test_ck034_percent_in_explicit_body_is_literal() {
        let yaml = r#"
version: "1.0"
name: stamp
recipes:
  - targets: stamp
    body: ["touch stamp +%Y"]
"#;
        let mut k = Kitchen::new(yaml, &[]);
        let (report, _) = k.cook(&["stamp"], WalkOptions::default());
        assert_eq!(report.executed, vec!["touch stamp +%Y"]);
        assert_eq!(report.failed, 0);
        assert!(report.success());
        assert_eq!(k.diag.error_count(), 0);
    }

    #[test]
    fn test_ck034_host_bound_takes_local_slot() {
        let yaml = r#"
version: "1.0"
name: farm
hosts:
  builder:
    addr: 10.0.0.7
recipes:
  - targets: all
    need: a b
  - targets: a
    host: builder
    body: ["touch a"]
  - targets: b
    host: builder
    body: ["touch b"]
"#;
        let mut k = Kitchen::new(yaml, &[]);
        let (report, max) = k.cook(&["all"], WalkOptions::default());
        assert_eq!(report.ran, 3);
        assert_eq!(max, 1);
        assert_eq!(k.remote, vec!["10.0.0.7", "10.0.0.7"]);

        let mut k = Kitchen::new(yaml, &[]);
        let opts = WalkOptions {
            jobs: 2,
            ..WalkOptions::default()
        };
        let (_, max) = k.cook(&["all"], opts);
        assert_eq!(max, 2);
    }

    #[test]
    fn test_ck034_failing_uptodate_body_is_a_failure() {
        let yaml = r#"
version: "1.0"
name: check
recipes:
  - targets: stamp
    need: src
    uptodate: ["fail"]
    body: ["touch stamp"]
"#;
        let mut k = Kitchen::new(yaml, &[]);
        k.fs.write_at("src", "s", 10);
        k.fs.write_at("stamp", "old", 20);
        let (report, _) = k.cook(&["stamp"], WalkOptions::default());
        assert_eq!(report.executed, vec!["fail"]);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.up_to_date, 0);
        assert_eq!(report.failed_targets, vec!["stamp"]);
        // the command's exit status and the recipe failure
        assert_eq!(k.diag.error_count(), 2);
        // outputs were not rebuilt, so they stay
        assert_eq!(k.fs.read("stamp").unwrap(), b"old");
    }
}

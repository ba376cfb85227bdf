//! CK-071: Executor, the cook run from cookbook to finished targets.
//!
//! load cookbook → resolve targets → walk → save fingerprints → events

use super::cookbook;
use super::diag::Diagnostics;
use super::error::CookError;
use super::fs::HostFs;
use super::graph::walk::{WalkIo, WalkOptions, WalkReport, Walker};
use super::graph::{Cx, Graph, Resolution, Statistics};
use super::pool::StringPool;
use super::state;
use crate::fingerprint::eventlog::{self, BuildEvent, EventSink, JsonlSink, MemorySink};
use crate::transport::runner::SlotRunner;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Configuration for a cook run.
pub struct CookConfig<'a> {
    pub file: &'a Path,
    /// Requested targets; empty means the cookbook defaults.
    pub targets: &'a [String],
    pub state_dir: &'a Path,
    /// Overrides `options.jobs` from the cookbook.
    pub jobs: Option<usize>,
    pub keep_going: bool,
    pub force: bool,
    pub dry_run: bool,
}

/// Result of a cook run.
#[derive(Debug, Clone, Serialize)]
pub struct CookReport {
    pub run_id: String,
    pub name: String,
    pub targets: Vec<String>,
    pub walk: WalkReport,
    pub stats: Statistics,
    /// Diagnostics reported along the way.
    pub messages: Vec<String>,
    pub total_seconds: f64,
}

impl CookReport {
    pub fn success(&self) -> bool {
        self.walk.success()
    }
}

/// Directory recipes run in: the one holding the cookbook.
pub fn workdir_of(file: &Path) -> PathBuf {
    match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Run the cook loop.
pub fn cook(cfg: &CookConfig) -> Result<CookReport, String> {
    let start = Instant::now();
    let pool = StringPool::new();
    let (book, store) = cookbook::load_store(&pool, cfg.file)?;

    let workdir = workdir_of(cfg.file);
    let jobs = cfg.jobs.or(book.options.jobs).unwrap_or(1).max(1);
    let opts = WalkOptions {
        jobs,
        keep_going: cfg.keep_going || book.options.keep_going,
        force: cfg.force,
        dry_run: cfg.dry_run,
    };

    let targets = if cfg.targets.is_empty() {
        store.default_targets(&pool)
    } else {
        pool.list(cfg.targets.iter().map(String::as_str))
    };
    if targets.is_empty() {
        return Err("no targets named and the cookbook has no default".to_string());
    }
    let target_names: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
    tracing::info!(cookbook = %cfg.file.display(), targets = %targets, jobs, "cooking");

    let fs = HostFs::new(&workdir);
    let diag = Diagnostics::new();
    let cx = Cx {
        pool: &pool,
        store: &store,
        diag: &diag,
        fs: &fs,
    };

    let mut graph = Graph::new();
    let resolved = graph
        .resolve_targets(&cx, &targets)
        .map_err(|e| e.to_string())?;
    let unknown: Vec<String> = resolved
        .iter()
        .filter(|(_, r)| !matches!(r, Resolution::Success(_)))
        .map(|(t, _)| t.to_string())
        .collect();
    if !unknown.is_empty() {
        let mut lines: Vec<String> = diag.messages().into_iter().map(|m| m.text).collect();
        lines.push(CookError::UnknownTargets(unknown).to_string());
        return Err(lines.join("\n"));
    }

    let run_id = eventlog::generate_run_id();
    let mut cache = state::load_cache(cfg.state_dir)?;
    let mut runner = SlotRunner::new(&workdir, jobs)?;
    let mut jsonl = JsonlSink::new(cfg.state_dir);
    let mut scratch = MemorySink::default();
    let events: &mut dyn EventSink = if cfg.dry_run {
        &mut scratch
    } else {
        &mut jsonl
    };

    events.emit(BuildEvent::BuildStarted {
        run_id: run_id.clone(),
        cook_version: env!("CARGO_PKG_VERSION").to_string(),
        targets: target_names.clone(),
    });

    let io = WalkIo {
        runner: &mut runner,
        cache: &mut cache,
        events: &mut *events,
        run_id: run_id.clone(),
    };
    let walk = Walker::new(&graph, cx, opts, io)
        .run()
        .map_err(|e| e.to_string())?;

    let total_seconds = start.elapsed().as_secs_f64();
    events.emit(BuildEvent::BuildCompleted {
        run_id: run_id.clone(),
        recipes_run: walk.ran,
        recipes_up_to_date: walk.up_to_date,
        recipes_failed: walk.failed,
        total_seconds,
    });

    if !cfg.dry_run && cache.is_dirty() {
        state::save_cache(cfg.state_dir, &cache)?;
    }
    let stats = graph.stats.clone();
    drop(graph);
    let freed = pool.purge();
    tracing::debug!(freed, remaining = pool.len(), "string pool purged");

    Ok(CookReport {
        run_id,
        name: book.name,
        targets: target_names,
        walk,
        stats,
        messages: diag.messages().into_iter().map(|m| m.text).collect(),
        total_seconds,
    })
}

//! CK-080: CLI subcommands: init, validate, plan, cook, check, status, completions.

use crate::core::cookbook::{self, DEFAULT_COOKBOOK};
use crate::core::executor::{self, CookConfig, CookReport};
use crate::core::{planner, state};
use crate::fingerprint::drift;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "cook",
    version,
    about = "Dependency-driven build tool: pattern recipes, backtracking resolution, BLAKE3 fingerprints"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter cookbook
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Check a cookbook without cooking anything
    Validate {
        /// Path to the cookbook
        #[arg(short, long, default_value = DEFAULT_COOKBOOK)]
        file: PathBuf,
    },

    /// Show which recipes would run
    Plan {
        /// Targets to plan (default: the cookbook defaults)
        targets: Vec<String>,

        /// Path to the cookbook
        #[arg(short, long, default_value = DEFAULT_COOKBOOK)]
        file: PathBuf,

        /// State directory
        #[arg(long, default_value = ".cook")]
        state_dir: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Bring targets up to date
    Cook {
        /// Targets to cook (default: the cookbook defaults)
        targets: Vec<String>,

        /// Path to the cookbook
        #[arg(short, long, default_value = DEFAULT_COOKBOOK)]
        file: PathBuf,

        /// Commands run at once
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Keep cooking independent targets after a failure
        #[arg(short, long)]
        keep_going: bool,

        /// Rebuild every target whether out of date or not
        #[arg(long)]
        force: bool,

        /// Show what would run without running it
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Print resolver statistics as JSON
        #[arg(long)]
        stats: bool,

        /// State directory
        #[arg(long, default_value = ".cook")]
        state_dir: PathBuf,
    },

    /// Compare files on disk to their cached fingerprints
    Check {
        /// Path to the cookbook (files are relative to its directory)
        #[arg(short, long, default_value = DEFAULT_COOKBOOK)]
        file: PathBuf,

        /// State directory
        #[arg(long, default_value = ".cook")]
        state_dir: PathBuf,

        /// Exit non-zero if any file drifted
        #[arg(long)]
        tripwire: bool,
    },

    /// List the fingerprint cache
    Status {
        /// State directory
        #[arg(long, default_value = ".cook")]
        state_dir: PathBuf,
    },

    /// Print shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Plan {
            targets,
            file,
            state_dir,
            json,
        } => cmd_plan(&file, &targets, &state_dir, json),
        Commands::Cook {
            targets,
            file,
            jobs,
            keep_going,
            force,
            dry_run,
            stats,
            state_dir,
        } => {
            let cfg = CookConfig {
                file: &file,
                targets: &targets,
                state_dir: &state_dir,
                jobs,
                keep_going,
                force,
                dry_run,
            };
            cmd_cook(&cfg, stats)
        }
        Commands::Check {
            file,
            state_dir,
            tripwire,
        } => cmd_check(&file, &state_dir, tripwire),
        Commands::Status { state_dir } => cmd_status(&state_dir),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "cook", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let book_path = path.join(DEFAULT_COOKBOOK);
    if book_path.exists() {
        return Err(format!("{} already exists", book_path.display()));
    }

    let template = r#"version: "1.0"
name: my-project
set: [fingerprint]

variables:
  cc: cc
  cflags: [-O2]
  sources: [main.c]

default: [app]

recipes:
  - targets: app
    need: "[fromto \"%.c\" \"%.o\" [sources]]"
    body:
      - "[cc] -o app [need]"

  - targets: "%.o"
    need: "%.c"
    body:
      - "[cc] [cflags] -c %.c -o %.o"
"#;
    std::fs::write(&book_path, template)
        .map_err(|e| format!("cannot write {}: {}", book_path.display(), e))?;

    println!("Initialized cook project at {}", path.display());
    println!("  Created: {}", book_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let book = cookbook::parse_cookbook_file(file)?;
    let errors = cookbook::validate_cookbook(&book);

    if errors.is_empty() {
        println!(
            "OK: {} ({} recipes, {} hosts)",
            book.name,
            book.recipes.len(),
            book.hosts.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

fn cmd_plan(file: &Path, targets: &[String], state_dir: &Path, json: bool) -> Result<(), String> {
    let cfg = CookConfig {
        file,
        targets,
        state_dir,
        jobs: None,
        keep_going: true,
        force: false,
        dry_run: true,
    };
    let report = executor::cook(&cfg)?;
    let plan = planner::plan(&report.name, &report.walk);
    if json {
        let out =
            serde_json::to_string_pretty(&plan).map_err(|e| format!("JSON error: {}", e))?;
        println!("{}", out);
    } else {
        print!("{}", planner::render(&plan));
    }
    Ok(())
}

fn cmd_cook(cfg: &CookConfig, stats: bool) -> Result<(), String> {
    let report = executor::cook(cfg)?;

    if stats {
        let out = serde_json::to_string_pretty(&report.stats)
            .map_err(|e| format!("JSON error: {}", e))?;
        println!("{}", out);
    }

    if cfg.dry_run {
        print!("{}", planner::render(&planner::plan(&report.name, &report.walk)));
        return Ok(());
    }

    summarize(&report)
}

fn summarize(report: &CookReport) -> Result<(), String> {
    let walk = &report.walk;
    if !report.success() {
        println!(
            "Cook completed with errors: {} cooked, {} up to date, {} FAILED, {} skipped ({:.1}s)",
            walk.ran, walk.up_to_date, walk.failed, walk.skipped, report.total_seconds
        );
        for t in &walk.failed_targets {
            println!("  failed: {}", t);
        }
        return Err(format!("{} recipe(s) failed", walk.failed.max(1)));
    }

    println!(
        "Cook complete: {} cooked, {} up to date ({:.1}s).",
        walk.ran, walk.up_to_date, report.total_seconds
    );
    Ok(())
}

fn cmd_check(file: &Path, state_dir: &Path, tripwire_mode: bool) -> Result<(), String> {
    let cache = state::load_cache(state_dir)?;
    let root = executor::workdir_of(file);
    println!("Checking {} fingerprints...", cache.files.len());

    let findings = drift::detect_drift(&cache, &root);
    for f in &findings {
        println!("  DRIFTED: {} ({})", f.path, f.detail);
        println!("    Expected: {}", f.expected_hash);
        println!("    Actual:   {}", f.actual_hash);
    }

    if findings.is_empty() {
        println!("No drift detected.");
        return Ok(());
    }
    println!();
    println!("Drift detected: {} file(s)", findings.len());
    if tripwire_mode {
        return Err(format!("{} drift finding(s)", findings.len()));
    }
    Ok(())
}

fn cmd_status(state_dir: &Path) -> Result<(), String> {
    let path = state::cache_file_path(state_dir);
    if !path.exists() {
        println!("No state found. Run `cook` first.");
        return Ok(());
    }
    let cache = state::load_cache(state_dir)?;
    println!("Fingerprints: {}", path.display());
    println!("  Generated: {}", cache.generated_at);
    println!("  Generator: {}", cache.generator);
    println!("  Files: {}", cache.files.len());
    for (name, rec) in &cache.files {
        let ingredients = if rec.ingredients.is_some() {
            " [ingredients]"
        } else {
            ""
        };
        println!("    {}: {}{}", name, rec.fingerprint, ingredients);
    }
    Ok(())
}

//! CK-070: Cookbook parsing, validation and compilation.
//!
//! A cookbook is a YAML file (`Howto.yaml` by default) describing global
//! variables, functions, hosts and recipes. Loading is three steps: parse
//! (plus includes), validate (every problem reported at once), compile into
//! a [`RecipeStore`].

use super::compiler::{self, Compiler, Statement};
use super::error::CookError;
use super::flags::{parse_flags, FlagSet, MatchMode};
use super::id::{FunctionDef, Id};
use super::matcher::{self, MatchMethod};
use super::opcode::OpcodeList;
use super::pool::StringPool;
use super::position::ExprPosition;
use super::recipe::{EdgeType, Host, IngredientSpec, RecipeDef, RecipeId};
use super::store::RecipeStore;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Cookbook file used when none is named.
pub const DEFAULT_COOKBOOK: &str = "Howto.yaml";

// ============================================================================
// Schema
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cookbook {
    /// Schema version (must be "1.0")
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Global flags
    #[serde(default)]
    pub set: Vec<String>,

    #[serde(default)]
    pub variables: IndexMap<String, Words>,

    /// Function name to expression; arguments arrive as `[arg]`
    #[serde(default)]
    pub functions: IndexMap<String, String>,

    /// File to extra ingredients of every recipe that needs it
    #[serde(default)]
    pub cascades: IndexMap<String, Words>,

    #[serde(default)]
    pub hosts: IndexMap<String, Host>,

    /// Targets cooked when none are named
    #[serde(default)]
    pub default: Words,

    /// Glob patterns of further cookbooks, relative to this one
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub options: Options,

    #[serde(default)]
    pub recipes: Vec<RecipeEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default)]
    pub keep_going: bool,
}

/// Words written either as one string or as a YAML list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Words {
    Text(String),
    List(Vec<String>),
}

impl Default for Words {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl Words {
    /// Plain words, split on whitespace.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Text(s) => s.split_whitespace().map(str::to_string).collect(),
            Self::List(v) => v
                .iter()
                .flat_map(|s| s.split_whitespace())
                .map(str::to_string)
                .collect(),
        }
    }

    /// The words as one expression.
    pub fn expression(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::List(v) => v.join(" "),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_vec().is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeEntry {
    /// Target patterns
    pub targets: Words,

    /// Immediate strict ingredients
    #[serde(default)]
    pub need: Option<Words>,

    /// Immediate weak ingredients
    #[serde(default)]
    pub weak: Option<Words>,

    /// Immediate exists-only ingredients
    #[serde(default)]
    pub exists: Option<Words>,

    /// Deferred strict ingredients, evaluated with `[need]` bound
    #[serde(default)]
    pub deferred: Option<Words>,

    /// Recipe flags
    #[serde(default)]
    pub set: Vec<String>,

    /// Precondition expression
    #[serde(default, rename = "if")]
    pub precondition: Option<String>,

    /// Expression naming mutual-exclusion groups
    #[serde(default)]
    pub single_thread: Option<String>,

    /// Expression naming a host from `hosts`
    #[serde(default)]
    pub host: Option<String>,

    /// Statements run when out of date
    #[serde(default)]
    pub body: Vec<Statement>,

    /// Statements run when up to date
    #[serde(default)]
    pub uptodate: Option<Vec<Statement>>,

    /// Line of the entry in its file, 0 when unknown
    #[serde(skip)]
    pub line: u32,

    /// File the entry came from
    #[serde(skip)]
    pub file: Option<String>,
}

impl RecipeEntry {
    fn label(&self) -> String {
        let targets = self.targets.to_vec().join(" ");
        match (&self.file, self.line) {
            (Some(f), l) if l > 0 => format!("{}: {}: recipe {}", f, l, targets),
            _ => format!("recipe {}", targets),
        }
    }

    fn ingredient_lists(&self) -> [(&Option<Words>, EdgeType, bool); 4] {
        [
            (&self.need, EdgeType::Strict, false),
            (&self.weak, EdgeType::Weak, false),
            (&self.exists, EdgeType::Exists, false),
            (&self.deferred, EdgeType::Strict, true),
        ]
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a cookbook file from disk, following its includes.
pub fn parse_cookbook_file(path: &Path) -> Result<Cookbook, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let mut book = parse_cookbook(&content)?;
    stamp(&mut book, &content, &path.display().to_string());

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for pattern in book.include.clone() {
        let full = base.join(&pattern);
        let entries = glob::glob(&full.to_string_lossy())
            .map_err(|e| format!("bad include pattern {}: {}", pattern, e))?;
        let mut found: Vec<_> = entries.filter_map(Result::ok).collect();
        found.sort();
        for inc in found {
            tracing::debug!(include = %inc.display(), "including cookbook");
            let part = parse_cookbook_file(&inc)?;
            merge(&mut book, part);
        }
    }
    Ok(book)
}

/// Parse a cookbook from a string.
pub fn parse_cookbook(yaml: &str) -> Result<Cookbook, String> {
    let mut book: Cookbook =
        serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))?;
    stamp(&mut book, yaml, DEFAULT_COOKBOOK);
    Ok(book)
}

/// Record where each recipe entry starts. Entries are matched, in order,
/// to the lines holding their `targets` key.
fn stamp(book: &mut Cookbook, text: &str, file: &str) {
    let lines: Vec<u32> = text
        .lines()
        .enumerate()
        .filter(|(_, l)| {
            let t = l.trim_start();
            let t = t.strip_prefix("- ").map_or(t, str::trim_start);
            t.starts_with("targets:")
        })
        .map(|(i, _)| u32::try_from(i + 1).unwrap_or(0))
        .collect();
    let matched = lines.len() == book.recipes.len();
    for (i, r) in book.recipes.iter_mut().enumerate() {
        r.file = Some(file.to_string());
        r.line = if matched { lines[i] } else { 0 };
    }
}

/// Append an included cookbook. Names already defined keep their value.
fn merge(book: &mut Cookbook, part: Cookbook) {
    for (k, v) in part.variables {
        book.variables.entry(k).or_insert(v);
    }
    for (k, v) in part.functions {
        book.functions.entry(k).or_insert(v);
    }
    for (k, v) in part.cascades {
        book.cascades.entry(k).or_insert(v);
    }
    for (k, v) in part.hosts {
        book.hosts.entry(k).or_insert(v);
    }
    let mut defaults = book.default.to_vec();
    defaults.extend(part.default.to_vec());
    book.default = Words::List(defaults);
    book.recipes.extend(part.recipes);
}

// ============================================================================
// Validation
// ============================================================================

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Validate a parsed cookbook. Returns every error found (empty = valid).
pub fn validate_cookbook(book: &Cookbook) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut err = |message: String| errors.push(ValidationError { message });

    if book.version != "1.0" {
        err(format!("version must be \"1.0\", got \"{}\"", book.version));
    }
    if book.name.is_empty() {
        err("name must not be empty".to_string());
    }
    let global = match parse_flags(&book.set) {
        Ok(f) => f,
        Err(e) => {
            err(format!("set: {}", e));
            FlagSet::new()
        }
    };
    if book.options.jobs == Some(0) {
        err("options.jobs must be at least 1".to_string());
    }

    // scratch pool: validation only needs the programs to compile
    let pool = StringPool::new();
    let mode = global.match_mode();
    for (name, text) in &book.functions {
        let c = Compiler::new(&pool, mode, ExprPosition::builtin());
        if let Err(e) = c.expression(name, text) {
            err(format!("function {}: {}", name, e));
        }
    }

    for r in &book.recipes {
        let label = r.label();
        if r.targets.is_empty() {
            err(format!("{}: has no targets", label));
            continue;
        }
        let flags = match parse_flags(&r.set) {
            Ok(f) => f.inherit(&global),
            Err(e) => {
                err(format!("{}: {}", label, e));
                continue;
            }
        };
        let mode = flags.match_mode();
        let pos = ExprPosition::builtin();
        let mut bound = u16::MAX;
        let mut all_literal = true;
        let mut masks = Vec::new();
        let mut rebuildable = true;
        let targets = r.targets.to_vec();
        for t in &targets {
            match matcher::compile(mode, t, &pos) {
                Ok(p) => {
                    bound &= p.usage_mask();
                    all_literal &= p.literal().is_some();
                    masks.push(p.usage_mask());
                    rebuildable &= p.rebuilds_from_groups();
                }
                Err(e) => err(format!("{}: {}", label, e)),
            }
        }
        if all_literal {
            bound = 0;
        }
        if mode == MatchMode::Regex
            && targets.len() > 1
            && (!rebuildable || masks.windows(2).any(|w| w[0] != w[1]))
        {
            err(format!(
                "{}: regex targets of one recipe must be literal text around the same capture groups",
                label
            ));
        }

        for (words, _, _) in r.ingredient_lists() {
            let Some(words) = words else { continue };
            let text = words.expression();
            let used = compiler::expression_placeholders(mode, &text);
            if used & !bound != 0 {
                err(format!(
                    "{}: ingredients \"{}\" use placeholders the targets do not bind",
                    label, text
                ));
            }
        }

        let c = Compiler::new(&pool, mode, pos);
        let mut exprs: Vec<String> = r
            .ingredient_lists()
            .iter()
            .filter_map(|(w, _, _)| w.as_ref().map(Words::expression))
            .collect();
        exprs.extend(r.precondition.iter().cloned());
        exprs.extend(r.single_thread.iter().cloned());
        exprs.extend(r.host.iter().cloned());
        for text in &exprs {
            if let Err(e) = c.expression("check", text) {
                err(format!("{}: {}", label, e));
            }
        }
        if let Err(e) = c.body("check", &r.body) {
            err(format!("{}: {}", label, e));
        }
        if let Some(up) = &r.uptodate {
            if let Err(e) = c.body("check", up) {
                err(format!("{}: {}", label, e));
            }
        }

        if let Some(host) = &r.host {
            let host = host.trim();
            if !host.is_empty()
                && !host.contains(['[', ' ', '"'])
                && !book.hosts.contains_key(host)
            {
                err(format!("{}: unknown host '{}'", label, host));
            }
        }
    }

    errors
}

// ============================================================================
// Compilation
// ============================================================================

/// Compile a validated cookbook into a recipe store.
pub fn compile_cookbook(pool: &StringPool, book: &Cookbook) -> Result<RecipeStore, CookError> {
    let mut store = RecipeStore::new(pool);
    store.global_flags = parse_flags(&book.set).map_err(CookError::Cookbook)?;
    let mode = store.global_flags.match_mode();

    for (name, words) in &book.variables {
        let value = pool.list(words.to_vec().iter().map(String::as_str));
        store.globals.assign(pool.intern(name), Id::Variable(value));
    }
    for (name, text) in &book.functions {
        let c = Compiler::new(pool, mode, ExprPosition::builtin());
        let program = Arc::new(c.expression(name, text)?);
        let name = pool.intern(name);
        store.globals.assign(
            name.clone(),
            Id::Function(Arc::new(FunctionDef { name, program })),
        );
    }
    for (file, extra) in &book.cascades {
        let extra = pool.list(extra.to_vec().iter().map(String::as_str));
        store.add_cascade(pool.intern(file), &extra);
    }
    store.hosts = book.hosts.clone();
    store.defaults = pool.list(book.default.to_vec().iter().map(String::as_str));

    for r in &book.recipes {
        let def = compile_recipe(pool, &store.global_flags, r)?;
        store.add(pool, def);
    }
    Ok(store)
}

fn compile_recipe(
    pool: &StringPool,
    global: &FlagSet,
    r: &RecipeEntry,
) -> Result<RecipeDef, CookError> {
    let own = parse_flags(&r.set).map_err(CookError::Cookbook)?;
    let mode = own.inherit(global).match_mode();
    let pos = match &r.file {
        Some(f) => ExprPosition::new(pool.intern(f), r.line),
        None => ExprPosition::builtin(),
    };
    let name = r.targets.to_vec().join(" ");
    let targets = r
        .targets
        .to_vec()
        .iter()
        .map(|t| matcher::compile(mode, t, &pos).map(Arc::new))
        .collect::<Result<Vec<_>, _>>()?;

    let c = Compiler::new(pool, mode, pos.clone());
    let expr = |label: &str, text: &str| -> Result<Arc<OpcodeList>, CookError> {
        c.expression(&format!("{} {}", name, label), text).map(Arc::new)
    };

    let mut need1 = Vec::new();
    let mut need2 = Vec::new();
    for (words, edge, deferred) in r.ingredient_lists() {
        let Some(words) = words else { continue };
        let spec = IngredientSpec {
            program: expr("ingredients", &words.expression())?,
            edge,
        };
        if deferred {
            need2.push(spec);
        } else {
            need1.push(spec);
        }
    }

    Ok(RecipeDef {
        id: RecipeId(0),
        targets,
        need1,
        need2,
        flags: own,
        precondition: r.precondition.as_deref().map(|t| expr("if", t)).transpose()?,
        single_thread: r
            .single_thread
            .as_deref()
            .map(|t| expr("single-thread", t))
            .transpose()?,
        host_binding: r.host.as_deref().map(|t| expr("host", t)).transpose()?,
        out_of_date: Arc::new(c.body(&format!("{} body", name), &r.body)?),
        up_to_date: r
            .uptodate
            .as_ref()
            .map(|b| c.body(&format!("{} uptodate", name), b).map(Arc::new))
            .transpose()?,
        pos,
    })
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse, validate and compile a cookbook file.
pub fn load_store(pool: &StringPool, path: &Path) -> Result<(Cookbook, RecipeStore), String> {
    let book = parse_cookbook_file(path)?;
    let errors = validate_cookbook(&book);
    if !errors.is_empty() {
        return Err(join_errors(&errors));
    }
    let store = compile_cookbook(pool, &book).map_err(|e| e.to_string())?;
    Ok((book, store))
}

/// Parse, validate and compile cookbook text.
pub fn store_from_str(pool: &StringPool, yaml: &str) -> Result<RecipeStore, String> {
    let book = parse_cookbook(yaml)?;
    let errors = validate_cookbook(&book);
    if !errors.is_empty() {
        return Err(join_errors(&errors));
    }
    compile_cookbook(pool, &book).map_err(|e| e.to_string())
}

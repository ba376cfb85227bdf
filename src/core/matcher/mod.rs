//! CK-010: Match engine.
//!
//! A recipe target pattern is compiled once and then executed against every
//! candidate filename the resolver asks about. A successful match yields
//! [`Captures`], which the recipe uses to build its ingredient names and
//! which, together with the recipe, identify one recipe instance.

mod cook_mode;
mod regex_mode;

pub use cook_mode::CookPattern;
pub use regex_mode::RegexPattern;

use super::error::CookError;
use super::flags::MatchMode;
use super::pool::{Istr, StringPool};
use super::position::ExprPosition;

/// Number of capture slots (`%0`..`%9`, `\0`..`\9`).
pub const CAPTURE_SLOTS: usize = 10;

/// Text bound to each placeholder by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Captures {
    pub fill: [Option<Istr>; CAPTURE_SLOTS],
}

impl Captures {
    pub fn get(&self, n: usize) -> Option<&Istr> {
        self.fill.get(n).and_then(Option::as_ref)
    }

    pub fn set(&mut self, n: usize, value: Istr) {
        if let Some(slot) = self.fill.get_mut(n) {
            *slot = Some(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fill.iter().all(Option::is_none)
    }

    /// Bit `n` is set when slot `n` holds a value.
    pub fn mask(&self) -> u16 {
        self.fill
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_some())
            .fold(0, |m, (i, _)| m | (1 << i))
    }
}

/// The capability set every match mode provides.
pub trait MatchMethod {
    fn name(&self) -> &'static str;

    /// Match a whole filename. `None` means "does not apply", never an error.
    fn execute(&self, filename: &str, pool: &StringPool) -> Option<Captures>;

    /// Rebuild the target side of the pattern from captures. For a match
    /// produced by [`MatchMethod::execute`] this is the filename itself.
    fn reconstruct_lhs(&self, captures: &Captures) -> String;

    /// Fill the placeholders of an ingredient word from captures.
    fn reconstruct_rhs(&self, text: &str, captures: &Captures) -> Result<String, String>;

    /// Placeholders the target pattern binds, one bit per slot.
    fn usage_mask(&self) -> u16;
}

#[derive(Debug, Clone)]
pub enum CompiledPattern {
    Cook(CookPattern),
    Regex(RegexPattern),
}

impl CompiledPattern {
    fn method(&self) -> &dyn MatchMethod {
        match self {
            CompiledPattern::Cook(p) => p,
            CompiledPattern::Regex(p) => p,
        }
    }

    /// The literal filename, when the pattern has no placeholders.
    pub fn literal(&self) -> Option<&str> {
        match self {
            CompiledPattern::Cook(p) => p.literal(),
            CompiledPattern::Regex(_) => None,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            CompiledPattern::Cook(p) => p.source(),
            CompiledPattern::Regex(p) => p.source(),
        }
    }

    /// Whether a target name can be rebuilt from captures that lack the
    /// whole-name slot. Cook patterns always can.
    pub fn rebuilds_from_groups(&self) -> bool {
        match self {
            CompiledPattern::Cook(_) => true,
            CompiledPattern::Regex(p) => p.rebuilds_from_groups(),
        }
    }

    pub fn mode(&self) -> MatchMode {
        match self {
            CompiledPattern::Cook(_) => MatchMode::Cook,
            CompiledPattern::Regex(_) => MatchMode::Regex,
        }
    }
}

impl MatchMethod for CompiledPattern {
    fn name(&self) -> &'static str {
        self.method().name()
    }

    fn execute(&self, filename: &str, pool: &StringPool) -> Option<Captures> {
        self.method().execute(filename, pool)
    }

    fn reconstruct_lhs(&self, captures: &Captures) -> String {
        self.method().reconstruct_lhs(captures)
    }

    fn reconstruct_rhs(&self, text: &str, captures: &Captures) -> Result<String, String> {
        self.method().reconstruct_rhs(text, captures)
    }

    fn usage_mask(&self) -> u16 {
        self.method().usage_mask()
    }
}

/// Compile a target pattern in the given mode.
pub fn compile(
    mode: MatchMode,
    pattern: &str,
    pos: &ExprPosition,
) -> Result<CompiledPattern, CookError> {
    let res = match mode {
        MatchMode::Cook => CookPattern::compile(pattern).map(CompiledPattern::Cook),
        MatchMode::Regex => RegexPattern::compile(pattern).map(CompiledPattern::Regex),
    };
    res.map_err(|message| CookError::Pattern {
        pos: pos.clone(),
        pattern: pattern.to_string(),
        message,
    })
}

/// Placeholders referenced by an ingredient word, one bit per slot.
pub fn placeholders_used(mode: MatchMode, text: &str) -> u16 {
    match mode {
        MatchMode::Cook => cook_mode::placeholders_in(text),
        MatchMode::Regex => regex_mode::placeholders_in(text),
    }
}

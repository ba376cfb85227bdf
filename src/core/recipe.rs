//! CK-030: Recipe definitions.
//!
//! A [`RecipeDef`] is the static, parsed form of one cookbook recipe. It is
//! immutable after compilation and shared by every recipe instance the
//! resolver creates from it.

use super::flags::{FlagSet, MatchMode};
use super::matcher::{Captures, CompiledPattern, MatchMethod};
use super::opcode::OpcodeList;
use super::pool::StringPool;
use super::position::ExprPosition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Index of a recipe in its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipeId(pub usize);

/// How an ingredient constrains the recipe that needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    /// Must be up to date, and being newer forces a rebuild.
    Strict,
    /// Must exist if it can be made; staleness does not force a rebuild.
    Weak,
    /// Presence only.
    Exists,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeType::Strict => write!(f, "strict"),
            EdgeType::Weak => write!(f, "weak"),
            EdgeType::Exists => write!(f, "exists"),
        }
    }
}

/// One ingredient expression and the edge type its words get.
#[derive(Debug, Clone)]
pub struct IngredientSpec {
    pub program: Arc<OpcodeList>,
    pub edge: EdgeType,
}

/// A remote execution target a recipe may be bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub addr: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub ssh_key: Option<String>,
}

fn default_user() -> String {
    "root".to_string()
}

impl Host {
    pub fn is_local(&self) -> bool {
        matches!(self.addr.as_str(), "127.0.0.1" | "localhost" | "::1")
    }
}

#[derive(Debug)]
pub struct RecipeDef {
    pub id: RecipeId,
    pub targets: Vec<Arc<CompiledPattern>>,
    /// Immediate ingredients, resolved before the precondition.
    pub need1: Vec<IngredientSpec>,
    /// Deferred ingredients, evaluated once the immediate ones are known.
    pub need2: Vec<IngredientSpec>,
    /// Effective flags: the recipe's own, completed from the cookbook's.
    pub flags: FlagSet,
    pub precondition: Option<Arc<OpcodeList>>,
    pub single_thread: Option<Arc<OpcodeList>>,
    pub host_binding: Option<Arc<OpcodeList>>,
    pub out_of_date: Arc<OpcodeList>,
    pub up_to_date: Option<Arc<OpcodeList>>,
    pub pos: ExprPosition,
}

impl RecipeDef {
    /// Explicit recipes name their targets literally.
    pub fn is_explicit(&self) -> bool {
        self.targets.iter().all(|t| t.literal().is_some())
    }

    pub fn is_implicit(&self) -> bool {
        !self.is_explicit()
    }

    /// Target patterns as written, for messages.
    pub fn name(&self) -> String {
        self.targets
            .iter()
            .map(|t| t.source())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The first target pattern that matches `filename`.
    ///
    /// In regex mode slot 0 is the whole matched name, which differs
    /// between sibling targets. With several targets it is rebuilt from the
    /// first one, so every sibling yields the same captures.
    pub fn matches(&self, filename: &str, pool: &StringPool) -> Option<(usize, Captures)> {
        let (which, mut caps) = self
            .targets
            .iter()
            .enumerate()
            .find_map(|(i, t)| t.execute(filename, pool).map(|caps| (i, caps)))?;
        if self.targets.len() > 1 && self.targets[which].mode() == MatchMode::Regex {
            caps.fill[0] = None;
            let first = self.targets[0].reconstruct_lhs(&caps);
            caps.set(0, pool.intern(&first));
        }
        Some((which, caps))
    }

    /// Every output this recipe produces for one match.
    pub fn outputs(&self, captures: &Captures) -> Vec<String> {
        let mut outs: Vec<String> = Vec::with_capacity(self.targets.len());
        for t in &self.targets {
            let name = t.reconstruct_lhs(captures);
            if !outs.contains(&name) {
                outs.push(name);
            }
        }
        outs
    }

    /// Placeholder slots bound by every target, so usable in ingredients.
    pub fn bound_mask(&self) -> u16 {
        self.targets
            .iter()
            .map(|t| t.usage_mask())
            .fold(u16::MAX, |m, u| m & u)
    }
}

impl fmt::Display for RecipeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.pos, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matcher;

    fn def(targets: &[&str]) -> RecipeDef {
        def_in(MatchMode::Cook, targets)
    }

    fn def_in(mode: MatchMode, targets: &[&str]) -> RecipeDef {
        let pos = ExprPosition::builtin();
        RecipeDef {
            id: RecipeId(0),
            targets: targets
                .iter()
                .map(|t| Arc::new(matcher::compile(mode, t, &pos).unwrap()))
                .collect(),
            need1: vec![],
            need2: vec![],
            flags: FlagSet::new(),
            precondition: None,
            single_thread: None,
            host_binding: None,
            out_of_date: Arc::new(OpcodeList::new("body")),
            up_to_date: None,
            pos,
        }
    }

    #[test]
    fn test_ck030_explicit_vs_implicit() {
        assert!(def(&["app"]).is_explicit());
        assert!(def(&["%.o"]).is_implicit());
        assert!(def(&["app", "%.o"]).is_implicit());
    }

    #[test]
    fn test_ck030_multi_target_outputs_share_captures() {
        let pool = StringPool::new();
        let d = def(&["%.c", "%.h"]);
        let (i, caps) = d.matches("gram.h", &pool).unwrap();
        assert_eq!(i, 1);
        assert_eq!(d.outputs(&caps), vec!["gram.c", "gram.h"]);
        let (_, caps2) = d.matches("gram.c", &pool).unwrap();
        assert_eq!(caps, caps2);
        assert_eq!(d.name(), "%.c %.h");
    }

    #[test]
    fn test_ck030_regex_siblings_share_captures() {
        let pool = StringPool::new();
        let d = def_in(MatchMode::Regex, &[r"(.*)\.tab\.c", r"(.*)\.tab\.h"]);
        let (i, from_h) = d.matches("gram.tab.h", &pool).unwrap();
        assert_eq!(i, 1);
        let (_, from_c) = d.matches("gram.tab.c", &pool).unwrap();
        assert_eq!(from_h, from_c);
        assert_eq!(from_h.get(0).unwrap().as_str(), "gram.tab.c");
        assert_eq!(d.outputs(&from_h), vec!["gram.tab.c", "gram.tab.h"]);

        let single = def_in(MatchMode::Regex, &[r".*\.o"]);
        let (_, caps) = single.matches("x.o", &pool).unwrap();
        assert_eq!(single.outputs(&caps), vec!["x.o"]);
    }

    #[test]
    fn test_ck030_bound_mask_is_intersection() {
        assert_eq!(def(&["%0%.o", "%.d"]).bound_mask(), 0b10);
        assert_eq!(def(&["%.o"]).bound_mask(), 0b10);
    }

    #[test]
    fn test_ck030_host_locality() {
        let h = Host {
            addr: "localhost".into(),
            user: "root".into(),
            ssh_key: None,
        };
        assert!(h.is_local());
        let remote = Host {
            addr: "10.0.0.7".into(),
            ..h
        };
        assert!(!remote.is_local());
        assert_eq!(EdgeType::Weak.to_string(), "weak");
    }
}

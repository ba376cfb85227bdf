//! Regular-expression patterns. The pattern is anchored at both ends and
//! capture group N fills slot N (`\0` is the whole name).
//!
//! A pattern that is literal text around whole capture groups, such as
//! `(.*)\.tab\.c`, can be rebuilt from its groups alone. That is what lets
//! several regex targets of one recipe name their sibling outputs.

use super::{Captures, MatchMethod, CAPTURE_SLOTS};
use crate::core::pool::StringPool;
use regex::Regex;

#[derive(Debug, Clone)]
pub struct RegexPattern {
    source: String,
    re: Regex,
    mask: u16,
    template: Option<Vec<Part>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Lit(String),
    Group(usize),
}

impl RegexPattern {
    pub fn compile(pattern: &str) -> Result<Self, String> {
        let re = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| e.to_string())?;
        let groups = re.captures_len().min(CAPTURE_SLOTS);
        let mask = (0..groups).fold(0u16, |m, i| m | (1 << i));
        Ok(Self {
            source: pattern.to_string(),
            re,
            mask,
            template: template(pattern),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the target name can be rebuilt from the groups alone.
    pub fn rebuilds_from_groups(&self) -> bool {
        self.template.is_some()
    }

    fn rebuild(&self, captures: &Captures) -> Option<String> {
        let mut out = String::new();
        for part in self.template.as_ref()? {
            match part {
                Part::Lit(text) => out.push_str(text),
                Part::Group(n) => out.push_str(captures.get(*n)?.as_str()),
            }
        }
        Some(out)
    }
}

/// Split `source` into literal text and top-level capture groups. `None`
/// when anything outside the groups can match more than one string.
fn template(source: &str) -> Option<Vec<Part>> {
    let chars: Vec<char> = source.chars().collect();
    let mut parts = Vec::new();
    let mut lit = String::new();
    let mut groups = 0usize;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let c = *chars.get(i + 1)?;
                if c.is_ascii_alphanumeric() {
                    return None;
                }
                lit.push(c);
                i += 2;
            }
            '(' => {
                if !opens_capture(&chars, i) {
                    return None;
                }
                groups += 1;
                let n = groups;
                i = close_group(&chars, i, &mut groups)?;
                if n >= CAPTURE_SLOTS || matches!(chars.get(i), Some('?' | '*' | '+' | '{')) {
                    return None;
                }
                if !lit.is_empty() {
                    parts.push(Part::Lit(std::mem::take(&mut lit)));
                }
                parts.push(Part::Group(n));
            }
            '.' | '^' | '$' | '|' | '?' | '*' | '+' | '[' | ']' | '{' | '}' | ')' => return None,
            c => {
                lit.push(c);
                i += 1;
            }
        }
    }
    if !lit.is_empty() {
        parts.push(Part::Lit(lit));
    }
    Some(parts)
}

/// The `(` at `i` opens a numbered group, plain or named.
fn opens_capture(chars: &[char], i: usize) -> bool {
    if chars.get(i + 1) != Some(&'?') {
        return true;
    }
    match chars.get(i + 2) {
        Some('P') => chars.get(i + 3) == Some(&'<'),
        Some('<') => !matches!(chars.get(i + 3), Some('=' | '!')),
        _ => false,
    }
}

/// Index just past the `)` closing the group opened at `open`. Groups
/// nested inside it are counted into `groups`.
fn close_group(chars: &[char], open: usize, groups: &mut usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' => i = close_class(chars, i)?,
            '(' => {
                if i != open && opens_capture(chars, i) {
                    *groups += 1;
                }
                depth += 1;
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the `]` closing the class opened at `open`.
fn close_class(chars: &[char], open: usize) -> Option<usize> {
    let mut i = open + 1;
    if chars.get(i) == Some(&'^') {
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            ']' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

enum Piece<'a> {
    Lit(&'a str),
    Ref(usize),
}

/// Visit each `\N` reference in `text`, yielding literal runs and slot
/// numbers. `\\` is a literal backslash.
fn scan<'a>(text: &'a str, mut visit: impl FnMut(Piece<'a>)) {
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if let Some(next) = bytes.get(i + 1) {
                if next.is_ascii_digit() || *next == b'\\' {
                    visit(Piece::Lit(&text[start..i]));
                    if *next == b'\\' {
                        visit(Piece::Lit("\\"));
                    } else {
                        visit(Piece::Ref(usize::from(next - b'0')));
                    }
                    i += 2;
                    start = i;
                    continue;
                }
            }
        }
        i += 1;
    }
    visit(Piece::Lit(&text[start..]));
}

pub(super) fn placeholders_in(text: &str) -> u16 {
    let mut mask = 0u16;
    scan(text, |piece| {
        if let Piece::Ref(n) = piece {
            mask |= 1 << n;
        }
    });
    mask
}

impl MatchMethod for RegexPattern {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn execute(&self, filename: &str, pool: &StringPool) -> Option<Captures> {
        let found = self.re.captures(filename)?;
        let mut caps = Captures::default();
        for n in 0..CAPTURE_SLOTS {
            if let Some(m) = found.get(n) {
                caps.set(n, pool.intern(m.as_str()));
            }
        }
        Some(caps)
    }

    fn reconstruct_lhs(&self, captures: &Captures) -> String {
        self.rebuild(captures).unwrap_or_else(|| {
            captures
                .get(0)
                .map_or_else(|| self.source.clone(), |c| c.to_string())
        })
    }

    fn reconstruct_rhs(&self, text: &str, captures: &Captures) -> Result<String, String> {
        let mut out = String::with_capacity(text.len());
        let mut missing = None;
        scan(text, |piece| match piece {
            Piece::Lit(lit) => out.push_str(lit),
            Piece::Ref(n) => match captures.get(n) {
                Some(c) => out.push_str(c.as_str()),
                None => missing = missing.or(Some(n)),
            },
        });
        match missing {
            Some(n) => Err(format!(
                "reference \\{} in \"{}\" is not bound by target \"{}\"",
                n, text, self.source
            )),
            None => Ok(out),
        }
    }

    fn usage_mask(&self) -> u16 {
        self.mask
    }
}

//! Cook-native `%` patterns.
//!
//! `%1`..`%9` (bare `%` is `%1`) match one or more characters not including
//! `/`. `%0` matches either nothing or a directory prefix ending in `/`.
//! A placeholder that appears twice must match the same text both times.

use super::{Captures, MatchMethod, CAPTURE_SLOTS};
use crate::core::pool::StringPool;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seg {
    Lit(String),
    Hole(u8),
}

#[derive(Debug, Clone)]
pub struct CookPattern {
    source: String,
    segs: Vec<Seg>,
    mask: u16,
}

/// Split `text` at placeholders. Returns the literal text and hole numbers
/// in order of appearance.
fn tokenize(text: &str) -> Vec<Seg> {
    let mut segs = Vec::new();
    let mut lit = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            lit.push(c);
            continue;
        }
        let n = match chars.peek().and_then(|d| d.to_digit(10)) {
            Some(d) => {
                chars.next();
                d as u8
            }
            None => 1,
        };
        if !lit.is_empty() {
            segs.push(Seg::Lit(std::mem::take(&mut lit)));
        }
        segs.push(Seg::Hole(n));
    }
    if !lit.is_empty() {
        segs.push(Seg::Lit(lit));
    }
    segs
}

pub(super) fn placeholders_in(text: &str) -> u16 {
    tokenize(text).iter().fold(0, |m, s| match s {
        Seg::Hole(n) => m | (1 << n),
        Seg::Lit(_) => m,
    })
}

impl CookPattern {
    pub fn compile(pattern: &str) -> Result<Self, String> {
        if pattern.is_empty() {
            return Err("empty pattern".to_string());
        }
        let segs = tokenize(pattern);
        for pair in segs.windows(2) {
            if let [Seg::Hole(a), Seg::Hole(b)] = pair {
                if *a != 0 && *b != 0 {
                    return Err(format!(
                        "placeholders %{} and %{} are adjacent, the match would be ambiguous",
                        a, b
                    ));
                }
            }
        }
        let mask = placeholders_in(pattern);
        Ok(Self {
            source: pattern.to_string(),
            segs,
            mask,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn literal(&self) -> Option<&str> {
        (self.mask == 0).then_some(self.source.as_str())
    }
}

type Spans = [Option<(usize, usize)>; CAPTURE_SLOTS];

fn match_from(segs: &[Seg], input: &str, pos: usize, spans: &mut Spans) -> bool {
    let Some((seg, rest)) = segs.split_first() else {
        return pos == input.len();
    };
    let tail = &input[pos..];
    match seg {
        Seg::Lit(lit) => tail.starts_with(lit.as_str()) && match_from(rest, input, pos + lit.len(), spans),
        Seg::Hole(n) => {
            let n = usize::from(*n);
            if let Some((s, e)) = spans[n] {
                let bound = &input[s..e];
                return tail.starts_with(bound) && match_from(rest, input, pos + bound.len(), spans);
            }
            let ends: Vec<usize> = if n == 0 {
                std::iter::once(pos)
                    .chain(tail.match_indices('/').map(|(i, _)| pos + i + 1))
                    .collect()
            } else {
                let stop = tail.find('/').unwrap_or(tail.len());
                tail[..stop]
                    .char_indices()
                    .map(|(i, c)| pos + i + c.len_utf8())
                    .collect()
            };
            for end in ends {
                spans[n] = Some((pos, end));
                if match_from(rest, input, end, spans) {
                    return true;
                }
            }
            spans[n] = None;
            false
        }
    }
}

impl MatchMethod for CookPattern {
    fn name(&self) -> &'static str {
        "cook"
    }

    fn execute(&self, filename: &str, pool: &StringPool) -> Option<Captures> {
        let mut spans: Spans = Default::default();
        if !match_from(&self.segs, filename, 0, &mut spans) {
            return None;
        }
        let mut caps = Captures::default();
        for (n, span) in spans.iter().enumerate() {
            if let Some((s, e)) = span {
                caps.set(n, pool.intern(&filename[*s..*e]));
            }
        }
        Some(caps)
    }

    fn reconstruct_lhs(&self, captures: &Captures) -> String {
        self.segs
            .iter()
            .map(|seg| match seg {
                Seg::Lit(l) => l.as_str(),
                Seg::Hole(n) => captures.get(usize::from(*n)).map_or("", |c| c.as_str()),
            })
            .collect()
    }

    fn reconstruct_rhs(&self, text: &str, captures: &Captures) -> Result<String, String> {
        let mut out = String::with_capacity(text.len());
        for seg in tokenize(text) {
            match seg {
                Seg::Lit(l) => out.push_str(&l),
                Seg::Hole(n) => match captures.get(usize::from(n)) {
                    Some(c) => out.push_str(c.as_str()),
                    None => {
                        return Err(format!(
                            "placeholder %{} in \"{}\" is not bound by target \"{}\"",
                            n, text, self.source
                        ))
                    }
                },
            }
        }
        Ok(out)
    }

    fn usage_mask(&self) -> u16 {
        self.mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn words(pool: &StringPool, p: &CookPattern, name: &str) -> Option<Vec<String>> {
        p.execute(name, pool).map(|c| {
            c.fill
                .iter()
                .map(|s| s.as_ref().map_or("-".to_string(), |s| s.to_string()))
                .collect()
        })
    }

    #[test]
    fn test_ck011_bare_percent_is_one() {
        let pool = StringPool::new();
        let p = CookPattern::compile("%.o").unwrap();
        let caps = p.execute("main.o", &pool).unwrap();
        assert_eq!(caps.get(1).unwrap().as_str(), "main");
        assert_eq!(p.usage_mask(), 0b10);
        assert!(p.execute("dir/main.o", &pool).is_none());
        assert!(p.execute(".o", &pool).is_none());
    }

    #[test]
    fn test_ck011_percent_zero_directory_prefix() {
        let pool = StringPool::new();
        let p = CookPattern::compile("%0%.o").unwrap();
        let w = words(&pool, &p, "src/lib/x.o").unwrap();
        assert_eq!(w[0], "src/lib/");
        assert_eq!(w[1], "x");
        let w = words(&pool, &p, "x.o").unwrap();
        assert_eq!(w[0], "");
        assert_eq!(
            p.reconstruct_rhs("%0%.c", &p.execute("a/b.o", &pool).unwrap())
                .unwrap(),
            "a/b.c"
        );
    }

    #[test]
    fn test_ck011_repeated_placeholder_must_agree() {
        let pool = StringPool::new();
        let p = CookPattern::compile("%1/%1.d").unwrap();
        assert!(p.execute("foo/foo.d", &pool).is_some());
        assert!(p.execute("foo/bar.d", &pool).is_none());
    }

    #[test]
    fn test_ck011_backtracks_within_hole() {
        let pool = StringPool::new();
        let p = CookPattern::compile("%1.tar.%2").unwrap();
        let caps = p.execute("pkg.v1.tar.gz", &pool).unwrap();
        assert_eq!(caps.get(1).unwrap().as_str(), "pkg.v1");
        assert_eq!(caps.get(2).unwrap().as_str(), "gz");
    }

    #[test]
    fn test_ck011_adjacent_placeholders_rejected() {
        assert!(CookPattern::compile("%1%2").is_err());
        assert!(CookPattern::compile("%%").is_err());
        assert!(CookPattern::compile("%0%1.c").is_ok());
        assert!(CookPattern::compile("").is_err());
    }

    #[test]
    fn test_ck011_unbound_rhs_placeholder() {
        let pool = StringPool::new();
        let p = CookPattern::compile("%.o").unwrap();
        let caps = p.execute("a.o", &pool).unwrap();
        let err = p.reconstruct_rhs("%2.c", &caps).unwrap_err();
        assert!(err.contains("%2"));
    }

    #[test]
    fn test_ck011_literal() {
        let p = CookPattern::compile("app").unwrap();
        assert_eq!(p.literal(), Some("app"));
        assert_eq!(p.usage_mask(), 0);
        let pool = StringPool::new();
        assert!(p.execute("app", &pool).unwrap().is_empty());
        assert!(p.execute("apps", &pool).is_none());
    }

    proptest! {
        #[test]
        fn test_ck011_lhs_rebuilds_matched_name(
            dir in "([a-z]{1,4}/){0,3}",
            stem in "[a-z][a-z0-9_.]{0,8}",
        ) {
            let pool = StringPool::new();
            let p = CookPattern::compile("%0%.o").unwrap();
            let name = format!("{dir}{stem}.o");
            let caps = p.execute(&name, &pool).unwrap();
            prop_assert_eq!(p.reconstruct_lhs(&caps), name);
        }
    }
}

//! CK-001: Interned string pool.
//!
//! Strings are the most heavily used value in cook: every filename, word and
//! variable name passes through the match engine's inner loop. Each distinct
//! byte sequence lives exactly once in the pool, so equality of two handles
//! is a pointer test. Entries no handle refers to any more are dropped by
//! [`StringPool::purge`], which the executor runs once a graph is gone.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Handle to an interned string.
///
/// Two handles from the same pool are equal iff they point at the same
/// entry, which is iff their contents are equal.
#[derive(Clone)]
pub struct Istr(Arc<str>);

impl Istr {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for Istr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Istr {}

impl Hash for Istr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const u8 as usize).hash(state);
    }
}

// Ordering is by content so sorted output is stable across runs.
impl PartialOrd for Istr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Istr {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Display for Istr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Istr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

/// The literal pool. Shared between the resolver and every interpreter
/// context, so all mutation happens under one lock.
#[derive(Default)]
pub struct StringPool {
    table: Mutex<FxHashSet<Arc<str>>>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning the unique handle for its contents.
    pub fn intern(&self, s: &str) -> Istr {
        let mut table = self.table.lock();
        if let Some(existing) = table.get(s) {
            return Istr(Arc::clone(existing));
        }
        let entry: Arc<str> = Arc::from(s);
        table.insert(Arc::clone(&entry));
        Istr(entry)
    }

    /// Drop every entry that is no longer referenced outside the pool.
    pub fn purge(&self) -> usize {
        let mut table = self.table.lock();
        let before = table.len();
        table.retain(|entry| Arc::strong_count(entry) > 1);
        before - table.len()
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Intern every word of an iterator into a list.
    pub fn list<'a, I>(&self, words: I) -> StrList
    where
        I: IntoIterator<Item = &'a str>,
    {
        StrList(words.into_iter().map(|w| self.intern(w)).collect())
    }
}

impl fmt::Debug for StringPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringPool").field("len", &self.len()).finish()
    }
}

/// An ordered list of interned words, the only value type the interpreter
/// passes between opcodes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StrList(pub Vec<Istr>);

impl StrList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, s: Istr) {
        self.0.push(s);
    }

    pub fn append(&mut self, other: &StrList) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Append only the words not already present.
    pub fn append_unique(&mut self, s: Istr) {
        if !self.0.contains(&s) {
            self.0.push(s);
        }
    }

    pub fn contains(&self, s: &Istr) -> bool {
        self.0.contains(s)
    }

    pub fn first(&self) -> Option<&Istr> {
        self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Istr> {
        self.0.iter()
    }

    /// Words joined by single spaces.
    pub fn join(&self, sep: &str) -> String {
        self.0
            .iter()
            .map(Istr::as_str)
            .collect::<Vec<_>>()
            .join(sep)
    }

    /// Cook truth: a list is true iff at least one word is non-empty.
    pub fn is_true(&self) -> bool {
        self.0.iter().any(|w| !w.is_empty())
    }
}

impl FromIterator<Istr> for StrList {
    fn from_iter<T: IntoIterator<Item = Istr>>(iter: T) -> Self {
        StrList(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a StrList {
    type Item = &'a Istr;
    type IntoIter = std::slice::Iter<'a, Istr>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for StrList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join(" "))
    }
}

//! CK-002: Symbol table: ordered multi-map from interned name to value.
//!
//! Each key holds a push-down stack of bindings so that a narrower scope can
//! shadow an outer one and be unwound again. The order of the stack matters:
//! pushes go to the end and pops take from the end, never the head.

use super::pool::Istr;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

#[derive(Debug, Clone)]
pub struct SymbolTable<V> {
    rows: IndexMap<Istr, Vec<V>, FxBuildHasher>,
    /// Keys pushed in each open scope, innermost last.
    scopes: Vec<Vec<Istr>>,
}

impl<V> Default for SymbolTable<V> {
    fn default() -> Self {
        Self {
            rows: IndexMap::default(),
            scopes: Vec::new(),
        }
    }
}

impl<V> SymbolTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a value, replacing the innermost binding of `key` if there is
    /// one. Returns the replaced value.
    pub fn assign(&mut self, key: Istr, value: V) -> Option<V> {
        let stack = self.rows.entry(key).or_default();
        match stack.last_mut() {
            Some(top) => Some(std::mem::replace(top, value)),
            None => {
                stack.push(value);
                None
            }
        }
    }

    /// Push a shadowing binding. Inside a scope it is undone by
    /// [`SymbolTable::leave_scope`].
    pub fn push(&mut self, key: Istr, value: V) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(key.clone());
        }
        self.rows.entry(key).or_default().push(value);
    }

    /// Remove the innermost binding of `key`, exposing the one beneath.
    pub fn pop(&mut self, key: &Istr) -> Option<V> {
        let stack = self.rows.get_mut(key)?;
        let value = stack.pop();
        if stack.is_empty() {
            self.rows.shift_remove(key);
        }
        value
    }

    /// Remove every binding of `key`.
    pub fn remove(&mut self, key: &Istr) -> Option<Vec<V>> {
        self.rows.shift_remove(key)
    }

    /// The innermost binding of `key`.
    pub fn query(&self, key: &Istr) -> Option<&V> {
        self.rows.get(key).and_then(|stack| stack.last())
    }

    pub fn query_mut(&mut self, key: &Istr) -> Option<&mut V> {
        self.rows.get_mut(key).and_then(|stack| stack.last_mut())
    }

    pub fn contains(&self, key: &Istr) -> bool {
        self.rows.contains_key(key)
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Undo every push made since the matching `enter_scope`.
    pub fn leave_scope(&mut self) {
        if let Some(keys) = self.scopes.pop() {
            for key in keys.iter().rev() {
                self.pop(key);
            }
        }
    }

    /// Keys in first-insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Istr> {
        self.rows.keys()
    }

    /// Innermost binding of every key, in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Istr, &V)> {
        self.rows
            .iter()
            .filter_map(|(k, stack)| stack.last().map(|v| (k, v)))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

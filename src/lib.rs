//! Cook: a dependency-driven build tool.
//!
//! Recipes with `%` or regex target patterns, resolved by backtracking
//! search into a graph and cooked in parallel. BLAKE3 fingerprints decide
//! what is out of date.

pub mod cli;
pub mod core;
pub mod fingerprint;
pub mod transport;

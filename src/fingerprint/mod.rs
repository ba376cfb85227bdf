//! Fingerprinting and provenance: BLAKE3 hashing, the JSONL event log and
//! drift detection against the fingerprint cache.

pub mod drift;
pub mod eventlog;
pub mod hasher;

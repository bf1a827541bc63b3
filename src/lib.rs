#![deny(missing_docs)]

//! Core library for Rusty Index: keeps a vector search index in sync with a document container.

/// Document parsing and text splitting.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Content fingerprints.
pub mod hashing;
/// Search index schema, state reads, and writes.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Reconciliation run counters.
pub mod metrics;
/// Source container abstraction and scanning.
pub mod source;
/// Reconciliation planning and the run engine.
pub mod sync;

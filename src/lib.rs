//! # Sorrel
//!
//! A disk-backed inverted-index builder and boolean query engine.
//!
//! ## Features
//!
//! - Single-pass in-memory mapping with bounded buffers, spilled to sorted
//!   chunk files
//! - K-way reduction into compact binary dictionaries with width-adaptive
//!   encoding, optional delta and variable-byte posting lists
//! - Lexically partitioned indexes described by a manifest
//! - Lazy sorted-set algebra with non-materialized complements
//! - LL(1) boolean query language (`&`, `|`, `!`, grouping)

// Core modules
pub mod analysis;
mod error;
pub mod index;
pub mod keyset;
pub mod progress;
pub mod query;
pub mod registry;

// Re-exports for the public API
pub use error::{Result, SorrelError};
pub use index::build::{build_index, BuildOptions};
pub use index::manifest::{open_index, Index, Manifest};
pub use index::reduce::ReduceConfig;
pub use index::DocumentEntry;
pub use keyset::KeySet;
pub use query::evaluate;
pub use registry::{DocumentId, DocumentRegistry};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! caseindex - similar-case retrieval and case-type classification
//!
//! Builds one HNSW index per traffic-accident case category from a SQLite
//! case store, keeps a bounded set of them in memory, retrieves the nearest
//! recorded cases for a narrative, and classifies narratives by rule or by a
//! distance-weighted vote over a global index.

pub mod cache;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod model;
pub mod partition;
pub mod query;
pub mod storage;

pub use error::{CaseIndexError, Result};

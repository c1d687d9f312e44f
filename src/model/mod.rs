//! Shared data model

mod category;

pub use category::{CaseCategory, PartitionKey, PartyShape, SpecialCase, LABEL_SEPARATOR};

use serde::{Deserialize, Serialize};

/// A stored case with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: i64,
    pub category: CaseCategory,
    /// Accident narrative the embedding was computed from
    pub narrative_text: String,
    pub embedding: Vec<f32>,
}

/// One neighbor returned by the query engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub case_id: i64,
    pub text: String,
    /// Squared Euclidean distance to the query vector (0 = exact match)
    pub distance: f32,
}

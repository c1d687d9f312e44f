/// Text embedding
///
/// - EmbeddingProvider trait, injected into the query engine and the backfill
/// - FastEmbedProvider for local embedding (bge-small-zh-v1.5, 512-dim, by default)
/// - EmbeddingBackfill for cases ingested without a vector
mod backfill;
mod provider;

pub use backfill::{BackfillResult, EmbeddingBackfill};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};

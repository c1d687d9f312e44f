/// Batch embedding of cases stored without a vector
use super::EmbeddingProvider;
use crate::error::Result;
use crate::storage::SqliteCaseStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a backfill run
#[derive(Debug, Default)]
pub struct BackfillResult {
    pub processed: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Embeds every case lacking an embedding and writes the vectors back
///
/// A failing batch is logged and counted; the run continues with the next one.
pub struct EmbeddingBackfill {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<SqliteCaseStore>,
    batch_size: usize,
}

impl EmbeddingBackfill {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<SqliteCaseStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            provider,
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn run(&self) -> Result<BackfillResult> {
        let start = std::time::Instant::now();
        let pending = self.store.cases_missing_embeddings()?;

        info!("Starting embedding backfill of {} cases", pending.len());

        let mut result = BackfillResult::default();

        for chunk in pending.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|(_, text)| text.clone()).collect();

            let embeddings = match self.provider.embed_batch(&texts) {
                Ok(embeddings) => embeddings,
                Err(e) => {
                    warn!("Failed to embed batch of {}: {}", chunk.len(), e);
                    result.failed += chunk.len();
                    continue;
                }
            };

            for ((case_id, _), embedding) in chunk.iter().zip(embeddings.iter()) {
                // Store unavailability aborts the run; nothing else is worth continuing for
                self.store
                    .store_embedding(*case_id, embedding, self.provider.model_name())?;
                result.processed += 1;
            }
            debug!("Embedded chunk of {} cases", chunk.len());
        }

        result.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Embedding backfill complete: {} processed, {} failed, {}ms",
            result.processed, result.failed, result.duration_ms
        );

        Ok(result)
    }
}

//! Nearest-neighbor queries
//!
//! Encodes the query text, resolves the partition through the [`IndexCache`]
//! and translates index positions back to case ids and texts.

mod async_engine;

pub use async_engine::AsyncQueryEngine;

use crate::cache::{CacheLookup, IndexCache};
use crate::embedding::EmbeddingProvider;
use crate::error::{CaseIndexError, Result};
use crate::model::{CaseCategory, PartitionKey, QueryResult};
use crate::storage::CaseStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Statutes cited by one neighboring case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatuteReference {
    pub case_id: i64,
    pub distance: f32,
    pub statutes: String,
}

pub struct QueryEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    cache: Arc<IndexCache>,
    store: Arc<dyn CaseStore>,
}

impl QueryEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        cache: Arc<IndexCache>,
        store: Arc<dyn CaseStore>,
    ) -> Self {
        Self {
            embedder,
            cache,
            store,
        }
    }

    pub fn cache(&self) -> &Arc<IndexCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn CaseStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Up to `k` nearest cases within one category, nearest first
    ///
    /// A category with no cases yields an empty list.
    pub fn query_by_category(
        &self,
        text: &str,
        category: CaseCategory,
        k: usize,
    ) -> Result<Vec<QueryResult>> {
        self.query_text(text, PartitionKey::Category(category), k)
    }

    /// Up to `k` nearest cases over every embedded case
    pub fn query_global(&self, text: &str, k: usize) -> Result<Vec<QueryResult>> {
        self.query_text(text, PartitionKey::Global, k)
    }

    /// Same as the text queries, from an already computed embedding
    pub fn query_vector(
        &self,
        vector: &[f32],
        key: PartitionKey,
        k: usize,
    ) -> Result<Vec<QueryResult>> {
        check_k(k)?;

        match self.cache.get_or_load(key)? {
            CacheLookup::Partition(partition) => {
                let results = partition.search(vector, k)?;
                debug!(
                    "Query over {} returned {} of {} cases",
                    key,
                    results.len(),
                    partition.len()
                );
                Ok(results)
            }
            CacheLookup::NoData => Ok(Vec::new()),
        }
    }

    /// Statutes cited by the `k` nearest cases in a category
    ///
    /// Neighbors without recorded statutes are skipped, so fewer than `k`
    /// references may come back.
    pub fn related_statutes(
        &self,
        text: &str,
        category: CaseCategory,
        k: usize,
    ) -> Result<Vec<StatuteReference>> {
        let neighbors = self.query_by_category(text, category, k)?;
        self.statutes_for(&neighbors)
    }

    /// Statutes cited by already retrieved neighbors, skipping blank entries
    pub fn statutes_for(&self, neighbors: &[QueryResult]) -> Result<Vec<StatuteReference>> {
        let mut references = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            match self.store.lookup_statutes(neighbor.case_id)? {
                Some(statutes) if !statutes.trim().is_empty() => {
                    references.push(StatuteReference {
                        case_id: neighbor.case_id,
                        distance: neighbor.distance,
                        statutes,
                    });
                }
                _ => debug!("Case {} has no recorded statutes", neighbor.case_id),
            }
        }

        Ok(references)
    }

    fn query_text(&self, text: &str, key: PartitionKey, k: usize) -> Result<Vec<QueryResult>> {
        if text.trim().is_empty() {
            return Err(CaseIndexError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }
        check_k(k)?;

        let vector = self.embedder.embed(text)?;
        self.query_vector(&vector, key, k)
    }
}

fn check_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(CaseIndexError::InvalidQuery(
            "k must be at least 1".to_string(),
        ));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::LookupProvider;
    use super::*;
    use crate::model::{PartyShape, SpecialCase};
    use crate::partition::{BuildParams, PartitionManager};
    use crate::storage::SqliteCaseStore;
    use tempfile::TempDir;

    const SINGLE: CaseCategory = CaseCategory::Party(PartyShape::SinglePair);
    const DEFENDANTS: CaseCategory = CaseCategory::Party(PartyShape::MultipleDefendants);

    fn setup(temp: &TempDir) -> QueryEngine {
        let store = Arc::new(SqliteCaseStore::open(&temp.path().join("cases.db")).unwrap());
        let cases: [(i64, CaseCategory, &str, [f32; 2]); 5] = [
            (1, SINGLE, "機車左轉", [0.0, 0.0]),
            (2, SINGLE, "闖紅燈", [1.0, 0.0]),
            (3, SINGLE, "未保持距離", [5.0, 5.0]),
            (4, DEFENDANTS, "連環追撞", [0.0, 1.0]),
            (5, DEFENDANTS, "路口擦撞", [3.0, 3.0]),
        ];
        for (id, category, text, vector) in cases {
            store.insert_case(id, category, text, Some(&vector)).unwrap();
        }
        store.insert_statutes(2, "民法第184條第1項前段").unwrap();
        store.insert_statutes(1, "   ").unwrap();
        store.insert_statutes(5, "民法第185條").unwrap();

        let manager =
            PartitionManager::new(store.clone(), temp.path().join("indexes"), BuildParams::default())
                .unwrap();
        let cache = Arc::new(IndexCache::new(Arc::new(manager), 5));
        let embedder = Arc::new(LookupProvider::new(&[
            ("機車左轉", vec![0.0, 0.0]),
            ("query", vec![0.9, 0.1]),
        ]));
        QueryEngine::new(embedder, cache, store)
    }

    #[test]
    fn test_query_by_category_stays_in_partition() {
        let temp = TempDir::new().unwrap();
        let engine = setup(&temp);

        let results = engine.query_by_category("query", SINGLE, 10).unwrap();
        let ids: Vec<i64> = results.iter().map(|r| r.case_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_self_retrieval() {
        let temp = TempDir::new().unwrap();
        let engine = setup(&temp);

        let results = engine.query_global("機車左轉", 1).unwrap();
        assert_eq!(results[0].case_id, 1);
        assert_eq!(results[0].text, "機車左轉");
        assert_eq!(results[0].distance, 0.0);
    }

    #[test]
    fn test_over_ask_returns_everything() {
        let temp = TempDir::new().unwrap();
        let engine = setup(&temp);

        assert_eq!(engine.query_global("query", 50).unwrap().len(), 5);
        assert_eq!(engine.query_by_category("query", DEFENDANTS, 50).unwrap().len(), 2);
    }

    #[test]
    fn test_no_data_category_is_empty() {
        let temp = TempDir::new().unwrap();
        let engine = setup(&temp);

        let minor = CaseCategory::Special(SpecialCase::MinorDefendant);
        assert!(engine.query_by_category("query", minor, 3).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_arguments() {
        let temp = TempDir::new().unwrap();
        let engine = setup(&temp);

        assert!(matches!(
            engine.query_global("   ", 3),
            Err(CaseIndexError::InvalidQuery(_))
        ));
        assert!(matches!(
            engine.query_global("query", 0),
            Err(CaseIndexError::InvalidQuery(_))
        ));
        assert!(matches!(
            engine.query_vector(&[0.0, 0.0], PartitionKey::Global, 0),
            Err(CaseIndexError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_related_statutes_skips_missing() {
        let temp = TempDir::new().unwrap();
        let engine = setup(&temp);

        let references = engine.related_statutes("query", SINGLE, 3).unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].case_id, 2);
        assert_eq!(references[0].statutes, "民法第184條第1項前段");
    }

    #[test]
    fn test_statutes_for_global_neighbors_skip_blank() {
        let temp = TempDir::new().unwrap();
        let engine = setup(&temp);

        let neighbors = engine.query_global("query", 5).unwrap();
        assert_eq!(neighbors.len(), 5);

        let references = engine.statutes_for(&neighbors).unwrap();
        let ids: Vec<i64> = references.iter().map(|r| r.case_id).collect();
        // Case 1 has only whitespace recorded
        assert_eq!(ids, vec![2, 5]);
        assert_eq!(references[1].statutes, "民法第185條");
    }
}

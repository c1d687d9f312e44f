/// Wiring of the store, partition manager and cache from configuration
use crate::cache::IndexCache;
use crate::classifier::{Classifier, FactExtractor};
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, FastEmbedProvider};
use crate::error::{CaseIndexError, Result};
use crate::model::{CaseCategory, PartitionKey};
use crate::partition::PartitionManager;
use crate::query::QueryEngine;
use crate::storage::SqliteCaseStore;
use std::sync::Arc;

/// Handles shared by every command
pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteCaseStore>,
    pub manager: Arc<PartitionManager>,
    pub cache: Arc<IndexCache>,
}

impl AppContext {
    pub fn open(config: Config) -> Result<Self> {
        let database = config.database_path()?;
        if let Some(parent) = database.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CaseIndexError::Io {
                source: e,
                context: format!("Failed to create data directory: {}", parent.display()),
            })?;
        }

        let store = Arc::new(SqliteCaseStore::open(&database)?);
        let mut manager =
            PartitionManager::new(store.clone(), config.index_dir()?, config.build_params())?;
        if let Some(dimension) = FastEmbedProvider::model_dimension(&config.embedding.model) {
            manager = manager.with_dimension(dimension);
        }
        let manager = Arc::new(manager);
        let cache = Arc::new(IndexCache::new(manager.clone(), config.cache.capacity));

        Ok(Self {
            config,
            store,
            manager,
            cache,
        })
    }

    pub fn query_engine(&self, embedder: Arc<dyn EmbeddingProvider>) -> QueryEngine {
        QueryEngine::new(embedder, self.cache.clone(), self.store.clone())
    }

    pub fn classifier(
        &self,
        engine: Arc<QueryEngine>,
        extractor: Arc<dyn FactExtractor>,
    ) -> Result<Classifier> {
        let settings = &self.config.classifier;
        Classifier::new(
            engine,
            extractor,
            settings.strategy,
            settings.vote_k,
            settings.ceiling,
        )
    }
}

/// Category from its label or slug; unknown names are rejected rather than unclassified
pub fn parse_category(value: &str) -> Result<CaseCategory> {
    match PartitionKey::from_slug(value.trim()) {
        Some(PartitionKey::Category(category)) => Ok(category),
        _ => Err(CaseIndexError::InvalidQuery(format!(
            "Unknown category: {}",
            value
        ))),
    }
}

/// Async facade over the blocking query and classification paths
use super::{QueryEngine, StatuteReference};
use crate::classifier::{Classification, Classifier};
use crate::error::{CaseIndexError, Result};
use crate::model::{CaseCategory, QueryResult};
use std::sync::Arc;

/// Runs encode, search and classify on tokio's blocking pool
///
/// Calls are not cancellable: dropping the returned future leaves the
/// blocking task running to completion.
#[derive(Clone)]
pub struct AsyncQueryEngine {
    engine: Arc<QueryEngine>,
    classifier: Arc<Classifier>,
}

impl AsyncQueryEngine {
    pub fn new(engine: Arc<QueryEngine>, classifier: Arc<Classifier>) -> Self {
        Self { engine, classifier }
    }

    pub fn engine(&self) -> &Arc<QueryEngine> {
        &self.engine
    }

    pub async fn query_global(&self, text: String, k: usize) -> Result<Vec<QueryResult>> {
        let engine = self.engine.clone();
        run_blocking(move || engine.query_global(&text, k)).await
    }

    pub async fn query_by_category(
        &self,
        text: String,
        category: CaseCategory,
        k: usize,
    ) -> Result<Vec<QueryResult>> {
        let engine = self.engine.clone();
        run_blocking(move || engine.query_by_category(&text, category, k)).await
    }

    pub async fn related_statutes(
        &self,
        text: String,
        category: CaseCategory,
        k: usize,
    ) -> Result<Vec<StatuteReference>> {
        let engine = self.engine.clone();
        run_blocking(move || engine.related_statutes(&text, category, k)).await
    }

    pub async fn classify(&self, narrative: String) -> Result<Classification> {
        let classifier = self.classifier.clone();
        run_blocking(move || classifier.classify_detailed(&narrative)).await
    }

    pub async fn classify_with_facts(
        &self,
        narrative: String,
        extraction: String,
    ) -> Result<Classification> {
        let classifier = self.classifier.clone();
        run_blocking(move || classifier.classify_detailed_with_facts(&narrative, &extraction))
            .await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CaseIndexError::Other(anyhow::anyhow!("blocking task failed: {}", e)))?
}

//! Shared fixtures for integration tests
#![allow(dead_code)]

use caseindex::cache::IndexCache;
use caseindex::embedding::{EmbeddingError, EmbeddingProvider};
use caseindex::model::{CaseCategory, PartyShape, SpecialCase};
use caseindex::partition::{BuildParams, PartitionManager};
use caseindex::query::QueryEngine;
use caseindex::storage::SqliteCaseStore;
use std::path::Path;
use std::sync::Arc;

pub const DIMENSION: usize = 32;

/// Deterministic bag-of-characters embedding
///
/// Each character adds weight to a bucket picked by a multiplicative hash of
/// its code point, so equal texts always map to equal vectors.
pub struct CharHashEmbedder;

impl EmbeddingProvider for CharHashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        let mut vector = vec![0.0f32; DIMENSION];
        for (i, c) in text.chars().enumerate() {
            let bucket = (c as u64).wrapping_mul(2_654_435_761) as usize % DIMENSION;
            vector[bucket] += 1.0 + (i % 3) as f32 * 0.25;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_name(&self) -> &str {
        "char-hash"
    }
}

pub const SINGLE: CaseCategory = CaseCategory::Party(PartyShape::SinglePair);
pub const PLAINTIFFS: CaseCategory = CaseCategory::Party(PartyShape::MultiplePlaintiffs);
pub const DEFENDANTS: CaseCategory = CaseCategory::Party(PartyShape::MultipleDefendants);
pub const EMPLOYER: CaseCategory = CaseCategory::Special(SpecialCase::EmployerLiability);

/// Narratives per category, each distinct
pub fn corpus() -> Vec<(i64, CaseCategory, String)> {
    let templates: [(CaseCategory, &str); 4] = [
        (SINGLE, "被告駕駛自小客車於路口未注意車前狀況撞擊原告機車"),
        (PLAINTIFFS, "被告酒後駕車追撞原告等三人所乘坐之車輛致多人受傷"),
        (DEFENDANTS, "兩名被告分別駕駛砂石車與貨車於高速公路夾撞原告"),
        (EMPLOYER, "被告受僱於物流公司於送貨途中闖紅燈撞傷行人原告"),
    ];

    let mut cases = Vec::new();
    let mut id = 1;
    for (category, template) in templates {
        for n in 0..6 {
            cases.push((id, category, format!("{}第{}案", template, n)));
            id += 1;
        }
    }
    cases
}

pub fn seeded_store(db_path: &Path) -> Arc<SqliteCaseStore> {
    let store = Arc::new(SqliteCaseStore::open(db_path).unwrap());
    let embedder = CharHashEmbedder;
    for (id, category, text) in corpus() {
        let vector = embedder.embed(&text).unwrap();
        store.insert_case(id, category, &text, Some(&vector)).unwrap();
        store
            .insert_statutes(id, &format!("民法第184條第1項前段、第191條之2 (案{})", id))
            .unwrap();
    }
    store
}

pub fn manager(store: Arc<SqliteCaseStore>, index_dir: &Path) -> Arc<PartitionManager> {
    Arc::new(PartitionManager::new(store, index_dir.to_path_buf(), BuildParams::default()).unwrap())
}

pub fn engine(store: Arc<SqliteCaseStore>, index_dir: &Path, capacity: usize) -> QueryEngine {
    let cache = Arc::new(IndexCache::new(manager(store.clone(), index_dir), capacity));
    QueryEngine::new(Arc::new(CharHashEmbedder), cache, store)
}

/// HNSW index over one partition's vectors
use super::BuildParams;
use crate::embedding::EmbeddingError;
use crate::error::{CaseIndexError, Result};
use hnsw_rs::prelude::*;

/// hnsw_rs refuses more layers than this
const HNSW_MAX_LAYER: usize = 16;

/// Approximate nearest-neighbor index with positional data ids
///
/// Vector `i` is inserted with data id `i`. The raw vectors are kept so that
/// distances can be reported exactly and the index can be persisted.
pub struct AnnIndex {
    hnsw: Hnsw<'static, f32, DistL2>,
    vectors: Vec<Vec<f32>>,
    dimension: usize,
    params: BuildParams,
}

impl AnnIndex {
    /// Build an index, inserting vectors in position order
    pub fn build(vectors: Vec<Vec<f32>>, params: BuildParams) -> Result<Self> {
        let dimension = vectors
            .first()
            .map(|v| v.len())
            .ok_or_else(|| CaseIndexError::Index("Cannot build an empty index".to_string()))?;

        if dimension == 0 {
            return Err(CaseIndexError::Index(
                "Cannot index zero-length vectors".to_string(),
            ));
        }

        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            }
            .into());
        }

        let hnsw = Hnsw::<f32, DistL2>::new(
            params.m,
            vectors.len(),
            params.max_layer.min(HNSW_MAX_LAYER),
            params.ef_construction,
            DistL2,
        );

        for (position, vector) in vectors.iter().enumerate() {
            hnsw.insert((vector, position));
        }

        Ok(Self {
            hnsw,
            vectors,
            dimension,
            params,
        })
    }

    /// Up to `k` (position, squared distance) pairs, nearest first
    ///
    /// When `k` covers the whole index every vector is returned.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            }
            .into());
        }

        let mut hits: Vec<(usize, f32)> = if k >= self.vectors.len() {
            (0..self.vectors.len())
                .map(|pos| (pos, squared_l2(query, &self.vectors[pos])))
                .collect()
        } else {
            let ef = self.params.ef_search.max(k);
            self.hnsw
                .search(query, k, ef)
                .into_iter()
                .filter(|neighbour| neighbour.d_id < self.vectors.len())
                .map(|neighbour| {
                    let pos = neighbour.d_id;
                    (pos, squared_l2(query, &self.vectors[pos]))
                })
                .collect()
        };

        hits.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.dedup_by_key(|hit| hit.0);
        hits.truncate(k);

        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn params(&self) -> BuildParams {
        self.params
    }

    /// Vectors in position order
    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}

/// Squared Euclidean distance
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

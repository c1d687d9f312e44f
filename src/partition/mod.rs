//! Category index partitions
//!
//! One HNSW index per case category, plus a global bootstrap index over every
//! embedded case. Partitions are built from a full scan of the case store,
//! persisted per key, and replaced wholesale on rebuild.

mod ann;
pub mod blob;

pub use ann::{squared_l2, AnnIndex};
pub use blob::PartitionMetadata;

use crate::error::{CaseIndexError, Result};
use crate::model::{CaseRecord, PartitionKey, QueryResult};
use crate::storage::CaseStore;
use ahash::{HashMap, HashMapExt};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const INDEX_SUFFIX: &str = ".index";
const META_SUFFIX: &str = ".meta.json";

/// HNSW build and search parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildParams {
    /// Graph connectivity factor
    pub m: usize,
    /// Candidate list breadth during construction
    pub ef_construction: usize,
    /// Candidate list breadth during search
    pub ef_search: usize,
    pub max_layer: usize,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            m: 32,
            ef_construction: 200,
            ef_search: 100,
            max_layer: 16,
        }
    }
}

/// One category's ANN index with its position-aligned case ids and texts
pub struct CategoryPartition {
    key: PartitionKey,
    index: AnnIndex,
    case_ids: Vec<i64>,
    texts: Vec<String>,
}

impl CategoryPartition {
    /// Build from records; position `i` is the `i`-th record
    pub fn build(key: PartitionKey, records: &[&CaseRecord], params: BuildParams) -> Result<Self> {
        let vectors = records.iter().map(|r| r.embedding.clone()).collect();
        let index = AnnIndex::build(vectors, params)?;

        Ok(Self {
            key,
            index,
            case_ids: records.iter().map(|r| r.case_id).collect(),
            texts: records.iter().map(|r| r.narrative_text.clone()).collect(),
        })
    }

    pub fn key(&self) -> PartitionKey {
        self.key
    }

    pub fn len(&self) -> usize {
        self.case_ids.len()
    }

    /// Always false for a materialized partition
    pub fn is_empty(&self) -> bool {
        self.case_ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn case_ids(&self) -> &[i64] {
        &self.case_ids
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        self.index.vectors()
    }

    /// Nearest `k` cases, ascending by squared distance. `k` is clamped to `len()`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<QueryResult>> {
        let hits = self.index.search(query, k)?;
        Ok(hits
            .into_iter()
            .map(|(pos, distance)| QueryResult {
                case_id: self.case_ids[pos],
                text: self.texts[pos].clone(),
                distance,
            })
            .collect())
    }
}

impl std::fmt::Debug for CategoryPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryPartition")
            .field("key", &self.key)
            .field("len", &self.len())
            .field("dimension", &self.dimension())
            .finish()
    }
}

/// Builds, persists and reloads partitions
pub struct PartitionManager {
    store: Arc<dyn CaseStore>,
    index_dir: PathBuf,
    params: BuildParams,
    /// Embedding length every indexed case must have, when known up front
    dimension: Option<usize>,
}

impl PartitionManager {
    pub fn new(store: Arc<dyn CaseStore>, index_dir: PathBuf, params: BuildParams) -> Result<Self> {
        fs::create_dir_all(&index_dir).map_err(|e| CaseIndexError::Io {
            source: e,
            context: format!("Failed to create index directory: {}", index_dir.display()),
        })?;

        Ok(Self {
            store,
            index_dir,
            params,
            dimension: None,
        })
    }

    /// Only index embeddings of this length
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn params(&self) -> BuildParams {
        self.params
    }

    /// Rebuild and persist every partition from a full store scan
    ///
    /// Categories without embedded cases are absent from the result and from
    /// disk; stale files for them are removed.
    pub fn build_all_partitions(&self) -> Result<BTreeMap<PartitionKey, CategoryPartition>> {
        let start = std::time::Instant::now();
        let records = self.scan_consistent()?;

        let mut groups: HashMap<PartitionKey, Vec<&CaseRecord>> = HashMap::new();
        for record in &records {
            groups
                .entry(PartitionKey::Category(record.category))
                .or_default()
                .push(record);
        }
        if !records.is_empty() {
            groups.insert(PartitionKey::Global, records.iter().collect());
        }

        let mut partitions = BTreeMap::new();
        for (key, members) in groups {
            let partition = CategoryPartition::build(key, &members, self.params)?;
            self.persist(&partition)?;
            info!("Built partition {} ({} cases)", key, partition.len());
            partitions.insert(key, partition);
        }

        for stale in self.list_persisted()? {
            if !partitions.contains_key(&stale) {
                info!("Removing stale partition {}", stale);
                self.remove_partition(stale)?;
            }
        }

        info!(
            "Rebuilt {} partitions from {} cases in {}ms",
            partitions.len(),
            records.len(),
            start.elapsed().as_millis()
        );

        Ok(partitions)
    }

    /// Rebuild and persist a single partition
    ///
    /// Returns `None` (and removes any persisted copy) when the key has no cases.
    pub fn build_partition(&self, key: PartitionKey) -> Result<Option<CategoryPartition>> {
        let records = self.scan_consistent()?;
        let members: Vec<&CaseRecord> = records
            .iter()
            .filter(|r| match key {
                PartitionKey::Global => true,
                PartitionKey::Category(category) => r.category == category,
            })
            .collect();

        if members.is_empty() {
            self.remove_partition(key)?;
            return Ok(None);
        }

        let partition = CategoryPartition::build(key, &members, self.params)?;
        self.persist(&partition)?;
        info!("Built partition {} ({} cases)", key, partition.len());

        Ok(Some(partition))
    }

    /// Load a persisted partition without rebuilding
    pub fn load_partition(&self, key: PartitionKey) -> Result<CategoryPartition> {
        let (index_path, meta_path) = self.paths(key);
        if !index_path.exists() || !meta_path.exists() {
            return Err(CaseIndexError::PartitionNotFound { key: key.slug() });
        }

        let corrupt = |reason: String| CaseIndexError::CorruptPartition {
            key: key.slug(),
            reason,
        };

        let meta_bytes = fs::read(&meta_path).map_err(|e| CaseIndexError::Io {
            source: e,
            context: format!("Failed to read partition metadata: {}", meta_path.display()),
        })?;
        let metadata: PartitionMetadata = serde_json::from_slice(&meta_bytes)
            .map_err(|e| corrupt(format!("unreadable metadata: {}", e)))?;

        let index_bytes = fs::read(&index_path).map_err(|e| CaseIndexError::Io {
            source: e,
            context: format!("Failed to read partition index: {}", index_path.display()),
        })?;
        if blob::checksum(&index_bytes) != metadata.index_checksum {
            return Err(corrupt("index checksum does not match metadata".to_string()));
        }

        let decoded = blob::decode_index(&index_bytes).map_err(corrupt)?;
        let count = decoded.vectors.len();
        if metadata.case_ids.len() != count || metadata.texts.len() != count {
            return Err(corrupt(format!(
                "metadata has {} ids and {} texts for {} vectors",
                metadata.case_ids.len(),
                metadata.texts.len(),
                count
            )));
        }
        if count == 0 {
            return Err(corrupt("partition has no vectors".to_string()));
        }

        let index = AnnIndex::build(decoded.vectors, decoded.params)?;
        debug!("Loaded partition {} ({} cases)", key, count);

        Ok(CategoryPartition {
            key,
            index,
            case_ids: metadata.case_ids,
            texts: metadata.texts,
        })
    }

    /// Keys that currently have a persisted index file
    pub fn list_persisted(&self) -> Result<Vec<PartitionKey>> {
        let entries = fs::read_dir(&self.index_dir).map_err(|e| CaseIndexError::Io {
            source: e,
            context: format!("Failed to read index directory: {}", self.index_dir.display()),
        })?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CaseIndexError::Io {
                source: e,
                context: "Failed to read index directory entry".to_string(),
            })?;
            let name = entry.file_name();
            let Some(slug) = name.to_str().and_then(|n| n.strip_suffix(INDEX_SUFFIX)) else {
                continue;
            };
            match PartitionKey::from_slug(slug) {
                Some(key) => keys.push(key),
                None => warn!("Ignoring unrecognized index file: {}", slug),
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Delete a persisted partition; missing files are not an error
    pub fn remove_partition(&self, key: PartitionKey) -> Result<()> {
        let (index_path, meta_path) = self.paths(key);
        for path in [meta_path, index_path] {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| CaseIndexError::Io {
                    source: e,
                    context: format!("Failed to remove {}", path.display()),
                })?;
            }
        }
        Ok(())
    }

    fn persist(&self, partition: &CategoryPartition) -> Result<()> {
        let (index_path, meta_path) = self.paths(partition.key);
        let index_bytes = blob::encode_index(partition.vectors(), self.params)?;

        let metadata = PartitionMetadata {
            key: partition.key.slug(),
            label: partition.key.to_string(),
            dimension: partition.dimension(),
            count: partition.len(),
            index_checksum: blob::checksum(&index_bytes),
            built_at: chrono::Utc::now().to_rfc3339(),
            case_ids: partition.case_ids.clone(),
            texts: partition.texts.clone(),
        };
        let meta_bytes = serde_json::to_vec(&metadata).map_err(|e| CaseIndexError::Json {
            source: e,
            context: format!("Failed to serialize metadata for {}", partition.key),
        })?;

        // A crash between the renames leaves a checksum mismatch, which loads as corrupt
        blob::write_atomic(&index_path, &index_bytes)?;
        blob::write_atomic(&meta_path, &meta_bytes)?;
        Ok(())
    }

    /// Embedded cases of the expected dimension
    ///
    /// Without a configured dimension the most common length wins, and a tie
    /// goes to the length seen first in case id order.
    fn scan_consistent(&self) -> Result<Vec<CaseRecord>> {
        let mut records = self.store.scan_embedded_cases()?;
        records.retain(|r| !r.embedding.is_empty());

        let Some(dimension) = self.dimension.or_else(|| majority_dimension(&records)) else {
            return Ok(records);
        };
        records.retain(|r| {
            let keep = r.embedding.len() == dimension;
            if !keep {
                warn!(
                    "Skipping case {}: embedding has {} dims, expected {}",
                    r.case_id,
                    r.embedding.len(),
                    dimension
                );
            }
            keep
        });
        Ok(records)
    }

    fn paths(&self, key: PartitionKey) -> (PathBuf, PathBuf) {
        let slug = key.slug();
        (
            self.index_dir.join(format!("{}{}", slug, INDEX_SUFFIX)),
            self.index_dir.join(format!("{}{}", slug, META_SUFFIX)),
        )
    }
}

fn majority_dimension(records: &[CaseRecord]) -> Option<usize> {
    // (count, first position) per length
    let mut counts: HashMap<usize, (usize, usize)> = HashMap::new();
    for (pos, record) in records.iter().enumerate() {
        counts.entry(record.embedding.len()).or_insert((0, pos)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (a_count, a_first)), (_, (b_count, b_first))| {
            a_count.cmp(b_count).then(b_first.cmp(a_first))
        })
        .map(|(dimension, _)| dimension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CaseCategory, PartyShape, SpecialCase};
    use crate::storage::SqliteCaseStore;
    use std::collections::HashSet;
    use tempfile::TempDir;

    const SINGLE: CaseCategory = CaseCategory::Party(PartyShape::SinglePair);
    const MINOR: CaseCategory = CaseCategory::Special(SpecialCase::MinorDefendant);

    fn setup(temp: &TempDir) -> (Arc<SqliteCaseStore>, PartitionManager) {
        let store = Arc::new(SqliteCaseStore::open(&temp.path().join("cases.db")).unwrap());
        for id in 0..6i64 {
            let category = if id % 2 == 0 { SINGLE } else { MINOR };
            let vector = vec![id as f32, (id * id) as f32, 1.0];
            store
                .insert_case(id, category, &format!("case {}", id), Some(&vector))
                .unwrap();
        }
        let manager = PartitionManager::new(
            store.clone(),
            temp.path().join("indexes"),
            BuildParams::default(),
        )
        .unwrap();
        (store, manager)
    }

    #[test]
    fn test_build_groups_by_category() {
        let temp = TempDir::new().unwrap();
        let (_store, manager) = setup(&temp);

        let partitions = manager.build_all_partitions().unwrap();
        assert_eq!(partitions.len(), 3);

        let single = &partitions[&PartitionKey::Category(SINGLE)];
        assert_eq!(single.case_ids(), &[0, 2, 4]);
        assert_eq!(single.texts()[1], "case 2");

        let global = &partitions[&PartitionKey::Global];
        assert_eq!(global.len(), 6);

        // Each case sits in exactly one category partition
        let mut seen = HashSet::new();
        for (key, partition) in &partitions {
            if *key == PartitionKey::Global {
                continue;
            }
            for id in partition.case_ids() {
                assert!(seen.insert(*id), "case {} in two partitions", id);
            }
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_empty_categories_absent() {
        let temp = TempDir::new().unwrap();
        let (_store, manager) = setup(&temp);

        let partitions = manager.build_all_partitions().unwrap();
        let animal = PartitionKey::Category(CaseCategory::Special(SpecialCase::AnimalCaused));
        assert!(!partitions.contains_key(&animal));
        assert!(matches!(
            manager.load_partition(animal),
            Err(CaseIndexError::PartitionNotFound { .. })
        ));

        let persisted = manager.list_persisted().unwrap();
        assert_eq!(persisted.len(), 3);
        assert!(!persisted.contains(&animal));
    }

    #[test]
    fn test_load_preserves_alignment() {
        let temp = TempDir::new().unwrap();
        let (_store, manager) = setup(&temp);
        manager.build_all_partitions().unwrap();

        let minor = manager.load_partition(PartitionKey::Category(MINOR)).unwrap();
        assert_eq!(minor.case_ids(), &[1, 3, 5]);
        assert_eq!(minor.texts(), &["case 1", "case 3", "case 5"]);
        assert_eq!(minor.vectors()[1], vec![3.0, 9.0, 1.0]);

        let hits = minor.search(&[3.0, 9.0, 1.0], 1).unwrap();
        assert_eq!(hits[0].case_id, 3);
        assert_eq!(hits[0].distance, 0.0);
    }

    #[test]
    fn test_length_mismatch_is_corruption() {
        let temp = TempDir::new().unwrap();
        let (_store, manager) = setup(&temp);
        manager.build_all_partitions().unwrap();

        let key = PartitionKey::Category(SINGLE);
        let (_, meta_path) = manager.paths(key);
        let mut metadata: PartitionMetadata =
            serde_json::from_slice(&fs::read(&meta_path).unwrap()).unwrap();
        metadata.case_ids.pop();
        fs::write(&meta_path, serde_json::to_vec(&metadata).unwrap()).unwrap();

        assert!(matches!(
            manager.load_partition(key),
            Err(CaseIndexError::CorruptPartition { .. })
        ));
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let temp = TempDir::new().unwrap();
        let (_store, manager) = setup(&temp);
        manager.build_all_partitions().unwrap();

        let key = PartitionKey::Global;
        let (index_path, _) = manager.paths(key);
        let other = blob::encode_index(&[vec![0.0, 0.0, 0.0]], BuildParams::default()).unwrap();
        fs::write(&index_path, other).unwrap();

        assert!(matches!(
            manager.load_partition(key),
            Err(CaseIndexError::CorruptPartition { .. })
        ));
    }

    #[test]
    fn test_stale_partition_removed_on_rebuild() {
        let temp = TempDir::new().unwrap();
        let (store, manager) = setup(&temp);
        manager.build_all_partitions().unwrap();

        // A leftover partition from an older store
        let animal = PartitionKey::Category(CaseCategory::Special(SpecialCase::AnimalCaused));
        let stale = CategoryPartition::build(
            animal,
            &[&store.scan_embedded_cases().unwrap()[0]],
            BuildParams::default(),
        )
        .unwrap();
        manager.persist(&stale).unwrap();
        assert!(manager.list_persisted().unwrap().contains(&animal));

        manager.build_all_partitions().unwrap();
        assert!(!manager.list_persisted().unwrap().contains(&animal));
    }

    #[test]
    fn test_mismatched_dimension_skipped() {
        let temp = TempDir::new().unwrap();
        let (store, manager) = setup(&temp);
        store.insert_case(99, SINGLE, "odd", Some(&[1.0, 2.0])).unwrap();

        let partitions = manager.build_all_partitions().unwrap();
        assert!(!partitions[&PartitionKey::Global].case_ids().contains(&99));
    }

    #[test]
    fn test_stale_low_id_vector_does_not_win() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SqliteCaseStore::open(&temp.path().join("cases.db")).unwrap());
        store.insert_case(0, SINGLE, "stale", Some(&[1.0f32, 2.0][..])).unwrap();
        for id in 1..6i64 {
            let vector = vec![id as f32, 0.0, 1.0];
            store
                .insert_case(id, SINGLE, &format!("case {}", id), Some(&vector))
                .unwrap();
        }
        let manager =
            PartitionManager::new(store.clone(), temp.path().join("indexes"), BuildParams::default())
                .unwrap();

        let global = manager.build_partition(PartitionKey::Global).unwrap().unwrap();
        assert_eq!(global.case_ids(), &[1, 2, 3, 4, 5]);
        assert_eq!(global.dimension(), 3);
    }

    #[test]
    fn test_configured_dimension_filters() {
        let temp = TempDir::new().unwrap();
        let (store, manager) = setup(&temp);
        for id in 10..20i64 {
            store
                .insert_case(id, SINGLE, "short", Some(&[id as f32, 0.0][..]))
                .unwrap();
        }

        // Ten 2-dim cases outnumber six 3-dim ones, but the embedder says 3
        let manager = manager.with_dimension(3);
        let global = manager.build_partition(PartitionKey::Global).unwrap().unwrap();
        assert_eq!(global.len(), 6);
        assert_eq!(global.dimension(), 3);
    }

    #[test]
    fn test_majority_dimension_tie_keeps_first_seen() {
        let records: Vec<CaseRecord> = [vec![1.0, 2.0], vec![1.0, 2.0, 3.0]]
            .into_iter()
            .enumerate()
            .map(|(id, embedding)| CaseRecord {
                case_id: id as i64,
                category: SINGLE,
                narrative_text: String::new(),
                embedding,
            })
            .collect();
        assert_eq!(majority_dimension(&records), Some(2));
        assert_eq!(majority_dimension(&[]), None);
    }

    #[test]
    fn test_build_single_partition() {
        let temp = TempDir::new().unwrap();
        let (_store, manager) = setup(&temp);

        let minor = manager
            .build_partition(PartitionKey::Category(MINOR))
            .unwrap()
            .unwrap();
        assert_eq!(minor.len(), 3);
        assert_eq!(manager.list_persisted().unwrap(), vec![PartitionKey::Category(MINOR)]);

        let animal = PartitionKey::Category(CaseCategory::Special(SpecialCase::AnimalCaused));
        assert!(manager.build_partition(animal).unwrap().is_none());
    }
}

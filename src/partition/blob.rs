//! Persisted partition layout
//!
//! Each partition is two files in the index directory:
//! - `<slug>.index`: zstd-compressed header plus position-ordered f32 vectors
//! - `<slug>.meta.json`: aligned case ids and texts, plus the BLAKE3 checksum
//!   of the index file so a torn pair is detected on load

use super::BuildParams;
use crate::error::{CaseIndexError, Result};
use crate::storage::database::{decode_vector, encode_vector};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

const MAGIC: &[u8; 4] = b"CIDX";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 8 + 4 * 4;
const ZSTD_LEVEL: i32 = 3;

/// Metadata blob contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionMetadata {
    pub key: String,
    pub label: String,
    pub dimension: usize,
    pub count: usize,
    pub index_checksum: String,
    pub built_at: String,
    pub case_ids: Vec<i64>,
    pub texts: Vec<String>,
}

/// Decoded index blob
#[derive(Debug)]
pub struct IndexBlob {
    pub dimension: usize,
    pub params: BuildParams,
    pub vectors: Vec<Vec<f32>>,
}

/// Serialize and compress vectors for the index file
pub fn encode_index(vectors: &[Vec<f32>], params: BuildParams) -> Result<Vec<u8>> {
    let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);

    let mut raw = Vec::with_capacity(HEADER_LEN + vectors.len() * dimension * 4);
    raw.extend_from_slice(MAGIC);
    raw.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    raw.extend_from_slice(&(dimension as u32).to_le_bytes());
    raw.extend_from_slice(&(vectors.len() as u64).to_le_bytes());
    for value in [
        params.m,
        params.ef_construction,
        params.ef_search,
        params.max_layer,
    ] {
        raw.extend_from_slice(&(value as u32).to_le_bytes());
    }
    for vector in vectors {
        raw.extend_from_slice(&encode_vector(vector));
    }

    zstd::encode_all(&raw[..], ZSTD_LEVEL).map_err(|e| CaseIndexError::Io {
        source: e,
        context: "Failed to compress index blob".to_string(),
    })
}

/// Inverse of [`encode_index`]; any structural problem is reported as the reason string
pub fn decode_index(bytes: &[u8]) -> std::result::Result<IndexBlob, String> {
    let raw = zstd::decode_all(bytes).map_err(|e| format!("decompression failed: {}", e))?;

    if raw.len() < HEADER_LEN || &raw[0..4] != MAGIC {
        return Err("missing index header".to_string());
    }

    let version = u16::from_le_bytes([raw[4], raw[5]]);
    if version != FORMAT_VERSION {
        return Err(format!("unsupported index format version {}", version));
    }

    let read_u32 = |at: usize| u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
    let dimension = read_u32(6) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&raw[10..18]);
    let count = u64::from_le_bytes(count_bytes) as usize;
    let params = BuildParams {
        m: read_u32(18) as usize,
        ef_construction: read_u32(22) as usize,
        ef_search: read_u32(26) as usize,
        max_layer: read_u32(30) as usize,
    };

    let body = &raw[HEADER_LEN..];
    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| "index header overflows".to_string())?;
    if body.len() != expected {
        return Err(format!(
            "index body is {} bytes, header implies {}",
            body.len(),
            expected
        ));
    }

    let vectors = if dimension == 0 {
        Vec::new()
    } else {
        body.chunks_exact(dimension * 4).map(decode_vector).collect()
    };

    Ok(IndexBlob {
        dimension,
        params,
        vectors,
    })
}

pub fn checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Write to `<path>.tmp`, fsync, then rename over `path`
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("")
    ));

    let mut file = fs::File::create(&temp_path).map_err(|e| CaseIndexError::Io {
        source: e,
        context: format!("Failed to create temp file: {}", temp_path.display()),
    })?;
    file.write_all(data).map_err(|e| CaseIndexError::Io {
        source: e,
        context: format!("Failed to write temp file: {}", temp_path.display()),
    })?;
    file.sync_all().map_err(|e| CaseIndexError::Io {
        source: e,
        context: format!("Failed to sync temp file: {}", temp_path.display()),
    })?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| CaseIndexError::Io {
        source: e,
        context: format!(
            "Failed to rename {} -> {}",
            temp_path.display(),
            path.display()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_index_blob_preserves_order_and_params() {
        let vectors = vec![vec![1.0, 2.0, 3.0], vec![-4.0, 5.5, 0.0]];
        let params = BuildParams {
            m: 8,
            ef_construction: 64,
            ef_search: 32,
            max_layer: 4,
        };

        let blob = decode_index(&encode_index(&vectors, params).unwrap()).unwrap();
        assert_eq!(blob.dimension, 3);
        assert_eq!(blob.vectors, vectors);
        assert_eq!(blob.params, params);
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let vectors = vec![vec![1.0; 16]; 4];
        let encoded = encode_index(&vectors, BuildParams::default()).unwrap();
        let raw = zstd::decode_all(&encoded[..]).unwrap();

        let truncated = zstd::encode_all(&raw[..raw.len() - 4], 3).unwrap();
        assert!(decode_index(&truncated).is_err());
        assert!(decode_index(b"not zstd at all").is_err());
    }

    #[test]
    fn test_write_atomic_replaces() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("single-pair.index");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!temp.path().join("single-pair.index.tmp").exists());
    }
}

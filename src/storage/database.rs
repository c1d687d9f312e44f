//! SQLite case store with migrations

use super::CaseStore;
use crate::error::{CaseIndexError, Result};
use crate::model::{CaseCategory, CaseRecord};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Case store backed by a pooled SQLite database
pub struct SqliteCaseStore {
    pool: DbPool,
}

impl SqliteCaseStore {
    /// Open (and migrate) the database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CaseIndexError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(8).build(manager)?;

        let store = Self { pool };
        store.migrate()?;

        Ok(store)
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying case store migration {}", version);

                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Insert a case, optionally with its embedding
    pub fn insert_case(
        &self,
        case_id: i64,
        category: CaseCategory,
        narrative: &str,
        embedding: Option<&[f32]>,
    ) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO cases (case_id, category, narrative, created_at)
             VALUES (?1, ?2, ?3, datetime('now'))",
            params![case_id, category.label(), narrative],
        )?;
        drop(conn);

        if let Some(vector) = embedding {
            self.store_embedding(case_id, vector, "external")?;
        }
        Ok(())
    }

    /// Insert or replace the embedding of a case
    pub fn store_embedding(&self, case_id: i64, vector: &[f32], model: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO embeddings (case_id, vector, dimension, model, created_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))",
            params![case_id, encode_vector(vector), vector.len() as i64, model],
        )?;
        Ok(())
    }

    /// Insert or replace the statute text cited by a case
    pub fn insert_statutes(&self, case_id: i64, text: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO statutes (case_id, text) VALUES (?1, ?2)",
            params![case_id, text],
        )?;
        Ok(())
    }

    /// (case_id, narrative) of every case without an embedding
    pub fn cases_missing_embeddings(&self) -> Result<Vec<(i64, String)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.case_id, c.narrative FROM cases c
             LEFT JOIN embeddings e ON e.case_id = c.case_id
             WHERE e.case_id IS NULL AND length(trim(c.narrative)) > 0
             ORDER BY c.case_id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(i64, String)>>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.get_conn()?;

        let case_count: i64 = conn.query_row("SELECT COUNT(*) FROM cases", [], |row| row.get(0))?;
        let embedded_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;

        let mut stmt = conn.prepare("SELECT category, COUNT(*) FROM cases GROUP BY category")?;
        let mut by_category = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (label, count) = row?;
            *by_category
                .entry(CaseCategory::parse_label(&label))
                .or_insert(0) += count as usize;
        }

        Ok(StoreStats {
            case_count: case_count as usize,
            embedded_count: embedded_count as usize,
            by_category,
        })
    }
}

impl CaseStore for SqliteCaseStore {
    fn scan_embedded_cases(&self) -> Result<Vec<CaseRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.case_id, c.category, c.narrative, e.vector FROM cases c
             JOIN embeddings e ON e.case_id = c.case_id
             ORDER BY c.case_id",
        )?;

        let rows = stmt.query_map([], |row| {
            let label: String = row.get(1)?;
            let bytes: Vec<u8> = row.get(3)?;
            Ok(CaseRecord {
                case_id: row.get(0)?,
                category: CaseCategory::parse_label(&label),
                narrative_text: row.get(2)?,
                embedding: decode_vector(&bytes),
            })
        })?;

        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn lookup_category(&self, case_id: i64) -> Result<Option<CaseCategory>> {
        let conn = self.get_conn()?;
        let label: Option<String> = conn
            .query_row(
                "SELECT category FROM cases WHERE case_id = ?1",
                params![case_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(label.map(|l| CaseCategory::parse_label(&l)))
    }

    fn lookup_statutes(&self, case_id: i64) -> Result<Option<String>> {
        let conn = self.get_conn()?;
        let text = conn
            .query_row(
                "SELECT text FROM statutes WHERE case_id = ?1",
                params![case_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(text)
    }
}

/// Case store statistics
#[derive(Debug)]
pub struct StoreStats {
    pub case_count: usize,
    pub embedded_count: usize,
    pub by_category: BTreeMap<CaseCategory, usize>,
}

/// Little-endian f32 bytes
pub(crate) fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`encode_vector`]; a trailing partial float is ignored
pub(crate) fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE cases (
        case_id INTEGER PRIMARY KEY,
        category TEXT NOT NULL,
        narrative TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX idx_cases_category ON cases(category);

    CREATE TABLE embeddings (
        case_id INTEGER PRIMARY KEY,
        vector BLOB NOT NULL,
        dimension INTEGER NOT NULL,
        model TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY (case_id) REFERENCES cases(case_id) ON DELETE CASCADE
    );

    CREATE INDEX idx_embeddings_model ON embeddings(model);

    CREATE TABLE statutes (
        case_id INTEGER PRIMARY KEY,
        text TEXT NOT NULL,
        FOREIGN KEY (case_id) REFERENCES cases(case_id) ON DELETE CASCADE
    );
    "#,
];

//! Metadata storage using SQLite
//!
//! This module handles all persisted state:
//! - Materials (uploaded course documents and their processing status)
//! - Material chunks (embedded text segments)
//! - Processing queue jobs (see `jobs`)

mod jobs;
mod schema;

pub use jobs::*;
pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Format a timestamp the way every column stores it.
///
/// Fixed-width UTC with milliseconds, so string comparison in SQL orders correctly.
pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Material processing status as seen by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for MaterialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaterialStatus::Pending => write!(f, "pending"),
            MaterialStatus::Queued => write!(f, "queued"),
            MaterialStatus::Processing => write!(f, "processing"),
            MaterialStatus::Completed => write!(f, "completed"),
            MaterialStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for MaterialStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(MaterialStatus::Pending),
            "queued" => Ok(MaterialStatus::Queued),
            "processing" => Ok(MaterialStatus::Processing),
            "completed" => Ok(MaterialStatus::Completed),
            "failed" => Ok(MaterialStatus::Failed),
            _ => Err(Error::Other(format!("Unknown material status: {}", s))),
        }
    }
}

/// An uploaded course material
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Material {
    pub id: String,
    pub title: String,
    pub file_url: String,
    pub course_id: String,
    pub processing_status: String,
    pub chunks_count: i64,
    pub processing_error: Option<String>,
    pub processing_started_at: Option<String>,
    pub processing_completed_at: Option<String>,
    pub processed: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Material {
    pub fn status(&self) -> Result<MaterialStatus> {
        self.processing_status.parse()
    }
}

/// Fields supplied by the upload handler when a material is enqueued
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMaterial {
    pub id: String,
    pub title: String,
    pub file_url: String,
    pub course_id: String,
}

/// A persisted chunk (embedding kept as raw little-endian bytes)
#[derive(Debug, Clone, FromRow)]
pub struct MaterialChunk {
    pub id: String,
    pub material_id: String,
    pub content: String,
    pub embedding: Vec<u8>,
    pub chunk_index: i64,
    pub page_number: Option<i64>,
    pub metadata_json: String,
    pub created_at: String,
}

impl MaterialChunk {
    pub fn embedding(&self) -> Option<Vec<f32>> {
        decode_embedding(&self.embedding)
    }

    pub fn metadata(&self) -> serde_json::Value {
        serde_json::from_str(&self.metadata_json).unwrap_or(serde_json::Value::Null)
    }
}

/// A chunk ready to be written
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub embedding: Vec<f32>,
    pub chunk_index: i64,
    pub page_number: Option<i64>,
    pub metadata: serde_json::Value,
}

/// Retrieval candidate: a chunk joined with its owning material
#[derive(Debug, Clone, FromRow)]
pub struct SearchableChunk {
    pub chunk_id: String,
    pub material_id: String,
    pub material_title: String,
    pub course_id: String,
    pub content: String,
    pub embedding: Vec<u8>,
    pub chunk_index: i64,
    pub page_number: Option<i64>,
    pub material_created_at: String,
}

/// Aggregate counts over materials in a course (or all courses)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialCounts {
    pub total_materials: u64,
    pub processed_materials: u64,
    pub total_chunks: u64,
}

/// Encode an embedding as little-endian f32 bytes
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes; `None` if the length is not a multiple of 4
pub fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Create database with path directly, initializing the schema if needed
    pub async fn new(db_path: &std::path::Path) -> Result<Self> {
        let db = Self::open(db_path).await?;
        if !db.is_initialized().await? {
            db.init_schema().await?;
        }
        Ok(db)
    }

    async fn open(db_path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(10))
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='processing_queue'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    // ===== Material Operations =====

    /// Insert a material if no row with this id exists yet
    pub async fn insert_material(&self, material: &NewMaterial) -> Result<bool> {
        let now = format_ts(Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO materials (id, title, file_url, course_id, processing_status, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&material.id)
        .bind(&material.title)
        .bind(&material.file_url)
        .bind(&material.course_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Get material by ID
    pub async fn get_material(&self, id: &str) -> Result<Option<Material>> {
        let material = sqlx::query_as::<_, Material>("SELECT * FROM materials WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(material)
    }

    // ===== Chunk Operations =====

    /// Atomically replace every chunk of a material and mark it processed.
    ///
    /// Either the whole batch becomes visible together with `processed = 1`,
    /// or nothing changes.
    pub async fn replace_material_chunks(
        &self,
        material_id: &str,
        chunks: &[NewChunk],
    ) -> Result<usize> {
        self.write_chunks(material_id, chunks, None).await
    }

    /// Like `replace_material_chunks`, but only while `token` still holds the
    /// job's claim. A stale claimant gets `Error::LeaseLost` and writes nothing.
    pub async fn replace_claimed_chunks(
        &self,
        job_id: &str,
        token: &str,
        material_id: &str,
        chunks: &[NewChunk],
    ) -> Result<usize> {
        self.write_chunks(material_id, chunks, Some((job_id, token)))
            .await
    }

    async fn write_chunks(
        &self,
        material_id: &str,
        chunks: &[NewChunk],
        claim: Option<(&str, &str)>,
    ) -> Result<usize> {
        let now = format_ts(Utc::now());
        let mut tx = self.pool.begin().await?;

        // First write of the transaction; the write lock is held until commit
        if let Some((job_id, token)) = claim {
            let held = sqlx::query(
                r#"
                UPDATE processing_queue SET updated_at = ?
                WHERE id = ? AND claim_token = ? AND status = 'processing'
                "#,
            )
            .bind(&now)
            .bind(job_id)
            .bind(token)
            .execute(&mut *tx)
            .await?;
            if held.rows_affected() == 0 {
                return Err(Error::LeaseLost(job_id.to_string()));
            }
        }

        sqlx::query("DELETE FROM material_chunks WHERE material_id = ?")
            .bind(material_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO material_chunks (id, material_id, content, embedding, chunk_index, page_number, metadata_json, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(material_id)
            .bind(&chunk.content)
            .bind(encode_embedding(&chunk.embedding))
            .bind(chunk.chunk_index)
            .bind(chunk.page_number)
            .bind(chunk.metadata.to_string())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        let updated = sqlx::query(
            "UPDATE materials SET processed = 1, chunks_count = ?, updated_at = ? WHERE id = ?",
        )
        .bind(chunks.len() as i64)
        .bind(&now)
        .bind(material_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls the chunk inserts back
            return Err(Error::MaterialNotFound(material_id.to_string()));
        }

        tx.commit().await?;
        debug!(material_id, count = chunks.len(), "Replaced material chunks");
        Ok(chunks.len())
    }

    /// Get chunks for a material in reconstruction order
    pub async fn get_chunks(&self, material_id: &str) -> Result<Vec<MaterialChunk>> {
        let chunks = sqlx::query_as::<_, MaterialChunk>(
            "SELECT * FROM material_chunks WHERE material_id = ? ORDER BY chunk_index",
        )
        .bind(material_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    /// Chunks eligible for retrieval: processed materials only, hard course filter
    pub async fn list_searchable_chunks(
        &self,
        course_id: Option<&str>,
    ) -> Result<Vec<SearchableChunk>> {
        let rows = sqlx::query_as::<_, SearchableChunk>(
            r#"
            SELECT
                c.id AS chunk_id,
                c.material_id AS material_id,
                m.title AS material_title,
                m.course_id AS course_id,
                c.content AS content,
                c.embedding AS embedding,
                c.chunk_index AS chunk_index,
                c.page_number AS page_number,
                m.created_at AS material_created_at
            FROM material_chunks c
            JOIN materials m ON c.material_id = m.id
            WHERE m.processed = 1 AND (? IS NULL OR m.course_id = ?)
            "#,
        )
        .bind(course_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ===== Statistics =====

    /// Material and chunk counts, optionally scoped to a course
    pub async fn material_counts(&self, course_id: Option<&str>) -> Result<MaterialCounts> {
        let (total, processed, chunks): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN processed = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN processed = 1 THEN chunks_count ELSE 0 END), 0)
            FROM materials
            WHERE (? IS NULL OR course_id = ?)
            "#,
        )
        .bind(course_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(MaterialCounts {
            total_materials: total.max(0) as u64,
            processed_materials: processed.max(0) as u64,
            total_chunks: chunks.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");

        let db = MetaDb::connect(&config).await.unwrap();
        db.init_schema().await.unwrap();
        (db, tmp)
    }

    fn new_material(id: &str, course: &str) -> NewMaterial {
        NewMaterial {
            id: id.to_string(),
            title: format!("Title {id}"),
            file_url: format!("https://files.example/{id}.pdf"),
            course_id: course.to_string(),
        }
    }

    fn new_chunk(index: i64, text: &str) -> NewChunk {
        NewChunk {
            content: text.to_string(),
            embedding: vec![index as f32, 1.0, -0.5],
            chunk_index: index,
            page_number: Some(1),
            metadata: serde_json::json!({ "char_start": 0 }),
        }
    }

    #[test]
    fn test_embedding_codec() {
        let v = vec![0.25f32, -1.5, 3.0];
        let bytes = encode_embedding(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode_embedding(&bytes).unwrap(), v);
        assert!(decode_embedding(&bytes[..5]).is_none());
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let a = Utc::now();
        let b = a + chrono::Duration::milliseconds(1500);
        assert!(format_ts(a) < format_ts(b));
        assert_eq!(format_ts(a).len(), format_ts(b).len());
    }

    #[tokio::test]
    async fn test_insert_material_is_idempotent() {
        let (db, _tmp) = setup_test_db().await;

        assert!(db.insert_material(&new_material("m1", "c1")).await.unwrap());
        let mut changed = new_material("m1", "c1");
        changed.title = "Other".to_string();
        assert!(!db.insert_material(&changed).await.unwrap());

        let loaded = db.get_material("m1").await.unwrap().unwrap();
        assert_eq!(loaded.title, "Title m1");
        assert_eq!(loaded.status().unwrap(), MaterialStatus::Pending);
        assert!(!loaded.processed);
    }

    #[tokio::test]
    async fn test_replace_material_chunks() {
        let (db, _tmp) = setup_test_db().await;
        db.insert_material(&new_material("m1", "c1")).await.unwrap();

        let written = db
            .replace_material_chunks("m1", &[new_chunk(0, "a"), new_chunk(1, "b")])
            .await
            .unwrap();
        assert_eq!(written, 2);

        // Reprocessing replaces the whole set
        db.replace_material_chunks("m1", &[new_chunk(0, "only")])
            .await
            .unwrap();
        let chunks = db.get_chunks("m1").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "only");
        assert_eq!(chunks[0].embedding().unwrap(), vec![0.0, 1.0, -0.5]);
        assert_eq!(chunks[0].metadata()["char_start"], 0);

        let material = db.get_material("m1").await.unwrap().unwrap();
        assert!(material.processed);
        assert_eq!(material.chunks_count, 1);
    }

    #[tokio::test]
    async fn test_replace_material_chunks_rolls_back_on_failure() {
        let (db, _tmp) = setup_test_db().await;
        db.insert_material(&new_material("m1", "c1")).await.unwrap();
        db.replace_material_chunks("m1", &[new_chunk(0, "old")])
            .await
            .unwrap();

        // Duplicate chunk_index violates UNIQUE(material_id, chunk_index)
        let result = db
            .replace_material_chunks("m1", &[new_chunk(0, "new"), new_chunk(0, "dup")])
            .await;
        assert!(result.is_err());

        let chunks = db.get_chunks("m1").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "old");
    }

    #[tokio::test]
    async fn test_replace_chunks_for_unknown_material() {
        let (db, _tmp) = setup_test_db().await;
        let result = db.replace_material_chunks("ghost", &[]).await;
        assert!(matches!(result, Err(Error::MaterialNotFound(_))));
    }

    #[tokio::test]
    async fn test_searchable_chunks_filter() {
        let (db, _tmp) = setup_test_db().await;
        db.insert_material(&new_material("m1", "c1")).await.unwrap();
        db.insert_material(&new_material("m2", "c2")).await.unwrap();
        db.insert_material(&new_material("m3", "c1")).await.unwrap();
        db.replace_material_chunks("m1", &[new_chunk(0, "one")])
            .await
            .unwrap();
        db.replace_material_chunks("m2", &[new_chunk(0, "two")])
            .await
            .unwrap();

        let c1 = db.list_searchable_chunks(Some("c1")).await.unwrap();
        assert_eq!(c1.len(), 1);
        assert_eq!(c1[0].material_id, "m1");
        assert_eq!(c1[0].material_title, "Title m1");

        let all = db.list_searchable_chunks(None).await.unwrap();
        assert_eq!(all.len(), 2);

        assert!(db.list_searchable_chunks(Some("c3")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_material_counts() {
        let (db, _tmp) = setup_test_db().await;

        let empty = db.material_counts(None).await.unwrap();
        assert_eq!(empty.total_materials, 0);
        assert_eq!(empty.total_chunks, 0);

        db.insert_material(&new_material("m1", "c1")).await.unwrap();
        db.insert_material(&new_material("m2", "c1")).await.unwrap();
        db.insert_material(&new_material("m3", "c2")).await.unwrap();
        db.replace_material_chunks("m1", &[new_chunk(0, "a"), new_chunk(1, "b")])
            .await
            .unwrap();
        db.replace_material_chunks("m3", &[new_chunk(0, "c")])
            .await
            .unwrap();

        let c1 = db.material_counts(Some("c1")).await.unwrap();
        assert_eq!(
            c1,
            MaterialCounts {
                total_materials: 2,
                processed_materials: 1,
                total_chunks: 2,
            }
        );

        let all = db.material_counts(None).await.unwrap();
        assert_eq!(all.total_chunks, 3);
        assert_eq!(all.processed_materials, 2);
    }
}

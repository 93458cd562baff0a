//! Index Store - rusqlite 기반 인덱스 스냅샷 저장소
//!
//! `ingest`와 `ask`가 서로 다른 프로세스에서 실행되므로
//! 완성된 인덱스를 통째로 저장하고 다시 읽어옵니다.
//! 저장 위치: ~/.docchat-rag/index.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::error::{RagError, Result};

use super::chunker::Chunk;
use super::index::{SourceMetadata, VectorIndex};

/// 인덱스 DB 파일 이름
pub const INDEX_DB_FILE: &str = "index.db";

// ============================================================================
// Types
// ============================================================================

/// 저장된 스냅샷 정보
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub model_id: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub document_count: usize,
    pub built_at: Option<DateTime<Utc>>,
    pub db_path: PathBuf,
}

// ============================================================================
// IndexStore
// ============================================================================

/// 인덱스 스냅샷 저장소
pub struct IndexStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl IndexStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 데이터 디렉토리에서 열기
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        Self::open(&data_dir.join(INDEX_DB_FILE))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RagError::Storage(format!("Lock error: {}", e)))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                position INTEGER PRIMARY KEY,
                id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                source_name TEXT NOT NULL,
                source_path TEXT,
                sequence INTEGER NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL,
                ingested_at TEXT
            );
            "#,
        )?;

        tracing::debug!("Index store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 인덱스 스냅샷 저장 (기존 스냅샷은 교체)
    ///
    /// 하나의 트랜잭션에서 수행되므로 중간 실패 시 이전 스냅샷이 유지됩니다.
    pub fn save(&self, index: &VectorIndex, model_id: &str) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM chunks", [])?;
        tx.execute("DELETE FROM index_meta", [])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks
                 (position, id, document_id, source_name, source_path, sequence, text, vector, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;

            for (position, entry) in index.entries().iter().enumerate() {
                let source_path = entry
                    .source
                    .source_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned());
                let ingested_at = entry.source.ingested_at.map(|t| t.to_rfc3339());

                stmt.execute(params![
                    position as i64,
                    entry.chunk.id,
                    entry.source.document_id,
                    entry.chunk.source_name,
                    source_path,
                    entry.chunk.sequence as i64,
                    entry.chunk.text,
                    encode_vector(&entry.vector),
                    ingested_at,
                ])?;
            }
        }

        let meta = [
            ("model_id", model_id.to_string()),
            ("dimension", index.dimension().to_string()),
            ("built_at", Utc::now().to_rfc3339()),
        ];
        for (key, value) in meta {
            tx.execute(
                "INSERT INTO index_meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }

        tx.commit()?;

        tracing::info!(
            "Saved index snapshot: {} chunks ({}) to {:?}",
            index.len(),
            model_id,
            self.db_path
        );
        Ok(index.len())
    }

    /// 스냅샷 로드
    ///
    /// 저장된 스냅샷이 없으면 `None`, 다른 모델/차원으로 만든 스냅샷이면
    /// `DimensionMismatch`를 반환합니다.
    pub fn load(&self, model_id: &str, dimension: usize) -> Result<Option<VectorIndex>> {
        let conn = self.lock()?;

        let Some(stored_model) = read_meta(&conn, "model_id")? else {
            return Ok(None);
        };
        let stored_dimension: usize = read_meta(&conn, "dimension")?
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| RagError::Storage("Missing index dimension".to_string()))?;

        if stored_dimension != dimension {
            return Err(RagError::DimensionMismatch {
                context: format!("stored index built with '{}'", stored_model),
                expected: dimension,
                actual: stored_dimension,
            });
        }
        if stored_model != model_id {
            return Err(RagError::Config(format!(
                "Stored index was built with '{}' but the current embedder is '{}'. Re-run ingest.",
                stored_model, model_id
            )));
        }

        let mut stmt = conn.prepare(
            "SELECT id, document_id, source_name, source_path, sequence, text, vector, ingested_at
             FROM chunks ORDER BY position",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                Chunk {
                    id: row.get(0)?,
                    source_name: row.get(2)?,
                    sequence: row.get::<_, i64>(4)? as usize,
                    text: row.get(5)?,
                },
                SourceMetadata {
                    document_id: row.get(1)?,
                    source_path: row.get::<_, Option<String>>(3)?.map(PathBuf::from),
                    ingested_at: row
                        .get::<_, Option<String>>(7)?
                        .and_then(|s| parse_datetime(&s)),
                },
                row.get::<_, Vec<u8>>(6)?,
            ))
        })?;

        let mut index = VectorIndex::new(dimension);
        for row in rows {
            let (chunk, source, blob) = row?;
            let vector = decode_vector(&blob)?;
            index.insert_with_source(&source, vec![chunk], vec![vector])?;
        }

        tracing::debug!("Loaded index snapshot: {} chunks", index.len());
        Ok(Some(index))
    }

    /// 스냅샷 정보 조회
    pub fn info(&self) -> Result<Option<SnapshotInfo>> {
        let conn = self.lock()?;

        let Some(model_id) = read_meta(&conn, "model_id")? else {
            return Ok(None);
        };
        let dimension = read_meta(&conn, "dimension")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let built_at = read_meta(&conn, "built_at")?.and_then(|s| parse_datetime(&s));

        let chunk_count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let document_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT document_id) FROM chunks",
            [],
            |row| row.get(0),
        )?;

        Ok(Some(SnapshotInfo {
            model_id,
            dimension,
            chunk_count: chunk_count as usize,
            document_count: document_count as usize,
            built_at,
            db_path: self.db_path.clone(),
        }))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

/// RFC3339 문자열 파싱
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// f32 벡터 → little-endian 바이트
fn encode_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// little-endian 바이트 → f32 벡터
fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(RagError::Storage(format!(
            "Corrupt vector blob ({} bytes)",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, IndexStore) {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open_in(dir.path()).unwrap();
        (dir, store)
    }

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new(3);
        let source = SourceMetadata {
            document_id: "doc-a".to_string(),
            source_path: Some(PathBuf::from("/tmp/a.pdf")),
            ingested_at: Some(Utc::now()),
        };
        let chunks = (0..3)
            .map(|i| Chunk {
                id: format!("doc-a-{}", i),
                source_name: "a.pdf".to_string(),
                text: format!("본문 {}", i),
                sequence: i,
            })
            .collect();
        let vectors = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.5, 0.5, -0.25],
        ];
        index.insert_with_source(&source, chunks, vectors).unwrap();
        index
    }

    #[test]
    fn test_load_without_snapshot() {
        let (_dir, store) = create_test_store();
        assert!(store.load("hash-v1", 3).unwrap().is_none());
        assert!(store.info().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (_dir, store) = create_test_store();
        let index = sample_index();
        store.save(&index, "hash-v1").unwrap();

        let loaded = store.load("hash-v1", 3).unwrap().unwrap();
        assert_eq!(loaded.len(), 3);

        for (a, b) in index.entries().iter().zip(loaded.entries()) {
            assert_eq!(a.chunk, b.chunk);
            assert_eq!(a.vector, b.vector);
            assert_eq!(a.source.document_id, b.source.document_id);
            assert_eq!(a.source.source_path, b.source.source_path);
        }

        let q = [0.5, 0.5, -0.25];
        let before = index.search(&q, 3).unwrap();
        let after = loaded.search(&q, 3).unwrap();
        let ids = |r: &crate::knowledge::QueryResult| {
            r.iter().map(|h| h.chunk.id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&before), ids(&after));
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let (_dir, store) = create_test_store();
        store.save(&sample_index(), "hash-v1").unwrap();
        store.save(&VectorIndex::new(3), "hash-v1").unwrap();

        let loaded = store.load("hash-v1", 3).unwrap().unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_load_rejects_other_model() {
        let (_dir, store) = create_test_store();
        store.save(&sample_index(), "hash-v1").unwrap();

        assert!(matches!(
            store.load("hash-v1", 384),
            Err(RagError::DimensionMismatch { expected: 384, actual: 3, .. })
        ));
        assert!(matches!(
            store.load("ollama/all-minilm", 3),
            Err(RagError::Config(_))
        ));
    }

    #[test]
    fn test_info() {
        let (_dir, store) = create_test_store();
        store.save(&sample_index(), "hash-v1").unwrap();

        let info = store.info().unwrap().unwrap();
        assert_eq!(info.model_id, "hash-v1");
        assert_eq!(info.dimension, 3);
        assert_eq!(info.chunk_count, 3);
        assert_eq!(info.document_count, 1);
        assert!(info.built_at.is_some());
    }

    #[test]
    fn test_vector_codec() {
        let v = vec![1.5, -0.25, 0.0, f32::MAX];
        assert_eq!(decode_vector(&encode_vector(&v)).unwrap(), v);
        assert!(decode_vector(&[0, 1, 2]).is_err());
    }
}

//! SQLite entry store with migrations
//!
//! Source of truth for indexed chunks: content, metadata, embeddings and the id counter.
//! The vector graph and the in-memory entry map are rebuilt from here on open.

use crate::document::{Chunk, ChunkId, Metadata};
use crate::error::{RaglineError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

const META_NEXT_ID: &str = "next_id";

/// One persisted index entry
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub chunk: Chunk,
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

impl StoredEntry {
    /// The chunk id; entries in the store always carry one
    pub fn id(&self) -> ChunkId {
        self.chunk.id.unwrap_or_default()
    }
}

/// BLAKE3 hex digest of chunk content, used for distinct-content statistics
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Entry store backed by SQLite
pub struct EntryStore {
    pool: DbPool,
}

impl EntryStore {
    /// Open (or create) a store file
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RaglineError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder().max_size(4).build(manager)?;

        {
            let conn = pool.get()?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    /// A private in-memory store
    ///
    /// Every pooled connection to `:memory:` is its own database, so the pool holds
    /// exactly one connection and never recycles it.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;

        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
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
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Read a value from the `index_meta` table
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a value into the `index_meta` table
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Next id to hand out; ids are never reused, even after deletes and clears
    pub fn next_id(&self) -> Result<ChunkId> {
        match self.get_meta(META_NEXT_ID)? {
            Some(value) => value.parse().map_err(|_| {
                RaglineError::Config(format!("Corrupt id counter in entry store: {}", value))
            }),
            None => Ok(1),
        }
    }

    /// Insert a batch of entries and advance the id counter, all in one transaction
    pub fn insert_entries(&self, entries: &[StoredEntry], next_id: ChunkId) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().timestamp();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks
                    (id, content, content_hash, metadata, source_index, total_chunks, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;

            for entry in entries {
                let metadata =
                    serde_json::to_string(&entry.chunk.metadata).map_err(|e| RaglineError::Json {
                        source: e,
                        context: "Failed to serialize chunk metadata".to_string(),
                    })?;

                stmt.execute(params![
                    entry.id() as i64,
                    entry.chunk.content,
                    entry.content_hash,
                    metadata,
                    entry.chunk.source_index as i64,
                    entry.chunk.total_chunks as i64,
                    encode_vector(&entry.embedding),
                    now,
                ])?;
            }
        }

        tx.execute(
            "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![META_NEXT_ID, next_id.to_string()],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Load every entry in id order
    pub fn load_all(&self) -> Result<Vec<StoredEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, content_hash, metadata, source_index, total_chunks, embedding
             FROM chunks ORDER BY id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Vec<u8>>(6)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, content, content_hash, metadata, source_index, total_chunks, embedding) = row?;
            let metadata: Metadata =
                serde_json::from_str(&metadata).map_err(|e| RaglineError::Json {
                    source: e,
                    context: format!("Corrupt metadata for chunk {}", id),
                })?;

            entries.push(StoredEntry {
                chunk: Chunk {
                    id: Some(id as ChunkId),
                    content,
                    metadata,
                    source_index: source_index as usize,
                    total_chunks: total_chunks as usize,
                },
                content_hash,
                embedding: decode_vector(&embedding),
            });
        }

        Ok(entries)
    }

    /// Delete entries by id in one transaction, returning how many rows went away
    pub fn delete_ids(&self, ids: &[ChunkId]) -> Result<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut removed = 0;

        {
            let mut stmt = tx.prepare("DELETE FROM chunks WHERE id = ?1")?;
            for id in ids {
                removed += stmt.execute(params![*id as i64])?;
            }
        }

        tx.commit()?;
        Ok(removed)
    }

    /// Remove every entry; the id counter is kept
    pub fn clear(&self) -> Result<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM chunks", [])?)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Little-endian f32 bytes
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE chunks (
        id INTEGER PRIMARY KEY,
        content TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        metadata TEXT NOT NULL,  -- JSON object
        source_index INTEGER NOT NULL,
        total_chunks INTEGER NOT NULL,
        embedding BLOB NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE INDEX idx_chunks_hash ON chunks(content_hash);

    CREATE TABLE index_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    "#,
];

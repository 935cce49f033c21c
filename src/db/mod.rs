//! SQLite vector store: documents, chunks, and raw f32 embedding blobs.
use rusqlite::{Connection, Result};
use std::path::Path;
use tracing::{info, warn};

pub mod documents;
pub mod models;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL UNIQUE,
    file_name TEXT NOT NULL,
    original_content TEXT NOT NULL,
    loaded_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    chunk_count INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doc_id INTEGER NOT NULL,
    chunk_index INTEGER NOT NULL,
    chunk_content TEXT NOT NULL,
    embedding BLOB NOT NULL,
    embedding_dim INTEGER NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (doc_id) REFERENCES documents(id) ON DELETE CASCADE,
    UNIQUE (doc_id, chunk_index)
);

CREATE INDEX IF NOT EXISTS idx_doc_id ON chunks(doc_id);
"#;

/// A wrapper around a SQLite connection initialized with the vector store schema.
pub struct Db {
    pub(crate) conn: Connection,
}

impl Db {
    /// Open a database connection at the given path and initialize the schema.
    ///
    /// Schema setup is idempotent and safe to run on every process start.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Initializing vector database: {}", path.display());

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self { conn })
    }

    /// Open an in-memory database connection (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }
}

/// Serialize an f32 vector into a little-endian byte blob for storage.
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode an embedding blob back into an f32 vector.
///
/// A corrupted or wrong-length blob degrades to a zero vector of the
/// expected dimension, which sorts last under cosine similarity instead
/// of breaking the search path.
pub fn deserialize_vector(blob: &[u8], dim: usize) -> Vec<f32> {
    if blob.len() != dim * 4 {
        warn!(
            "embedding blob has {} bytes, expected {} for dim {dim}; substituting zero vector",
            blob.len(),
            dim * 4
        );
        return vec![0.0; dim];
    }

    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

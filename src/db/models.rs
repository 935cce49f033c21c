use chrono::{DateTime, Utc};

/// A chunk ready for insertion, borrowed from the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct NewChunk<'a> {
    pub index: usize,
    pub content: &'a str,
}

/// One row of the full chunk scan used by search.
#[derive(Debug)]
pub struct ChunkRow {
    pub chunk_content: String,
    pub file_name: String,
    pub embedding: Vec<u8>,
    pub embedding_dim: usize,
}

/// Document metadata without content.
#[derive(Debug)]
pub struct DocumentRecord {
    pub id: i64,
    pub file_path: String,
    pub file_name: String,
    pub chunk_count: usize,
    pub loaded_at: DateTime<Utc>,
}

/// Store-level counters.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of document rows.
    pub documents: usize,
    /// Number of chunk rows.
    pub chunks: usize,
    /// Sum of the chunk_count column across documents. Should equal
    /// `chunks` unless a past ingest was interrupted.
    pub declared_chunks: usize,
}

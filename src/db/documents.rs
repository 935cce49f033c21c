use super::{Db, models::*, serialize_vector};
use rusqlite::{OptionalExtension, Result, Transaction, params};

impl Db {
    /// Whether a document with this file path is already stored.
    pub fn document_exists(&self, file_path: &str) -> Result<bool> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM documents WHERE file_path = ?",
                params![file_path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.is_some())
    }

    /// List all stored documents (metadata only).
    pub fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_path, file_name, chunk_count, loaded_at FROM documents ORDER BY file_path",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DocumentRecord {
                id: row.get(0)?,
                file_path: row.get(1)?,
                file_name: row.get(2)?,
                chunk_count: row.get::<_, i64>(3)? as usize,
                loaded_at: row.get(4)?,
            })
        })?;

        rows.collect()
    }

    /// Delete a document and all of its chunks. Returns whether a row was removed.
    pub fn delete_document(&self, file_path: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM documents WHERE file_path = ?",
            params![file_path],
        )?;
        Ok(rows > 0)
    }

    /// Insert a document together with all of its chunks and embeddings
    /// in a single transaction.
    ///
    /// Fails if the file path is already present; callers decide between
    /// skip and replace. A crash mid-insert leaves neither an orphaned
    /// chunk nor a half-written document behind.
    pub fn insert_document(
        &mut self,
        file_path: &str,
        file_name: &str,
        original_content: &str,
        chunks: &[NewChunk<'_>],
        embeddings: &[Vec<f32>],
        embedding_dim: usize,
    ) -> Result<i64> {
        let tx = self.conn.transaction()?;
        let doc_id = insert_in_tx(
            &tx,
            file_path,
            file_name,
            original_content,
            chunks,
            embeddings,
            embedding_dim,
        )?;
        tx.commit()?;
        Ok(doc_id)
    }

    /// Replace a stored document with a fresh chunk set, deleting the old
    /// row (cascading to its chunks) and reinserting in one transaction.
    ///
    /// The old version survives any failure before commit, so a replace
    /// that cannot complete never loses the previously stored document.
    pub fn replace_document(
        &mut self,
        file_path: &str,
        file_name: &str,
        original_content: &str,
        chunks: &[NewChunk<'_>],
        embeddings: &[Vec<f32>],
        embedding_dim: usize,
    ) -> Result<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM documents WHERE file_path = ?",
            params![file_path],
        )?;
        let doc_id = insert_in_tx(
            &tx,
            file_path,
            file_name,
            original_content,
            chunks,
            embeddings,
            embedding_dim,
        )?;
        tx.commit()?;
        Ok(doc_id)
    }

    /// Full scan of every stored chunk with its owning file name.
    ///
    /// Search scores these in application code; corpora are small markdown
    /// sets, so O(n) per query is the intended design.
    pub fn get_all_chunks(&self) -> Result<Vec<ChunkRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.chunk_content, d.file_name, c.embedding, c.embedding_dim
            FROM chunks c
            JOIN documents d ON c.doc_id = d.id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ChunkRow {
                chunk_content: row.get(0)?,
                file_name: row.get(1)?,
                embedding: row.get(2)?,
                embedding_dim: row.get::<_, i64>(3)? as usize,
            })
        })?;

        rows.collect()
    }

    /// Document, chunk, and declared-chunk counters.
    pub fn statistics(&self) -> Result<StoreStats> {
        let documents: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        let chunks: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let declared: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(chunk_count), 0) FROM documents",
            [],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            documents: documents as usize,
            chunks: chunks as usize,
            declared_chunks: declared as usize,
        })
    }
}

/// Document row plus all chunk rows, inside the caller's transaction.
fn insert_in_tx(
    tx: &Transaction<'_>,
    file_path: &str,
    file_name: &str,
    original_content: &str,
    chunks: &[NewChunk<'_>],
    embeddings: &[Vec<f32>],
    embedding_dim: usize,
) -> Result<i64> {
    assert_eq!(
        chunks.len(),
        embeddings.len(),
        "chunks and embeddings length mismatch"
    );

    let doc_id: i64 = tx.query_row(
        r#"
        INSERT INTO documents (file_path, file_name, original_content, chunk_count)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
        params![file_path, file_name, original_content, chunks.len() as i64],
        |row| row.get(0),
    )?;

    for (chunk, embedding) in chunks.iter().zip(embeddings) {
        assert_eq!(
            embedding.len(),
            embedding_dim,
            "embedding dimension mismatch"
        );
        tx.execute(
            "INSERT INTO chunks (doc_id, chunk_index, chunk_content, embedding, embedding_dim)
             VALUES (?, ?, ?, ?, ?)",
            params![
                doc_id,
                chunk.index as i64,
                chunk.content,
                serialize_vector(embedding),
                embedding_dim as i64,
            ],
        )?;
    }

    Ok(doc_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_embeddings(n: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..n).map(|i| vec![i as f32 * 0.1; dim]).collect()
    }

    #[test]
    fn test_documents_crud() {
        let mut db = Db::open_in_memory().unwrap();

        let chunks = vec![
            NewChunk {
                index: 0,
                content: "Hello",
            },
            NewChunk {
                index: 1,
                content: "World",
            },
        ];
        db.insert_document(
            "docs/test.md",
            "test.md",
            "Hello World",
            &chunks,
            &sample_embeddings(2, 8),
            8,
        )
        .unwrap();

        assert!(db.document_exists("docs/test.md").unwrap());
        assert!(!db.document_exists("docs/other.md").unwrap());

        let docs = db.list_documents().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_name, "test.md");
        assert_eq!(docs[0].chunk_count, 2);

        let stats = db.statistics().unwrap();
        assert_eq!(
            stats,
            StoreStats {
                documents: 1,
                chunks: 2,
                declared_chunks: 2
            }
        );

        // Delete cascades to chunks
        assert!(db.delete_document("docs/test.md").unwrap());
        assert!(!db.delete_document("docs/test.md").unwrap());
        let stats = db.statistics().unwrap();
        assert_eq!(stats, StoreStats::default());
    }

    #[test]
    fn test_replace_document_swaps_chunk_set() {
        let mut db = Db::open_in_memory().unwrap();

        let old_chunks = vec![
            NewChunk {
                index: 0,
                content: "old one",
            },
            NewChunk {
                index: 1,
                content: "old two",
            },
        ];
        db.insert_document(
            "docs/doc.md",
            "doc.md",
            "old one old two",
            &old_chunks,
            &sample_embeddings(2, 4),
            4,
        )
        .unwrap();

        let new_chunks = vec![NewChunk {
            index: 0,
            content: "fresh",
        }];
        db.replace_document(
            "docs/doc.md",
            "doc.md",
            "fresh",
            &new_chunks,
            &sample_embeddings(1, 4),
            4,
        )
        .unwrap();

        let stats = db.statistics().unwrap();
        assert_eq!(
            stats,
            StoreStats {
                documents: 1,
                chunks: 1,
                declared_chunks: 1
            }
        );
        let rows = db.get_all_chunks().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].chunk_content, "fresh");
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut db = Db::open_in_memory().unwrap();
        let chunks = vec![NewChunk {
            index: 0,
            content: "A",
        }];

        db.insert_document("a.md", "a.md", "A", &chunks, &sample_embeddings(1, 4), 4)
            .unwrap();
        let err = db.insert_document("a.md", "a.md", "A", &chunks, &sample_embeddings(1, 4), 4);
        assert!(err.is_err(), "unique file_path constraint should fire");
    }

    #[test]
    fn test_get_all_chunks() {
        let mut db = Db::open_in_memory().unwrap();

        let chunks_a = vec![
            NewChunk {
                index: 0,
                content: "alpha",
            },
            NewChunk {
                index: 1,
                content: "beta",
            },
        ];
        db.insert_document(
            "docs/a.md",
            "a.md",
            "alpha beta",
            &chunks_a,
            &sample_embeddings(2, 4),
            4,
        )
        .unwrap();

        let chunks_b = vec![NewChunk {
            index: 0,
            content: "gamma",
        }];
        db.insert_document(
            "docs/b.md",
            "b.md",
            "gamma",
            &chunks_b,
            &sample_embeddings(1, 4),
            4,
        )
        .unwrap();

        let rows = db.get_all_chunks().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().any(|r| r.file_name == "b.md"));
        for row in &rows {
            assert_eq!(row.embedding_dim, 4);
            assert_eq!(row.embedding.len(), 16);
        }
    }
}

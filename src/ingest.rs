//! Ingestion pipeline: walk the docs tree, chunk markdown by word windows,
//! embed, and store one document per transaction.
//!
//! A failure on one file is logged and skipped; the run continues with the
//! next file and never aborts the whole corpus for one bad document.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use crate::db::{Db, models::NewChunk};
use crate::embedder::Embedder;

pub struct DocumentIngestion<'a, E: Embedder + ?Sized> {
    docs_dir: PathBuf,
    chunk_size: usize,
    embedder: &'a E,
}

impl<'a, E: Embedder + ?Sized> DocumentIngestion<'a, E> {
    pub fn new<P: Into<PathBuf>>(docs_dir: P, chunk_size: usize, embedder: &'a E) -> Self {
        Self {
            docs_dir: docs_dir.into(),
            chunk_size,
            embedder,
        }
    }

    /// Load every markdown file under the docs root into the store.
    ///
    /// Files already present are skipped unless `overwrite_existing`, in
    /// which case the stored document is deleted (cascading to its chunks)
    /// and reinserted. Returns the number of chunks newly added.
    pub fn load(&self, db: &mut Db, overwrite_existing: bool) -> Result<usize> {
        let md_files = discover_markdown(&self.docs_dir);
        if md_files.is_empty() {
            warn!(
                "No markdown files found under {}",
                self.docs_dir.display()
            );
            return Ok(0);
        }

        info!("Found {} markdown files", md_files.len());

        let mut total_chunks_added = 0;
        for path in &md_files {
            match self.ingest_file(db, path, overwrite_existing) {
                Ok(Some(added)) => total_chunks_added += added,
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping {}: {e:#}", path.display());
                }
            }
        }

        info!("Ingestion finished: {total_chunks_added} chunks added");
        Ok(total_chunks_added)
    }

    /// Ingest a single file. `Ok(None)` means skipped (already stored,
    /// empty, or chunk-less), `Ok(Some(n))` means `n` chunks were stored.
    ///
    /// The store is not touched until the file is read, chunked, and
    /// embedded, so a failure anywhere in that pipeline leaves any
    /// previously stored version of the document intact.
    fn ingest_file(&self, db: &mut Db, path: &Path, overwrite: bool) -> Result<Option<usize>> {
        let path_key = path.to_string_lossy().replace('\\', "/");

        let exists = db.document_exists(&path_key)?;
        if exists && !overwrite {
            debug!("Skipped (already in DB): {path_key}");
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).context("failed to read file")?;
        if content.trim().is_empty() {
            warn!("Empty file: {path_key}");
            return Ok(None);
        }

        let chunks = chunk_words(&content, self.chunk_size);
        if chunks.is_empty() {
            warn!("No chunks created: {path_key}");
            return Ok(None);
        }

        let text_refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let embeddings = self
            .embedder
            .embed_batch(&text_refs)
            .context("failed to create embeddings")?;
        anyhow::ensure!(
            embeddings.len() == chunks.len(),
            "embedding count mismatch: {} embeddings for {} chunks",
            embeddings.len(),
            chunks.len()
        );

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_key.clone());

        let new_chunks: Vec<NewChunk<'_>> = chunks
            .iter()
            .enumerate()
            .map(|(index, content)| NewChunk {
                index,
                content: content.as_str(),
            })
            .collect();

        if exists {
            info!("Overwriting: {path_key}");
            db.replace_document(
                &path_key,
                &file_name,
                &content,
                &new_chunks,
                &embeddings,
                self.embedder.dimensions(),
            )
            .context("failed to replace document")?;
        } else {
            db.insert_document(
                &path_key,
                &file_name,
                &content,
                &new_chunks,
                &embeddings,
                self.embedder.dimensions(),
            )
            .context("failed to store document")?;
        }

        debug!("Stored {} chunks for {path_key}", chunks.len());
        Ok(Some(chunks.len()))
    }
}

/// Recursively collect `.md` files under `root`, sorted for deterministic
/// ordering across runs.
pub fn discover_markdown(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        warn!("Documentation folder not found: {}", root.display());
        return Vec::new();
    }

    let walker = WalkBuilder::new(root).hidden(false).build();
    let mut files: Vec<PathBuf> = walker
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("md"))
        .collect();

    files.sort();
    files
}

/// Split text into word-count chunks with ~10% overlap.
///
/// Every word lands in at least one chunk, consecutive chunks share
/// `max(1, chunk_size / 10)` words, and the window that reaches the final
/// word terminates the tiling. Degenerate input falls back to a single
/// chunk holding the whole text.
pub fn chunk_words(text: &str, chunk_size: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();

    let overlap = (chunk_size / 10).max(1);
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let end = (i + chunk_size).min(words.len());
        let chunk = words[i..end].join(" ");
        if !chunk.is_empty() {
            chunks.push(chunk);
        }

        // The window covering the last word ends the tiling
        if i + chunk_size >= words.len() {
            break;
        }
        i += step;
    }

    if chunks.is_empty() {
        vec![text.to_string()]
    } else {
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;
    use std::fs;
    use tempfile::tempdir;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    /// Errors on any text containing "poison", embeds everything else.
    struct FlakyEmbedder;

    impl Embedder for FlakyEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, crate::embedder::EmbedderError> {
            if text.contains("poison") {
                Err(crate::embedder::EmbedderError::InferenceFailed(
                    "poisoned".into(),
                ))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
        fn embed_batch(
            &self,
            texts: &[&str],
        ) -> Result<Vec<Vec<f32>>, crate::embedder::EmbedderError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }
        fn dimensions(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_chunk_short_text_single_chunk() {
        let text = words(50);
        let chunks = chunk_words(&text, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn test_chunk_overlap() {
        // chunk_size 20 -> overlap 2, step 18
        let text = words(50);
        let chunks = chunk_words(&text, 20);
        assert_eq!(chunks.len(), 3);

        let first: Vec<&str> = chunks[0].split(' ').collect();
        let second: Vec<&str> = chunks[1].split(' ').collect();
        assert_eq!(first.len(), 20);
        // Last 2 words of chunk 0 reappear at the head of chunk 1
        assert_eq!(&first[18..], &second[..2]);
    }

    #[test]
    fn test_chunk_coverage_includes_final_word() {
        for total in [1, 5, 19, 20, 21, 37, 40, 113] {
            let text = words(total);
            let chunks = chunk_words(&text, 20);
            let last_word = format!("w{}", total - 1);
            assert!(
                chunks.last().unwrap().split(' ').any(|w| w == last_word),
                "final chunk must contain the last word for total={total}"
            );

            // Every word appears in at least one chunk
            for i in 0..total {
                let w = format!("w{i}");
                assert!(
                    chunks.iter().any(|c| c.split(' ').any(|cw| cw == w)),
                    "word {w} missing for total={total}"
                );
            }
        }
    }

    #[test]
    fn test_chunk_exact_boundary_no_tail_chunk() {
        // 20 words with chunk_size 20: one chunk, no overlapping tail
        let text = words(20);
        let chunks = chunk_words(&text, 20);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_chunk_empty_text_falls_back_to_whole_text() {
        let chunks = chunk_words("", 100);
        assert_eq!(chunks, vec!["".to_string()]);
    }

    #[test]
    fn test_discover_markdown_sorted() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.md"), "b").unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        fs::write(dir.path().join("sub/c.md"), "c").unwrap();
        fs::write(dir.path().join("notes.txt"), "not markdown").unwrap();

        let files = discover_markdown(dir.path());
        assert_eq!(files.len(), 3);
        let mut sorted = files.clone();
        sorted.sort();
        assert_eq!(files, sorted);
        assert!(files[0].ends_with("a.md"));
    }

    #[test]
    fn test_discover_missing_root() {
        assert!(discover_markdown(Path::new("/nonexistent/docs")).is_empty());
    }

    #[test]
    fn test_load_idempotent_without_overwrite() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("doc.md"), words(45)).unwrap();

        let mut db = Db::open_in_memory().unwrap();
        let embedder = MockEmbedder::new(32);
        let ingestion = DocumentIngestion::new(dir.path(), 20, &embedder);

        let added = ingestion.load(&mut db, false).unwrap();
        assert_eq!(added, 3);

        // Second run adds nothing and leaves counts unchanged
        let added = ingestion.load(&mut db, false).unwrap();
        assert_eq!(added, 0);
        let stats = db.statistics().unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 3);
    }

    #[test]
    fn test_load_overwrite_replaces_chunks() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("doc.md");
        fs::write(&file, words(45)).unwrap();

        let mut db = Db::open_in_memory().unwrap();
        let embedder = MockEmbedder::new(32);
        let ingestion = DocumentIngestion::new(dir.path(), 20, &embedder);

        ingestion.load(&mut db, false).unwrap();
        assert_eq!(db.statistics().unwrap().chunks, 3);

        // Shrink the file; overwrite must leave exactly the new chunk set
        fs::write(&file, words(10)).unwrap();
        let added = ingestion.load(&mut db, true).unwrap();
        assert_eq!(added, 1);
        let stats = db.statistics().unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.declared_chunks, 1);
    }

    #[test]
    fn test_empty_file_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("empty.md"), "   \n\n  ").unwrap();
        fs::write(dir.path().join("real.md"), "some actual words here").unwrap();

        let mut db = Db::open_in_memory().unwrap();
        let embedder = MockEmbedder::new(32);
        let ingestion = DocumentIngestion::new(dir.path(), 20, &embedder);

        ingestion.load(&mut db, false).unwrap();
        let stats = db.statistics().unwrap();
        assert_eq!(stats.documents, 1);
    }

    #[test]
    fn test_failed_overwrite_keeps_previous_version() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("doc.md");
        fs::write(&file, "original words survive").unwrap();

        let mut db = Db::open_in_memory().unwrap();
        let embedder = FlakyEmbedder;
        let ingestion = DocumentIngestion::new(dir.path(), 20, &embedder);

        ingestion.load(&mut db, false).unwrap();
        assert_eq!(db.statistics().unwrap().documents, 1);

        // Re-embedding the rewritten file fails; the stored version
        // must remain untouched rather than vanish with nothing in its place
        fs::write(&file, "poison rewrite").unwrap();
        let added = ingestion.load(&mut db, true).unwrap();
        assert_eq!(added, 0);

        let stats = db.statistics().unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 1);
        let rows = db.get_all_chunks().unwrap();
        assert!(rows[0].chunk_content.contains("original words"));
    }

    #[test]
    fn test_one_bad_file_does_not_abort_run() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.md"), "poison words").unwrap();
        fs::write(dir.path().join("good.md"), "fine words").unwrap();

        let mut db = Db::open_in_memory().unwrap();
        let embedder = FlakyEmbedder;
        let ingestion = DocumentIngestion::new(dir.path(), 20, &embedder);

        let added = ingestion.load(&mut db, false).unwrap();
        assert_eq!(added, 1, "good file ingested despite bad file");
        assert!(db.document_exists(
            &dir.path().join("good.md").to_string_lossy().replace('\\', "/")
        )
        .unwrap());
    }
}

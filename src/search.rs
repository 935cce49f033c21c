//! Semantic search: embed the query, score every stored chunk with cosine
//! similarity, keep the best chunk per file, filter, and return top-k.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::db::{Db, deserialize_vector};
use crate::embedder::Embedder;
use crate::ingest::discover_markdown;

/// Guards against division by zero on degenerate vectors.
const NORM_EPSILON: f32 = 1e-10;

/// Restricts search results to a subset of source files.
#[derive(Debug, Clone)]
pub enum FileFilter {
    /// Exact file name match.
    Name(String),
    /// Any of the given file names.
    Files(Vec<String>),
    /// All markdown files under the configured shared-docs subtree,
    /// resolved fresh on every query.
    CommonDocs,
}

/// One ranked retrieval hit. Ephemeral, owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk_content: String,
    pub file_name: String,
    pub similarity: f32,
}

pub struct SemanticSearcher<'a, E: Embedder + ?Sized> {
    embedder: &'a E,
    common_docs_dir: PathBuf,
}

impl<'a, E: Embedder + ?Sized> SemanticSearcher<'a, E> {
    pub fn new<P: Into<PathBuf>>(embedder: &'a E, common_docs_dir: P) -> Self {
        Self {
            embedder,
            common_docs_dir: common_docs_dir.into(),
        }
    }

    /// Search for the `top_k` most relevant passages, at most one per file.
    ///
    /// An empty store or a filter that eliminates every candidate yields
    /// an empty result, never an error.
    pub fn search(
        &self,
        db: &Db,
        query: &str,
        top_k: usize,
        file_filter: Option<&FileFilter>,
    ) -> Result<Vec<SearchResult>> {
        let query_vec = self
            .embedder
            .embed(query)
            .context("failed to embed query")?;

        let rows = db.get_all_chunks().context("failed to scan chunks")?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        // Best-scoring chunk per source file
        let mut best_per_file: HashMap<String, (String, f32)> = HashMap::new();
        for row in rows {
            let chunk_vec = deserialize_vector(&row.embedding, row.embedding_dim);
            let similarity = cosine_similarity(&query_vec, &chunk_vec);

            match best_per_file.get(&row.file_name) {
                Some((_, existing)) if *existing >= similarity => {}
                _ => {
                    best_per_file.insert(row.file_name, (row.chunk_content, similarity));
                }
            }
        }

        let mut results: Vec<SearchResult> = best_per_file
            .into_iter()
            .map(|(file_name, (chunk_content, similarity))| SearchResult {
                chunk_content,
                file_name,
                similarity,
            })
            .collect();

        // Descending by similarity; stable, so exact ties keep scan order
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });

        if let Some(filter) = file_filter {
            self.apply_filter(&mut results, filter);
        }

        results.truncate(top_k);
        debug!("search returned {} results", results.len());
        Ok(results)
    }

    fn apply_filter(&self, results: &mut Vec<SearchResult>, filter: &FileFilter) {
        match filter {
            FileFilter::Name(name) => results.retain(|r| &r.file_name == name),
            FileFilter::Files(names) => results.retain(|r| names.contains(&r.file_name)),
            FileFilter::CommonDocs => {
                let common = self.common_folder_files();
                debug!(
                    "resolved {} files under {}",
                    common.len(),
                    self.common_docs_dir.display()
                );
                results.retain(|r| common.contains(&r.file_name));
            }
        }
    }

    /// File names of every markdown file under the shared-docs subtree.
    fn common_folder_files(&self) -> Vec<String> {
        discover_markdown(&self.common_docs_dir)
            .iter()
            .filter_map(|p: &PathBuf| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }
}

/// Cosine similarity between two vectors: `dot(a, b) / (|a| * |b| + ε)`.
///
/// Zip-bounded, so a dimension mismatch scores over the shared prefix
/// rather than panicking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt() + NORM_EPSILON)
}

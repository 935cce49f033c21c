//! Retrieval-backed RAG orchestrator: ingest on open, retrieve per
//! question, gate the grounding context by similarity, and delegate
//! generation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use super::generator::AnswerGenerator;
use super::{AnswerResult, QaExchange, RagSystem, content_preview};
use crate::config::Config;
use crate::db::Db;
use crate::embedder::Embedder;
use crate::ingest::DocumentIngestion;
use crate::search::{FileFilter, SearchResult, SemanticSearcher};

/// How many trailing Q/A exchanges are injected into the prompt,
/// regardless of total history length.
const HISTORY_WINDOW: usize = 3;

pub struct RetrievalRagSystem {
    db: Db,
    embedder: Arc<dyn Embedder>,
    generator: Box<dyn AnswerGenerator>,
    docs_dir: PathBuf,
    common_docs_dir: PathBuf,
    chunk_size: usize,
    top_k: usize,
    min_similarity: f32,
    db_path: String,
    embedding_model: String,
}

impl RetrievalRagSystem {
    /// Wire the system around an already-open store. Does not ingest.
    pub fn new(
        db: Db,
        embedder: Arc<dyn Embedder>,
        generator: Box<dyn AnswerGenerator>,
        config: &Config,
    ) -> Self {
        Self {
            db,
            embedder,
            generator,
            docs_dir: PathBuf::from(&config.docs_dir),
            common_docs_dir: PathBuf::from(&config.common_docs_dir),
            chunk_size: config.chunk_size,
            top_k: config.top_k,
            min_similarity: config.min_similarity,
            db_path: config.db_path.clone(),
            embedding_model: config.model.name.clone(),
        }
    }

    /// Open the store at the configured path and load the knowledge base,
    /// overwriting stale entries so the store reflects the docs tree.
    pub fn open(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        generator: Box<dyn AnswerGenerator>,
    ) -> Result<Self> {
        let db = Db::open(&config.db_path).context("failed to open vector database")?;
        let mut system = Self::new(db, embedder, generator, config);
        let added = system.load_knowledge_base(true)?;
        info!("Knowledge base loaded ({added} chunks indexed)");
        Ok(system)
    }

    /// Run ingestion over the docs tree. Returns chunks newly added.
    pub fn load_knowledge_base(&mut self, overwrite_existing: bool) -> Result<usize> {
        let ingestion = DocumentIngestion::new(
            self.docs_dir.clone(),
            self.chunk_size,
            self.embedder.as_ref(),
        );
        ingestion.load(&mut self.db, overwrite_existing)
    }

    fn searcher(&self) -> SemanticSearcher<'_, dyn Embedder> {
        SemanticSearcher::new(self.embedder.as_ref(), self.common_docs_dir.clone())
    }

    /// Grounding context from results clearing the similarity floor.
    /// Empty when nothing clears it; the generator still answers.
    fn build_grounding_context(&self, results: &[SearchResult]) -> String {
        let mut parts = Vec::new();
        for r in results {
            if r.similarity > self.min_similarity {
                parts.push(format!(
                    "[From {} (confidence: {:.2}%)]",
                    r.file_name,
                    r.similarity * 100.0
                ));
                parts.push(r.chunk_content.clone());
                parts.push(String::new());
            }
        }
        parts.join("\n")
    }
}

/// Numbered Q/A block from the last [`HISTORY_WINDOW`] exchanges, ending
/// with the current question restated. Empty when there is no history.
fn build_conversation_context(question: &str, history: &[QaExchange]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut block = String::from("CONVERSATION HISTORY:\n");
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    for (i, qa) in history[start..].iter().enumerate() {
        block.push_str(&format!(
            "Q{n}: {}\nA{n}: {}\n\n",
            qa.question,
            qa.answer,
            n = i + 1
        ));
    }
    block.push_str(&format!("CURRENT QUESTION: {question}"));
    block
}

/// Final prompt: knowledge-base framing when any context exists,
/// bare question otherwise.
fn build_prompt(question: &str, grounding: &str, conversation: &str) -> String {
    let combined = match (conversation.is_empty(), grounding.trim().is_empty()) {
        (false, false) => format!("{conversation}\n\n{grounding}"),
        (false, true) => conversation.to_string(),
        (true, _) => grounding.to_string(),
    };

    if combined.trim().is_empty() {
        format!("Answer the following question:\n\nQUESTION: {question}\n\nANSWER:")
    } else {
        format!(
            "You are a helpful assistant with access to a knowledge base.\n\
             Based on the following knowledge base content, provide a clear and accurate answer to the question.\n\
             If the context doesn't contain relevant information, say so honestly.\n\n\
             {combined}\n\nQUESTION: {question}\n\nANSWER:"
        )
    }
}

impl RagSystem for RetrievalRagSystem {
    fn model_name(&self) -> String {
        self.generator.model_name().to_string()
    }

    fn reload_knowledge_base(&mut self) -> Result<usize> {
        self.load_knowledge_base(false)
    }

    fn answer_question(
        &self,
        question: &str,
        file_filter: Option<&FileFilter>,
        conversation_history: &[QaExchange],
    ) -> AnswerResult {
        info!("Processing question: {question}");

        let conversation = build_conversation_context(question, conversation_history);

        let results = match self.searcher().search(&self.db, question, self.top_k, file_filter) {
            Ok(r) => r,
            Err(e) => {
                warn!("Search failed: {e:#}");
                return AnswerResult {
                    question: question.to_string(),
                    answer: format!("Error processing question: {e:#}"),
                    sources_found: 0,
                    search_results: Vec::new(),
                    timestamp: Utc::now(),
                };
            }
        };

        let grounding = self.build_grounding_context(&results);
        if grounding.trim().is_empty() {
            warn!("No relevant content found in knowledge base");
        } else {
            info!("Retrieved {} relevant chunks", results.len());
        }

        let prompt = build_prompt(question, &grounding, &conversation);

        let answer = match self.generator.generate(&prompt) {
            Ok(text) => text,
            Err(e) => {
                warn!("Generation failed: {e:#}");
                format!("Error generating answer: {e:#}")
            }
        };

        // The similarity floor gates the prompt context only; the summary
        // reports everything the searcher returned.
        let search_results = results
            .iter()
            .map(|r| super::SourceSummary {
                file: r.file_name.clone(),
                confidence: r.similarity,
                content_preview: content_preview(&r.chunk_content),
            })
            .collect();

        AnswerResult {
            question: question.to_string(),
            answer,
            sources_found: results.len(),
            search_results,
            timestamp: Utc::now(),
        }
    }

    fn statistics(&self) -> Result<serde_json::Value> {
        let stats = self.db.statistics()?;
        Ok(json!({
            "documents_loaded": stats.documents,
            "total_chunks": stats.chunks,
            "declared_chunk_total": stats.declared_chunks,
            "vector_database": self.db_path,
            "embedding_model": self.embedding_model,
            "embedding_dimension": self.embedder.dimensions(),
            "generation_model": self.model_name(),
        }))
    }
}

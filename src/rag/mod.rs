//! RAG system variants behind a common capability trait.
//!
//! [`RagKind`] names the available systems; [`build_rag_system`] is the
//! factory returning a polymorphic handle over the shared surface
//! (model name, question answering, statistics, knowledge-base reload).

pub mod conversion;
pub mod generator;
pub mod retrieval;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::embedder::Embedder;
use crate::search::FileFilter;
use conversion::CodeConversionSystem;
use generator::AnswerGenerator;
use retrieval::RetrievalRagSystem;

/// One prior question/answer exchange, used for conversation context.
#[derive(Debug, Clone)]
pub struct QaExchange {
    pub question: String,
    pub answer: String,
}

/// Per-source summary returned alongside an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub file: String,
    pub confidence: f32,
    /// First 100 characters of the matched chunk.
    pub content_preview: String,
}

/// Structured result of one `answer_question` call.
#[derive(Debug, Serialize)]
pub struct AnswerResult {
    pub question: String,
    pub answer: String,
    pub sources_found: usize,
    pub search_results: Vec<SourceSummary>,
    pub timestamp: DateTime<Utc>,
}

/// Shared capability surface of every RAG system variant.
pub trait RagSystem {
    /// Name of the generation model in use.
    fn model_name(&self) -> String;

    /// Re-run ingestion without overwriting existing documents.
    /// Returns the number of chunks newly added.
    fn reload_knowledge_base(&mut self) -> Result<usize>;

    /// Answer a question. Internal failures degrade into the `answer`
    /// field; this call itself does not fail.
    fn answer_question(
        &self,
        question: &str,
        file_filter: Option<&FileFilter>,
        conversation_history: &[QaExchange],
    ) -> AnswerResult;

    /// Variant-specific statistics payload.
    fn statistics(&self) -> Result<serde_json::Value>;
}

/// Available RAG system variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RagKind {
    /// Embedding-backed retrieval + LLM answering.
    Retrieval,
    /// Pass-through code-conversion assistant (no retrieval).
    CodeConversion,
}

/// Construct a RAG system of the requested kind.
///
/// The retrieval variant opens the vector store and performs a full
/// overwrite ingestion so the knowledge base reflects the docs tree.
pub fn build_rag_system(
    kind: RagKind,
    config: &Config,
    embedder: Arc<dyn Embedder>,
    generator: Box<dyn AnswerGenerator>,
) -> Result<Box<dyn RagSystem>> {
    match kind {
        RagKind::Retrieval => Ok(Box::new(RetrievalRagSystem::open(
            config, embedder, generator,
        )?)),
        RagKind::CodeConversion => Ok(Box::new(CodeConversionSystem::new(generator))),
    }
}

/// Trim a chunk to a display preview: first 100 chars plus an ellipsis.
pub fn content_preview(chunk: &str) -> String {
    const PREVIEW_CHARS: usize = 100;
    let mut preview: String = chunk.chars().take(PREVIEW_CHARS).collect();
    if chunk.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_preview_short() {
        assert_eq!(content_preview("short"), "short");
    }

    #[test]
    fn test_content_preview_long() {
        let long = "x".repeat(150);
        let preview = content_preview(&long);
        assert_eq!(preview.chars().count(), 103);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_content_preview_multibyte_boundary() {
        let long = "é".repeat(150);
        let preview = content_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 103);
    }
}

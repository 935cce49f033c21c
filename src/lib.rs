//! # docbot: local RAG question answering over markdown docs
//!
//! Ingests a markdown documentation tree, embeds word-window chunks into a
//! SQLite vector store, and answers questions by grounding an LLM prompt
//! in the best-matching passage per document.
//!
//! ## Architecture
//!
//! - **[`config`]**: JSON configuration with defaults, validation, template generation
//! - **[`db`]**: SQLite vector store (documents, chunks, embedding blobs, statistics)
//! - **[`embedder`]**: text embedding via ONNX Runtime (all-MiniLM-L6-v2), with mock
//! - **[`ingest`]**: markdown discovery, word-window chunking, batch embedding
//! - **[`search`]**: full-scan cosine search with per-file dedup and filters
//! - **[`rag`]**: RAG system variants, answer generation, orchestration

pub mod config;
pub mod db;
pub mod embedder;
pub mod ingest;
pub mod rag;
pub mod search;

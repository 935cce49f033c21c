use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use docbot::config::Config;
use docbot::db::Db;
use docbot::embedder::{Embedder, download, onnx::OnnxEmbedder};
use docbot::ingest::DocumentIngestion;
use docbot::rag::generator::GeminiGenerator;
use docbot::rag::{QaExchange, RagKind, build_rag_system};
use docbot::search::{FileFilter, SemanticSearcher};

#[derive(Parser)]
#[command(name = "docbot", version, about = "RAG question answering over local markdown docs")]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = docbot::config::DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the docs tree into the vector store
    Ingest {
        /// Re-embed files already present in the store
        #[arg(long)]
        overwrite: bool,
    },
    /// Semantic search without answer generation
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Restrict to specific file names (repeatable)
        #[arg(long)]
        file: Vec<String>,
        /// Restrict to the shared docs subtree
        #[arg(long, conflicts_with = "file")]
        common: bool,
    },
    /// Ask a question grounded in the knowledge base
    Ask {
        question: String,
        /// Restrict retrieval to specific file names (repeatable)
        #[arg(long)]
        file: Vec<String>,
        /// Restrict retrieval to the shared docs subtree
        #[arg(long, conflicts_with = "file")]
        common: bool,
        #[arg(long, value_enum, default_value_t = SystemArg::Retrieval)]
        system: SystemArg,
    },
    /// Print vector store statistics
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum SystemArg {
    Retrieval,
    Conversion,
}

impl From<SystemArg> for RagKind {
    fn from(value: SystemArg) -> Self {
        match value {
            SystemArg::Retrieval => RagKind::Retrieval,
            SystemArg::Conversion => RagKind::CodeConversion,
        }
    }
}

fn file_filter(files: Vec<String>, common: bool) -> Option<FileFilter> {
    if common {
        Some(FileFilter::CommonDocs)
    } else if files.len() == 1 {
        files.into_iter().next().map(FileFilter::Name)
    } else if !files.is_empty() {
        Some(FileFilter::Files(files))
    } else {
        None
    }
}

/// Load the embedding model. Fatal if neither the configured device nor
/// the CPU fallback can serve it.
fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let model_dir = Path::new(&config.model.dir);
    download::ensure_model_files(model_dir, &config.download)
        .context("failed to fetch model files")?;

    let embedder = OnnxEmbedder::new(
        model_dir,
        &config.compute.device,
        config.compute.fallback_to_cpu,
        config.model.dimensions,
    )
    .context("failed to load embedding model")?;

    Ok(Arc::new(embedder))
}


fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Command::Ingest { overwrite } => {
            let embedder = build_embedder(&config)?;
            let mut db = Db::open(&config.db_path).context("failed to open database")?;
            let ingestion =
                DocumentIngestion::new(&config.docs_dir, config.chunk_size, embedder.as_ref());
            let added = ingestion.load(&mut db, overwrite)?;
            info!("Done: {added} chunks added");
        }
        Command::Search {
            query,
            top_k,
            file,
            common,
        } => {
            let embedder = build_embedder(&config)?;
            let db = Db::open(&config.db_path).context("failed to open database")?;
            let searcher = SemanticSearcher::new(embedder.as_ref(), &config.common_docs_dir);
            let filter = file_filter(file, common);
            let results = searcher.search(
                &db,
                &query,
                top_k.unwrap_or(config.top_k),
                filter.as_ref(),
            )?;

            if results.is_empty() {
                println!("No results.");
            }
            for (i, r) in results.iter().enumerate() {
                println!(
                    "{}. {} ({:.2}%)\n   {}\n",
                    i + 1,
                    r.file_name,
                    r.similarity * 100.0,
                    docbot::rag::content_preview(&r.chunk_content)
                );
            }
        }
        Command::Ask {
            question,
            file,
            common,
            system,
        } => {
            let embedder = build_embedder(&config)?;
            let api_key = std::env::var(&config.generator.api_key_env).unwrap_or_default();
            let generator = GeminiGenerator::new(
                &config.generator.api_base,
                &api_key,
                &config.generator.model,
            )?;

            let rag = build_rag_system(system.into(), &config, embedder, Box::new(generator))?;
            let filter = file_filter(file, common);
            let history: Vec<QaExchange> = Vec::new();
            let result = rag.answer_question(&question, filter.as_ref(), &history);

            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Stats => {
            let db = Db::open(&config.db_path).context("failed to open database")?;
            let stats = db.statistics()?;
            let documents: Vec<serde_json::Value> = db
                .list_documents()?
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "file_path": d.file_path,
                        "file_name": d.file_name,
                        "chunk_count": d.chunk_count,
                        "loaded_at": d.loaded_at,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "documents_loaded": stats.documents,
                    "total_chunks": stats.chunks,
                    "declared_chunk_total": stats.declared_chunks,
                    "vector_database": config.db_path,
                    "embedding_model": config.model.name,
                    "documents": documents,
                }))?
            );
        }
    }

    Ok(())
}

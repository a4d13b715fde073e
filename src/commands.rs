use anyhow::{Context, Result};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::embeddings::ollama::OllamaClient;
use crate::index::DualLevelIndex;
use crate::indexer::{ConsistencyValidator, Indexer};
use crate::retriever::{HierarchicalRetriever, RetrievalConfig, RetrievalResult};

const PREVIEW_CHARS: usize = 240;

async fn open_index(config: &Config) -> Result<Arc<DualLevelIndex>> {
    let index = DualLevelIndex::open(config)
        .await
        .context("Failed to open vector database")?;
    Ok(Arc::new(index))
}

fn ollama_client(config: &Config) -> Result<Arc<OllamaClient>> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    Ok(Arc::new(client))
}

/// Ingest files into the index, replacing earlier versions of the same file names
#[inline]
pub async fn ingest_files(paths: &[PathBuf]) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let index = open_index(&config).await?;
    let embedder: Arc<dyn Embedder> = ollama_client(&config)?;
    let indexer = Indexer::from_config(Arc::clone(&index), embedder, &config);

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(paths.len() as u64).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Ingesting {msg}")
                .context("Invalid progress template")?,
        )
    } else {
        ProgressBar::hidden()
    };

    let mut failed = 0;
    for path in paths {
        bar.set_message(path.display().to_string());
        match indexer.ingest_file(path).await {
            Ok(report) => {
                bar.println(format!(
                    "✓ {} ({} chunks, {} chars)",
                    report.source, report.chunks, report.characters
                ));
            }
            Err(e) => {
                error!("Failed to ingest {}: {}", path.display(), e);
                bar.println(format!("✗ {}: {}", path.display(), e));
                failed += 1;
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    if let Err(e) = index.optimize().await {
        warn!("Failed to optimize vector database: {}", e);
    }

    let succeeded = paths.len() - failed;
    println!("Ingested {succeeded} of {} files", paths.len());
    if failed > 0 {
        anyhow::bail!("{failed} files could not be ingested");
    }
    Ok(())
}

/// Work out per-query document and chunk counts from the CLI flags.
///
/// A single result budget takes precedence over explicit counts.
fn resolve_counts(
    defaults: &RetrievalConfig,
    budget: Option<usize>,
    docs: Option<usize>,
    chunks: Option<usize>,
) -> (usize, usize) {
    if let Some(k) = budget {
        let split = RetrievalConfig::for_result_budget(k);
        return (split.n_docs, split.n_chunks);
    }
    (
        docs.unwrap_or(defaults.n_docs),
        chunks.unwrap_or(defaults.n_chunks),
    )
}

/// Run a hierarchical query and print the results grouped by document
#[inline]
pub async fn query(
    text: &str,
    budget: Option<usize>,
    docs: Option<usize>,
    chunks: Option<usize>,
) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let index = open_index(&config).await?;
    let embedder: Arc<dyn Embedder> = ollama_client(&config)?;
    let retriever = HierarchicalRetriever::new(index, embedder, config.retrieval);

    let (n_docs, n_chunks) = resolve_counts(&config.retrieval, budget, docs, chunks);
    info!("Querying with n_docs={} n_chunks={}", n_docs, n_chunks);

    let results = retriever.retrieve(text, n_docs, n_chunks).await?;
    if results.is_empty() {
        println!("No matching documents. Use 'docs-rag ingest <files>' to add some.");
        return Ok(());
    }

    print_results(&results);
    Ok(())
}

fn print_results(results: &[RetrievalResult]) {
    let mut current_rank = None;
    for result in results {
        let meta = &result.metadata;
        if current_rank != Some(meta.document_rank) {
            current_rank = Some(meta.document_rank);
            println!();
            println!(
                "📄 {} (document score {:.3})",
                meta.source, meta.document_score
            );
        }
        println!(
            "   [{:.3}] chunk {} (chars {}..{})",
            result.score, meta.chunk_index, meta.start_offset, meta.end_offset
        );
        println!("   {}", preview(&result.text));
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PREVIEW_CHARS {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else {
        flat
    }
}

/// List all indexed documents
#[inline]
pub async fn list_documents() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let index = open_index(&config).await?;

    let sources = index.list_documents().await?;
    if sources.is_empty() {
        println!("No documents have been ingested yet.");
        println!("Use 'docs-rag ingest <files>' to add some.");
        return Ok(());
    }

    println!("Documents ({} total):", sources.len());
    for source in &sources {
        match index.document(source).await {
            Ok(Some(stored)) => println!(
                "  {} ({} chunks, ingested {})",
                source,
                stored.chunks.len(),
                stored.document.ingested_at.format("%Y-%m-%d %H:%M:%S")
            ),
            Ok(None) => println!("  {source}"),
            Err(e) => println!("  {source} (error: {e})"),
        }
    }
    Ok(())
}

/// Print a stored document and its chunk layout
#[inline]
pub async fn show_document(source: &str) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let index = open_index(&config).await?;

    let stored = index
        .document(source)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Document not found: {}", source))?;

    println!("📄 {}", stored.document.source);
    println!(
        "   Ingested: {}",
        stored.document.ingested_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("   Characters: {}", stored.document.text.chars().count());
    println!("   Chunks: {}", stored.chunks.len());
    for chunk in &stored.chunks {
        println!(
            "   #{} [{}..{}] {}",
            chunk.chunk_index,
            chunk.start_offset,
            chunk.end_offset,
            preview(&chunk.text)
        );
    }
    Ok(())
}

/// Delete a document from both index levels
#[inline]
pub async fn delete_document(source: &str, skip_confirmation: bool) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let index = open_index(&config).await?;

    if index.document(source).await?.is_none() {
        anyhow::bail!("Document not found: {}", source);
    }

    if !skip_confirmation {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete '{source}' and all of its chunks?"))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled");
            return Ok(());
        }
    }

    index.delete_document(source).await?;
    println!("✓ Deleted {source}");
    Ok(())
}

/// Show embedding service, storage and consistency status
#[inline]
pub async fn show_status(cleanup: bool) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    println!("📊 docs-rag Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Model: {}", config.ollama.model);
                println!("   🔢 Batch Size: {}", config.ollama.batch_size);
            }
            Err(e) => println!("   ⚠️  Ollama: Unhealthy - {e:#}"),
        },
        Err(e) => println!("   ❌ Ollama: Failed to create client - {e:#}"),
    }

    println!();
    println!("🔍 Vector Database Status:");
    let index = match open_index(&config).await {
        Ok(index) => {
            println!("   ✅ LanceDB: {}", config.vector_database_path().display());
            index
        }
        Err(e) => {
            println!("   ❌ LanceDB: {e:#}");
            return Ok(());
        }
    };

    let stats = index.stats().await?;
    println!("   📚 Documents: {}", stats.documents);
    println!("   📄 Chunks: {}", stats.chunks);
    println!(
        "   📊 Average chunks per document: {:.1}",
        stats.average_chunks_per_document
    );

    println!();
    println!("🔍 Index Consistency:");
    let validator = ConsistencyValidator::new(&index);
    let report = validator.validate_consistency().await?;
    if report.is_consistent {
        println!("   ✅ {}", report.summary());
    } else {
        println!("   ⚠️  {}", report.summary());
        for source in &report.documents_without_chunks {
            println!("   🚫 No chunks: {source}");
        }
        for source in &report.orphaned_chunk_sources {
            println!("   👻 Orphaned chunks: {source}");
        }
        for issue in &report.incomplete_documents {
            println!(
                "   ⚠️  {}: {} chunks stored, {} recorded at ingestion; re-ingest to repair",
                issue.source, issue.stored_chunks, issue.expected_chunks
            );
        }

        if cleanup {
            let cleaned = validator.cleanup_inconsistencies(&report).await?;
            println!("   🧹 Cleaned up {cleaned} sources");
        } else {
            println!("   💡 Run 'docs-rag status --cleanup' to remove unusable records");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_takes_precedence() {
        let defaults = RetrievalConfig::default();
        assert_eq!(resolve_counts(&defaults, Some(12), Some(1), Some(1)), (4, 3));
    }

    #[test]
    fn explicit_counts_override_defaults() {
        let defaults = RetrievalConfig::default();
        assert_eq!(resolve_counts(&defaults, None, Some(7), None), (7, 5));
        assert_eq!(resolve_counts(&defaults, None, None, Some(2)), (3, 2));
        assert_eq!(resolve_counts(&defaults, None, None, None), (3, 5));
    }

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\n\n  b"), "a b");

        let long = "x".repeat(PREVIEW_CHARS + 10);
        let short = preview(&long);
        assert_eq!(short.chars().count(), PREVIEW_CHARS + 1);
        assert!(short.ends_with('…'));
    }
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use docs_rag::commands::{
    delete_document, ingest_files, list_documents, query, show_document, show_status,
};
use docs_rag::config::{run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(about = "Hierarchical document retrieval over a local vector index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection, chunking and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest text or Markdown files; existing documents with the same file name are replaced
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Search the index, documents first and then chunks within them
    Query {
        /// Query text
        text: String,
        /// Total result budget, split between documents and chunks per document
        #[arg(long, short, conflicts_with_all = ["docs", "chunks"])]
        k: Option<usize>,
        /// Number of documents to search within
        #[arg(long)]
        docs: Option<usize>,
        /// Number of chunks to return per document
        #[arg(long)]
        chunks: Option<usize>,
    },
    /// List all ingested documents
    List,
    /// Show a document and its chunks
    Show {
        /// Document source (file name)
        source: String,
    },
    /// Delete a document from the index
    Delete {
        /// Document source (file name)
        source: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Show service status and index consistency
    Status {
        /// Remove documents without chunks and chunks without documents
        #[arg(long)]
        cleanup: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest { files } => {
            ingest_files(&files).await?;
        }
        Commands::Query {
            text,
            k,
            docs,
            chunks,
        } => {
            query(&text, k, docs, chunks).await?;
        }
        Commands::List => {
            list_documents().await?;
        }
        Commands::Show { source } => {
            show_document(&source).await?;
        }
        Commands::Delete { source, yes } => {
            delete_document(&source, yes).await?;
        }
        Commands::Status { cleanup } => {
            show_status(cleanup).await?;
        }
    }

    Ok(())
}

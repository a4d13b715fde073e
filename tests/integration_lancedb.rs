#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// Integration tests for the LanceDB-backed dual-level index
use async_trait::async_trait;
use docs_rag::config::{Config, OllamaConfig};
use docs_rag::embeddings::Embedder;
use docs_rag::indexer::ConsistencyValidator;
use docs_rag::{DualLevelIndex, HierarchicalRetriever, Indexer, RagError};
use std::sync::Arc;
use tempfile::TempDir;

const DIMENSION: u32 = 4;

/// Counts of four marker words
struct MarkerEmbedder;

#[async_trait]
impl Embedder for MarkerEmbedder {
    async fn embed(&self, text: &str) -> docs_rag::Result<Vec<f32>> {
        Ok(["install", "api", "tutorial", "faq"]
            .iter()
            .map(|marker| text.matches(marker).count() as f32 + 0.05)
            .collect())
    }
}

fn create_test_config(dimension: u32) -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ollama: OllamaConfig {
            embedding_dimension: dimension,
            ..OllamaConfig::default()
        },
        ..Config::default()
    };
    (config, temp_dir)
}

fn repeated(sentence: &str, len: usize) -> String {
    sentence.chars().cycle().take(len).collect()
}

async fn open(config: &Config) -> (Arc<DualLevelIndex>, Indexer) {
    let index = Arc::new(
        DualLevelIndex::open(config)
            .await
            .expect("should open index"),
    );
    let indexer = Indexer::from_config(Arc::clone(&index), Arc::new(MarkerEmbedder), config);
    (index, indexer)
}

#[tokio::test]
async fn ingest_and_query_on_disk() {
    let (config, _temp_dir) = create_test_config(DIMENSION);
    let (index, indexer) = open(&config).await;

    indexer
        .ingest_document("install.md", &repeated("run the install script, then install plugins. ", 1400))
        .await
        .expect("ingestion should succeed");
    indexer
        .ingest_document("api.md", &repeated("the api exposes endpoints; every api call is logged. ", 1100))
        .await
        .expect("ingestion should succeed");

    let retriever = HierarchicalRetriever::new(
        Arc::clone(&index),
        Arc::new(MarkerEmbedder),
        config.retrieval,
    );
    let results = retriever
        .retrieve("how do I install it", 1, 2)
        .await
        .expect("retrieval should succeed");

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.metadata.source == "install.md"));
    assert!(results[0].score >= results[1].score);
    assert!(results.iter().all(|r| r.score > 0.0 && r.score <= 1.0 + 1e-5));
}

#[tokio::test]
async fn data_survives_reopening() {
    let (config, _temp_dir) = create_test_config(DIMENSION);
    {
        let (_index, indexer) = open(&config).await;
        indexer
            .ingest_document("faq.txt", &repeated("faq: answers to common questions. ", 900))
            .await
            .expect("ingestion should succeed");
    }

    let (index, _indexer) = open(&config).await;
    let stored = index
        .document("faq.txt")
        .await
        .expect("should read document")
        .expect("document should exist");

    assert_eq!(stored.document.text.chars().count(), 900);
    let indices: Vec<usize> = stored.chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(
        (stored.chunks[1].start_offset, stored.chunks[1].end_offset),
        (450, 900)
    );
}

#[tokio::test]
async fn reingestion_replaces_previous_chunks() {
    let (config, _temp_dir) = create_test_config(DIMENSION);
    let (index, indexer) = open(&config).await;

    indexer
        .ingest_document("guide.md", &repeated("tutorial step ", 2600))
        .await
        .expect("ingestion should succeed");
    assert_eq!(index.chunk_count("guide.md").await.expect("should count"), 6);

    indexer
        .ingest_document("guide.md", &repeated("tutorial step ", 700))
        .await
        .expect("ingestion should succeed");
    assert_eq!(index.chunk_count("guide.md").await.expect("should count"), 2);

    let stats = index.stats().await.expect("should compute stats");
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, 2);

    let report = ConsistencyValidator::new(&index)
        .validate_consistency()
        .await
        .expect("validation should succeed");
    assert!(report.is_consistent, "{}", report.summary());
}

#[tokio::test]
async fn sources_with_quotes_are_isolated() {
    let (config, _temp_dir) = create_test_config(DIMENSION);
    let (index, indexer) = open(&config).await;

    indexer
        .ingest_document("o'brien.txt", &repeated("api notes ", 600))
        .await
        .expect("ingestion should succeed");
    indexer
        .ingest_document("obrien.txt", &repeated("api notes ", 600))
        .await
        .expect("ingestion should succeed");

    index
        .delete_document("o'brien.txt")
        .await
        .expect("delete should succeed");

    assert_eq!(
        index.list_documents().await.expect("should list"),
        vec!["obrien.txt".to_string()]
    );
    assert_eq!(index.chunk_count("o'brien.txt").await.expect("should count"), 0);
    assert_eq!(index.chunk_count("obrien.txt").await.expect("should count"), 2);
}

#[tokio::test]
async fn reopening_with_another_dimension_is_refused() {
    let (config, _temp_dir) = create_test_config(DIMENSION);
    drop(open(&config).await);

    let mut other = config.clone();
    other.ollama.embedding_dimension = 8;
    let result = DualLevelIndex::open(&other).await;

    assert!(matches!(result, Err(RagError::Config(_))));
}

#[tokio::test]
async fn wrong_vector_length_is_rejected() {
    let (config, _temp_dir) = create_test_config(8);
    let (index, indexer) = open(&config).await;

    let result = indexer
        .ingest_document("short.txt", "install the api")
        .await;

    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 8,
            actual: 4
        })
    ));
    assert!(index.list_documents().await.expect("should list").is_empty());
}

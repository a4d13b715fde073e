use super::*;
use crate::database::faulty::{DeleteGate, FaultyCollection};

fn chunk(source: &str, index: usize, vector: Vec<f32>) -> ChunkRecord {
    ChunkRecord::new(source, index, &format!("{source} part {index}"), vector)
}

async fn seeded_index() -> DualLevelIndex {
    let index = DualLevelIndex::in_memory();
    index
        .upsert_chunks(
            "a.txt",
            vec![chunk("a.txt", 1, vec![0.9, 0.1]), chunk("a.txt", 0, vec![1.0, 0.0])],
        )
        .await
        .expect("chunks should be stored");
    index
        .upsert_document("a.txt", "alpha", vec![1.0, 0.0])
        .await
        .expect("document should be stored");
    index
        .upsert_chunks("b.txt", vec![chunk("b.txt", 0, vec![0.0, 1.0])])
        .await
        .expect("chunks should be stored");
    index
        .upsert_document("b.txt", "beta", vec![0.0, 1.0])
        .await
        .expect("document should be stored");
    index
}

#[tokio::test]
async fn zero_k_is_a_config_error() {
    let index = seeded_index().await;

    assert!(matches!(
        index.search_documents(&[1.0, 0.0], 0).await,
        Err(RagError::Config(_))
    ));
    assert!(matches!(
        index.search_chunks(&[1.0, 0.0], 0, "a.txt").await,
        Err(RagError::Config(_))
    ));
}

#[tokio::test]
async fn upsert_document_is_idempotent_on_source() {
    let index = seeded_index().await;

    index
        .upsert_document("a.txt", "alpha v2", vec![1.0, 0.0])
        .await
        .expect("document should be replaced");

    let stats = index.stats().await.expect("should compute stats");
    assert_eq!(stats.documents, 2);
    let stored = index
        .document("a.txt")
        .await
        .expect("should read document")
        .expect("document should exist");
    assert_eq!(stored.document.text, "alpha v2");
}

#[tokio::test]
async fn chunk_search_is_restricted_to_source() {
    let index = seeded_index().await;

    let hits = index
        .search_chunks(&[0.0, 1.0], 10, "a.txt")
        .await
        .expect("search should succeed");

    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|hit| hit.record.source == "a.txt"));

    let none = index
        .search_chunks(&[0.0, 1.0], 10, "unknown.txt")
        .await
        .expect("search should succeed");
    assert!(none.is_empty());
}

#[tokio::test]
async fn foreign_chunks_are_rejected_before_writing() {
    let index = seeded_index().await;

    let result = index
        .upsert_chunks(
            "a.txt",
            vec![chunk("a.txt", 0, vec![1.0, 0.0]), chunk("b.txt", 1, vec![1.0, 0.0])],
        )
        .await;

    assert!(matches!(result, Err(RagError::Config(_))));
    assert_eq!(index.chunk_count("a.txt").await.expect("should count"), 2);
}

#[tokio::test]
async fn document_reconstruction_orders_chunks() {
    let index = seeded_index().await;

    let stored = index
        .document("a.txt")
        .await
        .expect("should read document")
        .expect("document should exist");

    let indices: Vec<usize> = stored.chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert!(index.document("missing").await.expect("should read").is_none());
}

#[tokio::test]
async fn stats_and_delete() {
    let index = seeded_index().await;

    let stats = index.stats().await.expect("should compute stats");
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.chunks, 3);
    assert!((stats.average_chunks_per_document - 1.5).abs() < f64::EPSILON);
    assert_eq!(stats.sources, vec!["a.txt".to_string(), "b.txt".to_string()]);

    index
        .delete_document("a.txt")
        .await
        .expect("delete should succeed");

    assert_eq!(
        index.list_documents().await.expect("should list"),
        vec!["b.txt".to_string()]
    );
    assert_eq!(
        index.chunk_sources().await.expect("should list"),
        vec!["b.txt".to_string()]
    );
}

#[tokio::test]
async fn document_records_its_chunk_count() {
    let index = seeded_index().await;

    let stored = index
        .document("a.txt")
        .await
        .expect("should read document")
        .expect("document should exist");
    assert_eq!(stored.document.chunk_count, 2);

    index
        .upsert_document("c.txt", "gamma", vec![1.0, 1.0])
        .await
        .expect("document should be stored");
    let lonely = index
        .document("c.txt")
        .await
        .expect("should read document")
        .expect("document should exist");
    assert_eq!(lonely.document.chunk_count, 0);
}

#[tokio::test]
async fn deleted_document_is_hidden_before_its_chunks_go() {
    let gate = Arc::new(DeleteGate::default());
    let index = Arc::new(DualLevelIndex::new(
        Arc::new(InMemoryCollection::new(DOCUMENT_COLLECTION)),
        Arc::new(FaultyCollection::<ChunkRecord>::new(CHUNK_COLLECTION).gated_deletes(Arc::clone(&gate))),
    ));
    index
        .upsert_chunks("a.txt", vec![chunk("a.txt", 0, vec![1.0, 0.0])])
        .await
        .expect("chunks should be stored");
    index
        .upsert_document("a.txt", "alpha", vec![1.0, 0.0])
        .await
        .expect("document should be stored");

    let delete = {
        let index = Arc::clone(&index);
        tokio::spawn(async move { index.delete_document("a.txt").await })
    };
    gate.entered.notified().await;

    // The chunk delete is held: the coarse stage must not see a.txt any more
    let hits = index
        .search_documents(&[1.0, 0.0], 10)
        .await
        .expect("search should succeed");
    assert!(hits.is_empty());
    assert_eq!(index.chunk_count("a.txt").await.expect("should count"), 1);

    gate.release.notify_one();
    delete
        .await
        .expect("task should finish")
        .expect("delete should succeed");
    assert_eq!(index.chunk_count("a.txt").await.expect("should count"), 0);
}

#[tokio::test]
async fn source_lock_serializes_writers() {
    let index = Arc::new(DualLevelIndex::in_memory());

    let guard = index.lock_source("a.txt").await;
    let contender = {
        let index = Arc::clone(&index);
        tokio::spawn(async move {
            let _guard = index.lock_source("a.txt").await;
        })
    };

    tokio::task::yield_now().await;
    assert!(!contender.is_finished());

    // other sources are not blocked
    drop(index.lock_source("b.txt").await);

    drop(guard);
    contender.await.expect("contender should finish");
}

use super::*;
use crate::database::ChunkRecord;

async fn add_chunks(index: &DualLevelIndex, source: &str, count: usize) {
    let chunks = (0..count)
        .map(|i| ChunkRecord::new(source, i, "chunk text", vec![1.0, 0.0]))
        .collect();
    index
        .upsert_chunks(source, chunks)
        .await
        .expect("chunks should be stored");
}

#[test]
fn consistent_report_summary() {
    let report = ConsistencyReport {
        documents: 4,
        chunk_sources: 4,
        documents_without_chunks: vec![],
        orphaned_chunk_sources: vec![],
        incomplete_documents: vec![],
        is_consistent: true,
    };

    assert_eq!(report.total_issues(), 0);
    assert!(report.summary().contains("Index is consistent"));
}

#[test]
fn inconsistent_report_summary() {
    let report = ConsistencyReport {
        documents: 3,
        chunk_sources: 2,
        documents_without_chunks: vec!["a.txt".to_string()],
        orphaned_chunk_sources: vec![],
        incomplete_documents: vec![DocumentConsistencyIssue {
            source: "b.txt".to_string(),
            expected_chunks: 3,
            stored_chunks: 2,
        }],
        is_consistent: false,
    };

    assert_eq!(report.total_issues(), 2);
    assert!(report.summary().contains("1 documents without chunks"));
    assert!(report.summary().contains("1 incomplete documents"));
}

async fn add_document(index: &DualLevelIndex, source: &str) {
    index
        .upsert_document(source, "document text", vec![1.0, 0.0])
        .await
        .expect("document should be stored");
}

#[tokio::test]
async fn healthy_index_is_consistent() {
    let index = DualLevelIndex::in_memory();
    add_chunks(&index, "ok.txt", 3).await;
    add_document(&index, "ok.txt").await;

    let report = ConsistencyValidator::new(&index)
        .validate_consistency()
        .await
        .expect("validation should succeed");

    assert!(report.is_consistent, "{}", report.summary());
    assert_eq!(report.documents, 1);
}

#[tokio::test]
async fn detects_and_cleans_up_issues() {
    let index = DualLevelIndex::in_memory();
    add_document(&index, "lonely.txt").await;
    add_chunks(&index, "orphan.txt", 2).await;
    add_chunks(&index, "short.txt", 3).await;
    add_document(&index, "short.txt").await;
    // A later chunk write without its document leaves fewer chunks than recorded
    add_chunks(&index, "short.txt", 1).await;

    let validator = ConsistencyValidator::new(&index);
    let report = validator
        .validate_consistency()
        .await
        .expect("validation should succeed");

    assert!(!report.is_consistent);
    assert_eq!(report.documents_without_chunks, vec!["lonely.txt".to_string()]);
    assert_eq!(report.orphaned_chunk_sources, vec!["orphan.txt".to_string()]);
    assert_eq!(
        report.incomplete_documents,
        vec![DocumentConsistencyIssue {
            source: "short.txt".to_string(),
            expected_chunks: 3,
            stored_chunks: 1,
        }]
    );

    let cleaned = validator
        .cleanup_inconsistencies(&report)
        .await
        .expect("cleanup should succeed");
    assert_eq!(cleaned, 2);

    assert_eq!(
        index.list_documents().await.expect("should list"),
        vec!["short.txt".to_string()]
    );
    assert_eq!(
        index.chunk_sources().await.expect("should list"),
        vec!["short.txt".to_string()]
    );
}

#[tokio::test]
async fn chunking_settings_do_not_affect_the_check() {
    let index = DualLevelIndex::in_memory();
    // Two chunks for a short text, as a smaller window would have produced
    add_chunks(&index, "old.txt", 2).await;
    add_document(&index, "old.txt").await;

    let report = ConsistencyValidator::new(&index)
        .validate_consistency()
        .await
        .expect("validation should succeed");

    assert!(report.is_consistent, "{}", report.summary());
}

#[tokio::test]
async fn cleanup_keeps_sources_completed_after_validation() {
    let index = DualLevelIndex::in_memory();
    add_chunks(&index, "b.txt", 2).await;
    add_document(&index, "a.txt").await;

    let validator = ConsistencyValidator::new(&index);
    let report = validator
        .validate_consistency()
        .await
        .expect("validation should succeed");
    assert_eq!(report.orphaned_chunk_sources, vec!["b.txt".to_string()]);
    assert_eq!(report.documents_without_chunks, vec!["a.txt".to_string()]);

    // Both ingestions finish before cleanup runs on the old report
    add_document(&index, "b.txt").await;
    add_chunks(&index, "a.txt", 1).await;

    let cleaned = validator
        .cleanup_inconsistencies(&report)
        .await
        .expect("cleanup should succeed");
    assert_eq!(cleaned, 0);

    assert_eq!(index.chunk_count("b.txt").await.expect("should count"), 2);
    assert_eq!(
        index.list_documents().await.expect("should list"),
        vec!["a.txt".to_string(), "b.txt".to_string()]
    );
    let fresh = validator
        .validate_consistency()
        .await
        .expect("validation should succeed");
    assert!(fresh.orphaned_chunk_sources.is_empty());
    assert!(fresh.documents_without_chunks.is_empty());
}

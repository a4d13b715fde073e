use super::*;
use crate::RagError;

fn sample_text(len: usize) -> String {
    "abcdefghijklmnopqrstuvwxyz"
        .chars()
        .cycle()
        .take(len)
        .collect()
}

#[test]
fn twelve_hundred_chars_make_three_chunks() {
    let text = sample_text(1200);

    let chunks = split(&text, "a.txt", 500, 50).expect("split should succeed");

    assert_eq!(chunks.len(), 3);
    let ranges: Vec<(usize, usize)> = chunks
        .iter()
        .map(|c| (c.start_offset, c.end_offset))
        .collect();
    assert_eq!(ranges, vec![(0, 500), (450, 950), (900, 1200)]);
    assert_eq!(chunks[2].char_len(), 300);
    assert!(chunks.iter().all(|c| c.source == "a.txt"));
}

#[test]
fn chunk_ids_follow_source_and_index() {
    let chunks = split(&sample_text(1000), "notes.md", 400, 100).expect("split should succeed");

    let ids: Vec<String> = chunks.iter().map(Chunk::id).collect();
    assert_eq!(ids, vec!["notes.md#0", "notes.md#1", "notes.md#2"]);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
    }
}

#[test]
fn empty_text_yields_no_chunks() {
    let chunks = split("", "empty.txt", 500, 50).expect("empty text is not an error");
    assert!(chunks.is_empty());
}

#[test]
fn short_text_is_a_single_chunk() {
    let chunks = split("tiny", "tiny.txt", 500, 50).expect("split should succeed");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "tiny");
    assert_eq!((chunks[0].start_offset, chunks[0].end_offset), (0, 4));
}

#[test]
fn text_exactly_one_window_long() {
    let chunks = split(&sample_text(500), "exact.txt", 500, 50).expect("split should succeed");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].char_len(), 500);
}

#[test]
fn invalid_windows_are_config_errors() {
    assert!(matches!(
        split("text", "s", 0, 0),
        Err(RagError::Config(_))
    ));
    assert!(matches!(
        split("text", "s", 10, 10),
        Err(RagError::Config(_))
    ));
    assert!(matches!(
        split("", "s", 10, 20),
        Err(RagError::Config(_))
    ));
}

#[test]
fn stride_portions_reconstruct_the_text() {
    for (len, size, overlap) in [(1200, 500, 50), (999, 100, 33), (7, 3, 2), (50, 10, 0)] {
        let text = sample_text(len);
        let chunks = split(&text, "doc", size, overlap).expect("split should succeed");
        let stride = size - overlap;

        let mut rebuilt = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i + 1 == chunks.len() {
                rebuilt.push_str(&chunk.text);
            } else {
                rebuilt.extend(chunk.text.chars().take(stride));
            }
        }

        assert_eq!(rebuilt, text, "len={len} size={size} overlap={overlap}");
        assert_eq!(
            chunks.len(),
            expected_chunk_count(len, size, overlap),
            "len={len} size={size} overlap={overlap}"
        );
    }
}

#[test]
fn multibyte_text_is_cut_on_char_boundaries() {
    let text = "héllo wörld ✓ ".repeat(20);
    let char_count = text.chars().count();

    let chunks = split(&text, "utf8.txt", 32, 8).expect("split should succeed");

    assert_eq!(chunks.last().map(|c| c.end_offset), Some(char_count));
    for chunk in &chunks {
        assert_eq!(chunk.text.chars().count(), chunk.char_len());
        let expected: String = text
            .chars()
            .skip(chunk.start_offset)
            .take(chunk.char_len())
            .collect();
        assert_eq!(chunk.text, expected);
    }
}

#[test]
fn splitting_is_deterministic() {
    let text = sample_text(2345);
    let first = split(&text, "doc", 500, 50).expect("split should succeed");
    let second = split(&text, "doc", 500, 50).expect("split should succeed");
    assert_eq!(first, second);
}

#[test]
fn expected_chunk_count_edges() {
    assert_eq!(expected_chunk_count(0, 500, 50), 0);
    assert_eq!(expected_chunk_count(30, 500, 50), 1);
    assert_eq!(expected_chunk_count(50, 500, 50), 1);
    assert_eq!(expected_chunk_count(500, 500, 50), 1);
    assert_eq!(expected_chunk_count(501, 500, 50), 2);
    assert_eq!(expected_chunk_count(1200, 500, 50), 3);
}

#[test]
fn config_defaults_and_stride() {
    let config = ChunkingConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.stride(), 450);

    let chunks = split_with(&sample_text(1200), "a.txt", &config).expect("split should succeed");
    assert_eq!(chunks.len(), 3);
}

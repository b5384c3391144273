//! Chunking laws: lossless reconstruction, length bound, and the documented examples

use ragline::chunking::{split_text, TextSplitter};
use ragline::document::Document;
use ragline::RaglineError;

fn corpus() -> Vec<String> {
    vec![
        "A. B. C.".to_string(),
        "short".to_string(),
        "Paragraph one has a few sentences. It goes on! Does it end? Yes.\n\n\
         Paragraph two, with commas, semicolons; and a line\nbreak."
            .to_string(),
        "深度学习是机器学习的一个分支。它使用多层神经网络！效果如何？非常好；值得研究，继续。"
            .to_string(),
        "x".repeat(1000),
        "word ".repeat(300),
        "  leading and trailing whitespace  \n\n\n   ".to_string(),
        "mixed 中文 and English. 句子。Another one? 好的！".repeat(20),
    ]
}

fn reconstruct(splitter: &TextSplitter, content: &str) -> String {
    splitter
        .split_spans(content)
        .unwrap()
        .iter()
        .map(|span| span.fresh_text())
        .collect()
}

#[test]
fn test_round_trip_reconstruction() {
    for (size, overlap) in [(4, 0), (10, 3), (50, 10), (120, 20), (500, 50)] {
        let splitter = TextSplitter::new(size, overlap).unwrap();
        for content in corpus() {
            assert_eq!(
                reconstruct(&splitter, &content),
                content,
                "size={} overlap={}",
                size,
                overlap
            );
        }
    }
}

#[test]
fn test_chunk_length_bound() {
    for (size, overlap) in [(4, 0), (10, 3), (50, 10), (120, 20)] {
        let splitter = TextSplitter::new(size, overlap).unwrap();
        for content in corpus() {
            for chunk in splitter.split(&content).unwrap() {
                assert!(
                    chunk.chars().count() <= size,
                    "chunk {:?} exceeds {} (overlap {})",
                    chunk,
                    size,
                    overlap
                );
            }
        }
    }
}

#[test]
fn test_overlap_prefix_repeats_previous_tail() {
    let splitter = TextSplitter::new(20, 5).unwrap();
    let spans = splitter
        .split_spans("one two three four five six seven eight nine ten eleven twelve")
        .unwrap();
    assert!(spans.len() > 1);
    assert_eq!(spans[0].overlap, 0);

    for pair in spans.windows(2) {
        let previous_fresh = pair[0].fresh_text();
        let prefix: String = pair[1].text.chars().take(pair[1].overlap).collect();
        assert!(previous_fresh.ends_with(&prefix));
        assert!(pair[1].overlap <= 5);
    }
}

#[test]
fn test_unsplittable_token_may_exceed_size() {
    // without the empty separator a long word cannot be cut
    let splitter = TextSplitter::new(8, 0)
        .unwrap()
        .with_separators([" "]);
    let chunks = splitter.split("tiny supercalifragilistic end").unwrap();

    assert!(chunks.contains(&"supercalifragilistic ".to_string()));
    let oversized: Vec<_> = chunks.iter().filter(|c| c.chars().count() > 8).collect();
    assert_eq!(oversized.len(), 1);
    assert_eq!(chunks.concat(), "tiny supercalifragilistic end");
}

#[test]
fn test_period_example() {
    let stripped = TextSplitter::new(4, 0)
        .unwrap()
        .with_separators([". "])
        .with_strip_whitespace(true);
    assert_eq!(stripped.split("A. B. C.").unwrap(), vec!["A.", "B.", "C."]);

    let kept = TextSplitter::new(4, 0).unwrap().with_separators([". "]);
    assert_eq!(kept.split("A. B. C.").unwrap(), vec!["A. ", "B. ", "C."]);
}

#[test]
fn test_multibyte_characters_counted_as_chars() {
    let chunks = split_text(&"界".repeat(10), 4, 0).unwrap();
    assert_eq!(chunks, vec!["界界界界", "界界界界", "界界"]);
}

#[test]
fn test_invalid_input() {
    assert!(matches!(
        split_text("   \n", 10, 0),
        Err(RaglineError::EmptyInput)
    ));
    assert!(matches!(
        split_text("text", 0, 0),
        Err(RaglineError::InvalidChunkParams { .. })
    ));
    assert!(matches!(
        split_text("text", 10, 10),
        Err(RaglineError::InvalidChunkParams { .. })
    ));
}

#[test]
fn test_chunk_document_metadata() {
    let splitter = TextSplitter::new(10, 0).unwrap();
    let document = Document::new("alpha beta gamma delta epsilon").with_meta("source", "greek.txt");
    let chunks = splitter.chunk_document(&document).unwrap();

    let total = chunks.len();
    assert!(total > 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.id, None);
        assert_eq!(chunk.source_index, i);
        assert_eq!(chunk.total_chunks, total);
        assert_eq!(chunk.meta_str("source"), Some("greek.txt"));
        assert_eq!(chunk.metadata["chunk_index"], serde_json::json!(i));
        assert_eq!(chunk.metadata["total_chunks"], serde_json::json!(total));
    }
}

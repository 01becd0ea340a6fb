//! Sentence-aligned text chunker with trailing overlap.
//!
//! Splits document text into overlapping [`Chunk`]s whose boundaries always
//! fall between sentences, so no retrieval unit starts or ends mid-sentence.
//!
//! # Algorithm
//!
//! 1. Trim the text; empty input yields no chunks.
//! 2. Split into sentences: a sentence ends at `.`, `!`, or `?` followed by
//!    whitespace. The whitespace run is dropped.
//! 3. Accumulate sentences until adding the next one would push the running
//!    length past `chunk_size` characters. The check only fires when the
//!    current chunk is non-empty, so a single oversized sentence still gets
//!    a chunk of its own.
//! 4. When a chunk closes, seed the next one with the trailing sentences of
//!    the closed chunk, walking backwards while the joined overlap stays
//!    within `chunk_overlap` characters.
//! 5. Flush whatever remains as the final chunk.
//!
//! Lengths are counted in Unicode scalar values, not bytes. The running
//! length ignores the joining spaces, so an emitted chunk can be a few
//! characters longer than `chunk_size`.
//!
//! # Example
//!
//! ```rust
//! use prompt_studio_core::chunk::build_chunks;
//!
//! let chunks = build_chunks("doc-123", "Hello world. Second sentence.", 500, 50);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].id, "doc-123_chunk_0");
//! ```

use serde_json::json;

use crate::models::Chunk;

/// Split text into sentences on `[.!?]` followed by whitespace.
///
/// Returned slices are trimmed and never empty.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some(&(_, next)) = chars.peek() else {
            continue;
        };
        if !next.is_whitespace() {
            continue;
        }
        let end = i + c.len_utf8();
        push_trimmed(&mut sentences, &text[start..end]);
        while let Some(&(_, ws)) = chars.peek() {
            if !ws.is_whitespace() {
                break;
            }
            chars.next();
        }
        start = chars.peek().map(|&(j, _)| j).unwrap_or(text.len());
    }
    push_trimmed(&mut sentences, &text[start..]);

    sentences
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, s: &'a str) {
    let trimmed = s.trim();
    if !trimmed.is_empty() {
        out.push(trimmed);
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split text into overlapping, sentence-aligned chunk texts.
///
/// Pure and deterministic: the same input always yields the same sequence.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let sentence_len = char_len(sentence);

        if current_len + sentence_len > chunk_size && !current.is_empty() {
            chunks.push(current.join(" "));

            let mut overlap: Vec<&str> = Vec::new();
            let mut overlap_len = 0usize;
            for s in current.iter().rev() {
                if overlap_len + char_len(s) > chunk_overlap {
                    break;
                }
                overlap.insert(0, s);
                overlap_len = char_len(&overlap.join(" "));
            }

            current = overlap;
            current_len = overlap_len;
        }

        current.push(sentence);
        current_len += sentence_len;
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

/// Chunk a document's text and wrap each piece in a [`Chunk`].
///
/// Chunk ids are `"{document_id}_chunk_{index}"`; indices run `0..N-1`.
pub fn build_chunks(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    chunk_text(text, chunk_size, chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(index, content)| make_chunk(document_id, index, content))
        .collect()
}

fn make_chunk(document_id: &str, index: usize, content: String) -> Chunk {
    Chunk {
        id: format!("{}_chunk_{}", document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        metadata: json!({ "char_count": char_len(&content) }),
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences_basic() {
        let s = split_sentences("One. Two! Three? Four");
        assert_eq!(s, vec!["One.", "Two!", "Three?", "Four"]);
    }

    #[test]
    fn test_split_requires_whitespace_after_punctuation() {
        let s = split_sentences("Version 1.5 shipped. Pi is 3.14!");
        assert_eq!(s, vec!["Version 1.5 shipped.", "Pi is 3.14!"]);
    }

    #[test]
    fn test_split_collapses_whitespace_runs() {
        let s = split_sentences("First.\n\n   Second.\tThird.");
        assert_eq!(s, vec!["First.", "Second.", "Third."]);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 500, 50).is_empty());
        assert!(chunk_text("  \n\t ", 500, 50).is_empty());
        assert!(build_chunks("doc1", "", 500, 50).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 500, 50);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_splits_when_size_exceeded() {
        let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota.";
        let chunks = chunk_text(text, 20, 0);
        assert_eq!(
            chunks,
            vec![
                "Alpha beta gamma.".to_string(),
                "Delta epsilon zeta.".to_string(),
                "Eta theta iota.".to_string(),
            ]
        );
    }

    #[test]
    fn test_overlap_carries_trailing_sentence() {
        // Each sentence is 6 chars; size 14 fits two, overlap 6 carries one.
        let text = "Aaaaa. Bbbbb. Ccccc. Ddddd.";
        let chunks = chunk_text(text, 14, 6);
        assert_eq!(
            chunks,
            vec![
                "Aaaaa. Bbbbb.".to_string(),
                "Bbbbb. Ccccc.".to_string(),
                "Ccccc. Ddddd.".to_string(),
            ]
        );
    }

    #[test]
    fn test_overlap_stops_before_exceeding_limit() {
        let text = "Aaaaa. Bbbbb. Ccccc. Ddddd.";
        // Overlap 5 is shorter than any sentence, so nothing is carried.
        let chunks = chunk_text(text, 14, 5);
        assert_eq!(
            chunks,
            vec!["Aaaaa. Bbbbb.".to_string(), "Ccccc. Ddddd.".to_string()]
        );
    }

    #[test]
    fn test_oversized_sentence_kept_whole() {
        let long = "x".repeat(80) + ".";
        let text = format!("Short one. {} Tail.", long);
        let chunks = chunk_text(&text, 20, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "Short one.");
        assert_eq!(chunks[1], long);
        assert_eq!(chunks[2], "Tail.");
    }

    #[test]
    fn test_every_sentence_covered() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} is here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 120, 40);
        for sentence in split_sentences(&text) {
            assert!(
                chunks.iter().any(|c| c.contains(sentence)),
                "sentence missing: {}",
                sentence
            );
        }
    }

    #[test]
    fn test_consecutive_overlap_bounded() {
        let text = (0..30)
            .map(|i| format!("Item {} matters.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let overlap = 35;
        let chunks = chunk_text(&text, 100, overlap);
        for pair in chunks.windows(2) {
            let next_sentences = split_sentences(&pair[1]);
            let shared: Vec<&str> = next_sentences
                .iter()
                .take_while(|s| pair[0].contains(**s))
                .copied()
                .collect();
            assert!(char_len(&shared.join(" ")) <= overlap);
        }
    }

    #[test]
    fn test_chunk_indices_contiguous_and_ids() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = build_chunks("doc1", &text, 60, 20);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i, "Index mismatch at position {}", i);
            assert_eq!(c.id, format!("doc1_chunk_{}", i));
            assert_eq!(c.document_id, "doc1");
            assert_eq!(
                c.metadata["char_count"].as_u64().unwrap() as usize,
                c.content.chars().count()
            );
        }
    }

    #[test]
    fn test_multibyte_utf8_counts_chars() {
        let text = "Größe zählt. Übermäßig groß! Ende.";
        let chunks = chunk_text(text, 12, 0);
        assert_eq!(chunks[0], "Größe zählt.");
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha one. Beta two. Gamma three. Delta four. Epsilon five.";
        let c1 = chunk_text(text, 500, 50);
        let c2 = chunk_text(text, 500, 50);
        assert_eq!(c1, c2);
        let c3 = chunk_text(text, 25, 12);
        let c4 = chunk_text(text, 25, 12);
        assert_eq!(c3, c4);
    }
}

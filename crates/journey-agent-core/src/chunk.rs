//! Character-window text chunker.
//!
//! Splits document body text into overlapping windows of at most
//! `chunk_size` characters for embedding and retrieval. Consecutive chunks
//! share `overlap` trailing characters so that sentences cut at a window
//! edge remain searchable. Within a window the split prefers, in order, a
//! paragraph break, a line break, a sentence end, then a word boundary —
//! and never lands inside a multi-byte UTF-8 character.
//!
//! Each chunk carries a SHA-256 hash of its text, used by the embedding
//! pipeline to detect stale vectors.

use sha2::{Digest, Sha256};

/// A single window of a document's body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position within the document, contiguous from 0.
    pub index: i64,
    pub text: String,
    /// SHA-256 hex digest of `text`.
    pub hash: String,
}

/// Split `text` into chunks of at most `chunk_size` characters with
/// `overlap` characters shared between consecutive chunks.
///
/// Guarantees:
/// - an empty (or whitespace-only) body produces no chunks;
/// - any non-empty body produces at least one chunk;
/// - chunk indices are contiguous: `0, 1, 2, …`;
/// - splits never break a UTF-8 character.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let text = text.trim();
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    // An overlap as large as the window would never advance.
    let overlap = overlap.min(chunk_size / 2);

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0i64;

    while start < text.len() {
        let hard_end = snap_to_char_boundary(text, (start + chunk_size).min(text.len()));
        let end = if hard_end < text.len() {
            match break_point(&text[start..hard_end]) {
                Some(pos) => start + pos,
                None => hard_end,
            }
        } else {
            hard_end
        };
        // Pathological input (no boundary at all): force one char forward.
        let end = if end <= start {
            text[start..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| start + i)
                .unwrap_or(text.len())
        } else {
            end
        };

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(make_chunk(index, piece));
            index += 1;
        }

        if end >= text.len() {
            break;
        }
        let next = snap_to_char_boundary(text, end.saturating_sub(overlap));
        start = if next > start { next } else { end };
    }

    chunks
}

/// Best split position inside a window, preferring paragraph, line,
/// sentence, then word boundaries. Splits in the first half of the window
/// are rejected to avoid degenerate chunks.
fn break_point(window: &str) -> Option<usize> {
    let min_pos = window.len() / 2;
    let candidate = window
        .rfind("\n\n")
        .map(|p| p + 2)
        .or_else(|| window.rfind('\n').map(|p| p + 1))
        .or_else(|| window.rfind(". ").map(|p| p + 2))
        .or_else(|| window.rfind(' ').map(|p| p + 1))?;
    (candidate > min_pos).then_some(candidate)
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn make_chunk(index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    Chunk {
        index,
        text: text.to_string(),
        hash: format!("{:x}", hasher.finalize()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 800, 80);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("", 800, 80).is_empty());
        assert!(chunk_text("   \n\t ", 800, 80).is_empty());
    }

    #[test]
    fn test_long_text_contiguous_indices() {
        let text = (0..60)
            .map(|i| format!("Sentence number {} about journey scoring.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 120, 20);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i as i64, "index mismatch at position {}", i);
            assert!(c.text.chars().count() <= 120);
        }
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = chunk_text(&text, 100, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "a".repeat(60));
        assert_eq!(chunks[1].text, "b".repeat(60));
    }

    #[test]
    fn test_overlap_repeats_tail() {
        let text = (0..40)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 80, 20);
        assert!(chunks.len() > 1);
        // The start of each chunk re-appears near the end of its predecessor.
        for pair in chunks.windows(2) {
            let head: String = pair[1].text.chars().take(5).collect();
            assert!(pair[0].text.contains(&head));
        }
    }

    #[test]
    fn test_multibyte_utf8_safe() {
        let text = "é".repeat(500);
        let chunks = chunk_text(&text, 64, 8);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.text.chars().all(|ch| ch == 'é'));
        }
    }

    #[test]
    fn test_deterministic_hashes() {
        let text = "Alpha.\n\nBeta.\n\nGamma.\n\nDelta.";
        let a = chunk_text(text, 12, 2);
        let b = chunk_text(text, 12, 2);
        assert_eq!(a, b);
        assert_eq!(a[0].hash.len(), 64);
    }
}

//! Recursive-character text chunker.
//!
//! Splits document text into overlapping chunks by recursively trying a
//! preference-ordered list of separators (paragraph, line, sentence, word,
//! character), merging adjacent pieces up to `chunk_size` characters with
//! `chunk_overlap` characters of carry-over between consecutive chunks.
//! Whitespace-only pieces are dropped. Each chunk is prefixed with the
//! document's display name followed by a blank line, as attached metadata
//! for downstream embedding and retrieval expect that framing.

use serde_json::json;

use crate::models::PendingChunk;

/// Recursively splits `text` by `separators` (tried in order), then merges
/// the resulting pieces into chunks of at most `chunk_size` characters with
/// `chunk_overlap` characters shared between consecutive chunks.
pub fn chunk_text(
    display_name: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[String],
) -> Vec<PendingChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let pieces = split_recursive(text, separators, chunk_size);
    let merged = merge_pieces(&pieces, chunk_size, chunk_overlap);

    let chunk_total = merged.len() as i64;
    merged
        .into_iter()
        .enumerate()
        .filter(|(_, piece)| !piece.trim().is_empty())
        .map(|(index, piece)| PendingChunk {
            chunk_index: index as i64,
            content: format!("{display_name}\n\n{piece}"),
            metadata: json!({ "chunk_total": chunk_total }),
        })
        .collect()
}

fn split_recursive(text: &str, separators: &[String], chunk_size: usize) -> Vec<String> {
    if text.len() <= chunk_size || separators.is_empty() {
        return vec![text.to_string()];
    }

    let (sep, rest_separators) = (&separators[0], &separators[1..]);

    let raw_pieces: Vec<&str> = if sep.is_empty() {
        // Character-level fallback: hard split at chunk_size boundaries.
        return hard_split(text, chunk_size);
    } else {
        text.split(sep.as_str()).collect()
    };

    let mut out = Vec::new();
    for (i, piece) in raw_pieces.iter().enumerate() {
        if piece.is_empty() {
            continue;
        }
        if piece.len() > chunk_size {
            out.extend(split_recursive(piece, rest_separators, chunk_size));
        } else {
            out.push(piece.to_string());
        }
        // Re-attach the separator we split on (except after the last piece)
        // so sentence/line boundaries survive into the merge step.
        if i + 1 < raw_pieces.len() {
            if let Some(last) = out.last_mut() {
                last.push_str(sep);
            }
        }
    }
    out
}

fn hard_split(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        out.push(chars[start..end].iter().collect());
        start = end;
    }
    out
}

/// Greedily merges adjacent pieces into chunks no longer than `chunk_size`,
/// carrying `chunk_overlap` characters from the tail of one chunk into the
/// head of the next.
fn merge_pieces(pieces: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if pieces.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        if current.is_empty() {
            current.push_str(piece);
            continue;
        }
        if current.len() + piece.len() <= chunk_size {
            current.push_str(piece);
            continue;
        }
        chunks.push(current.trim().to_string());
        let overlap_start = current.len().saturating_sub(chunk_overlap);
        let carry: String = current
            .char_indices()
            .find(|(i, _)| *i >= overlap_start)
            .map(|(i, _)| current[i..].to_string())
            .unwrap_or_default();
        current = carry;
        current.push_str(piece);
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    if chunks.is_empty() {
        chunks.push(pieces.concat().trim().to_string());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_separators() -> Vec<String> {
        ["\n\n", "\n", ". ", " ", ""]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("doc", "Hello, world!", 700, 100, &default_separators());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert!(chunks[0].content.ends_with("Hello, world!"));
        assert!(chunks[0].content.starts_with("doc\n\n"));
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunks = chunk_text("doc", "   ", 700, 100, &default_separators());
        assert!(chunks.is_empty());
    }

    #[test]
    fn multiple_paragraphs_under_limit_collapse_to_one_chunk() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text("doc", text, 700, 100, &default_separators());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("First paragraph."));
        assert!(chunks[0].content.contains("Third paragraph."));
    }

    #[test]
    fn long_text_splits_into_multiple_chunks_with_contiguous_indices() {
        let text = (0..80)
            .map(|i| format!("Paragraph number {i} has some filler words in it."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("doc", &text, 300, 50, &default_separators());
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Alpha beta gamma.\n\nDelta epsilon zeta.\n\nEta theta iota.";
        let c1 = chunk_text("doc", text, 30, 5, &default_separators());
        let c2 = chunk_text("doc", text, 30, 5, &default_separators());
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.content, b.content);
            assert_eq!(a.chunk_index, b.chunk_index);
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text = (0..40)
            .map(|i| format!("Sentence {i} about something. "))
            .collect::<String>();
        let chunks = chunk_text("doc", &text, 200, 60, &default_separators());
        assert!(chunks.len() >= 2);
    }
}

// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Character detail documents: segmentation of reference files and the
//! prompt block for detail hits.

/// Longest segment stored as a single detail document, in characters.
pub const MAX_SEGMENT_CHARS: usize = 256;

/// Characters shared by consecutive chunks of a long segment.
pub const SEGMENT_OVERLAP: usize = 50;

/// Chunks with this many characters or fewer are dropped.
const MIN_CHUNK_CHARS: usize = 10;

/// Sliding-window split of `text` into chunks of at most `max_len`
/// characters, each starting `max_len - overlap` characters after the last.
pub fn split_text(text: &str, max_len: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let max_len = max_len.max(1);
    let step = max_len.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_len).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if chunk.chars().count() > MIN_CHUNK_CHARS {
            chunks.push(chunk.to_string());
        }
        start += step;
    }
    chunks
}

/// Detail documents for one reference file: paragraphs separated by blank
/// lines, with long paragraphs split into overlapping chunks.
pub fn segments(content: &str) -> Vec<String> {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .flat_map(|s| {
            if s.chars().count() > MAX_SEGMENT_CHARS {
                split_text(s, MAX_SEGMENT_CHARS, SEGMENT_OVERLAP)
            } else {
                vec![s.to_string()]
            }
        })
        .collect()
}

/// Prompt block for detail hits, or `""` when there are none.
pub fn format_details(texts: &[&str]) -> String {
    if texts.is_empty() {
        return String::new();
    }
    format!("Relevant character details:\n```{}```\n\n", texts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_become_segments() {
        let content = "Alice likes tea.\n\n\n  Alice was born in Paris.  \n\n";
        assert_eq!(
            segments(content),
            vec!["Alice likes tea.".to_string(), "Alice was born in Paris.".to_string()]
        );
    }

    #[test]
    fn long_paragraph_is_windowed() {
        let long = "a".repeat(600);
        let chunks = segments(&long);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 256);
        assert_eq!(chunks[2].len(), 600 - 2 * 206);
    }

    #[test]
    fn short_tail_chunks_are_dropped() {
        let text = "x".repeat(210);
        let chunks = split_text(&text, 200, 0);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn split_counts_characters_not_bytes() {
        let text = "猫".repeat(30);
        let chunks = split_text(&text, 20, 5);
        assert_eq!(chunks[0].chars().count(), 20);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn details_block_format() {
        assert_eq!(format_details(&[]), "");
        assert_eq!(
            format_details(&["likes tea", "born in Paris"]),
            "Relevant character details:\n```likes tea; born in Paris```\n\n"
        );
    }
}

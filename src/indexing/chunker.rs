//! Recursive separator-based text splitter.
//!
//! Text is split on the coarsest separator present (paragraph, line,
//! sentence, word, character), fragments are packed greedily up to
//! `chunk_size` characters, and each new chunk is seeded with a tail of the
//! previous one of at most `chunk_overlap` characters. Fragments that are
//! still too long are split again with the finer separators.
//!
//! Lengths are counted in `char`s, not bytes.

use crate::core::config::ChunkingConfig;

/// Separators from coarsest to finest; `""` means per-character splitting
const SEPARATORS: [&str; 7] = ["\n\n", "\n", ". ", "? ", "! ", " ", ""];

pub const DEFAULT_CHUNK_SIZE: usize = 1500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// `chunk_overlap` is clamped below `chunk_size` so every chunk makes progress
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into ordered chunks. Empty input yields no chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }

        let (separator, finer) = pick_separator(text, separators);
        let fragments: Vec<&str> = if separator.is_empty() {
            split_chars(text)
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };
        let sep_len = char_len(separator);

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0;

        for fragment in fragments {
            let fragment_len = char_len(fragment);

            if fragment_len > self.chunk_size && !finer.is_empty() {
                if !current.is_empty() {
                    chunks.push(current.join(separator));
                    current.clear();
                    current_len = 0;
                }
                chunks.extend(self.split_with(fragment, finer));
                continue;
            }

            if !current.is_empty() && current_len + sep_len + fragment_len > self.chunk_size {
                chunks.push(current.join(separator));

                current = self.overlap_tail(&current, sep_len);
                current_len = joined_len(&current, sep_len);

                // The overlap must leave room for the incoming fragment
                while !current.is_empty()
                    && current_len + sep_len + fragment_len > self.chunk_size
                {
                    current.remove(0);
                    current_len = joined_len(&current, sep_len);
                }
            }

            current_len = if current.is_empty() {
                fragment_len
            } else {
                current_len + sep_len + fragment_len
            };
            current.push(fragment);
        }

        if !current.is_empty() {
            chunks.push(current.join(separator));
        }

        chunks
    }

    /// Trailing fragments of a closed chunk totalling at most `chunk_overlap`
    fn overlap_tail<'a>(&self, fragments: &[&'a str], sep_len: usize) -> Vec<&'a str> {
        let mut tail = Vec::new();
        let mut tail_len = 0;

        for fragment in fragments.iter().rev() {
            let part_len = char_len(fragment) + if tail_len > 0 { sep_len } else { 0 };
            if tail_len + part_len > self.chunk_overlap {
                break;
            }
            tail.push(*fragment);
            tail_len += part_len;
        }

        tail.reverse();
        tail
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

/// First separator occurring in `text` plus the finer ones after it.
/// Falls through to per-character splitting.
fn pick_separator<'s>(text: &str, separators: &'s [&'s str]) -> (&'s str, &'s [&'s str]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return ("", &[]);
        }
        if text.contains(separator) {
            return (separator, &separators[i + 1..]);
        }
    }
    ("", &[])
}

fn split_chars(text: &str) -> Vec<&str> {
    text.char_indices()
        .map(|(i, c)| &text[i..i + c.len_utf8()])
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn joined_len(parts: &[&str], sep_len: usize) -> usize {
    let content: usize = parts.iter().map(|p| char_len(p)).sum();
    content + sep_len * parts.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(TextChunker::default().split_text("").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = TextChunker::default().split_text("dogs and cats");
        assert_eq!(chunks, vec!["dogs and cats".to_string()]);
    }

    #[test]
    fn test_character_level_split_with_overlap() {
        let text = "A".repeat(1600);
        let chunks = TextChunker::new(1000, 200).split_text(&text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 1000);
        // 1600 - 1000 remaining plus 200 overlap
        assert_eq!(chunks[1].len(), 800);
    }

    #[test]
    fn test_adjacent_chunks_share_overlap() {
        let words: Vec<String> = (0..30).map(|i| format!("w{:02}", i)).collect();
        let text = words.join(" ");
        let chunks = TextChunker::new(20, 8).split_text(&text);

        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            // Two 3-char words plus one space fit in the 8-char overlap
            let tail = &pair[0][pair[0].len() - 7..];
            assert!(
                pair[1].starts_with(tail),
                "{:?} should start with {:?}",
                pair[1],
                tail
            );
        }
    }

    #[test]
    fn test_chunks_never_exceed_size() {
        let paragraph = "The quick brown fox jumps over the lazy dog. ".repeat(12);
        let text = format!(
            "{}\n\n{}\nshort line\n{}? Really! Yes.",
            paragraph,
            "x".repeat(130),
            paragraph
        );
        let chunker = TextChunker::new(100, 30);

        let chunks = chunker.split_text(&text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100, "chunk too long: {}", chunk.len());
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn test_paragraphs_preferred_over_lines() {
        let text = format!("{}\n\n{}", "a".repeat(8), "b\nb");
        let chunks = TextChunker::new(8, 0).split_text(&text);
        assert_eq!(chunks, vec!["a".repeat(8), "b\nb".to_string()]);
    }

    #[test]
    fn test_sentence_separator() {
        let text = "First sentence here. Second sentence here. Third one";
        let chunks = TextChunker::new(25, 0).split_text(text);
        assert_eq!(
            chunks,
            vec![
                "First sentence here".to_string(),
                "Second sentence here".to_string(),
                "Third one".to_string()
            ]
        );
    }

    #[test]
    fn test_multibyte_counted_in_chars() {
        let text = "가".repeat(30);
        let chunks = TextChunker::new(10, 0).split_text(&text);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() == 10));
    }

    #[test]
    fn test_overlap_clamped_below_size() {
        let chunker = TextChunker::new(10, 50);
        assert_eq!(chunker.chunk_overlap(), 9);
        let chunks = chunker.split_text(&"z".repeat(40));
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }
}

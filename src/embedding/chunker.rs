// src/embedding/chunker.rs
// Deterministic, sentence-boundary-aware text chunking.

/// Splits `text` into chunks no longer than `budget` characters, each
/// overlapping the previous by `overlap` characters. Splits on a sentence
/// boundary (`. `, `! `, `? `, or `\n`) within the budget when one exists;
/// otherwise splits hard at the budget.
pub fn chunk_text(text: &str, budget: usize, overlap: usize) -> Vec<String> {
    if text.chars().count() <= budget {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let ideal_end = (start + budget).min(chars.len());

        let end = if ideal_end == chars.len() {
            ideal_end
        } else {
            find_boundary(&chars, start, ideal_end).unwrap_or(ideal_end)
        };

        let chunk: String = chars[start..end].iter().collect();
        chunks.push(chunk);

        if end >= chars.len() {
            break;
        }

        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

/// Looks backward from `ideal_end` for the end of a sentence, within the
/// last quarter of the window so we don't produce tiny fragments.
fn find_boundary(chars: &[char], start: usize, ideal_end: usize) -> Option<usize> {
    let min_search = start + (ideal_end - start) * 3 / 4;

    for i in (min_search..ideal_end).rev() {
        if i + 1 >= chars.len() {
            continue;
        }
        let c = chars[i];
        let next = chars[i + 1];
        if (c == '.' || c == '!' || c == '?') && next == ' ' {
            return Some(i + 2);
        }
        if c == '\n' {
            return Some(i + 1);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello world", 8000, 200);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn long_text_splits_on_sentence_boundary() {
        let sentence = "This is a sentence. ";
        let text = sentence.repeat(500);
        let chunks = chunk_text(&text, 1000, 50);
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.ends_with(". ") || chunk.ends_with('\n'));
        }
    }

    #[test]
    fn chunks_cover_the_whole_text_modulo_overlap() {
        let text = "x".repeat(2500);
        let chunks = chunk_text(&text, 1000, 100);
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert!(total >= text.len());
    }

    #[test]
    fn hard_splits_when_no_sentence_boundary_exists() {
        let text = "a".repeat(5000);
        let chunks = chunk_text(&text, 1000, 0);
        assert_eq!(chunks.len(), 5);
    }
}

//! Text windowing helpers for embedding inputs.
//!
//! Truncation to a model's input budget is a correctness-relevant boundary
//! (content is lost at the cut point), so it lives here as an explicit
//! pure function instead of inline slicing. [`chunk_text`] supports the
//! chunk-and-average embedding strategy by splitting on paragraph
//! boundaries while respecting a character budget.

/// Cut `text` after at most `max_chars` characters, on a char boundary.
///
/// Returns the input unchanged when it already fits. Counts characters,
/// not bytes, so multi-byte input is never split mid-codepoint.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Split text into chunks of at most `max_chars` characters each,
/// preferring paragraph boundaries (`\n\n`) and falling back to space
/// boundaries inside oversized paragraphs.
///
/// Always returns at least one chunk, even for empty input.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max = max_chars.max(1);
    let mut chunks: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_chars = trimmed.chars().count();

        // Flush the buffer if appending this paragraph would overflow it.
        let would_be = if buf.is_empty() {
            para_chars
        } else {
            buf_chars + 2 + para_chars
        };
        if would_be > max && !buf.is_empty() {
            chunks.push(std::mem::take(&mut buf));
            buf_chars = 0;
        }

        if para_chars > max {
            // A single oversized paragraph: hard-split at the budget,
            // backing up to the last space inside the window when possible.
            if !buf.is_empty() {
                chunks.push(std::mem::take(&mut buf));
                buf_chars = 0;
            }
            let mut rest = trimmed;
            while !rest.is_empty() {
                let window = truncate_chars(rest, max);
                let cut = if window.len() < rest.len() {
                    match window.rfind(' ') {
                        Some(pos) if pos > 0 => pos + 1,
                        _ => window.len(),
                    }
                } else {
                    window.len()
                };
                let piece = rest[..cut].trim();
                if !piece.is_empty() {
                    chunks.push(piece.to_string());
                }
                rest = &rest[cut..];
            }
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
                buf_chars += 2;
            }
            buf.push_str(trimmed);
            buf_chars += para_chars;
        }
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }
    if chunks.is_empty() {
        chunks.push(text.trim().to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_noop_when_short() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
    }

    #[test]
    fn truncate_cuts_at_char_count() {
        assert_eq!(truncate_chars("hello world", 5), "hello");
    }

    #[test]
    fn truncate_is_char_boundary_safe() {
        // Each of these is one char but multiple bytes.
        let text = "héllo wörld ünïcode";
        let cut = truncate_chars(text, 7);
        assert_eq!(cut, "héllo w");
        assert_eq!(cut.chars().count(), 7);

        let emoji = "🦀🦀🦀🦀";
        assert_eq!(truncate_chars(emoji, 2), "🦀🦀");
    }

    #[test]
    fn truncate_zero_budget_yields_empty() {
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 700);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn empty_text_yields_one_chunk() {
        let chunks = chunk_text("", 700);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn paragraphs_group_under_budget() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text(text, 700);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("First paragraph."));
        assert!(chunks[0].contains("Third paragraph."));
    }

    #[test]
    fn paragraphs_split_over_budget() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text(text, 30);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 30, "chunk too long: {:?}", chunk);
        }
    }

    #[test]
    fn oversized_paragraph_hard_splits() {
        let text = "word ".repeat(100);
        let chunks = chunk_text(&text, 40);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40);
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn multibyte_paragraph_split_does_not_panic() {
        let text = "ü".repeat(50);
        let chunks = chunk_text(&text, 8);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 8);
        }
    }

    #[test]
    fn deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        assert_eq!(chunk_text(text, 8), chunk_text(text, 8));
    }
}

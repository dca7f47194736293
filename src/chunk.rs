//! Abstract chunker.
//!
//! Splits a publication's abstract into [`Chunk`]s of at most `max_tokens`
//! (approximated as 4 chars per token), packing whole sentences where it can.
//! Every chunk starts with a short header:
//!
//! ```text
//! Title: Microneedling for atrophic acne scars
//! Year: 2024
//!
//! <body text>
//! ```
//!
//! The `Year:` line is what the readiness engine reads recency from, and the
//! title carries study-design markers ("meta-analysis", "randomized") into
//! every chunk of the paper.
//!
//! Chunk ids are derived from the document id and index, so re-chunking the
//! same document yields the same ids.

use sha2::{Digest, Sha256};

use crate::models::{Chunk, LiteratureRecord};

const CHARS_PER_TOKEN: usize = 4;

/// Titles shorter than this ("Reply", "Erratum") are too generic to match
/// papers across sources.
const MIN_DEDUP_TITLE_WORDS: usize = 4;

/// Deterministic document id for a record.
pub fn document_id(record: &LiteratureRecord) -> String {
    format!("{}:{}", record.source, record.source_id)
}

/// Content hash used to spot the same paper arriving from two sources.
///
/// Keyed on the normalized title plus the publication year. `None` when the
/// title is too short to tell papers apart; such records only dedupe on
/// `(source, source_id)`.
pub fn dedup_hash(record: &LiteratureRecord) -> Option<String> {
    let words: Vec<String> = record
        .title
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() < MIN_DEDUP_TITLE_WORDS {
        return None;
    }
    let year = record.year.map(|y| y.to_string()).unwrap_or_default();
    Some(sha256_hex(&format!("{}|{}", words.join(" "), year)))
}

/// Chunk a record's abstract. Always returns at least one chunk; a record
/// with no abstract yields a single title-only chunk.
pub fn chunk_record(record: &LiteratureRecord, max_tokens: usize) -> Vec<Chunk> {
    let doc_id = document_id(record);
    let header = header(record);
    let budget = (max_tokens * CHARS_PER_TOKEN)
        .saturating_sub(header.len())
        .max(CHARS_PER_TOKEN * 16);

    let pieces = split_body(record.abstract_text.trim(), budget);
    if pieces.is_empty() {
        return vec![make_chunk(&doc_id, 0, header.trim_end(), record.year)];
    }

    pieces
        .iter()
        .enumerate()
        .map(|(i, body)| {
            let text = format!("{}{}", header, body);
            make_chunk(&doc_id, i as i64, &text, record.year)
        })
        .collect()
}

fn header(record: &LiteratureRecord) -> String {
    let mut h = format!("Title: {}\n", record.title.trim());
    if let Some(year) = record.year {
        h.push_str(&format!("Year: {}\n", year));
    }
    if let Some(journal) = record.journal.as_deref().filter(|j| !j.trim().is_empty()) {
        h.push_str(&format!("Journal: {}\n", journal.trim()));
    }
    h.push('\n');
    h
}

/// Pack sentences into pieces of at most `max_chars` bytes.
fn split_body(body: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();

    for sentence in sentences(body) {
        let would_be = if buf.is_empty() {
            sentence.len()
        } else {
            buf.len() + 1 + sentence.len()
        };
        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if sentence.len() > max_chars {
            let mut remaining = sentence;
            while !remaining.is_empty() {
                let mut split_at = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
                if split_at < remaining.len() {
                    if let Some(space) = remaining[..split_at].rfind(' ') {
                        if space > 0 {
                            split_at = space + 1;
                        }
                    }
                }
                if split_at == 0 {
                    split_at = remaining
                        .char_indices()
                        .nth(1)
                        .map(|(i, _)| i)
                        .unwrap_or(remaining.len());
                }
                pieces.push(remaining[..split_at].trim().to_string());
                remaining = &remaining[split_at..];
            }
        } else {
            if !buf.is_empty() {
                buf.push(' ');
            }
            buf.push_str(sentence);
        }
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

/// Split after `.`, `!` or `?` followed by whitespace.
fn sentences(body: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(_, next)) = chars.peek() {
                if next.is_whitespace() {
                    let end = i + c.len_utf8();
                    let s = body[start..end].trim();
                    if !s.is_empty() {
                        out.push(s);
                    }
                    start = end;
                }
            }
        }
    }
    let tail = body[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn snap_to_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn make_chunk(document_id: &str, index: i64, text: &str, year: Option<i32>) -> Chunk {
    Chunk {
        id: format!("{}#{}", document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash: sha256_hex(text),
        publication_year: year,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topic_readiness_core::signals::extract_publication_year;

    fn record(abstract_text: &str) -> LiteratureRecord {
        LiteratureRecord {
            source: "pubmed".into(),
            source_id: "123".into(),
            title: "A randomized trial of microneedling".into(),
            abstract_text: abstract_text.into(),
            year: Some(2024),
            journal: Some("J Derm".into()),
            url: None,
        }
    }

    #[test]
    fn test_short_abstract_single_chunk_with_header() {
        let chunks = chunk_record(&record("Scars improved. No serious adverse events."), 250);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "pubmed:123#0");
        assert!(chunks[0].text.starts_with("Title: A randomized trial"));
        assert_eq!(extract_publication_year(&chunks[0].text, 2027), Some(2024));
        assert!(chunks[0].text.ends_with("No serious adverse events."));
    }

    #[test]
    fn test_empty_abstract_yields_title_chunk() {
        let chunks = chunk_record(&record("   "), 250);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("Year: 2024"));
    }

    #[test]
    fn test_long_abstract_splits_on_sentences() {
        let body = (0..60)
            .map(|i| format!("Sentence number {} reports an outcome.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_record(&record(&body), 64);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(c.text.starts_with("Title: "));
            assert!(c.text.trim_end().ends_with('.'));
        }
    }

    #[test]
    fn test_deterministic_ids_and_hashes() {
        let r = record("One. Two. Three.");
        let a = chunk_record(&r, 16);
        let b = chunk_record(&r, 16);
        assert_eq!(a, b);
    }

    #[test]
    fn test_oversized_sentence_is_hard_split() {
        let body = "é".repeat(2000);
        let chunks = chunk_record(&record(&body), 32);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn test_dedup_hash_ignores_case_and_punctuation() {
        let mut a = record("");
        let mut b = record("");
        a.title = "Microneedling: a Review".into();
        b.title = "microneedling a review".into();
        b.source = "semantic_scholar".into();
        assert!(dedup_hash(&a).is_some());
        assert_eq!(dedup_hash(&a), dedup_hash(&b));
    }

    #[test]
    fn test_dedup_hash_separates_years_and_skips_generic_titles() {
        let a = record("");
        let mut b = record("");
        b.year = Some(2019);
        assert_ne!(dedup_hash(&a), dedup_hash(&b));

        let mut reply = record("");
        reply.title = "Reply.".into();
        assert_eq!(dedup_hash(&reply), None);
        reply.title = "   ".into();
        assert_eq!(dedup_hash(&reply), None);
    }
}

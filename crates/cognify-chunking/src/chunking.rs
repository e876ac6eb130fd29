//! The Chunker (§4.1): splits a document's text into `DocumentChunk`s with
//! exact character and line provenance, splitting on paragraph boundaries
//! when possible and never exceeding `maxTokens`.

use cognify_core::{ChunkId, CutType, DataId, DocumentChunk};
use tracing::debug;

/// A document handed to the chunker. Loading bytes off disk, parsing a
/// format-specific container and so on is a `Loader` concern upstream; by
/// the time a `Document` reaches the chunker it is already plain text.
#[derive(Debug, Clone)]
pub struct Document {
    pub data_id: DataId,
    pub text: String,
    pub page_number: Option<usize>,
}

impl Document {
    pub fn new(data_id: DataId, text: impl Into<String>) -> Self {
        Self {
            data_id,
            text: text.into(),
            page_number: None,
        }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page_number = Some(page);
        self
    }
}

/// §7: "a parser failure for one document raises `ChunkingError(data_id)`;
/// other documents in the batch proceed. The chunker never retries."
#[derive(Debug, thiserror::Error)]
#[error("chunking failed for data {data_id}: {message}")]
pub struct ChunkingError {
    pub data_id: DataId,
    pub message: String,
}

impl From<ChunkingError> for cognify_core::CognifyError {
    fn from(e: ChunkingError) -> Self {
        cognify_core::CognifyError::Validation(e.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl ChunkerConfig {
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Result<Self, ChunkingError> {
        if max_tokens == 0 {
            return Err(ChunkingError {
                data_id: DataId::new(),
                message: "max_tokens must be greater than 0".to_string(),
            });
        }
        if overlap_tokens >= max_tokens {
            return Err(ChunkingError {
                data_id: DataId::new(),
                message: "overlap_tokens must be less than max_tokens".to_string(),
            });
        }
        Ok(Self {
            max_tokens,
            overlap_tokens,
        })
    }
}

/// Approximate token count using the same chars-per-token ratio the rest of
/// the workspace's stubbed tokenizer uses. A real LLM tokenizer would be
/// swapped in behind the same signature.
fn estimate_tokens(text: &str) -> usize {
    estimate_tokens_for_chars(text.chars().count())
}

fn estimate_tokens_for_chars(char_count: usize) -> usize {
    (char_count + 3) / 4
}

/// The exact `doc.text` substring covered by `[start, end)` char offsets,
/// converted to the matching byte range so invariant #1 (§8) — `doc.text
/// [c.start_char:c.end_char] == c.text` — holds for every chunk, including
/// ones whose covered range spans a paragraph break or sentence-boundary
/// space that was never itself an atom.
fn slice_by_char_range<'a>(text: &'a str, chars: &[char], start: usize, end: usize) -> &'a str {
    let byte_start: usize = chars[..start].iter().map(|c| c.len_utf8()).sum();
    let byte_end: usize = chars[..end].iter().map(|c| c.len_utf8()).sum();
    &text[byte_start..byte_end]
}

fn tokens_to_chars(tokens: usize) -> usize {
    tokens * 4
}

struct Span<'a> {
    text: &'a str,
    start_char: usize,
    end_char: usize,
}

fn line_of(text: &str, char_offset: usize) -> usize {
    text.chars().take(char_offset).filter(|&c| c == '\n').count()
}

/// Splits text into paragraph spans (on blank lines), with exact character
/// offsets measured in chars (not bytes), so downstream citations are valid
/// even for multi-byte UTF-8 content.
fn split_paragraphs(text: &str) -> Vec<Span<'_>> {
    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    let n = chars.len();

    while i < n {
        // look for a paragraph boundary: two or more consecutive newlines
        if chars[i] == '\n' && i + 1 < n && chars[i + 1] == '\n' {
            let end = i;
            if end > start {
                spans.push(byte_span(text, &chars, start, end));
            }
            // skip the run of blank lines
            let mut j = i;
            while j < n && chars[j] == '\n' {
                j += 1;
            }
            start = j;
            i = j;
            continue;
        }
        i += 1;
    }
    if start < n {
        spans.push(byte_span(text, &chars, start, n));
    }
    spans
}

fn byte_span<'a>(text: &'a str, chars: &[char], start: usize, end: usize) -> Span<'a> {
    let byte_start: usize = chars[..start].iter().map(|c| c.len_utf8()).sum();
    let byte_end: usize = chars[..end].iter().map(|c| c.len_utf8()).sum();
    Span {
        text: &text[byte_start..byte_end],
        start_char: start,
        end_char: end,
    }
}

/// Splits a span into sentence-level spans when it alone exceeds `maxTokens`.
fn split_sentences<'a>(span: &Span<'a>) -> Vec<Span<'a>> {
    let chars: Vec<char> = span.text.chars().collect();
    let mut spans = Vec::new();
    let mut start = 0usize;

    for (i, &c) in chars.iter().enumerate() {
        let is_boundary = (c == '.' || c == '!' || c == '?')
            && chars
                .get(i + 1)
                .map(|&nc| nc.is_whitespace())
                .unwrap_or(true);
        if is_boundary || i == chars.len() - 1 {
            let end = i + 1;
            if end > start {
                spans.push(byte_span(span.text, &chars, start, end));
            }
            start = end;
        }
    }

    // translate offsets to be relative to the parent span's char positions
    spans
        .into_iter()
        .map(|s| Span {
            text: s.text,
            start_char: span.start_char + s.start_char,
            end_char: span.start_char + s.end_char,
        })
        .collect()
}

/// Falls back to an exact character-level cut at `maxTokens` tokens when a
/// single sentence alone exceeds the limit (§8 edge case).
fn split_character_fallback<'a>(span: &Span<'a>, max_tokens: usize) -> Vec<Span<'a>> {
    let chars: Vec<char> = span.text.chars().collect();
    let max_chars = tokens_to_chars(max_tokens).max(1);
    let mut spans = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        spans.push(byte_span(span.text, &chars, start, end));
        start = end;
    }

    spans
        .into_iter()
        .map(|s| Span {
            text: s.text,
            start_char: span.start_char + s.start_char,
            end_char: span.start_char + s.end_char,
        })
        .collect()
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// `Split(doc, maxTokens, overlap) → stream<DocumentChunk>` (§4.1). The
    /// stream is materialized eagerly here; `resume_from` lets a caller
    /// restart at a given chunk index without redoing earlier work's side
    /// effects (the chunks themselves are pure and cheap to recompute).
    pub fn split(&self, doc: &Document, resume_from: usize) -> Result<Vec<DocumentChunk>, ChunkingError> {
        if doc.text.is_empty() {
            return Ok(Vec::new());
        }

        let paragraphs = split_paragraphs(&doc.text);
        let mut atoms: Vec<(Span<'_>, CutType)> = Vec::new();

        for p in paragraphs {
            if estimate_tokens(p.text) <= self.config.max_tokens {
                atoms.push((p, CutType::Paragraph));
                continue;
            }
            let sentences = split_sentences(&p);
            for s in sentences {
                if estimate_tokens(s.text) <= self.config.max_tokens {
                    atoms.push((s, CutType::Sentence));
                } else {
                    for frag in split_character_fallback(&s, self.config.max_tokens) {
                        atoms.push((frag, CutType::CharacterFallback));
                    }
                }
            }
        }

        let doc_chars: Vec<char> = doc.text.chars().collect();
        let merged = self.merge_atoms(&doc_chars, atoms);

        let chunks: Vec<DocumentChunk> = merged
            .into_iter()
            .enumerate()
            .skip(resume_from)
            .map(|(index, (start_char, end_char, cut_type))| {
                let text = slice_by_char_range(&doc.text, &doc_chars, start_char, end_char).to_string();
                let token_count = estimate_tokens(&text);
                let start_line = line_of(&doc.text, start_char);
                let end_line = line_of(&doc.text, end_char);
                let text_hash = cognify_core::content_hash(text.as_bytes());
                DocumentChunk {
                    id: ChunkId::derive_from_chunk(doc.data_id, index, &text_hash),
                    data_id: doc.data_id,
                    text,
                    chunk_index: index,
                    token_count,
                    start_line,
                    end_line,
                    start_char,
                    end_char,
                    page_number: doc.page_number,
                    cut_type,
                }
            })
            .collect();

        debug!(
            data_id = %doc.data_id,
            chunk_count = chunks.len(),
            "document chunked"
        );

        Ok(chunks)
    }

    /// Greedily packs atoms (paragraphs, sentences, or character fragments)
    /// into chunks up to `max_tokens`, carrying the trailing `overlap_tokens`
    /// worth of *range* from one chunk into the start of the next so that for
    /// consecutive chunks `c1.end_char - overlap ≤ c2.start_char ≤ c1.end_char` (§8).
    ///
    /// Tracks only the covering `[start_char, end_char)` range per chunk —
    /// never rebuilds chunk text from the atom strings — so each chunk's
    /// final text (sliced from `doc.text` in `split`) is exactly the source
    /// substring over that range, including whatever separator (a paragraph
    /// break, a sentence-boundary space) actually sat between the atoms it
    /// covers, rather than a synthetic `"\n\n"` that may not match the source.
    fn merge_atoms(&self, doc_chars: &[char], atoms: Vec<(Span<'_>, CutType)>) -> Vec<(usize, usize, CutType)> {
        let mut chunks = Vec::new();
        let mut current_start = 0usize;
        let mut current_end = 0usize;
        let mut current_cut = CutType::Paragraph;
        let mut started = false;

        for (span, cut_type) in atoms {
            if !started {
                current_start = span.start_char;
                current_end = span.end_char;
                current_cut = cut_type;
                started = true;
                continue;
            }

            let candidate_chars = span.end_char.saturating_sub(current_start);
            if estimate_tokens_for_chars(candidate_chars) <= self.config.max_tokens {
                current_end = span.end_char;
                current_cut = cut_type;
            } else {
                chunks.push((current_start, current_end, current_cut));

                let overlap_chars = tokens_to_chars(self.config.overlap_tokens);
                let carry_start = current_end.saturating_sub(overlap_chars).max(current_start);
                let carry_is_blank = doc_chars[carry_start..current_end].iter().all(|c| c.is_whitespace());

                current_start = if carry_is_blank { span.start_char } else { carry_start };
                current_end = span.end_char;
                current_cut = cut_type;
            }
        }

        if started {
            chunks.push((current_start, current_end, current_cut));
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ChunkerConfig {
        ChunkerConfig::new(50, 10).unwrap()
    }

    #[test]
    fn empty_document_yields_zero_chunks() {
        let chunker = Chunker::new(cfg());
        let doc = Document::new(DataId::new(), "");
        let chunks = chunker.split(&doc, 0).unwrap();
        assert!(chunks.is_empty());
    }

    /// §8 quantified invariant #1: `doc.text[c.start_char:c.end_char] == c.text`.
    fn assert_chunks_are_exact_substrings(doc: &Document, chunks: &[DocumentChunk]) {
        let doc_chars: Vec<char> = doc.text.chars().collect();
        for c in chunks {
            let source = slice_by_char_range(&doc.text, &doc_chars, c.start_char, c.end_char);
            assert_eq!(source, c.text, "chunk {} text diverges from its cited source range", c.chunk_index);
        }
    }

    #[test]
    fn splits_on_paragraph_boundaries_when_possible() {
        let chunker = Chunker::new(ChunkerConfig::new(30, 5).unwrap());
        let text = "Alice works at Acme.\n\nAcme is based in Berlin.\n\nBerlin is a city in Germany.";
        let doc = Document::new(DataId::new(), text);
        let chunks = chunker.split(&doc, 0).unwrap();
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.token_count <= 30);
        }
        assert_chunks_are_exact_substrings(&doc, &chunks);
    }

    #[test]
    fn chunk_text_is_the_exact_source_substring_across_merged_paragraphs() {
        // Small enough max_tokens that several short paragraphs get merged
        // into one chunk, exercising the candidate-range path in
        // `merge_atoms` that previously rebuilt text with a synthetic "\n\n".
        let chunker = Chunker::new(ChunkerConfig::new(40, 8).unwrap());
        let text = "Alice works at Acme.\n\nAcme is based in Berlin.\n\n\nBerlin is a city in Germany.\n\nGermany is in Europe.";
        let doc = Document::new(DataId::new(), text);
        let chunks = chunker.split(&doc, 0).unwrap();
        assert!(!chunks.is_empty());
        assert_chunks_are_exact_substrings(&doc, &chunks);
    }

    #[test]
    fn chunk_text_is_the_exact_source_substring_across_sentence_splits() {
        // One paragraph whose sentences alone exceed max_tokens so it is
        // split at `split_sentences`, joined back by single spaces in the
        // source rather than the chunker's own paragraph separator.
        let chunker = Chunker::new(ChunkerConfig::new(8, 2).unwrap());
        let text = "One two three four five six seven eight nine ten eleven twelve. Thirteen fourteen fifteen sixteen seventeen eighteen nineteen twenty.";
        let doc = Document::new(DataId::new(), text);
        let chunks = chunker.split(&doc, 0).unwrap();
        assert!(!chunks.is_empty());
        assert_chunks_are_exact_substrings(&doc, &chunks);
    }

    #[test]
    fn consecutive_chunks_overlap_within_bound() {
        let config = ChunkerConfig::new(20, 5).unwrap();
        let chunker = Chunker::new(config);
        let text = "One two three four five six seven eight nine ten.\n\nEleven twelve thirteen fourteen fifteen sixteen seventeen eighteen.\n\nNineteen twenty twentyone twentytwo twentythree twentyfour.";
        let doc = Document::new(DataId::new(), text);
        let chunks = chunker.split(&doc, 0).unwrap();
        for pair in chunks.windows(2) {
            let (c1, c2) = (&pair[0], &pair[1]);
            if c1.chunk_index + 1 == c2.chunk_index {
                let overlap_chars = tokens_to_chars(config.overlap_tokens);
                assert!(c2.start_char <= c1.end_char);
                assert!(c1.end_char.saturating_sub(overlap_chars) <= c2.start_char);
            }
        }
        assert_chunks_are_exact_substrings(&doc, &chunks);
    }

    #[test]
    fn overlong_single_sentence_falls_back_to_character_split() {
        let config = ChunkerConfig::new(10, 2).unwrap();
        let chunker = Chunker::new(config);
        let long_sentence = "a".repeat(400);
        let doc = Document::new(DataId::new(), long_sentence);
        let chunks = chunker.split(&doc, 0).unwrap();
        assert!(chunks.iter().any(|c| c.cut_type == CutType::CharacterFallback));
        for c in &chunks {
            assert!(c.token_count <= 10);
        }
        assert_chunks_are_exact_substrings(&doc, &chunks);
    }

    #[test]
    fn chunk_ids_are_deterministic_for_identical_input() {
        let chunker = Chunker::new(cfg());
        let data_id = DataId::new();
        let text = "Alice works at Acme. Acme is based in Berlin.";
        let a = chunker.split(&Document::new(data_id, text), 0).unwrap();
        let b = chunker.split(&Document::new(data_id, text), 0).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
        }
    }

    #[test]
    fn resume_from_skips_earlier_chunk_indices() {
        let chunker = Chunker::new(ChunkerConfig::new(15, 3).unwrap());
        let text = "First sentence is here. Second sentence follows. Third sentence too. Fourth one also exists. Fifth wraps it up.";
        let doc = Document::new(DataId::new(), text);
        let all = chunker.split(&doc, 0).unwrap();
        let resumed = chunker.split(&doc, 2).unwrap();
        assert_eq!(resumed.len(), all.len().saturating_sub(2));
        if let Some(first_resumed) = resumed.first() {
            assert_eq!(first_resumed.chunk_index, 2);
        }
    }

    #[test]
    fn char_ranges_are_within_document_bounds() {
        let chunker = Chunker::new(cfg());
        let text = "Short document with a few sentences. Another one here.";
        let doc = Document::new(DataId::new(), text);
        let chunks = chunker.split(&doc, 0).unwrap();
        let total_chars = text.chars().count();
        for c in &chunks {
            assert!(c.end_char <= total_chars);
            assert!(c.start_char <= c.end_char);
        }
    }
}

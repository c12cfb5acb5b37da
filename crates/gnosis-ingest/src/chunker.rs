//! Word-bounded, overlap-carrying document chunker.
//!
//! Splits on blank-line paragraph boundaries, accumulates whole paragraphs
//! into a chunk until it reaches `target_words` or the next paragraph would
//! push it past `max_words`, then carries the tail `overlap_words` of a
//! chunk's text into the start of the next one. Every offset the chunker
//! records is a byte range into the *original* document, so a caller can
//! always slice back to ground truth rather than trusting the copied text.

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub target_words: usize,
    pub min_words: usize,
    pub max_words: usize,
    pub overlap_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_words: 1000,
            min_words: 800,
            max_words: 1500,
            overlap_words: 200,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> IngestResult<()> {
        if self.target_words == 0 || self.min_words == 0 || self.max_words == 0 {
            return Err(IngestError::InvalidConfig("word bounds must be positive".into()));
        }
        if !(self.min_words <= self.target_words && self.target_words <= self.max_words) {
            return Err(IngestError::InvalidConfig(
                "require min_words <= target_words <= max_words".into(),
            ));
        }
        if self.overlap_words >= self.min_words {
            return Err(IngestError::InvalidConfig(
                "overlap_words must be smaller than min_words".into(),
            ));
        }
        Ok(())
    }
}

/// One chunk of a document. `core_start`/`core_end` are the byte offsets of
/// this chunk's own, non-overlapping contribution to the document;
/// `overlap_start`/`overlap_end` (when present) are the byte offsets of the
/// tail of the *previous* chunk's core that was prepended to `text` for
/// extraction context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub word_count: usize,
    pub core_start: usize,
    pub core_end: usize,
    pub overlap_start: Option<usize>,
    pub overlap_end: Option<usize>,
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> IngestResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    /// Chunk the whole document.
    pub fn chunk(&self, document: &str) -> IngestResult<Vec<Chunk>> {
        if document.trim().is_empty() {
            return Err(IngestError::EmptyDocument);
        }
        let paragraphs = paragraph_spans(document);
        let mut spans = self.walk_paragraphs(document, &paragraphs);
        self.merge_undersized(document, &mut spans);
        Ok(self.attach_overlap(document, spans))
    }

    /// Chunk the document and return only chunks from `from_index` onward.
    /// Chunking is a pure function of `(document, config)`, so a job that
    /// checkpointed at chunk N can safely re-derive the same sequence and
    /// resume here instead of persisting chunk state itself.
    pub fn chunk_from(&self, document: &str, from_index: usize) -> IngestResult<Vec<Chunk>> {
        let mut chunks = self.chunk(document)?;
        if from_index >= chunks.len() {
            chunks.clear();
        } else {
            chunks.drain(0..from_index);
        }
        Ok(chunks)
    }

    fn walk_paragraphs(&self, document: &str, paragraphs: &[(usize, usize)]) -> Vec<(usize, usize, usize)> {
        let words_in = |range: (usize, usize)| word_ranges(&document[range.0..range.1]).len();
        let mut spans = Vec::new();
        let mut i = 0;
        while i < paragraphs.len() {
            let mut j = i;
            let mut word_count = 0usize;
            loop {
                if j >= paragraphs.len() {
                    break;
                }
                let para_words = words_in(paragraphs[j]);
                if word_count > 0 && word_count + para_words > self.config.max_words {
                    break;
                }
                word_count += para_words;
                j += 1;
                if word_count >= self.config.target_words {
                    break;
                }
            }
            if j == i {
                // A single paragraph alone already meets or exceeds max_words;
                // take it anyway so the walk always makes progress.
                j = i + 1;
                word_count = words_in(paragraphs[i]);
            }
            let core_start = paragraphs[i].0;
            let core_end = paragraphs[j - 1].1;
            spans.push((core_start, core_end, word_count));
            i = j;
        }
        spans
    }

    /// Folds any chunk under `min_words` into its predecessor, except the
    /// final chunk, which is allowed to be short since there's nothing left
    /// to pad it with.
    fn merge_undersized(&self, document: &str, spans: &mut Vec<(usize, usize, usize)>) {
        loop {
            let mut merged = false;
            let mut k = 1;
            while k < spans.len() {
                let is_last = k == spans.len() - 1;
                if !is_last && spans[k].2 < self.config.min_words {
                    let new_start = spans[k - 1].0;
                    let new_end = spans[k].1;
                    let new_count = word_ranges(&document[new_start..new_end]).len();
                    spans[k - 1] = (new_start, new_end, new_count);
                    spans.remove(k);
                    merged = true;
                } else {
                    k += 1;
                }
            }
            if !merged {
                break;
            }
        }
    }

    fn attach_overlap(&self, document: &str, spans: Vec<(usize, usize, usize)>) -> Vec<Chunk> {
        let mut chunks = Vec::with_capacity(spans.len());
        for (idx, &(core_start, core_end, word_count)) in spans.iter().enumerate() {
            let core_text = &document[core_start..core_end];
            let overlap = if idx == 0 || self.config.overlap_words == 0 {
                None
            } else {
                let (prev_start, prev_end, _) = spans[idx - 1];
                let prev_words = word_ranges(&document[prev_start..prev_end]);
                let take = self.config.overlap_words.min(prev_words.len());
                if take == 0 {
                    None
                } else {
                    let tail_word_start = prev_words[prev_words.len() - take].0;
                    Some((prev_start + tail_word_start, prev_end))
                }
            };

            let text = match overlap {
                Some((overlap_start, overlap_end)) => {
                    format!("{}\n\n{}", &document[overlap_start..overlap_end], core_text)
                }
                None => core_text.to_string(),
            };

            chunks.push(Chunk {
                index: idx,
                text,
                word_count,
                core_start,
                core_end,
                overlap_start: overlap.map(|(s, _)| s),
                overlap_end: overlap.map(|(_, e)| e),
            });
        }
        chunks
    }
}

/// Byte ranges of paragraphs: maximal runs of text separated by one or more
/// blank lines. Separators are matched only on ASCII whitespace bytes, so
/// every offset returned is guaranteed to land on a UTF-8 char boundary.
fn paragraph_spans(document: &str) -> Vec<(usize, usize)> {
    static SEPARATOR: once_sep::Lazy = once_sep::Lazy::new();
    let sep = SEPARATOR.get();
    let mut spans = Vec::new();
    let mut pos = 0;
    for m in sep.find_iter(document) {
        if m.start() > pos {
            spans.push((pos, m.start()));
        }
        pos = m.end();
    }
    if pos < document.len() {
        spans.push((pos, document.len()));
    }
    spans
}

/// Byte ranges of whitespace-delimited words within `text`.
fn word_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                ranges.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        ranges.push((s, text.len()));
    }
    ranges
}

/// Minimal lazily-initialized regex holder, avoiding a `once_cell` dependency
/// the teacher's stack doesn't already carry.
mod once_sep {
    use std::sync::OnceLock;

    use regex::Regex;

    pub struct Lazy(OnceLock<Regex>);

    impl Lazy {
        pub const fn new() -> Self {
            Self(OnceLock::new())
        }

        pub fn get(&self) -> &Regex {
            self.0.get_or_init(|| Regex::new(r"\n[ \t]*\n+").expect("static regex"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraphs(n: usize, words_per_para: usize) -> String {
        (0..n)
            .map(|p| {
                (0..words_per_para)
                    .map(|w| format!("p{p}w{w}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn rejects_inverted_bounds() {
        let config = ChunkerConfig {
            target_words: 10,
            min_words: 20,
            max_words: 30,
            overlap_words: 5,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_document() {
        let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        assert!(matches!(chunker.chunk(""), Err(IngestError::EmptyDocument)));
        assert!(matches!(chunker.chunk("   \n\n  "), Err(IngestError::EmptyDocument)));
    }

    #[test]
    fn emits_one_chunk_for_a_short_document() {
        let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        let doc = paragraphs(3, 50);
        let chunks = chunker.chunk(&doc).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].overlap_start, None);
    }

    #[test]
    fn splits_long_document_into_multiple_chunks_with_overlap() {
        let config = ChunkerConfig {
            target_words: 100,
            min_words: 60,
            max_words: 150,
            overlap_words: 20,
        };
        let chunker = Chunker::new(config).unwrap();
        let doc = paragraphs(20, 20);
        let chunks = chunker.chunk(&doc).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks[1..] {
            let (os, oe) = (c.overlap_start.unwrap(), c.overlap_end.unwrap());
            assert!(c.text.starts_with(&doc[os..oe]));
        }
    }

    #[test]
    fn undersized_non_last_chunk_merges_into_predecessor() {
        // Paragraph 0 is tiny, paragraph 1 alone already exceeds max_words,
        // forcing paragraph 0 to be emitted alone below min_words, then
        // merged forward into... there is no predecessor for chunk 0, so
        // instead build a case where a middle chunk is undersized.
        let config = ChunkerConfig {
            target_words: 100,
            min_words: 50,
            max_words: 120,
            overlap_words: 10,
        };
        let chunker = Chunker::new(config).unwrap();
        // First paragraph reaches just short of target (forces emit once the
        // following huge paragraph would overflow max), second paragraph
        // alone is huge (its own forced chunk), third is small and last.
        let small_first = paragraphs(1, 40);
        let huge_middle = paragraphs(1, 200);
        let small_last = paragraphs(1, 10);
        let doc = format!("{small_first}\n\n{huge_middle}\n\n{small_last}");
        let chunks = chunker.chunk(&doc).unwrap();
        // The tiny first chunk (40 words, < min_words=50) has a successor
        // (the huge paragraph) so it must have merged forward into it.
        assert!(chunks[0].word_count >= config.min_words || chunks.len() == 1);
        // Last chunk is exempt and may remain short.
        assert_eq!(chunks.last().unwrap().word_count, 10);
    }

    #[test]
    fn chunk_from_skips_earlier_chunks_deterministically() {
        let config = ChunkerConfig {
            target_words: 50,
            min_words: 30,
            max_words: 80,
            overlap_words: 10,
        };
        let chunker = Chunker::new(config).unwrap();
        let doc = paragraphs(10, 15);
        let full = chunker.chunk(&doc).unwrap();
        let resumed = chunker.chunk_from(&doc, 1).unwrap();
        assert_eq!(resumed.len(), full.len() - 1);
        assert_eq!(resumed[0], full[1]);
    }

    #[test]
    fn core_regions_are_contiguous_and_ordered() {
        let config = ChunkerConfig {
            target_words: 30,
            min_words: 15,
            max_words: 45,
            overlap_words: 5,
        };
        let chunker = Chunker::new(config).unwrap();
        let doc = paragraphs(12, 10);
        let chunks = chunker.chunk(&doc).unwrap();
        let mut cursor = 0;
        for c in &chunks {
            assert!(c.core_start >= cursor);
            assert!(c.core_end > c.core_start);
            assert_eq!(&doc[c.core_start..c.core_end], {
                let s = &doc[c.core_start..c.core_end];
                s
            });
            cursor = c.core_end;
        }
        assert!(cursor <= doc.len());
    }
}

mod split;

use tracing::{debug, info};

use self::split::split_at_boundaries;
use crate::config::ChunkingConfig;
use crate::error::ChunkError;
use crate::model::{ChunkedDocument, DocumentChunk, DocumentSection};
use crate::text::Vocabulary;
use crate::util::now_utc_string;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkOptions {
    pub target_tokens: usize,
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    pub chars_per_token: f64,
}

impl From<&ChunkingConfig> for ChunkOptions {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            target_tokens: config.chunk_target_tokens,
            max_tokens: config.chunk_max_tokens,
            overlap_tokens: config.chunk_overlap_tokens,
            chars_per_token: config.chars_per_token,
        }
    }
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self::from(&ChunkingConfig::default())
    }
}

/// Character window used when a text has to be split.
#[derive(Debug, Clone, Copy)]
struct SplitWindow {
    split_chars: usize,
    overlap_chars: usize,
}

#[derive(Debug)]
struct ChunkDraft {
    section_path: Vec<String>,
    heading: String,
    content: String,
}

pub fn estimate_tokens(char_count: usize, chars_per_token: f64) -> usize {
    (char_count as f64 / chars_per_token).ceil() as usize
}

/// True when a document of `char_count` characters exceeds the model context.
pub fn should_chunk_document(char_count: usize, config: &ChunkingConfig) -> bool {
    char_count as f64 > config.max_context_tokens as f64 * config.chars_per_token
}

/// Splits a parsed document into token-bounded, keyword-tagged chunks.
pub struct DocumentChunker<'a> {
    vocabulary: &'a Vocabulary,
    options: ChunkOptions,
}

impl<'a> DocumentChunker<'a> {
    pub fn new(vocabulary: &'a Vocabulary, options: ChunkOptions) -> Self {
        Self {
            vocabulary,
            options,
        }
    }

    pub fn chunk_document(
        &self,
        sections: &[DocumentSection],
        raw_text: &str,
        document_id: &str,
        filename: &str,
    ) -> Result<ChunkedDocument, ChunkError> {
        let window = self.split_window()?;
        let mut drafts = Vec::<ChunkDraft>::new();

        if sections.is_empty() {
            self.chunk_raw_text(raw_text, document_id, filename, window, &mut drafts);
        } else {
            for section in sections {
                self.chunk_section(section, &[], window, &mut drafts);
            }
        }

        let chunks = drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| self.finalize(index, document_id, draft))
            .collect::<Vec<DocumentChunk>>();

        let total_chars = chunks.iter().map(|chunk| chunk.char_count).sum();
        let total_estimated_tokens = chunks.iter().map(|chunk| chunk.estimated_tokens).sum();

        info!(
            document_id,
            filename,
            chunks = chunks.len(),
            total_chars,
            total_estimated_tokens,
            "chunked document"
        );

        Ok(ChunkedDocument {
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            total_chunks: chunks.len(),
            total_chars,
            total_estimated_tokens,
            chunks,
            chunked_at: now_utc_string(),
        })
    }

    fn split_window(&self) -> Result<SplitWindow, ChunkError> {
        let cpt = self.options.chars_per_token;
        let window_tokens = self.options.target_tokens.min(self.options.max_tokens);
        let split_chars = if cpt.is_finite() && cpt > 0.0 {
            (window_tokens as f64 * cpt).floor()
        } else {
            0.0
        };

        if split_chars < 1.0 {
            return Err(ChunkError::InvalidWindow {
                max_chars: split_chars as i64,
                max_tokens: self.options.max_tokens,
                chars_per_token: cpt,
            });
        }

        let split_chars = split_chars as usize;
        let overlap_chars = ((self.options.overlap_tokens as f64 * cpt).floor() as usize)
            .min(split_chars / 2);

        Ok(SplitWindow {
            split_chars,
            overlap_chars,
        })
    }

    fn chunk_section(
        &self,
        section: &DocumentSection,
        parent_path: &[String],
        window: SplitWindow,
        drafts: &mut Vec<ChunkDraft>,
    ) {
        let mut section_path = parent_path.to_vec();
        section_path.push(section.heading.clone());

        let content = section.content.trim();
        if !content.is_empty() {
            let tokens = estimate_tokens(content.chars().count(), self.options.chars_per_token);
            if tokens <= self.options.max_tokens {
                drafts.push(ChunkDraft {
                    section_path: section_path.clone(),
                    heading: section.heading.clone(),
                    content: content.to_string(),
                });
            } else {
                let parts = split_at_boundaries(content, window.split_chars, window.overlap_chars);
                debug!(
                    heading = %section.heading,
                    tokens,
                    parts = parts.len(),
                    "split oversized section"
                );
                let total = parts.len();
                for (index, part) in parts.into_iter().enumerate() {
                    drafts.push(ChunkDraft {
                        section_path: section_path.clone(),
                        heading: format!("{} (časť {}/{})", section.heading, index + 1, total),
                        content: part,
                    });
                }
            }
        }

        for subsection in &section.subsections {
            self.chunk_section(subsection, &section_path, window, drafts);
        }
    }

    fn chunk_raw_text(
        &self,
        raw_text: &str,
        document_id: &str,
        filename: &str,
        window: SplitWindow,
        drafts: &mut Vec<ChunkDraft>,
    ) {
        let root = if filename.trim().is_empty() {
            document_id
        } else {
            filename
        };

        let parts = split_at_boundaries(raw_text, window.split_chars, window.overlap_chars);
        for (index, part) in parts.into_iter().enumerate() {
            drafts.push(ChunkDraft {
                section_path: vec![root.to_string()],
                heading: format!("Sekcia {}", index + 1),
                content: part,
            });
        }
    }

    fn finalize(&self, index: usize, document_id: &str, draft: ChunkDraft) -> DocumentChunk {
        let char_count = draft.content.chars().count();
        let keywords = self
            .vocabulary
            .extract_keywords(&format!("{} {}", draft.heading, draft.content));

        DocumentChunk {
            chunk_id: format!("{document_id}-c{index:04}"),
            document_id: document_id.to_string(),
            section_path: draft.section_path,
            heading: draft.heading,
            content: draft.content,
            char_count,
            estimated_tokens: estimate_tokens(char_count, self.options.chars_per_token),
            keywords,
        }
    }
}

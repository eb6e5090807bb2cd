mod convert;
mod html;
mod tree;

use std::sync::Arc;

use tracing::info;

pub use convert::{DocumentConverter, DocumentFormat, PandocConverter};

use self::html::{HtmlNode, html_nodes};
use self::tree::SectionTreeBuilder;
use crate::error::ParseError;
use crate::model::ParsedDocument;

/// Converts document buffers into a section tree plus the flat raw text.
pub struct StructuralParser {
    converter: Arc<dyn DocumentConverter>,
}

impl StructuralParser {
    pub fn new(converter: Arc<dyn DocumentConverter>) -> Self {
        Self { converter }
    }

    /// Plain-text buffers carry no structure and yield no sections, leaving
    /// the chunker to split the raw text.
    pub async fn parse_document(
        &self,
        buffer: &[u8],
        filename: &str,
    ) -> Result<ParsedDocument, ParseError> {
        if DocumentFormat::from_filename(filename) == Some(DocumentFormat::PlainText) {
            let raw_text =
                String::from_utf8(buffer.to_vec()).map_err(|_| ParseError::InvalidEncoding {
                    filename: filename.to_string(),
                })?;
            info!(filename, chars = raw_text.chars().count(), "parsed plain-text document");
            return Ok(ParsedDocument {
                sections: Vec::new(),
                raw_text,
            });
        }

        let html = self.converter.to_html(buffer, filename).await?;
        let parsed = self.parse_html(&html);
        info!(
            filename,
            sections = parsed.sections.len(),
            chars = parsed.raw_text.chars().count(),
            "parsed document structure"
        );
        Ok(parsed)
    }

    pub fn parse_html(&self, html: &str) -> ParsedDocument {
        let mut builder = SectionTreeBuilder::new();
        let mut raw_lines = Vec::<String>::new();

        for node in html_nodes(html) {
            match node {
                HtmlNode::Heading { level, text } => {
                    raw_lines.push(text.clone());
                    builder.open_heading(level, text);
                }
                HtmlNode::Block { text } => {
                    raw_lines.push(text.clone());
                    builder.append_content(text);
                }
            }
        }

        ParsedDocument {
            sections: builder.finish(),
            raw_text: raw_lines.join("\n"),
        }
    }
}

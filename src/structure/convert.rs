use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::ParseError;

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Html,
    Docx,
    Odt,
    Markdown,
    PlainText,
}

impl DocumentFormat {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())?;

        match extension.as_str() {
            "html" | "htm" | "xhtml" => Some(Self::Html),
            "docx" => Some(Self::Docx),
            "odt" => Some(Self::Odt),
            "md" | "markdown" => Some(Self::Markdown),
            "txt" | "text" => Some(Self::PlainText),
            _ => None,
        }
    }

    fn pandoc_reader(self) -> Option<&'static str> {
        match self {
            Self::Docx => Some("docx"),
            Self::Odt => Some("odt"),
            Self::Markdown => Some("markdown"),
            Self::Html | Self::PlainText => None,
        }
    }

    fn is_zip_container(self) -> bool {
        matches!(self, Self::Docx | Self::Odt)
    }
}

/// Turns a document buffer into an HTML fragment.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn to_html(&self, buffer: &[u8], filename: &str) -> Result<String, ParseError>;
}

/// HTML passes through; office and markdown documents go through a `pandoc`
/// child process fed on stdin.
#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: String,
}

impl PandocConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run_pandoc(
        &self,
        buffer: &[u8],
        reader: &str,
        filename: &str,
    ) -> Result<String, ParseError> {
        let mut child = Command::new(&self.program)
            .arg("--from")
            .arg(reader)
            .arg("--to")
            .arg("html")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ParseError::ConverterUnavailable {
                program: self.program.clone(),
                filename: filename.to_string(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(buffer)
                .await
                .map_err(|error| self.failed(filename, "stdin", error.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|error| self.failed(filename, "wait", error.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failed(
                filename,
                &output.status.to_string(),
                stderr.trim().to_string(),
            ));
        }

        debug!(
            filename,
            program = %self.program,
            html_bytes = output.stdout.len(),
            "converted document to html"
        );
        String::from_utf8(output.stdout).map_err(|_| ParseError::InvalidEncoding {
            filename: filename.to_string(),
        })
    }

    fn failed(&self, filename: &str, status: &str, stderr: String) -> ParseError {
        ParseError::ConversionFailed {
            program: self.program.clone(),
            filename: filename.to_string(),
            status: status.to_string(),
            stderr,
        }
    }
}

#[async_trait]
impl DocumentConverter for PandocConverter {
    async fn to_html(&self, buffer: &[u8], filename: &str) -> Result<String, ParseError> {
        let format =
            DocumentFormat::from_filename(filename).ok_or_else(|| ParseError::UnsupportedFormat {
                filename: filename.to_string(),
            })?;

        if format.is_zip_container() && !buffer.starts_with(ZIP_SIGNATURE) {
            return Err(ParseError::Corrupt {
                filename: filename.to_string(),
                reason: "missing ZIP container signature".to_string(),
            });
        }

        match format.pandoc_reader() {
            Some(reader) => self.run_pandoc(buffer, reader, filename).await,
            None => String::from_utf8(buffer.to_vec()).map_err(|_| ParseError::InvalidEncoding {
                filename: filename.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_detected_case_insensitively() {
        assert_eq!(
            DocumentFormat::from_filename("Spec.DOCX"),
            Some(DocumentFormat::Docx)
        );
        assert_eq!(
            DocumentFormat::from_filename("page.htm"),
            Some(DocumentFormat::Html)
        );
        assert_eq!(
            DocumentFormat::from_filename("notes.txt"),
            Some(DocumentFormat::PlainText)
        );
        assert_eq!(DocumentFormat::from_filename("archive.zip"), None);
        assert_eq!(DocumentFormat::from_filename("no_extension"), None);
    }

    #[tokio::test]
    async fn html_passes_through_without_pandoc() {
        let converter = PandocConverter::new("definitely-not-installed-pandoc");
        let html = converter
            .to_html(b"<h1>Title</h1><p>Body</p>", "page.html")
            .await
            .expect("html should pass through");
        assert_eq!(html, "<h1>Title</h1><p>Body</p>");
    }

    #[tokio::test]
    async fn corrupt_docx_fails_before_spawning_converter() {
        let converter = PandocConverter::new("definitely-not-installed-pandoc");
        let error = converter
            .to_html(b"not a zip archive", "spec.docx")
            .await
            .expect_err("corrupt docx must fail");
        assert!(matches!(error, ParseError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn missing_converter_binary_is_reported() {
        let converter = PandocConverter::new("definitely-not-installed-pandoc");
        let error = converter
            .to_html(b"PK\x03\x04rest", "spec.docx")
            .await
            .expect_err("missing binary must fail");
        assert!(matches!(error, ParseError::ConverterUnavailable { .. }));
    }

    #[tokio::test]
    async fn invalid_utf8_html_is_rejected() {
        let converter = PandocConverter::new("pandoc");
        let error = converter
            .to_html(&[0xff, 0xfe, 0x00], "page.html")
            .await
            .expect_err("invalid utf-8 must fail");
        assert!(matches!(error, ParseError::InvalidEncoding { .. }));
    }

    #[tokio::test]
    async fn unknown_extension_is_unsupported() {
        let converter = PandocConverter::new("pandoc");
        let error = converter
            .to_html(b"data", "image.png")
            .await
            .expect_err("png is unsupported");
        assert!(matches!(error, ParseError::UnsupportedFormat { .. }));
    }
}

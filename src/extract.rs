//! Document loading: file on disk → [`Document`] of pages.
//!
//! PDFs are text-extracted with `pdf-extract`; everything else is read as
//! UTF-8 text. In both cases pages are separated by form-feed characters
//! (`\x0c`), which `pdf-extract` emits between PDF pages. Blank pages are
//! dropped but keep their place in the numbering.

use std::path::Path;

use groundchat_core::error::{RagError, Result};
use groundchat_core::models::{Document, Page};
use tracing::debug;

const PAGE_BREAK: char = '\x0c';

/// Load and extract the text of the document at `path`.
///
/// # Errors
///
/// [`RagError::Load`] when the file is missing, unreadable, not valid UTF-8
/// (text files), or not a parsable PDF.
pub fn load_document(path: &Path) -> Result<Document> {
    let bytes = std::fs::read(path)
        .map_err(|e| RagError::Load(format!("{}: {}", path.display(), e)))?;

    let text = if is_pdf(path) {
        extract_pdf(&bytes).map_err(|e| RagError::Load(format!("{}: {}", path.display(), e)))?
    } else {
        String::from_utf8(bytes).map_err(|_| {
            RagError::Load(format!("{}: file is not valid UTF-8 text", path.display()))
        })?
    };

    let pages = split_pages(&text);
    debug!(path = %path.display(), pages = pages.len(), "loaded document");
    Ok(Document {
        source: path.display().to_string(),
        pages,
    })
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn extract_pdf(bytes: &[u8]) -> std::result::Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| format!("PDF extraction failed: {}", e))
}

/// Split extracted text into 1-based pages, skipping blank ones.
pub fn split_pages(text: &str) -> Vec<Page> {
    text.split(PAGE_BREAK)
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| Page {
            number: i + 1,
            text: page.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_split_pages_numbers_from_one() {
        let pages = split_pages("first\x0csecond");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[1].number, 2);
        assert_eq!(pages[1].text, "second");
    }

    #[test]
    fn test_blank_pages_skipped_but_counted() {
        let pages = split_pages("one\x0c  \n\x0cthree");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].number, 3);
    }

    #[test]
    fn test_loads_text_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("guide.txt");
        fs::write(&path, "Refunds take 30 days.").unwrap();
        let doc = load_document(&path).unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].text, "Refunds take 30 days.");
        assert!(doc.source.ends_with("guide.txt"));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = load_document(Path::new("/nonexistent/Help-Guide.pdf")).unwrap_err();
        assert!(matches!(err, RagError::Load(_)));
    }

    #[test]
    fn test_invalid_pdf_is_load_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.PDF");
        fs::write(&path, b"not a pdf").unwrap();
        let err = load_document(&path).unwrap_err();
        assert!(matches!(err, RagError::Load(_)));
        assert!(err.to_string().contains("broken.PDF"));
    }
}

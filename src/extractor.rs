//! Plain-text extraction from uploaded notes.
//!
//! Text files are decoded lossily. PDFs are read page by page with lopdf;
//! pages that fail to extract are skipped and counted rather than failing
//! the whole upload.

use std::path::Path;

use lopdf::Document;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("No readable text found.")]
    NoTextFound,
    #[error("unsupported file type: {0}")]
    UnsupportedKind(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Pdf,
}

impl DocumentKind {
    /// Infer the kind from a declared filename's extension.
    pub fn from_filename(filename: &str) -> Result<Self, ExtractError> {
        let ext = Path::new(filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" => Ok(Self::PlainText),
            "pdf" => Ok(Self::Pdf),
            _ => Err(ExtractError::UnsupportedKind(ext)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub pages_total: usize,
    pub pages_skipped: usize,
}

pub fn extract(bytes: &[u8], kind: DocumentKind) -> Result<Extraction, ExtractError> {
    let extraction = match kind {
        DocumentKind::PlainText => Extraction {
            text: String::from_utf8_lossy(bytes).into_owned(),
            pages_total: 1,
            pages_skipped: 0,
        },
        DocumentKind::Pdf => extract_pdf(bytes),
    };

    if extraction.pages_skipped > 0 {
        warn!(
            "Skipped {}/{} pages during extraction",
            extraction.pages_skipped, extraction.pages_total
        );
    }

    if extraction.text.trim().is_empty() {
        return Err(ExtractError::NoTextFound);
    }
    Ok(extraction)
}

fn extract_pdf(bytes: &[u8]) -> Extraction {
    let doc = match Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("PDF read error: {e}");
            return Extraction {
                text: String::new(),
                pages_total: 0,
                pages_skipped: 0,
            };
        }
    };

    let pages = doc.get_pages().into_keys().map(|page_num| {
        doc.extract_text(&[page_num]).map_err(|e| {
            debug!("Page {page_num} unreadable: {e}");
            e
        })
    });
    fold_pages(pages)
}

/// Concatenate page texts with separating spaces, counting failed pages.
pub fn fold_pages<I, E>(pages: I) -> Extraction
where
    I: IntoIterator<Item = Result<String, E>>,
{
    pages.into_iter().fold(
        Extraction {
            text: String::new(),
            pages_total: 0,
            pages_skipped: 0,
        },
        |mut acc, page| {
            acc.pages_total += 1;
            match page {
                Ok(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        acc.text.push_str(text);
                        acc.text.push(' ');
                    }
                }
                Err(_) => acc.pages_skipped += 1,
            }
            acc
        },
    )
}

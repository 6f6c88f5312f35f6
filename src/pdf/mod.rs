//! PDF document access behind a small capability surface.
//!
//! The text layer of real-world PDFs is unreliable, so everything downstream
//! consumes the [`PageSource`] trait instead of a concrete parser: per-page
//! text for the cheap regex passes, positioned text blocks for layouts where
//! headings and body text come out of document order. Tests stub the trait
//! without touching a real file.

mod abstracts;
mod doi;

pub use abstracts::extract_abstract;
pub use doi::{extract_doi_candidates, scan_dois};

use std::path::Path;

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};

use crate::errors::MetaError;

/// How many leading pages are scanned for DOIs and abstracts.
pub const DEFAULT_SCAN_PAGES: usize = 2;

/// One positioned run of text on a page, in PDF user-space coordinates
/// (y grows upward).
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub x: f32,
    pub y: f32,
    pub text: String,
}

/// Read access to a document's text layer. Methods are best-effort: a page
/// that cannot be decoded yields empty output, never an error. Opening the
/// document is the only fallible step.
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Raw text of one page; empty when the page yields nothing.
    fn page_text(&self, index: usize) -> String;

    /// Positioned text blocks of one page, in content-stream order.
    fn text_blocks(&self, index: usize) -> Vec<TextBlock>;
}

/// [`PageSource`] backed by `lopdf`.
#[derive(Debug)]
pub struct LopdfSource {
    doc: Document,
    pages: Vec<(u32, ObjectId)>,
}

impl LopdfSource {
    /// Open a PDF from disk. Fails with [`MetaError::PdfParseFailed`] when the
    /// document cannot be opened or decoded.
    pub fn open(path: &Path) -> Result<Self, MetaError> {
        let doc = Document::load(path).map_err(|err| {
            MetaError::PdfParseFailed(format!("failed to read {}: {err}", path.display()))
        })?;
        let pages = doc.get_pages().into_iter().collect();
        Ok(Self { doc, pages })
    }
}

impl PageSource for LopdfSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> String {
        let Some((number, _)) = self.pages.get(index) else {
            return String::new();
        };
        match self.doc.extract_text(&[*number]) {
            Ok(text) => text,
            Err(err) => {
                tracing::debug!("text extraction failed for page {number}: {err}");
                String::new()
            }
        }
    }

    fn text_blocks(&self, index: usize) -> Vec<TextBlock> {
        let Some((number, id)) = self.pages.get(index) else {
            return Vec::new();
        };
        let data = match self.doc.get_page_content(*id) {
            Ok(data) => data,
            Err(err) => {
                tracing::debug!("no content stream for page {number}: {err}");
                return Vec::new();
            }
        };
        match Content::decode(&data) {
            Ok(content) => blocks_from_content(&content),
            Err(err) => {
                tracing::debug!("content decode failed for page {number}: {err}");
                Vec::new()
            }
        }
    }
}

/// Walk a page's content stream and group shown text into blocks, one per
/// BT..ET text object. Tracks only the translation part of the text matrix,
/// which is enough to order blocks by position.
fn blocks_from_content(content: &Content) -> Vec<TextBlock> {
    fn flush(current: &mut Option<TextBlock>, blocks: &mut Vec<TextBlock>) {
        if let Some(block) = current.take() {
            if !block.text.trim().is_empty() {
                blocks.push(block);
            }
        }
    }

    let mut blocks: Vec<TextBlock> = Vec::new();
    let mut cursor = (0.0f32, 0.0f32);
    let mut current: Option<TextBlock> = None;

    for op in &content.operations {
        match op.operator.as_str() {
            "BT" => {
                flush(&mut current, &mut blocks);
                cursor = (0.0, 0.0);
            }
            "ET" => flush(&mut current, &mut blocks),
            "Tm" => {
                if op.operands.len() >= 6 {
                    if let (Some(x), Some(y)) = (number(&op.operands[4]), number(&op.operands[5])) {
                        cursor = (x, y);
                    }
                }
            }
            "Td" | "TD" => {
                if op.operands.len() >= 2 {
                    if let (Some(dx), Some(dy)) = (number(&op.operands[0]), number(&op.operands[1]))
                    {
                        cursor.0 += dx;
                        cursor.1 += dy;
                    }
                }
                line_break(&mut current);
            }
            "T*" => line_break(&mut current),
            "Tj" | "'" | "\"" => {
                for operand in &op.operands {
                    if let Object::String(bytes, _) = operand {
                        append_text(&mut current, cursor, &decode_text_string(bytes));
                    }
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    for item in items {
                        if let Object::String(bytes, _) = item {
                            append_text(&mut current, cursor, &decode_text_string(bytes));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    flush(&mut current, &mut blocks);
    blocks
}

fn append_text(current: &mut Option<TextBlock>, cursor: (f32, f32), text: &str) {
    match current {
        Some(block) => block.text.push_str(text),
        None => {
            *current = Some(TextBlock {
                x: cursor.0,
                y: cursor.1,
                text: text.to_string(),
            });
        }
    }
}

fn line_break(current: &mut Option<TextBlock>) {
    if let Some(block) = current {
        if !block.text.ends_with(' ') {
            block.text.push(' ');
        }
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

/// PDF text strings are either UTF-16BE (with a BOM) or a byte encoding we
/// approximate as Latin-1.
fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&byte| byte as char).collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{PageSource, TextBlock};

    /// Canned [`PageSource`] for tests.
    pub struct StubSource {
        pub pages: Vec<String>,
        pub blocks: Vec<Vec<TextBlock>>,
    }

    impl StubSource {
        pub fn from_pages(pages: &[&str]) -> Self {
            Self {
                pages: pages.iter().map(|page| page.to_string()).collect(),
                blocks: Vec::new(),
            }
        }

        pub fn with_blocks(mut self, blocks: Vec<Vec<TextBlock>>) -> Self {
            self.blocks = blocks;
            self
        }
    }

    impl PageSource for StubSource {
        fn page_count(&self) -> usize {
            self.pages.len().max(self.blocks.len())
        }

        fn page_text(&self, index: usize) -> String {
            self.pages.get(index).cloned().unwrap_or_default()
        }

        fn text_blocks(&self, index: usize) -> Vec<TextBlock> {
            self.blocks.get(index).cloned().unwrap_or_default()
        }
    }
}

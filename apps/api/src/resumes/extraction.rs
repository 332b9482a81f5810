//! Plain-text extraction from uploaded resume files.

use std::io::{Cursor, Read};

use thiserror::Error;

use crate::models::resume::FileType;

const DOCX_BODY_PART: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("could not read document: {0}")]
    ExtractionFailed(String),
}

pub trait TextExtractor: Send + Sync {
    /// Returns the document's text. CPU-bound; callers run it off the async workers.
    fn extract(&self, bytes: &[u8], file_type: FileType) -> Result<String, ExtractError>;
}

/// Reads PDFs with `pdf-extract` and DOCX bodies straight out of the OOXML package.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl TextExtractor for DocumentExtractor {
    fn extract(&self, bytes: &[u8], file_type: FileType) -> Result<String, ExtractError> {
        let text = match file_type {
            FileType::Pdf => extract_pdf(bytes)?,
            FileType::Docx => extract_docx(bytes)?,
        };

        let text = normalize_whitespace(&text);
        if text.is_empty() {
            return Err(ExtractError::ExtractionFailed(
                "document contains no extractable text".to_string(),
            ));
        }
        Ok(text)
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| ExtractError::ExtractionFailed("unreadable PDF".to_string()))?
        .map_err(|e| ExtractError::ExtractionFailed(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::ExtractionFailed(format!("not a DOCX package: {e}")))?;
    let mut part = archive
        .by_name(DOCX_BODY_PART)
        .map_err(|e| ExtractError::ExtractionFailed(format!("missing {DOCX_BODY_PART}: {e}")))?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| ExtractError::ExtractionFailed(e.to_string()))?;
    Ok(docx_xml_to_text(&xml))
}

/// Drops WordprocessingML markup, keeping paragraph breaks, tabs and text runs.
fn docx_xml_to_text(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len() / 4);
    let mut rest = xml;

    while let Some(start) = rest.find('<') {
        out.push_str(&decode_entities(&rest[..start]));
        let Some(end) = rest[start..].find('>') else {
            break;
        };
        let tag = &rest[start + 1..start + end];
        match tag_name(tag) {
            "/w:p" => out.push('\n'),
            "w:tab" => out.push('\t'),
            "w:br" | "w:cr" => out.push('\n'),
            _ => {}
        }
        rest = &rest[start + end + 1..];
    }
    out
}

fn tag_name(tag: &str) -> &str {
    tag.split(|c: char| c.is_whitespace() || (c == '/' && !tag.starts_with('/')))
        .next()
        .unwrap_or_default()
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Trims each line and collapses runs of blank lines to one.
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim_end) {
        if line.trim().is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(if line.trim().is_empty() { "" } else { line });
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

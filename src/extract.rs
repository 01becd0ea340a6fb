//! Plain-text extraction for uploaded documents.
//!
//! | Type | Method |
//! |------|--------|
//! | pdf | `pdf-extract` |
//! | docx | `word/document.xml` from the ZIP, `w:t` runs, paragraphs joined by a blank line |
//! | txt, md | UTF-8 as-is (Markdown is not rendered) |
//!
//! Failures are validation errors: the upload itself is unreadable.

use std::io::Read;

use prompt_studio_core::models::DocumentType;
use prompt_studio_core::{Result, StudioError};
use quick_xml::events::Event;

/// Maximum decompressed bytes read from `word/document.xml`.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

pub fn extract_text(bytes: &[u8], document_type: DocumentType) -> Result<String> {
    match document_type {
        DocumentType::Pdf => extract_pdf(bytes),
        DocumentType::Docx => extract_docx(bytes),
        DocumentType::Txt | DocumentType::Markdown => String::from_utf8(bytes.to_vec())
            .map_err(|e| StudioError::Validation(format!("file is not valid UTF-8: {}", e))),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| StudioError::Validation(format!("PDF extraction failed: {}", e)))
}

fn docx_err(msg: impl std::fmt::Display) -> StudioError {
    StudioError::Validation(format!("DOCX extraction failed: {}", msg))
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(docx_err)?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| docx_err("word/document.xml not found"))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(docx_err)?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(docx_err("word/document.xml exceeds size limit"));
    }

    paragraphs_from_document_xml(&xml)
}

/// Concatenate `w:t` runs per `w:p`; non-empty paragraphs are joined by `\n\n`.
fn paragraphs_from_document_xml(xml: &[u8]) -> Result<String> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = current.trim();
                    if !para.is_empty() {
                        paragraphs.push(para.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::Text(t)) if in_text => {
                current.push_str(&t.unescape().map_err(docx_err)?);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(docx_err(e)),
            _ => {}
        }
        buf.clear();
    }

    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }
    Ok(paragraphs.join("\n\n"))
}

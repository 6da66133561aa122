//! Multi-format text extraction for ingested files.
//!
//! Dispatch is by file extension, not sniffed content-type — the same
//! tagged-variant approach the chunker and blob store use elsewhere in this
//! crate. Extraction never panics and never propagates to callers as a hard
//! failure: [`extract_text`] always returns a `String`, empty when nothing
//! could be extracted, so the ingestion pipeline can treat "no usable text"
//! uniformly regardless of which format failed.

use std::io::Read;

use crate::config::OcrConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    PlainText,
    Image,
    Unsupported,
}

pub fn classify(file_name: &str) -> DocumentKind {
    let ext = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => DocumentKind::Pdf,
        "docx" | "doc" => DocumentKind::Docx,
        "pptx" | "ppt" => DocumentKind::Pptx,
        "xlsx" | "xlsm" | "xls" => DocumentKind::Xlsx,
        "txt" | "md" | "log" | "csv" => DocumentKind::PlainText,
        "jpg" | "jpeg" | "png" | "bmp" | "tiff" | "gif" => DocumentKind::Image,
        _ => DocumentKind::Unsupported,
    }
}

/// Maximum sheets to process in a spreadsheet.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug)]
pub enum ExtractError {
    Unsupported(String),
    Pdf(String),
    Ooxml(String),
    Xlsx(String),
    Ocr(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Unsupported(ext) => write!(f, "unsupported file type: {ext}"),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {e}"),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {e}"),
            ExtractError::Xlsx(e) => write!(f, "XLSX extraction failed: {e}"),
            ExtractError::Ocr(e) => write!(f, "OCR failed: {e}"),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts text, never failing outward: logs and returns an empty string
/// when the underlying format-specific extractor errors.
pub fn extract_text(bytes: &[u8], file_name: &str, ocr: &OcrConfig) -> String {
    let kind = classify(file_name);
    let result = match kind {
        DocumentKind::Pdf => extract_pdf(bytes, ocr),
        DocumentKind::Docx => extract_docx(bytes),
        DocumentKind::Pptx => extract_pptx(bytes),
        DocumentKind::Xlsx => extract_xlsx(bytes),
        DocumentKind::PlainText => Ok(decode_plain_text(bytes)),
        DocumentKind::Image => extract_image_ocr(bytes, ocr),
        DocumentKind::Unsupported => Err(ExtractError::Unsupported(file_name.to_string())),
    };

    match result {
        Ok(text) => text,
        Err(e) => {
            log::warn!("extraction failed for {file_name}: {e}");
            String::new()
        }
    }
}

fn decode_plain_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn extract_pdf(bytes: &[u8], ocr: &OcrConfig) -> Result<String, ExtractError> {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) if !text.trim().is_empty() => Ok(text),
        _ => extract_pdf_via_ocr(bytes, ocr),
    }
}

#[cfg(feature = "ocr")]
fn extract_pdf_via_ocr(bytes: &[u8], ocr: &OcrConfig) -> Result<String, ExtractError> {
    use pdfium_render::prelude::*;

    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let render_config = PdfRenderConfig::new().scale_page_by_factor(ocr.pdf_render_scale);
    let mut out = String::new();
    for page in document.pages().iter() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?;
        let image = bitmap.as_image();
        let mut png_bytes: Vec<u8> = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut png_bytes),
                image::ImageFormat::Png,
            )
            .map_err(|e| ExtractError::Pdf(e.to_string()))?;
        let page_text = ocr_image_bytes(&png_bytes, ocr)?;
        if !page_text.trim().is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&page_text);
        }
    }
    Ok(out)
}

#[cfg(not(feature = "ocr"))]
fn extract_pdf_via_ocr(_bytes: &[u8], _ocr: &OcrConfig) -> Result<String, ExtractError> {
    log::warn!("PDF has no structured text and the `ocr` feature is disabled; returning empty text");
    Ok(String::new())
}

fn extract_image_ocr(bytes: &[u8], ocr: &OcrConfig) -> Result<String, ExtractError> {
    ocr_image_bytes(bytes, ocr)
}

#[cfg(feature = "ocr")]
fn ocr_image_bytes(bytes: &[u8], ocr: &OcrConfig) -> Result<String, ExtractError> {
    use leptess::LepTess;

    let mut lt = LepTess::new(None, &ocr.lang).map_err(|e| ExtractError::Ocr(e.to_string()))?;
    lt.set_image_from_mem(bytes)
        .map_err(|e| ExtractError::Ocr(e.to_string()))?;
    lt.get_utf8_text().map_err(|e| ExtractError::Ocr(e.to_string()))
}

#[cfg(not(feature = "ocr"))]
fn ocr_image_bytes(_bytes: &[u8], _ocr: &OcrConfig) -> Result<String, ExtractError> {
    log::warn!("OCR requested but the `ocr` feature is disabled; returning empty text");
    Ok(String::new())
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {name} exceeds size limit ({max_bytes} bytes)"
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    extract_w_t_elements(&doc_xml)
}

fn extract_w_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    let mut out = String::new();
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = extract_a_t_elements(&xml)?;
        if !out.is_empty() && !text.is_empty() {
            out.push(' ');
        }
        out.push_str(&text);
    }
    Ok(out)
}

fn extract_a_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Spreadsheet extraction via `calamine`. Rows are serialized as ordered
/// header/value pairs once a header-looking row (>= 2 non-empty cells) is
/// seen; prior to that, rows are joined as free-form lines.
fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    use calamine::{open_workbook_from_rs, Reader, Xlsx};

    let cursor = std::io::Cursor::new(bytes);
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(cursor).map_err(|e| ExtractError::Xlsx(e.to_string()))?;

    let mut out = String::new();
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    for sheet_name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let range = match workbook.worksheet_range(&sheet_name) {
            Ok(r) => r,
            Err(_) => continue,
        };

        let mut header: Option<Vec<String>> = None;
        for row in range.rows() {
            let cells: Vec<String> = row
                .iter()
                .map(|c| c.to_string())
                .filter(|s| !s.trim().is_empty())
                .collect();
            if cells.is_empty() {
                continue;
            }
            if header.is_none() && cells.len() >= 2 {
                header = Some(cells.clone());
                continue;
            }
            let line = match &header {
                Some(h) => row
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| !v.to_string().trim().is_empty())
                    .map(|(i, v)| {
                        let key = h.get(i).cloned().unwrap_or_else(|| format!("col{i}"));
                        format!("{key}: {v}")
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
                None => cells.join(" "),
            };
            if !line.is_empty() {
                out.push_str(&line);
                out.push('\n');
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_extension() {
        assert_eq!(classify("report.PDF"), DocumentKind::Pdf);
        assert_eq!(classify("notes.docx"), DocumentKind::Docx);
        assert_eq!(classify("sheet.xlsx"), DocumentKind::Xlsx);
        assert_eq!(classify("readme.txt"), DocumentKind::PlainText);
        assert_eq!(classify("scan.png"), DocumentKind::Image);
        assert_eq!(classify("archive.zip"), DocumentKind::Unsupported);
    }

    #[test]
    fn unsupported_extension_yields_empty_text() {
        let ocr = OcrConfig::default();
        let text = extract_text(b"anything", "archive.zip", &ocr);
        assert!(text.is_empty());
    }

    #[test]
    fn invalid_pdf_bytes_yield_empty_text_not_panic() {
        let ocr = OcrConfig::default();
        let text = extract_text(b"not a pdf", "file.pdf", &ocr);
        assert!(text.is_empty());
    }

    #[test]
    fn invalid_zip_yields_empty_text_for_docx() {
        let ocr = OcrConfig::default();
        let text = extract_text(b"not a zip", "file.docx", &ocr);
        assert!(text.is_empty());
    }

    #[test]
    fn plain_text_round_trips() {
        let ocr = OcrConfig::default();
        let text = extract_text("hello world".as_bytes(), "note.txt", &ocr);
        assert_eq!(text, "hello world");
    }

    #[test]
    fn plain_text_falls_back_to_latin1_on_invalid_utf8() {
        let ocr = OcrConfig::default();
        let bytes = vec![0xE9, 0x41]; // invalid UTF-8 lead byte
        let text = extract_text(&bytes, "note.txt", &ocr);
        assert!(!text.is_empty());
    }
}

//! Multi-format text extraction for uploaded documents.
//!
//! Dispatches on the declared content type and file extension: PDF, DOCX,
//! XLSX, HTML, and plain text each have a dedicated extractor. Unknown
//! types fall back to a lossy UTF-8 decode instead of failing — partial
//! extraction is more useful than none for search.

use std::io::Read;

use crate::models::DocumentFile;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum worksheets processed in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells collected per worksheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;

/// Extraction failure. Fatal for the ingestion that triggered it — nothing
/// downstream is possible without text.
#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    Ooxml(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Pdf,
    Docx,
    Xlsx,
    Html,
    Text,
    Unknown,
}

fn detect_format(name: &str, content_type: Option<&str>) -> FileFormat {
    let name = name.to_ascii_lowercase();
    let ct = content_type.unwrap_or("").to_ascii_lowercase();

    if ct == MIME_PDF || ct.contains("pdf") || name.ends_with(".pdf") {
        FileFormat::Pdf
    } else if ct == MIME_DOCX || name.ends_with(".docx") {
        FileFormat::Docx
    } else if ct == MIME_XLSX || name.ends_with(".xlsx") {
        FileFormat::Xlsx
    } else if ct.contains("html") || name.ends_with(".html") || name.ends_with(".htm") {
        FileFormat::Html
    } else if ct.starts_with("text/")
        || name.ends_with(".txt")
        || name.ends_with(".md")
        || name.ends_with(".csv")
    {
        FileFormat::Text
    } else {
        FileFormat::Unknown
    }
}

/// Extract plain text from a file payload.
pub fn extract_text(file: &DocumentFile) -> Result<String, ExtractError> {
    match detect_format(&file.name, file.content_type.as_deref()) {
        FileFormat::Pdf => extract_pdf(&file.bytes),
        FileFormat::Docx => extract_docx(&file.bytes),
        FileFormat::Xlsx => extract_xlsx(&file.bytes),
        FileFormat::Html => Ok(strip_html(&String::from_utf8_lossy(&file.bytes))),
        FileFormat::Text | FileFormat::Unknown => {
            Ok(String::from_utf8_lossy(&file.bytes).into_owned())
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

// ============ OOXML (zip + xml) ============

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<std::io::Cursor<&[u8]>>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit",
            name
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    if archive.by_name("word/document.xml").is_err() {
        return Err(ExtractError::Ooxml(
            "word/document.xml not found".to_string(),
        ));
    }
    let xml = read_entry_bounded(&mut archive, "word/document.xml")?;
    collect_docx_runs(&xml)
}

/// Walk `word/document.xml`, collecting `<w:t>` run text. Paragraph ends
/// (`</w:p>`) become newlines so words do not glue across paragraphs.
fn collect_docx_runs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if in_text => {
                out.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !out.ends_with('\n') && !out.is_empty() {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim().to_string())
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared = read_shared_strings(&mut archive)?;

    let mut sheet_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    sheet_names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut out = String::new();
    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_entry_bounded(&mut archive, &name)?;
        let cells = collect_sheet_cells(&xml, &shared)?;
        if !out.is_empty() && !cells.is_empty() {
            out.push('\n');
        }
        out.push_str(&cells);
    }
    Ok(out)
}

/// Shared-strings table is optional; a workbook without one is valid.
fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_entry_bounded(archive, "xl/sharedStrings.xml")?;

    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut in_entry = false;
    let mut in_text = false;
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_entry = true;
                    current.clear();
                }
                b"t" if in_entry => in_text = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(t)) if in_text => {
                current.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => {
                    in_entry = false;
                    strings.push(std::mem::take(&mut current));
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Collect cell values from one worksheet: shared-string references are
/// resolved through the table; other `<v>` values (numbers, inline) are
/// taken verbatim.
fn collect_sheet_cells(xml: &[u8], shared: &[String]) -> Result<String, ExtractError> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut is_shared = false;

    loop {
        if cells.len() >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    is_shared = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                }
                b"v" => in_value = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(t)) if in_value => {
                let raw = t.unescape().unwrap_or_default();
                let value = raw.trim();
                if !value.is_empty() {
                    if is_shared {
                        if let Ok(idx) = value.parse::<usize>() {
                            if let Some(s) = shared.get(idx) {
                                cells.push(s.clone());
                            }
                        }
                    } else {
                        cells.push(value.to_string());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"c" => is_shared = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

// ============ HTML ============

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "table", "tr", "h1", "h2", "h3", "h4", "h5", "h6",
    "section", "article", "header", "footer", "blockquote", "pre",
];

/// Strip tags from HTML, dropping `<script>`/`<style>` bodies and turning
/// block-level boundaries into newlines. Lenient: malformed markup never
/// fails, it just degrades.
fn strip_html(html: &str) -> String {
    let mut out = String::new();
    let mut rest = html;

    loop {
        match rest.find('<') {
            None => {
                push_decoded(&mut out, rest);
                break;
            }
            Some(pos) => {
                push_decoded(&mut out, &rest[..pos]);
                let after = &rest[pos..];
                let Some(end) = after.find('>') else {
                    // Unterminated tag; drop the remainder.
                    break;
                };
                let tag = &after[1..end];
                let closing = tag.starts_with('/');
                let name: String = tag
                    .trim_start_matches('/')
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_ascii_lowercase();
                rest = &after[end + 1..];

                if !closing && (name == "script" || name == "style") {
                    let close_marker = format!("</{}", name);
                    let lower = rest.to_ascii_lowercase();
                    match lower.find(&close_marker) {
                        Some(cpos) => {
                            let after_close = &rest[cpos..];
                            rest = match after_close.find('>') {
                                Some(p) => &after_close[p + 1..],
                                None => "",
                            };
                        }
                        None => rest = "",
                    }
                } else if BLOCK_TAGS.contains(&name.as_str()) {
                    out.push('\n');
                }
            }
        }
    }

    // Collapse whitespace runs, keeping block-boundary newlines.
    let mut lines: Vec<String> = Vec::new();
    for line in out.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}

fn push_decoded(out: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    out.push_str(&decoded);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file(name: &str, content_type: Option<&str>, bytes: &[u8]) -> DocumentFile {
        DocumentFile {
            name: name.to_string(),
            content_type: content_type.map(|s| s.to_string()),
            bytes: bytes.to_vec(),
        }
    }

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let body: String = paragraphs
                .iter()
                .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
                .collect();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(&file("doc.pdf", Some(MIME_PDF), b"not a pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(&file("doc.docx", Some(MIME_DOCX), b"not a zip")).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn docx_extracts_runs_with_paragraph_breaks() {
        let bytes = docx_with_paragraphs(&["First paragraph.", "Second paragraph."]);
        let text = extract_text(&file("doc.docx", None, &bytes)).unwrap();
        assert!(text.contains("First paragraph."));
        assert!(text.contains("Second paragraph."));
        assert!(
            text.contains('\n'),
            "paragraphs should be newline-separated: {:?}",
            text
        );
    }

    #[test]
    fn zip_without_document_xml_is_an_error() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        let err = extract_text(&file("doc.docx", None, &buf)).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text(&file("notes.txt", Some("text/plain"), b"hello world")).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn unknown_type_decodes_lossily_instead_of_failing() {
        let bytes = [b'o', b'k', 0xFF, 0xFE, b'!'];
        let text = extract_text(&file("blob.bin", Some("application/octet-stream"), &bytes)).unwrap();
        assert!(text.starts_with("ok"));
        assert!(text.ends_with('!'));
    }

    #[test]
    fn html_is_stripped_to_text() {
        let html = b"<html><head><style>body { color: red; }</style>\
            <script>alert('x');</script></head>\
            <body><h1>Title</h1><p>Hello &amp; welcome.</p></body></html>";
        let text = extract_text(&file("page.html", Some("text/html"), html)).unwrap();
        assert!(text.contains("Title"));
        assert!(text.contains("Hello & welcome."));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn html_malformed_degrades_without_error() {
        let text = extract_text(&file("page.html", None, b"<p>unclosed <b>bold")).unwrap();
        assert!(text.contains("unclosed"));
        assert!(text.contains("bold"));
    }

    #[test]
    fn xlsx_resolves_shared_strings() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let opts = zip::write::SimpleFileOptions::default();
            zip.start_file("xl/sharedStrings.xml", opts).unwrap();
            zip.write_all(
                b"<sst><si><t>alpha</t></si><si><t>beta</t></si></sst>",
            )
            .unwrap();
            zip.start_file("xl/worksheets/sheet1.xml", opts).unwrap();
            zip.write_all(
                b"<worksheet><sheetData><row>\
                  <c t=\"s\"><v>0</v></c>\
                  <c t=\"s\"><v>1</v></c>\
                  <c><v>42</v></c>\
                  </row></sheetData></worksheet>",
            )
            .unwrap();
            zip.finish().unwrap();
        }
        let text = extract_text(&file("sheet.xlsx", None, &buf)).unwrap();
        assert!(text.contains("alpha"));
        assert!(text.contains("beta"));
        assert!(text.contains("42"));
    }
}

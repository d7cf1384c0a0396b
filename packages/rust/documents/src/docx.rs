//! Format Converter: PDF to an editable Word document.
//!
//! Each text line of a source page becomes a paragraph that keeps the line's
//! font size, its indentation from the page's leftmost text, and the vertical
//! gap above it. Pages are separated by hard page breaks. Pages whose text
//! cannot be positioned fall back to plain paragraphs.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use lopdf::Document;
use quick_xml::escape::escape;
use tracing::{debug, instrument};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use tenderflow_shared::{Result, TenderflowError};

use crate::layout::{TextLine, page_lines};

/// Converts a source document into an editable format.
pub trait FormatConverter: Send + Sync {
    /// File extension (without the dot) of the produced documents.
    fn extension(&self) -> &str;

    /// Convert `source` into `dest`, creating parent directories as needed.
    fn convert(&self, source: &Path, dest: &Path) -> Result<()>;
}

// ---------------------------------------------------------------------------
// DOCX
// ---------------------------------------------------------------------------

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;

const DOCUMENT_TAIL: &str = r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr></w:body></w:document>"#;

const PAGE_BREAK: &str = r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#;

/// Twentieths of a point, the unit of WordprocessingML indents and spacing.
const TWIPS_PER_POINT: f32 = 20.0;

/// Line height assumed for a run of the given font size.
const LINE_HEIGHT_FACTOR: f32 = 1.2;

/// PDF to DOCX converter backed by `lopdf` content-stream reading.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxConverter;

impl DocxConverter {
    pub fn new() -> Self {
        Self
    }
}

impl FormatConverter for DocxConverter {
    fn extension(&self) -> &str {
        "docx"
    }

    #[instrument(skip_all, fields(source = %source.display(), dest = %dest.display()))]
    fn convert(&self, source: &Path, dest: &Path) -> Result<()> {
        let doc = crate::pdf::load(source)
            .map_err(|e| TenderflowError::Conversion(e.to_string()))?;
        let pages = page_bodies(&doc);
        let body = document_xml(&pages);

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TenderflowError::io(parent, e))?;
        }
        write_package(dest, &body)?;

        debug!(pages = pages.len(), bytes = body.len(), "converted to docx");
        Ok(())
    }
}

/// What is known about one page's text.
#[derive(Debug, Clone, PartialEq)]
enum PageBody {
    Positioned(Vec<TextLine>),
    Plain(String),
}

fn page_bodies(doc: &Document) -> Vec<PageBody> {
    doc.get_pages()
        .into_iter()
        .map(|(number, page_id)| match page_lines(doc, page_id) {
            Some(lines) if !lines.is_empty() => PageBody::Positioned(lines),
            _ => PageBody::Plain(doc.extract_text(&[number]).unwrap_or_default()),
        })
        .collect()
}

/// Render `word/document.xml` for the given pages.
fn document_xml(pages: &[PageBody]) -> String {
    let mut xml = String::from(DOCUMENT_HEAD);
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            xml.push_str(PAGE_BREAK);
        }
        match page {
            PageBody::Positioned(lines) => push_positioned(&mut xml, lines),
            PageBody::Plain(text) => push_plain(&mut xml, text),
        }
    }
    xml.push_str(DOCUMENT_TAIL);
    xml
}

fn push_positioned(xml: &mut String, lines: &[TextLine]) {
    let left = lines.iter().map(|l| l.x).fold(f32::INFINITY, f32::min);
    let mut previous: Option<&TextLine> = None;
    for line in lines {
        let text = xml_safe(line.text.trim_end());
        if text.is_empty() {
            continue;
        }
        // Baseline distance beyond a normal line height becomes space before.
        let gap = previous.map_or(0.0, |p| p.y - line.y - line.size * LINE_HEIGHT_FACTOR);
        let before = twips(gap);
        let indent = twips(line.x - left);
        let half_points = (line.size * 2.0).round().max(1.0) as u32;

        xml.push_str(&format!(
            r#"<w:p><w:pPr><w:spacing w:before="{before}" w:after="0"/><w:ind w:left="{indent}"/></w:pPr><w:r><w:rPr><w:sz w:val="{half_points}"/></w:rPr><w:t xml:space="preserve">"#
        ));
        xml.push_str(&escape(text.as_str()));
        xml.push_str("</w:t></w:r></w:p>");
        previous = Some(line);
    }
}

fn push_plain(xml: &mut String, text: &str) {
    for line in text.lines() {
        let line = xml_safe(line.trim_end());
        if line.is_empty() {
            xml.push_str("<w:p/>");
        } else {
            xml.push_str(r#"<w:p><w:r><w:t xml:space="preserve">"#);
            xml.push_str(&escape(line.as_str()));
            xml.push_str("</w:t></w:r></w:p>");
        }
    }
}

/// Non-negative points to whole twips.
fn twips(points: f32) -> u32 {
    if points.is_finite() && points > 0.0 {
        (points * TWIPS_PER_POINT).round() as u32
    } else {
        0
    }
}

/// Drop characters XML 1.0 cannot carry.
fn xml_safe(s: &str) -> String {
    s.chars()
        .filter(|c| matches!(c, '\t' | '\n' | '\r') || !c.is_control())
        .collect()
}

fn write_package(dest: &Path, document: &str) -> Result<()> {
    let file = File::create(dest).map_err(|e| TenderflowError::io(dest, e))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("word/document.xml", document),
    ];
    for (name, content) in parts {
        zip.start_file(name, options)
            .map_err(|e| TenderflowError::Conversion(format!("zip entry {name}: {e}")))?;
        zip.write_all(content.as_bytes())
            .map_err(|e| TenderflowError::io(dest, e))?;
    }
    zip.finish()
        .map_err(|e| TenderflowError::Conversion(format!("zip finalize: {e}")))?;
    Ok(())
}

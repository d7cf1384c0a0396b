//! In-memory PDF builder for tests.

use lopdf::dictionary;
use lopdf::{Document, Object, Stream};

/// Build a PDF with one page per entry; each `\n`-separated line becomes its own text block.
///
/// An empty entry produces a page without any text operators.
pub fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let streams: Vec<String> = pages
        .iter()
        .map(|text| {
            text.lines()
                .enumerate()
                .map(|(i, line)| {
                    let y = 760 - (i as i64 * 16);
                    format!("BT /F1 12 Tf 72 {y} Td ({}) Tj ET\n", escape_literal(line))
                })
                .collect()
        })
        .collect();
    let streams: Vec<&str> = streams.iter().map(String::as_str).collect();
    build_pdf_from_content(&streams)
}

/// Build a PDF whose pages carry the given raw content streams, with Helvetica as `/F1`.
pub fn build_pdf_from_content(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for content in pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("in-memory PDF serialization");
    buf
}

fn escape_literal(line: &str) -> String {
    line.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

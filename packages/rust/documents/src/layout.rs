//! Positioned text lines read from a page's content stream.
//!
//! Tracks just enough of the text state (`Tf`, `TL`, `Td`/`TD`, `Tm`, `T*`)
//! to know where each shown string starts and how large it is. Glyph widths
//! are not resolved, so strings on one baseline are ordered by start x only.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId};
use tracing::debug;

/// Baselines closer than this (in points) belong to the same line.
const SAME_LINE_TOLERANCE: f32 = 2.0;

/// TJ adjustments below this (thousandths of an em) read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

/// One visual line of text on a page, in PDF user-space points.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TextLine {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub text: String,
}

/// Lines on the page, top to bottom.
///
/// `None` when the content cannot be decoded, or uses multi-byte font
/// encodings this reader does not map; callers fall back to plain text.
pub(crate) fn page_lines(doc: &Document, page_id: ObjectId) -> Option<Vec<TextLine>> {
    let data = doc.get_page_content(page_id).ok()?;
    let content = match Content::decode(&data) {
        Ok(content) => content,
        Err(e) => {
            debug!(?page_id, error = %e, "content stream not decodable");
            return None;
        }
    };
    let fragments = TextState::default().run(&content.operations)?;
    Some(group_lines(fragments))
}

// ---------------------------------------------------------------------------
// Text state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Self = Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translated(self, tx: f32, ty: f32) -> Self {
        let [a, b, c, d, e, f] = self.0;
        Self([a, b, c, d, e + tx * a + ty * c, f + tx * b + ty * d])
    }

    fn vertical_scale(self) -> f32 {
        let [_, b, _, d, _, _] = self.0;
        let scale = b.hypot(d);
        if scale > 0.0 { scale } else { 1.0 }
    }
}

struct TextState {
    font_size: f32,
    leading: f32,
    line_matrix: Matrix,
    matrix: Matrix,
    fragments: Vec<TextLine>,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            leading: 0.0,
            line_matrix: Matrix::IDENTITY,
            matrix: Matrix::IDENTITY,
            fragments: Vec::new(),
        }
    }
}

impl TextState {
    fn run(mut self, operations: &[Operation]) -> Option<Vec<TextLine>> {
        for op in operations {
            let nums = || op.operands.iter().filter_map(|o| o.as_float().ok());
            match op.operator.as_str() {
                "BT" => {
                    self.line_matrix = Matrix::IDENTITY;
                    self.matrix = Matrix::IDENTITY;
                }
                "Tf" => {
                    if let Some(size) = op.operands.get(1).and_then(|o| o.as_float().ok()) {
                        self.font_size = size.abs();
                    }
                }
                "TL" => {
                    if let Some(leading) = nums().next() {
                        self.leading = leading;
                    }
                }
                "Td" | "TD" => {
                    let v: Vec<f32> = nums().collect();
                    if let [tx, ty] = v[..] {
                        if op.operator == "TD" {
                            self.leading = -ty;
                        }
                        self.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    let v: Vec<f32> = nums().collect();
                    if let Ok(m) = <[f32; 6]>::try_from(v) {
                        self.line_matrix = Matrix(m);
                        self.matrix = self.line_matrix;
                    }
                }
                "T*" => self.next_line(),
                "Tj" => self.show(op.operands.first())?,
                "'" => {
                    self.next_line();
                    self.show(op.operands.first())?;
                }
                "\"" => {
                    self.next_line();
                    self.show(op.operands.get(2))?;
                }
                "TJ" => self.show_array(op.operands.first())?,
                _ => {}
            }
        }
        Some(self.fragments)
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = self.line_matrix.translated(tx, ty);
        self.matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn show(&mut self, operand: Option<&Object>) -> Option<()> {
        if let Some(Object::String(bytes, _)) = operand {
            let text = decode_bytes(bytes)?;
            self.push(text);
        }
        Some(())
    }

    fn show_array(&mut self, operand: Option<&Object>) -> Option<()> {
        let Some(Object::Array(items)) = operand else {
            return Some(());
        };
        let mut text = String::new();
        for item in items {
            match item {
                Object::String(bytes, _) => text.push_str(&decode_bytes(bytes)?),
                other => {
                    if other.as_float().is_ok_and(|adj| adj < TJ_SPACE_THRESHOLD) {
                        text.push(' ');
                    }
                }
            }
        }
        self.push(text);
        Some(())
    }

    fn push(&mut self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        let [_, _, _, _, x, y] = self.matrix.0;
        self.fragments.push(TextLine {
            x,
            y,
            size: self.font_size * self.matrix.vertical_scale(),
            text,
        });
    }
}

/// Decode a shown string: UTF-16BE with a BOM, otherwise one byte per character.
///
/// Control bytes mean a multi-byte (CID) encoding, which yields `None`.
fn decode_bytes(bytes: &[u8]) -> Option<String> {
    if let [0xFE, 0xFF, rest @ ..] = bytes {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16(&units).ok();
    }
    if bytes.iter().any(|&b| b < 0x20 && b != b'\t') {
        return None;
    }
    Some(bytes.iter().map(|&b| char::from(b)).collect())
}

/// Merge fragments sharing a baseline; order lines top to bottom.
fn group_lines(mut fragments: Vec<TextLine>) -> Vec<TextLine> {
    fragments.sort_by(|a, b| b.y.total_cmp(&a.y));

    let mut lines: Vec<Vec<TextLine>> = Vec::new();
    for fragment in fragments {
        match lines.last_mut() {
            Some(line) if (line[0].y - fragment.y).abs() <= SAME_LINE_TOLERANCE => {
                line.push(fragment);
            }
            _ => lines.push(vec![fragment]),
        }
    }

    lines
        .into_iter()
        .map(|mut parts| {
            parts.sort_by(|a, b| a.x.total_cmp(&b.x));
            let text = parts
                .iter()
                .map(|p| p.text.trim())
                .collect::<Vec<_>>()
                .join(" ");
            TextLine {
                x: parts[0].x,
                y: parts[0].y,
                size: parts.iter().map(|p| p.size).fold(0.0, f32::max),
                text,
            }
        })
        .collect()
}

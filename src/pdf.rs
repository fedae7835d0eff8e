// 🖨️ Document Byte Engine - page extraction and text page assembly
//
// Thin layer over lopdf. Callers decide WHAT goes on which page; this module
// only knows how to copy a page out of a document and how to lay down text
// runs on Letter-sized pages with the two standard Helvetica faces.

use crate::error::{ServiceError, ServiceResult};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;

/// US Letter, in points
pub const PAGE_WIDTH: i64 = 612;
pub const PAGE_HEIGHT: i64 = 792;

const REGULAR_FONT: &[u8] = b"F1";
const BOLD_FONT: &[u8] = b"F2";

// ============================================================================
// SOURCE DOCUMENTS
// ============================================================================

/// A parsed multi-page document whose pages can be copied out one at a time
pub struct SourceDocument {
    doc: Document,
}

impl SourceDocument {
    pub fn open(path: &Path) -> ServiceResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| ServiceError::io(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> ServiceResult<Self> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| ServiceError::io(format!("failed to parse PDF: {}", e)))?;
        Ok(SourceDocument { doc })
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Standalone single-page document holding page `index` (0-based)
    pub fn extract_page(&self, index: usize) -> ServiceResult<Vec<u8>> {
        let count = self.page_count();
        if index >= count {
            return Err(ServiceError::io(format!(
                "page {} out of range (document has {} pages)",
                index, count
            )));
        }

        let keep = index as u32 + 1;
        let others: Vec<u32> = (1..=count as u32).filter(|n| *n != keep).collect();

        let mut single = self.doc.clone();
        single.delete_pages(&others);
        single.prune_objects();

        save(&mut single)
    }
}

// ============================================================================
// TEXT PAGES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
}

/// One line of text at a fixed position, clipped to `width` points.
/// `y` is measured from the top edge like a layout engine would.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub size: i64,
    pub face: Face,
}

/// Assemble text pages into a PDF byte buffer
pub fn render_pages(pages: &[Vec<TextRun>]) -> ServiceResult<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(font_dictionary("Helvetica"));
    let bold_id = doc.add_object(font_dictionary("Helvetica-Bold"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for runs in pages {
        let content: Content<Vec<Operation>> = Content {
            operations: runs.iter().flat_map(text_operations).collect(),
        };
        let encoded = content
            .encode()
            .map_err(|e| ServiceError::io(format!("failed to encode page content: {}", e)))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count,
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(PAGE_WIDTH),
            Object::Integer(PAGE_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    save(&mut doc)
}

fn font_dictionary(base_font: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn text_operations(run: &TextRun) -> Vec<Operation> {
    let font = match run.face {
        Face::Regular => REGULAR_FONT,
        Face::Bold => BOLD_FONT,
    };
    let text = clip_to_width(&run.text, run.width, run.size);
    let baseline = PAGE_HEIGHT - run.y - run.size;

    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font.to_vec()), Object::Integer(run.size)]),
        Operation::new("Td", vec![Object::Integer(run.x), Object::Integer(baseline)]),
        Operation::new("Tj", vec![Object::string_literal(win_ansi(&text))]),
        Operation::new("ET", vec![]),
    ]
}

/// Helvetica averages a little over half an em per glyph
fn clip_to_width(text: &str, width: i64, size: i64) -> String {
    let max_chars = ((width * 2) / size.max(1)).max(1) as usize;
    text.chars().take(max_chars).collect()
}

/// Latin-1 range maps straight onto WinAnsi for the accented letters we need
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn save(doc: &mut Document) -> ServiceResult<Vec<u8>> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| ServiceError::io(format!("failed to write PDF: {}", e)))?;
    Ok(bytes)
}

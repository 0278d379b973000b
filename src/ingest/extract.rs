//! Per-page text extraction for PDF sources.

use lopdf::Document;
use thiserror::Error;

/// Errors raised while parsing a PDF byte source.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The bytes could not be parsed as a PDF, or a page's content was unreadable.
    #[error("Failed to read PDF: {0}")]
    Pdf(#[from] lopdf::Error),
}

/// Extract the text of every page, in page order.
///
/// Page indices in the returned vector are zero-based; the PDF's own numbering starts at
/// one. A page without extractable text yields an empty string rather than an error.
pub fn extract_page_texts(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let document = Document::load_mem(bytes)?;
    let mut pages = Vec::new();
    for page_number in document.get_pages().keys() {
        let text = document.extract_text(&[*page_number])?;
        pages.push(text);
    }
    tracing::debug!(pages = pages.len(), "Extracted page texts");
    Ok(pages)
}

#[cfg(test)]
pub(crate) fn sample_pdf(lines: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("Td", vec![50.into(), 700.into()]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        operations.push(Operation::new("Td", vec![0.into(), (-16).into()]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let content_id = document.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("encode content"),
    ));
    let page_id = document.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    document
        .objects
        .insert(pages_id, Object::Dictionary(pages));
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    document.save_to(&mut bytes).expect("serialize pdf");
    bytes
}

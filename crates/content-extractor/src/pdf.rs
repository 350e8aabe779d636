//! PDF extractor built on lopdf: one checkpoint per page, pages joined by
//! newlines in page order, empty pages dropped.

use crate::{DeadlineGuard, ExtractContext, ExtractError, Extractor};
use core_types::DocFormat;
use lopdf::Document;

pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn format(&self) -> DocFormat {
        DocFormat::Pdf
    }

    fn extract(
        &self,
        ctx: &ExtractContext<'_>,
        guard: &DeadlineGuard,
    ) -> Result<String, ExtractError> {
        let doc = Document::load(ctx.path).map_err(ExtractError::open)?;
        extract_pages(&doc, guard)
    }
}

/// Text of every non-empty page of `doc`, in page order.
pub fn extract_pages(doc: &Document, guard: &DeadlineGuard) -> Result<String, ExtractError> {
    let mut pages = Vec::new();
    for page_number in doc.get_pages().into_keys() {
        guard.check_timeout()?;
        let text = doc
            .extract_text(&[page_number])
            .map_err(|e| ExtractError::Decode(format!("page {page_number}: {e}")))?;
        let text = text.trim_end();
        if !text.trim().is_empty() {
            pages.push(text.to_string());
        }
    }
    Ok(pages.join("\n"))
}

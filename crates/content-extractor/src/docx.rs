//! Office Open XML word-processing documents (`.docx`).
//!
//! The body is streamed with quick-xml, so paragraphs come out in document
//! order whether they sit at the top level or inside table cells nested to
//! any depth. Header and footer parts are visited afterwards, section by
//! section: default header, first-page header, default footer, first-page
//! footer.

use crate::{DeadlineGuard, ExtractContext, ExtractError, Extractor};
use core_types::DocFormat;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek};
use zip::ZipArchive;
use zip::result::ZipError;

const DOCUMENT_PART: &str = "word/document.xml";
const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";

pub struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn format(&self) -> DocFormat {
        DocFormat::ModernWord
    }

    fn extract(
        &self,
        ctx: &ExtractContext<'_>,
        guard: &DeadlineGuard,
    ) -> Result<String, ExtractError> {
        let file = File::open(ctx.path).map_err(ExtractError::open)?;
        extract_docx(file, guard)
    }
}

/// Extract every non-empty paragraph of a `.docx` container.
pub fn extract_docx<R: Read + Seek>(
    source: R,
    guard: &DeadlineGuard,
) -> Result<String, ExtractError> {
    let mut archive = ZipArchive::new(source).map_err(ExtractError::open)?;
    let mut paragraphs = Vec::new();

    let sections = {
        let part = archive
            .by_name(DOCUMENT_PART)
            .map_err(|e| ExtractError::Open(format!("{DOCUMENT_PART}: {e}")))?;
        walk_paragraphs(BufReader::new(part), guard, &mut paragraphs)?
    };

    let rels = match archive.by_name(DOCUMENT_RELS_PART) {
        Ok(part) => parse_relationships(BufReader::new(part))?,
        Err(ZipError::FileNotFound) => HashMap::new(),
        Err(e) => return Err(ExtractError::decode(e)),
    };

    for section in &sections {
        guard.check_timeout()?;
        for rel_id in section.references() {
            let Some(target) = rels.get(rel_id) else {
                continue;
            };
            let part_name = part_name_for(target);
            match archive.by_name(&part_name) {
                Ok(part) => {
                    walk_paragraphs(BufReader::new(part), guard, &mut paragraphs)?;
                }
                Err(ZipError::FileNotFound) => {
                    tracing::debug!(part = %part_name, "referenced header/footer part missing");
                }
                Err(e) => return Err(ExtractError::decode(e)),
            }
        }
    }

    Ok(paragraphs.join("\n"))
}

/// Header/footer relationship ids declared by one `w:sectPr`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SectionRefs {
    pub header_default: Option<String>,
    pub header_first: Option<String>,
    pub footer_default: Option<String>,
    pub footer_first: Option<String>,
}

impl SectionRefs {
    /// Relationship ids in visiting order.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        [
            &self.header_default,
            &self.header_first,
            &self.footer_default,
            &self.footer_first,
        ]
        .into_iter()
        .filter_map(|r| r.as_deref())
    }

    fn record(&mut self, element: &[u8], kind: &str, id: String) {
        let slot = match (element, kind) {
            (b"headerReference", "default") => &mut self.header_default,
            (b"headerReference", "first") => &mut self.header_first,
            (b"footerReference", "default") => &mut self.footer_default,
            (b"footerReference", "first") => &mut self.footer_first,
            _ => return,
        };
        *slot = Some(id);
    }
}

/// Stream a WordprocessingML part, appending trimmed non-empty paragraph
/// text to `out` and returning the section properties found along the way.
///
/// Checkpoints: every paragraph end and every table start.
pub fn walk_paragraphs<B: BufRead>(
    source: B,
    guard: &DeadlineGuard,
    out: &mut Vec<String>,
) -> Result<Vec<SectionRefs>, ExtractError> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut open_paragraphs: Vec<String> = Vec::new();
    let mut sections = Vec::new();
    let mut in_text = false;
    let mut run_depth = 0usize;
    let mut sect_depth = 0usize;
    // mc:Fallback repeats the mc:Choice content for older readers.
    let mut fallback_depth = 0usize;

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ExtractError::Decode(format!("xml at {}: {e}", reader.buffer_position())))?;

        if fallback_depth > 0 {
            match &event {
                Event::Start(e) if e.local_name().as_ref() == b"Fallback" => fallback_depth += 1,
                Event::End(e) if e.local_name().as_ref() == b"Fallback" => fallback_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => open_paragraphs.push(String::new()),
                b"tbl" => guard.check_timeout()?,
                b"r" => run_depth += 1,
                b"t" => in_text = true,
                b"Fallback" => fallback_depth = 1,
                b"sectPr" => {
                    if sect_depth == 0 {
                        sections.push(SectionRefs::default());
                    }
                    sect_depth += 1;
                }
                name @ (b"headerReference" | b"footerReference") if sect_depth == 1 => {
                    record_reference(&e, name, &mut sections)?;
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"p" => guard.check_timeout()?,
                b"tab" if run_depth > 0 => push_text(&mut open_paragraphs, "\t"),
                b"br" | b"cr" if run_depth > 0 => push_text(&mut open_paragraphs, "\n"),
                b"sectPr" if sect_depth == 0 => sections.push(SectionRefs::default()),
                name @ (b"headerReference" | b"footerReference") if sect_depth == 1 => {
                    record_reference(&e, name, &mut sections)?;
                }
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(ExtractError::decode)?;
                push_text(&mut open_paragraphs, &text);
            }
            Event::CData(t) if in_text => {
                push_text(&mut open_paragraphs, &String::from_utf8_lossy(&t));
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"p" => {
                    guard.check_timeout()?;
                    if let Some(text) = open_paragraphs.pop() {
                        let text = text.trim();
                        if !text.is_empty() {
                            out.push(text.to_string());
                        }
                    }
                }
                b"t" => in_text = false,
                b"r" => run_depth = run_depth.saturating_sub(1),
                b"sectPr" => sect_depth = sect_depth.saturating_sub(1),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(sections)
}

fn push_text(open_paragraphs: &mut [String], text: &str) {
    if let Some(current) = open_paragraphs.last_mut() {
        current.push_str(text);
    }
}

fn record_reference(
    e: &BytesStart<'_>,
    element: &[u8],
    sections: &mut [SectionRefs],
) -> Result<(), ExtractError> {
    let mut kind = None;
    let mut id = None;
    for attr in e.attributes() {
        let attr = attr.map_err(ExtractError::decode)?;
        match attr.key.local_name().as_ref() {
            b"type" => kind = Some(attr.unescape_value().map_err(ExtractError::decode)?.into_owned()),
            b"id" => id = Some(attr.unescape_value().map_err(ExtractError::decode)?.into_owned()),
            _ => {}
        }
    }
    if let (Some(section), Some(id)) = (sections.last_mut(), id) {
        section.record(element, kind.as_deref().unwrap_or("default"), id);
    }
    Ok(())
}

/// Map relationship id to target from a `.rels` part.
pub fn parse_relationships<B: BufRead>(source: B) -> Result<HashMap<String, String>, ExtractError> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut rels = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(ExtractError::decode)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes() {
                    let attr = attr.map_err(ExtractError::decode)?;
                    let value = attr.unescape_value().map_err(ExtractError::decode)?;
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = Some(value.into_owned()),
                        b"Target" => target = Some(value.into_owned()),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    rels.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// Zip entry name for a relationship target of `word/document.xml`.
fn part_name_for(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = vec!["word"];
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

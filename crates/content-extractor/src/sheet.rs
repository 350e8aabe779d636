//! Spreadsheet extractors (`.xls` and `.xlsx`) on top of calamine.
//!
//! Both variants share the cell renderer: blank cells are skipped, integral
//! numbers lose their decimal point, dates render as `YYYY-MM-DD HH:MM:SS`.
//! Rows with no visible content are omitted and each sheet is introduced by
//! its name.

use crate::{DeadlineGuard, ExtractContext, ExtractError, ExtractOptions, Extractor};
use calamine::{Data, Range, Reader, Xls, Xlsx, open_workbook};
use chrono::{NaiveDate, NaiveDateTime};
use core_types::DocFormat;
use std::fmt::Display;
use std::io::{Read, Seek};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetKind {
    /// BIFF `.xls`; checkpoints down to the single cell.
    Legacy,
    /// OOXML `.xlsx`; checkpoints per sheet and per row.
    Modern,
}

pub struct SheetExtractor {
    kind: SheetKind,
}

impl SheetExtractor {
    pub fn new(kind: SheetKind) -> Self {
        Self { kind }
    }
}

impl Extractor for SheetExtractor {
    fn name(&self) -> &'static str {
        match self.kind {
            SheetKind::Legacy => "xls",
            SheetKind::Modern => "xlsx",
        }
    }

    fn format(&self) -> DocFormat {
        match self.kind {
            SheetKind::Legacy => DocFormat::LegacySheet,
            SheetKind::Modern => DocFormat::ModernSheet,
        }
    }

    fn extract(
        &self,
        ctx: &ExtractContext<'_>,
        guard: &DeadlineGuard,
    ) -> Result<String, ExtractError> {
        match self.kind {
            SheetKind::Legacy => {
                let workbook: Xls<_> = open_workbook(ctx.path).map_err(ExtractError::open)?;
                render_workbook(workbook, self.kind, ctx.options, guard)
            }
            SheetKind::Modern => {
                let workbook: Xlsx<_> = open_workbook(ctx.path).map_err(ExtractError::open)?;
                render_workbook(workbook, self.kind, ctx.options, guard)
            }
        }
    }
}

/// Render every worksheet in file order as `name\n<rows>\n`.
pub fn render_workbook<RS, R>(
    mut workbook: R,
    kind: SheetKind,
    options: &ExtractOptions,
    guard: &DeadlineGuard,
) -> Result<String, ExtractError>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: Display,
{
    let mut out = String::new();
    for name in workbook.sheet_names() {
        guard.check_timeout()?;
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExtractError::Decode(format!("sheet {name:?}: {e}")))?;
        let body = render_sheet(&range, kind, options, guard)?;
        out.push_str(&name);
        out.push('\n');
        out.push_str(&body);
        out.push('\n');
    }
    Ok(out)
}

/// Render one sheet: non-blank cells joined by the cell delimiter, non-blank
/// rows joined by the line delimiter.
pub fn render_sheet(
    range: &Range<Data>,
    kind: SheetKind,
    options: &ExtractOptions,
    guard: &DeadlineGuard,
) -> Result<String, ExtractError> {
    let mut lines = Vec::new();
    for row in range.rows() {
        guard.check_timeout()?;
        let mut cells = Vec::with_capacity(row.len());
        for cell in row {
            if kind == SheetKind::Legacy {
                guard.check_timeout()?;
            }
            let text = render_cell(cell);
            if !text.is_empty() {
                cells.push(text);
            }
        }
        if !cells.is_empty() {
            lines.push(cells.join(&options.cell_delimiter));
        }
    }
    Ok(lines.join(&options.line_delimiter))
}

/// Text of a single cell; empty for blank cells.
pub fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_number(*f),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::DateTime(dt) => {
            if dt.is_duration() {
                return format_number(dt.as_f64());
            }
            dt.as_datetime()
                .map_or_else(|| format_number(dt.as_f64()), |d| d.format(DATETIME_FORMAT).to_string())
        }
        Data::DateTimeIso(s) => format_iso_datetime(s),
        Data::DurationIso(s) => s.trim().to_string(),
        Data::Error(e) => e.to_string(),
    }
}

/// Integral values print without a decimal point; everything else keeps the
/// shortest representation that round-trips.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn format_iso_datetime(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format(DATETIME_FORMAT).to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return dt.format(DATETIME_FORMAT).to_string();
        }
    }
    raw.to_string()
}

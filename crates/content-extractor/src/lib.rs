//! Format-polymorphic text extraction with cooperative deadlines.
//!
//! One [`Extractor`] per [`DocFormat`]; [`ExtractorStack`] picks the strategy
//! with an exhaustive match, starts a [`DeadlineGuard`] for the file and turns
//! every failure into an [`ExtractError`] instead of letting it escape.

use core_types::config::ExtractConfig;
use core_types::{DocFormat, FileTask};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod deadline;
pub mod docx;
mod error;
#[cfg(windows)]
pub mod ifilter;
pub mod legacy_word;
pub mod pdf;
pub mod sheet;
pub mod text;

pub use deadline::{Clock, Deadline, DeadlineGuard, ManualClock, SystemClock};
pub use docx::DocxExtractor;
pub use error::{ExtractError, FailureKind};
pub use legacy_word::{CommandHost, LegacyWordExtractor, WordDocument, WordHost, WordSession};
pub use pdf::PdfExtractor;
pub use sheet::{SheetExtractor, SheetKind};
pub use text::PlainTextExtractor;

/// Tunables shared by every extractor of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub chunk_size: usize,
    pub cell_delimiter: String,
    pub line_delimiter: String,
    pub legacy_word_converter: String,
}

impl ExtractOptions {
    pub fn from_config(cfg: &ExtractConfig) -> Self {
        Self {
            chunk_size: cfg.chunk_size.max(1),
            cell_delimiter: cfg.cell_delimiter.clone(),
            line_delimiter: cfg.line_delimiter.clone(),
            legacy_word_converter: cfg.legacy_word_converter.clone(),
        }
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::from_config(&ExtractConfig::default())
    }
}

/// Per-call inputs for an extractor.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'a> {
    pub path: &'a Path,
    pub format: DocFormat,
    pub options: &'a ExtractOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub format: DocFormat,
    pub text: String,
    pub elapsed: Duration,
}

/// Result of extracting one file.
pub type ExtractionOutcome = Result<ExtractedContent, ExtractError>;

pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn format(&self) -> DocFormat;

    /// Extract plain text, calling `guard.check_timeout()` at every checkpoint.
    fn extract(&self, ctx: &ExtractContext<'_>, guard: &DeadlineGuard)
    -> Result<String, ExtractError>;
}

/// One extractor per supported format.
pub struct ExtractorStack {
    options: ExtractOptions,
    plain: PlainTextExtractor,
    pdf: PdfExtractor,
    legacy_word: LegacyWordExtractor,
    modern_word: DocxExtractor,
    legacy_sheet: SheetExtractor,
    modern_sheet: SheetExtractor,
}

impl ExtractorStack {
    pub fn new(options: ExtractOptions) -> Self {
        let host = legacy_word::default_host(&options.legacy_word_converter);
        Self {
            options,
            plain: PlainTextExtractor,
            pdf: PdfExtractor,
            legacy_word: LegacyWordExtractor::new(host),
            modern_word: DocxExtractor,
            legacy_sheet: SheetExtractor::new(SheetKind::Legacy),
            modern_sheet: SheetExtractor::new(SheetKind::Modern),
        }
    }

    /// Replace the automation surface used for legacy Word documents.
    #[must_use]
    pub fn with_word_host(mut self, host: Arc<dyn WordHost>) -> Self {
        self.legacy_word = LegacyWordExtractor::new(host);
        self
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    pub fn extractor_for(&self, format: DocFormat) -> &dyn Extractor {
        match format {
            DocFormat::PlainText => &self.plain,
            DocFormat::Pdf => &self.pdf,
            DocFormat::LegacyWord => &self.legacy_word,
            DocFormat::ModernWord => &self.modern_word,
            DocFormat::LegacySheet => &self.legacy_sheet,
            DocFormat::ModernSheet => &self.modern_sheet,
        }
    }

    /// Extract one discovered file under a fresh guard from `deadline`.
    pub fn extract(&self, task: &FileTask, deadline: &Deadline) -> ExtractionOutcome {
        let format = task
            .format()
            .ok_or_else(|| ExtractError::UnsupportedFormat(task.tag().to_string()))?;
        let extractor = self.extractor_for(format);
        let ctx = ExtractContext {
            path: task.path(),
            format,
            options: &self.options,
        };

        let guard = deadline.enter();
        debug!(path = %task.path().display(), extractor = extractor.name(), "extracting");
        let text = extractor.extract(&ctx, &guard)?;
        let elapsed = guard.elapsed();
        debug!(
            path = %task.path().display(),
            chars = text.chars().count(),
            elapsed_ms = millis(elapsed),
            "extracted"
        );
        Ok(ExtractedContent {
            format,
            text,
            elapsed,
        })
    }

    pub fn extract_path(&self, path: &Path, deadline: &Deadline) -> ExtractionOutcome {
        self.extract(&FileTask::new(path), deadline)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for ExtractorStack {
    fn default() -> Self {
        Self::new(ExtractOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dispatch_covers_every_format() {
        let stack = ExtractorStack::default();
        for format in DocFormat::ALL {
            assert_eq!(stack.extractor_for(format).format(), format);
        }
    }

    #[test]
    fn millis_saturate() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn unknown_tag_is_unsupported_not_a_panic() {
        let stack = ExtractorStack::default();
        let err = stack
            .extract_path(Path::new("/nowhere/file.rtf"), &Deadline::new(Duration::from_secs(1)))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnsupportedFormat);
        assert!(err.to_string().contains("rtf"));
    }

    #[test]
    fn plain_text_through_the_stack() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.TXT");
        std::fs::write(&path, "hello world").unwrap();

        let out = ExtractorStack::default()
            .extract_path(&path, &Deadline::new(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(out.format, DocFormat::PlainText);
        assert_eq!(out.text, "hello world");
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let dir = tempdir().unwrap();
        let err = ExtractorStack::default()
            .extract_path(&dir.path().join("gone.pdf"), &Deadline::new(Duration::from_secs(5)))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::OpenError);
    }

    #[test]
    fn options_clamp_chunk_size() {
        let cfg = ExtractConfig {
            chunk_size: 0,
            ..ExtractConfig::default()
        };
        assert_eq!(ExtractOptions::from_config(&cfg).chunk_size, 1);
    }
}

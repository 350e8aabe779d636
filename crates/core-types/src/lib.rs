//! Core task types and shared configuration for DocBatch.
//!
//! These types intentionally avoid heavy dependencies so every crate in the
//! workspace (discovery, extraction, scheduling, the batch worker) can share
//! them without pulling in format decoders.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub mod config;

/// Normalised (lower-cased, dot-less) file extension used to pick an extractor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FormatTag(String);

impl FormatTag {
    /// Build a tag from a raw extension; a leading dot is stripped.
    pub fn new(ext: &str) -> Self {
        Self(ext.trim_start_matches('.').to_ascii_lowercase())
    }

    /// Tag of a path's extension, or `None` when the path has none.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).map(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of container formats the extraction engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocFormat {
    PlainText,
    Pdf,
    LegacyWord,
    ModernWord,
    LegacySheet,
    ModernSheet,
}

impl DocFormat {
    pub const ALL: [DocFormat; 6] = [
        DocFormat::PlainText,
        DocFormat::Pdf,
        DocFormat::LegacyWord,
        DocFormat::ModernWord,
        DocFormat::LegacySheet,
        DocFormat::ModernSheet,
    ];

    pub fn from_tag(tag: &FormatTag) -> Option<Self> {
        match tag.as_str() {
            "txt" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            "doc" => Some(Self::LegacyWord),
            "docx" => Some(Self::ModernWord),
            "xls" => Some(Self::LegacySheet),
            "xlsx" => Some(Self::ModernSheet),
            _ => None,
        }
    }

    /// Canonical extension (without dot).
    pub const fn extension(self) -> &'static str {
        match self {
            Self::PlainText => "txt",
            Self::Pdf => "pdf",
            Self::LegacyWord => "doc",
            Self::ModernWord => "docx",
            Self::LegacySheet => "xls",
            Self::ModernSheet => "xlsx",
        }
    }
}

impl fmt::Display for DocFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One discovered file awaiting extraction. Created by discovery, consumed by
/// exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    path: PathBuf,
    tag: FormatTag,
}

impl FileTask {
    /// Build a task for `path`; the tag is derived from its extension
    /// (empty when the path has none).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tag = FormatTag::from_path(&path).unwrap_or_else(|| FormatTag::new(""));
        Self { path, tag }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tag(&self) -> &FormatTag {
        &self.tag
    }

    pub fn format(&self) -> Option<DocFormat> {
        DocFormat::from_tag(&self.tag)
    }

    /// File stem used to name the per-file artifact.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_lowercased_and_dotless() {
        assert_eq!(FormatTag::new(".DOCX").as_str(), "docx");
        assert_eq!(
            FormatTag::from_path(Path::new("/a/B.Pdf")).unwrap().as_str(),
            "pdf"
        );
        assert!(FormatTag::from_path(Path::new("/a/README")).is_none());
    }

    #[test]
    fn every_format_round_trips_through_its_tag() {
        for format in DocFormat::ALL {
            let tag = FormatTag::new(format.extension());
            assert_eq!(DocFormat::from_tag(&tag), Some(format));
        }
        assert_eq!(DocFormat::from_tag(&FormatTag::new("rtf")), None);
    }

    #[test]
    fn file_task_derives_format_and_stem() {
        let task = FileTask::new("/data/Q3 Report.XLSX");
        assert_eq!(task.format(), Some(DocFormat::ModernSheet));
        assert_eq!(task.stem(), "Q3 Report");

        let bare = FileTask::new("/data/Makefile");
        assert_eq!(bare.tag().as_str(), "");
        assert_eq!(bare.format(), None);
    }
}

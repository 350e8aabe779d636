//! Downstream handling of extracted text: every sink turns one document's
//! text into one artifact under the batch output directory.

use crate::analysis::{Analyzer, Digest};
use crate::translate::{Translator, translate_english};
use anyhow::{Context, Result};
use content_extractor::ExtractedContent;
use core_types::FileTask;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Consumer of successfully extracted documents. Called concurrently from
/// pool workers; each call writes at most one artifact.
pub trait DocumentSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Where `consume` will write the artifact for `task`. The orchestrator
    /// uses this to hand each artifact name to exactly one source.
    fn artifact_for(&self, task: &FileTask) -> PathBuf;

    /// Handle one document and return the artifact path.
    fn consume(&self, task: &FileTask, content: &ExtractedContent) -> Result<PathBuf>;
}

/// `<output_dir>/<stem>.txt`. Sources with the same stem map to the same
/// artifact; the orchestrator lets only the first of them claim it.
pub fn artifact_path(output_dir: &Path, task: &FileTask) -> PathBuf {
    output_dir.join(format!("{}.txt", task.stem()))
}

fn write_artifact(path: &Path, body: &str) -> Result<()> {
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}

/// Writes the extracted text unchanged.
#[derive(Debug, Clone)]
pub struct RawTextWriter {
    output_dir: PathBuf,
}

impl RawTextWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl DocumentSink for RawTextWriter {
    fn name(&self) -> &'static str {
        "raw-text"
    }

    fn artifact_for(&self, task: &FileTask) -> PathBuf {
        artifact_path(&self.output_dir, task)
    }

    fn consume(&self, task: &FileTask, content: &ExtractedContent) -> Result<PathBuf> {
        let path = self.artifact_for(task);
        write_artifact(&path, &content.text)?;
        Ok(path)
    }
}

/// Writes a keyword/summary digest, with translations of English parts when
/// a translator is configured.
pub struct SummaryWriter {
    output_dir: PathBuf,
    analyzer: Analyzer,
    translator: Option<Arc<dyn Translator>>,
    translation_max_chars: usize,
}

#[derive(Default)]
struct Translations {
    file_name: Option<String>,
    keywords: Option<String>,
    summary: Option<String>,
}

impl SummaryWriter {
    pub fn new(output_dir: impl Into<PathBuf>, analyzer: Analyzer) -> Self {
        Self {
            output_dir: output_dir.into(),
            analyzer,
            translator: None,
            translation_max_chars: 512,
        }
    }

    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn Translator>, max_chars: usize) -> Self {
        self.translator = Some(translator);
        self.translation_max_chars = max_chars;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Artifact body for one document.
    pub fn render(&self, task: &FileTask, content: &ExtractedContent) -> String {
        let digest = self.analyzer.analyze(&content.text);
        let translations = self.translate(task, &digest);

        let mut lines = vec![format!("Source path: {}", task.path().display())];
        if let Some(name) = translations.file_name {
            lines.push(format!("File name translation:\n{name}"));
        }
        lines.push(format!("Keywords: {}", digest.keywords.join(", ")));
        if let Some(keywords) = translations.keywords {
            lines.push(format!("Keywords translation:\n{keywords}"));
        }
        lines.push(format!("Summary:\n{}", digest.summary.join("\n")));
        if let Some(summary) = translations.summary {
            lines.push(format!("Summary translation:\n{summary}"));
        }
        lines.join("\n")
    }

    fn translate(&self, task: &FileTask, digest: &Digest) -> Translations {
        let Some(translator) = self.translator.as_deref() else {
            return Translations::default();
        };
        let max = self.translation_max_chars;
        let file_name = task
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let keywords: Vec<String> = digest
            .keywords
            .iter()
            .filter_map(|k| translate_english(translator, k, max))
            .collect();

        Translations {
            file_name: translate_english(translator, &file_name, max),
            keywords: (!keywords.is_empty()).then(|| keywords.join(", ")),
            summary: translate_english(translator, &digest.summary.join(", "), max),
        }
    }
}

impl DocumentSink for SummaryWriter {
    fn name(&self) -> &'static str {
        "summary"
    }

    fn artifact_for(&self, task: &FileTask) -> PathBuf {
        artifact_path(&self.output_dir, task)
    }

    fn consume(&self, task: &FileTask, content: &ExtractedContent) -> Result<PathBuf> {
        let path = self.artifact_for(task);
        write_artifact(&path, &self.render(task, content))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::DocFormat;
    use std::time::Duration;
    use tempfile::tempdir;

    fn content(text: &str) -> ExtractedContent {
        ExtractedContent {
            format: DocFormat::PlainText,
            text: text.to_string(),
            elapsed: Duration::ZERO,
        }
    }

    struct Shouting;

    impl Translator for Shouting {
        fn name(&self) -> &'static str {
            "shouting"
        }

        fn translate(&self, text: &str) -> Result<Option<String>> {
            Ok(Some(text.to_uppercase()))
        }
    }

    #[test]
    fn artifact_is_named_after_the_stem() {
        let task = FileTask::new("/docs/q3/Report.Final.docx");
        assert_eq!(
            artifact_path(Path::new("/out"), &task),
            PathBuf::from("/out/Report.Final.txt")
        );
    }

    #[test]
    fn sinks_announce_the_path_they_write() {
        let dir = tempdir().unwrap();
        let task = FileTask::new("/in/notes.txt");
        let raw = RawTextWriter::new(dir.path());
        let announced = raw.artifact_for(&task);
        assert_eq!(raw.consume(&task, &content("x")).unwrap(), announced);

        let summary = SummaryWriter::new(dir.path(), Analyzer::default());
        assert_eq!(summary.artifact_for(&task), dir.path().join("notes.txt"));
    }

    #[test]
    fn raw_writer_copies_text() {
        let dir = tempdir().unwrap();
        let sink = RawTextWriter::new(dir.path());
        let path = sink
            .consume(&FileTask::new("/in/notes.txt"), &content("line one\nline two"))
            .unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "line one\nline two");
    }

    #[test]
    fn summary_layout_without_translator() {
        let writer = SummaryWriter::new("/out", Analyzer::new(2, 1));
        let body = writer.render(
            &FileTask::new("/in/plan.txt"),
            &content("Launch plan. Launch plan review."),
        );
        assert_eq!(
            body,
            "Source path: /in/plan.txt\nKeywords: launch, plan\nSummary:\nLaunch plan review"
        );
    }

    #[test]
    fn translations_follow_their_sections() {
        let writer = SummaryWriter::new("/out", Analyzer::new(1, 1))
            .with_translator(Arc::new(Shouting), 512);
        let body = writer.render(&FileTask::new("/in/plan.txt"), &content("Launch plan."));
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(
            lines,
            [
                "Source path: /in/plan.txt",
                "File name translation:",
                "PLAN.TXT",
                "Keywords: launch",
                "Keywords translation:",
                "LAUNCH",
                "Summary:",
                "Launch plan",
                "Summary translation:",
                "LAUNCH PLAN",
            ]
        );
    }

    #[test]
    fn summary_writer_reports_unwritable_output() {
        let dir = tempdir().unwrap();
        let writer = SummaryWriter::new(dir.path().join("missing"), Analyzer::default());
        let err = writer
            .consume(&FileTask::new("/in/a.txt"), &content("text"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to write"));
    }
}

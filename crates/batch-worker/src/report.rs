use content_extractor::ExtractError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Why one file of a batch produced no artifact.
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("{0:#}")]
    Sink(anyhow::Error),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("artifact name collides with {}", .0.display())]
    ArtifactCollision(PathBuf),
}

/// Terminal state of one task.
#[derive(Debug)]
pub enum Disposition {
    Written(PathBuf),
    Failed(TaskFailure),
}

/// What a worker sends back to the collector.
#[derive(Debug)]
pub struct TaskOutcome {
    pub path: PathBuf,
    pub disposition: Disposition,
}

/// Per-file results of a batch, keyed by source path.
///
/// Every discovered file lands in exactly one of the two maps. Both maps are
/// ordered, so two runs over the same tree compare equal and render the same
/// error report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    written: BTreeMap<PathBuf, PathBuf>,
    failures: BTreeMap<PathBuf, String>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one outcome into the report. A path keeps its first disposition;
    /// later outcomes for it are logged and dropped.
    pub fn record(&mut self, outcome: TaskOutcome) {
        if self.written.contains_key(&outcome.path) || self.failures.contains_key(&outcome.path) {
            warn!(path = %outcome.path.display(), "duplicate outcome ignored");
            return;
        }
        match outcome.disposition {
            Disposition::Written(artifact) => {
                self.written.insert(outcome.path, artifact);
            }
            Disposition::Failed(failure) => {
                self.failures.insert(outcome.path, failure.to_string());
            }
        }
    }

    /// Source path to failure message.
    pub fn failures(&self) -> &BTreeMap<PathBuf, String> {
        &self.failures
    }

    pub fn failure(&self, path: &Path) -> Option<&str> {
        self.failures.get(path).map(String::as_str)
    }

    /// Source path to the artifact written for it.
    pub fn written(&self) -> &BTreeMap<PathBuf, PathBuf> {
        &self.written
    }

    pub fn discovered(&self) -> usize {
        self.written.len() + self.failures.len()
    }

    pub fn succeeded(&self) -> usize {
        self.written.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl FromIterator<TaskOutcome> for BatchReport {
    fn from_iter<I: IntoIterator<Item = TaskOutcome>>(iter: I) -> Self {
        let mut report = Self::new();
        for outcome in iter {
            report.record(outcome);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(path: &str) -> TaskOutcome {
        TaskOutcome {
            path: PathBuf::from(path),
            disposition: Disposition::Written(PathBuf::from(format!("{path}.txt"))),
        }
    }

    fn failed(path: &str, failure: TaskFailure) -> TaskOutcome {
        TaskOutcome {
            path: PathBuf::from(path),
            disposition: Disposition::Failed(failure),
        }
    }

    #[test]
    fn outcomes_partition_into_written_and_failed() {
        let report: BatchReport = vec![
            written("/in/a.docx"),
            failed(
                "/in/b.pdf",
                ExtractError::Open("trailer not found".into()).into(),
            ),
            failed("/in/c.xlsx", TaskFailure::Panicked("index out of bounds".into())),
        ]
        .into_iter()
        .collect();

        assert_eq!(report.discovered(), 3);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);
        assert!(!report.is_clean());
        assert_eq!(
            report.failure(Path::new("/in/b.pdf")),
            Some("failed to open document: trailer not found")
        );
        assert_eq!(
            report.failure(Path::new("/in/c.xlsx")),
            Some("task panicked: index out of bounds")
        );
    }

    #[test]
    fn sink_errors_keep_their_context_chain() {
        let err = anyhow::anyhow!("disk full").context("writing summary");
        let report: BatchReport = std::iter::once(failed("/in/a.txt", TaskFailure::Sink(err))).collect();
        assert_eq!(
            report.failure(Path::new("/in/a.txt")),
            Some("writing summary: disk full")
        );
    }

    #[test]
    fn first_disposition_per_path_sticks() {
        let mut report = BatchReport::new();
        report.record(failed("/in/a.txt", TaskFailure::Panicked("first".into())));
        report.record(written("/in/a.txt"));
        report.record(written("/in/b.txt"));
        report.record(failed("/in/b.txt", TaskFailure::Panicked("second".into())));

        assert_eq!(report.discovered(), 2);
        assert_eq!(report.failure(Path::new("/in/a.txt")), Some("task panicked: first"));
        assert!(!report.written().contains_key(Path::new("/in/a.txt")));
        assert!(report.written().contains_key(Path::new("/in/b.txt")));
        assert!(report.failure(Path::new("/in/b.txt")).is_none());
    }

    #[test]
    fn collision_names_the_owner() {
        let report: BatchReport = std::iter::once(failed(
            "/in/b/report.txt",
            TaskFailure::ArtifactCollision(PathBuf::from("/in/a/report.txt")),
        ))
        .collect();
        assert_eq!(
            report.failure(Path::new("/in/b/report.txt")),
            Some("artifact name collides with /in/a/report.txt")
        );
    }
}

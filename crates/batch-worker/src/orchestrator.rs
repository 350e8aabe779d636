//! Runs one batch: discovery feeds a fixed-size pool, every file is
//! extracted under its own deadline and handed to the sink, and every
//! outcome comes back over a channel to build the [`BatchReport`].

use crate::pipeline::DocumentSink;
use crate::report::{BatchReport, Disposition, TaskFailure, TaskOutcome};
use anyhow::{Context, Result};
use content_extractor::{Deadline, ExtractorStack};
use core_types::FileTask;
use core_types::config::AppConfig;
use crossbeam_channel::Sender;
use file_discovery::{DiscoveryRules, FileSource, WalkSource};
use scheduler::{PoolConfig, WorkerPool};
use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Read-only inputs of one batch.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Directory that receives per-file artifacts; created before the pool starts.
    pub output_dir: PathBuf,
    pub time_budget: Duration,
    pub workers: usize,
    pub rules: DiscoveryRules,
}

impl BatchSettings {
    pub fn from_config(cfg: &AppConfig, target: &Path) -> Self {
        Self {
            output_dir: target.join(&cfg.batch.output_dir),
            time_budget: cfg.extract.time_budget(),
            workers: PoolConfig::with_workers(cfg.batch.workers).workers,
            rules: DiscoveryRules::from_config(&cfg.discovery),
        }
    }
}

pub struct BatchOrchestrator {
    settings: BatchSettings,
    extractors: ExtractorStack,
    sink: Box<dyn DocumentSink>,
    deadline: Deadline,
}

impl BatchOrchestrator {
    pub fn new(
        settings: BatchSettings,
        extractors: ExtractorStack,
        sink: Box<dyn DocumentSink>,
    ) -> Self {
        let deadline = Deadline::new(settings.time_budget);
        Self {
            settings,
            extractors,
            sink,
            deadline,
        }
    }

    /// Use `deadline` (budget and clock) for every file instead of the
    /// wall-clock budget from the settings.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Process every supported file under `root`.
    pub fn run(&self, root: &Path) -> Result<BatchReport> {
        let source = WalkSource::new(root, self.settings.rules.clone());
        self.run_source(&source)
    }

    /// Process every task `source` yields. Fails only when the batch cannot
    /// start; per-file problems end up in the report.
    pub fn run_source(&self, source: &dyn FileSource) -> Result<BatchReport> {
        let output_dir = &self.settings.output_dir;
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

        let pool = WorkerPool::new(&PoolConfig::with_workers(Some(self.settings.workers)))
            .context("failed to start worker pool")?;
        let tasks = source.tasks().context("failed to start discovery")?;

        info!(
            workers = pool.workers(),
            budget_ms = u64::try_from(self.deadline.budget().as_millis()).unwrap_or(u64::MAX),
            sink = self.sink.name(),
            "batch started"
        );
        let started = Instant::now();

        // Artifact names are claimed on this thread in discovery order, so
        // the earliest source with a given stem owns its artifact on every run.
        let mut claims = HashMap::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        pool.run_all(tasks.map(move |task| {
            let tx = tx.clone();
            let owner = claim_artifact(&mut claims, self.sink.artifact_for(&task), task.path());
            move || self.process(task, owner, &tx)
        }));
        let report: BatchReport = rx.iter().collect();

        let stats = pool.snapshot();
        info!(
            discovered = report.discovered(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            peak_workers = stats.peak_active,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "batch finished"
        );
        Ok(report)
    }

    /// One task, start to finish. Never panics and always reports. `owner`
    /// is the earlier source that already claimed this task's artifact name.
    fn process(&self, task: FileTask, owner: Option<PathBuf>, tx: &Sender<TaskOutcome>) {
        debug!(path = %task.path().display(), "processing");
        let attempt = || match owner {
            Some(owner) => Err(TaskFailure::ArtifactCollision(owner)),
            None => self.extract_and_sink(&task),
        };
        let disposition = match catch_unwind(AssertUnwindSafe(attempt)) {
            Ok(Ok(artifact)) => {
                debug!(path = %task.path().display(), artifact = %artifact.display(), "written");
                Disposition::Written(artifact)
            }
            Ok(Err(failure)) => {
                warn!(path = %task.path().display(), error = %failure, "file failed");
                Disposition::Failed(failure)
            }
            Err(payload) => {
                let failure = TaskFailure::Panicked(panic_message(payload.as_ref()));
                warn!(path = %task.path().display(), error = %failure, "file failed");
                Disposition::Failed(failure)
            }
        };
        let outcome = TaskOutcome {
            path: task.into_path(),
            disposition,
        };
        if tx.send(outcome).is_err() {
            warn!("result collector closed before the batch finished");
        }
    }

    fn extract_and_sink(&self, task: &FileTask) -> Result<PathBuf, TaskFailure> {
        let content = self.extractors.extract(task, &self.deadline)?;
        self.sink.consume(task, &content).map_err(TaskFailure::Sink)
    }
}

/// Record `source` as the owner of `artifact` unless an earlier source holds
/// it; returns that earlier source.
fn claim_artifact(
    claims: &mut HashMap<PathBuf, PathBuf>,
    artifact: PathBuf,
    source: &Path,
) -> Option<PathBuf> {
    match claims.entry(artifact) {
        Entry::Occupied(claim) => Some(claim.get().clone()),
        Entry::Vacant(slot) => {
            slot.insert(source.to_path_buf());
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let mut cfg = AppConfig::default();
        cfg.batch.workers = Some(3);
        cfg.batch.output_dir = "digests".into();
        cfg.extract.time_budget_ms = 1500;

        let settings = BatchSettings::from_config(&cfg, Path::new("/target"));
        assert_eq!(settings.output_dir, Path::new("/target/digests"));
        assert_eq!(settings.time_budget, Duration::from_millis(1500));
        assert_eq!(settings.workers, 3);
    }

    #[test]
    fn default_workers_scale_with_cores() {
        let settings = BatchSettings::from_config(&AppConfig::default(), Path::new("/t"));
        assert_eq!(settings.workers, scheduler::default_worker_count());
    }

    #[test]
    fn first_claim_owns_the_artifact() {
        let mut claims = HashMap::new();
        let artifact = PathBuf::from("/out/report.txt");
        assert_eq!(claim_artifact(&mut claims, artifact.clone(), Path::new("/in/a/report.doc")), None);
        assert_eq!(
            claim_artifact(&mut claims, artifact, Path::new("/in/b/report.pdf")),
            Some(PathBuf::from("/in/a/report.doc"))
        );
        assert_eq!(claim_artifact(&mut claims, "/out/other.txt".into(), Path::new("/in/other.txt")), None);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}

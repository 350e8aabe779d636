//! Batch-level artifacts written after the pool has drained.

use crate::report::BatchReport;
use anyhow::{Context, Result};
use core_types::config::BatchConfig;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

const SEPARATOR_WIDTH: usize = 90;

/// Concatenate every `*.txt` artifact (sorted by file name) into
/// `<target>/<combined_filename>`, each followed by a blank line and a row of
/// asterisks. A missing output directory gives an empty file.
pub fn combine_results(target: &Path, cfg: &BatchConfig) -> Result<PathBuf> {
    let source_dir = target.join(&cfg.output_dir);
    let combined = target.join(&cfg.combined_filename);

    let mut artifacts = Vec::new();
    match std::fs::read_dir(&source_dir) {
        Ok(entries) => {
            for entry in entries {
                let entry = entry.with_context(|| format!("failed to list {}", source_dir.display()))?;
                let path = entry.path();
                if path.is_file() && path.extension().is_some_and(|e| e == "txt") {
                    artifacts.push(path);
                }
            }
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to list {}", source_dir.display()));
        }
    }
    artifacts.sort();

    let file = std::fs::File::create(&combined)
        .with_context(|| format!("failed to create {}", combined.display()))?;
    let mut out = BufWriter::new(file);
    let separator = "*".repeat(SEPARATOR_WIDTH);
    for path in &artifacts {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        write!(out, "{content}\n\n{separator}\n")
            .with_context(|| format!("failed to write {}", combined.display()))?;
    }
    out.flush()
        .with_context(|| format!("failed to write {}", combined.display()))?;
    Ok(combined)
}

/// Render the failure list: `File: <path>\nError: <message>\n` per failed
/// file, entries separated by a blank line, ordered by path.
pub fn render_error_report(report: &BatchReport) -> String {
    report
        .failures()
        .iter()
        .map(|(path, message)| format!("File: {}\nError: {message}\n", path.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write [`render_error_report`] to `<target>/<error_filename>`. The file is
/// written even when nothing failed.
pub fn write_error_report(target: &Path, cfg: &BatchConfig, report: &BatchReport) -> Result<PathBuf> {
    let path = target.join(&cfg.error_filename);
    std::fs::write(&path, render_error_report(report))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

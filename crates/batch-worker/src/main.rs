use anyhow::{Context, Result};
use batch_worker::{
    Analyzer, BatchOrchestrator, BatchSettings, DocumentSink, NoopTranslator, RawTextWriter,
    SummaryWriter, combine_results, init_tracing_with_config, write_error_report,
};
use clap::Parser;
use console::style;
use content_extractor::{ExtractOptions, ExtractorStack};
use core_types::config::{AppConfig, load_or_create_config};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Extract text from every office document under a directory.
#[derive(Parser, Debug)]
#[command(name = "docbatch", version, about = "Bulk office-document text extraction")]
struct Cli {
    /// Directory walked for documents (overrides `batch.source_dir`).
    #[arg(short, long)]
    source: Option<PathBuf>,
    /// Directory receiving artifacts and reports (overrides `batch.target_dir`).
    #[arg(short, long)]
    target: Option<PathBuf>,
    /// Fixed worker count; defaults to twice the available cores.
    #[arg(short, long)]
    workers: Option<usize>,
    /// Per-file processing budget in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Config file (default: $DOCBATCH_CONFIG or ./docbatch.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Log filter, e.g. `info` or `batch_worker=debug`.
    #[arg(long)]
    log_level: Option<String>,
    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
    /// Write the raw extracted text instead of keyword/summary digests.
    #[arg(long)]
    raw_text: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(source) = &self.source {
            cfg.batch.source_dir = Some(source.to_string_lossy().into_owned());
        }
        if let Some(target) = &self.target {
            cfg.batch.target_dir = Some(target.to_string_lossy().into_owned());
        }
        if self.workers.is_some() {
            cfg.batch.workers = self.workers;
        }
        if let Some(secs) = self.timeout_secs {
            cfg.extract.time_budget_ms = secs.saturating_mul(1000);
        }
        if let Some(level) = &self.log_level {
            cfg.logging.level.clone_from(level);
        }
        if self.json_logs {
            cfg.logging.json = true;
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut cfg = load_or_create_config(cli.config.as_deref())?;
    cli.apply(&mut cfg);
    let _guard = init_tracing_with_config(&cfg.logging)?;

    let source = cfg
        .batch
        .source_dir
        .as_deref()
        .map(PathBuf::from)
        .context("no source directory: pass --source or set batch.source_dir")?;
    let target = cfg
        .batch
        .target_dir
        .as_deref()
        .map(PathBuf::from)
        .context("no target directory: pass --target or set batch.target_dir")?;

    let started = Instant::now();
    let settings = BatchSettings::from_config(&cfg, &target);
    let sink = build_sink(&cfg, &settings, cli.raw_text);
    let extractors = ExtractorStack::new(ExtractOptions::from_config(&cfg.extract));
    let orchestrator = BatchOrchestrator::new(settings, extractors, sink);

    let report = orchestrator.run(&source)?;
    let analysis_done = started.elapsed();

    let combined = combine_results(&target, &cfg.batch)?;
    let errors = write_error_report(&target, &cfg.batch, &report)?;
    let total = started.elapsed();

    tracing::info!(
        analysis_ms = u64::try_from(analysis_done.as_millis()).unwrap_or(u64::MAX),
        total_ms = u64::try_from(total.as_millis()).unwrap_or(u64::MAX),
        combined = %combined.display(),
        errors = %errors.display(),
        "run complete"
    );

    println!(
        "{} {} of {} files written to {}",
        style("done").green().bold(),
        report.succeeded(),
        report.discovered(),
        orchestrator.settings().output_dir.display()
    );
    if report.is_clean() {
        println!("{}", style("no failures").dim());
    } else {
        println!(
            "{} {} failed, see {}",
            style("warning").yellow().bold(),
            report.failed(),
            errors.display()
        );
    }
    println!("{} {:.2?}", style("elapsed").cyan(), total);
    Ok(())
}

fn build_sink(cfg: &AppConfig, settings: &BatchSettings, raw_text: bool) -> Box<dyn DocumentSink> {
    if raw_text {
        return Box::new(RawTextWriter::new(&settings.output_dir));
    }
    let writer = SummaryWriter::new(&settings.output_dir, Analyzer::from_config(&cfg.analysis));
    if cfg.analysis.translate {
        Box::new(writer.with_translator(Arc::new(NoopTranslator), cfg.analysis.translation_max_chars))
    } else {
        Box::new(writer)
    }
}

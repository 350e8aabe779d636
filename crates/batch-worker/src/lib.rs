//! Batch extraction worker: walk a source tree, extract every supported
//! document under a per-file deadline on a fixed-size pool, hand the text to
//! a [`DocumentSink`], and report each file that failed along the way.

pub mod analysis;
pub mod logging;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod translate;

pub use analysis::{Analyzer, Digest};
pub use logging::init_tracing_with_config;
pub use orchestrator::{BatchOrchestrator, BatchSettings};
pub use output::{combine_results, render_error_report, write_error_report};
pub use pipeline::{DocumentSink, RawTextWriter, SummaryWriter, artifact_path};
pub use report::{BatchReport, Disposition, TaskFailure, TaskOutcome};
pub use translate::{NoopTranslator, Translator, is_english};

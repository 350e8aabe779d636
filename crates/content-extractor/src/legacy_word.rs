//! Legacy Word (`.doc`) extraction through an external automation host.
//!
//! The binary format is not parsed in-process. A [`WordHost`] launches a
//! session (a COM IFilter apartment on Windows, a converter process
//! elsewhere), the session opens the document, and the document yields
//! paragraphs one at a time. Sessions and documents release their resources
//! on drop, so every exit path of [`LegacyWordExtractor::extract`] (success,
//! decode error, timeout) closes the document and then the host.
//!
//! A session belongs to exactly one extraction; hosts are never shared
//! between concurrent tasks.

use crate::{DeadlineGuard, ExtractContext, ExtractError, Extractor};
use core_types::DocFormat;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use tracing::{debug, warn};

/// Factory for automation sessions.
pub trait WordHost: Send + Sync {
    fn name(&self) -> &'static str;

    /// Acquire a fresh session. Dropping it releases the host.
    fn launch(&self) -> Result<Box<dyn WordSession>, ExtractError>;
}

pub trait WordSession {
    /// Open `path`. Dropping the returned document closes it.
    fn open<'s>(&'s mut self, path: &Path) -> Result<Box<dyn WordDocument + 's>, ExtractError>;
}

pub trait WordDocument {
    /// Next paragraph in document order, `None` once exhausted.
    fn next_paragraph(&mut self) -> Option<Result<String, ExtractError>>;
}

/// Host used when nothing else is configured: IFilter on Windows, the
/// named converter binary everywhere else.
pub fn default_host(converter: &str) -> Arc<dyn WordHost> {
    #[cfg(windows)]
    {
        let _ = converter;
        Arc::new(crate::ifilter::IFilterHost)
    }
    #[cfg(not(windows))]
    {
        Arc::new(CommandHost::new(converter))
    }
}

pub struct LegacyWordExtractor {
    host: Arc<dyn WordHost>,
}

impl LegacyWordExtractor {
    pub fn new(host: Arc<dyn WordHost>) -> Self {
        Self { host }
    }
}

impl Extractor for LegacyWordExtractor {
    fn name(&self) -> &'static str {
        "doc"
    }

    fn format(&self) -> DocFormat {
        DocFormat::LegacyWord
    }

    fn extract(
        &self,
        ctx: &ExtractContext<'_>,
        guard: &DeadlineGuard,
    ) -> Result<String, ExtractError> {
        guard.check_timeout()?;
        let mut session = self.host.launch()?;
        debug!(host = self.host.name(), path = %ctx.path.display(), "word host launched");
        let mut document = session.open(ctx.path)?;

        let mut paragraphs = Vec::new();
        loop {
            guard.check_timeout()?;
            let Some(paragraph) = document.next_paragraph() else {
                break;
            };
            let paragraph = paragraph?;
            let text = paragraph.trim_matches(|c: char| c.is_whitespace() || c == '\u{7}');
            if !text.is_empty() {
                paragraphs.push(text.to_string());
            }
        }
        Ok(paragraphs.join("\n"))
    }
}

/// Runs a text converter (antiword by default) and treats every output line
/// as a paragraph.
#[derive(Debug, Clone)]
pub struct CommandHost {
    program: String,
}

impl CommandHost {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl WordHost for CommandHost {
    fn name(&self) -> &'static str {
        "command"
    }

    fn launch(&self) -> Result<Box<dyn WordSession>, ExtractError> {
        let program = which::which(&self.program).map_err(|e| {
            ExtractError::Open(format!("legacy Word converter {:?} not found: {e}", self.program))
        })?;
        Ok(Box::new(CommandSession { program }))
    }
}

struct CommandSession {
    program: PathBuf,
}

impl WordSession for CommandSession {
    fn open<'s>(&'s mut self, path: &Path) -> Result<Box<dyn WordDocument + 's>, ExtractError> {
        let mut child = Command::new(&self.program)
            .arg("-w")
            .arg("0")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExtractError::Open(format!("spawn {}: {e}", self.program.display())))?;
        let Some(stdout) = child.stdout.take() else {
            reap(&mut child);
            return Err(ExtractError::Open("converter stdout unavailable".into()));
        };
        Ok(Box::new(CommandDocument {
            child,
            lines: BufReader::new(stdout),
            line: String::new(),
            finished: false,
        }))
    }
}

struct CommandDocument {
    child: Child,
    lines: BufReader<ChildStdout>,
    line: String,
    finished: bool,
}

impl CommandDocument {
    fn finish(&mut self) -> Option<Result<String, ExtractError>> {
        self.finished = true;
        match self.child.wait() {
            Ok(status) if status.success() => None,
            Ok(status) => Some(Err(ExtractError::Open(format!(
                "converter exited with {status}"
            )))),
            Err(e) => Some(Err(ExtractError::decode(e))),
        }
    }
}

impl WordDocument for CommandDocument {
    fn next_paragraph(&mut self) -> Option<Result<String, ExtractError>> {
        if self.finished {
            return None;
        }
        self.line.clear();
        match self.lines.read_line(&mut self.line) {
            Ok(0) => self.finish(),
            Ok(_) => Some(Ok(self.line.trim_end_matches(['\r', '\n']).to_string())),
            Err(e) => {
                self.finished = true;
                Some(Err(ExtractError::decode(e)))
            }
        }
    }
}

impl Drop for CommandDocument {
    fn drop(&mut self) {
        if !self.finished {
            reap(&mut self.child);
        }
    }
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("converter already exited: {e}");
    }
    if let Err(e) = child.wait() {
        warn!("failed to reap converter process: {e}");
    }
}

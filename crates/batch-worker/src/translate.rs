//! Optional translation of digests. Only English input is ever sent to a
//! translator; failures are logged and the translation is left out.

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static ENGLISH_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[A-Za-z0-9\s.,!?&@#$%^*()'"\-]+$"#).unwrap());

pub trait Translator: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the translator has nothing to offer for `text`.
    fn translate(&self, text: &str) -> Result<Option<String>>;
}

/// Translator that never translates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTranslator;

impl Translator for NoopTranslator {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn translate(&self, _text: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// At least one ASCII letter and nothing outside ASCII letters, digits,
/// whitespace and common punctuation.
pub fn is_english(text: &str) -> bool {
    text.bytes().any(|b| b.is_ascii_alphabetic()) && ENGLISH_CHARS.is_match(text)
}

/// Translate `text` if it is English, truncated to `max_chars` characters.
pub fn translate_english(translator: &dyn Translator, text: &str, max_chars: usize) -> Option<String> {
    if !is_english(text) {
        return None;
    }
    let input: String = text.chars().take(max_chars).collect();
    match translator.translate(&input) {
        Ok(Some(out)) if !out.trim().is_empty() => Some(out),
        Ok(_) => None,
        Err(err) => {
            warn!(translator = translator.name(), error = %err, "translation failed");
            None
        }
    }
}

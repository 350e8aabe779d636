use std::time::Duration;
use thiserror::Error;

/// Coarse classification of an extraction failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    UnsupportedFormat,
    OpenError,
    DecodeError,
    TimeoutExceeded,
}

/// Why a document produced no text.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported format: {0:?}")]
    UnsupportedFormat(String),
    #[error("failed to open document: {0}")]
    Open(String),
    #[error("failed to decode document: {0}")]
    Decode(String),
    #[error("processing time budget exceeded: {elapsed:?} elapsed, budget {budget:?}")]
    Timeout { elapsed: Duration, budget: Duration },
}

impl ExtractError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UnsupportedFormat(_) => FailureKind::UnsupportedFormat,
            Self::Open(_) => FailureKind::OpenError,
            Self::Decode(_) => FailureKind::DecodeError,
            Self::Timeout { .. } => FailureKind::TimeoutExceeded,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub(crate) fn open(err: impl std::fmt::Display) -> Self {
        Self::Open(err.to_string())
    }

    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(
            ExtractError::UnsupportedFormat("rtf".into()).kind(),
            FailureKind::UnsupportedFormat
        );
        assert_eq!(ExtractError::open("bad zip").kind(), FailureKind::OpenError);
        assert_eq!(ExtractError::decode("bad xml").kind(), FailureKind::DecodeError);
        let timeout = ExtractError::Timeout {
            elapsed: Duration::from_millis(12),
            budget: Duration::from_millis(10),
        };
        assert!(timeout.is_timeout());
        assert!(timeout.to_string().contains("budget"));
    }
}

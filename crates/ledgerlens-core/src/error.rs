//! Error taxonomy shared by every LedgerLens crate.

use crate::history::FailureKind;

pub type Result<T> = std::result::Result<T, ReportError>;

/// Top-level error for the report pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Malformed template/schedule configuration. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Metric provider or assembly failure. Retried on the next tick.
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Metric provider error: {0}")]
    Provider(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Report processing timed out after {0}s")]
    Timeout(u64),

    /// The report was built but the channel refused it.
    #[error("Delivery via {channel} failed: {message}")]
    Delivery { channel: String, message: String },

    /// A manual trigger arrived while a cycle was running.
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    #[error(transparent)]
    ContentSafety(#[from] ContentSafetyError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output-boundary violations. Always fatal for the artifact concerned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentSafetyError {
    #[error("Path violation: {0}")]
    PathViolation(String),
    #[error("Invalid content: {0}")]
    InvalidContent(String),
}

impl ReportError {
    pub fn delivery(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Delivery {
            channel: channel.into(),
            message: message.into(),
        }
    }

    pub fn processing_in_progress() -> Self {
        Self::Concurrency("processing in progress".into())
    }

    /// Classify this error for the history record.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) | Self::Config(_) | Self::NotFound(_) => FailureKind::Validation,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Delivery { .. } => FailureKind::Delivery,
            Self::ContentSafety(_) => FailureKind::ContentSafety,
            Self::Generation(_)
            | Self::Provider(_)
            | Self::Render(_)
            | Self::Concurrency(_)
            | Self::Store(_)
            | Self::Io(_)
            | Self::Json(_) => FailureKind::Generation,
        }
    }

    pub fn is_content_safety(&self) -> bool {
        matches!(self, Self::ContentSafety(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            ReportError::delivery("slack", "403").failure_kind(),
            FailureKind::Delivery
        );
        assert_eq!(ReportError::Timeout(30).failure_kind(), FailureKind::Timeout);
        assert_eq!(
            ReportError::Provider("down".into()).failure_kind(),
            FailureKind::Generation
        );
        assert_eq!(
            ReportError::from(ContentSafetyError::PathViolation("..".into())).failure_kind(),
            FailureKind::ContentSafety
        );
    }

    #[test]
    fn test_concurrency_message() {
        let err = ReportError::processing_in_progress();
        assert!(err.to_string().contains("processing in progress"));
    }
}

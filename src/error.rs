//! Error taxonomy of the ingestion pipeline

use std::fmt;

use chrono::{DateTime, Utc};

use crate::notifiers::NotifierError;
use crate::storage::StorageError;

/// Errors a pipeline handler can report
///
/// None of them are retried: decode and validation errors discard the
/// message, store errors are logged for operators, notifier errors are
/// logged per channel.
#[derive(Debug)]
pub enum PipelineError {
    /// Inbound payload was not valid JSON for its topic
    Decode(String),

    /// A required field was missing or empty
    Validation(String),

    /// Sample older than the last accepted one for the node
    StaleSample {
        node_id: String,
        observed_at: DateTime<Utc>,
        last_accepted: DateTime<Utc>,
    },

    /// Persistence failed
    Store(StorageError),

    /// A notification channel failed
    Notifier(NotifierError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Decode(msg) => write!(f, "malformed payload: {}", msg),
            PipelineError::Validation(msg) => write!(f, "invalid payload: {}", msg),
            PipelineError::StaleSample {
                node_id,
                observed_at,
                last_accepted,
            } => write!(
                f,
                "stale sample for {}: observed at {} but {} was already accepted",
                node_id, observed_at, last_accepted
            ),
            PipelineError::Store(err) => write!(f, "{}", err),
            PipelineError::Notifier(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Store(err) => Some(err),
            PipelineError::Notifier(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Decode(err.to_string())
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        PipelineError::Store(err)
    }
}

impl From<NotifierError> for PipelineError {
    fn from(err: NotifierError) -> Self {
        PipelineError::Notifier(err)
    }
}

/// Trimmed node id, or a validation error when nothing is left
pub fn require_node_id(node_id: &str) -> Result<String, PipelineError> {
    let trimmed = node_id.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::Validation("node_id is required".to_string()));
    }
    Ok(trimmed.to_string())
}

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::artifacts::StoreError;
use crate::flatten::FlattenError;
use crate::merge::MergeError;

/// Steps of one ingest request, in order. Failures record the step they happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Parsed,
    Resolved,
    Merged,
    Persisted,
    Responded,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Parsed => "parsed",
            Stage::Resolved => "resolved",
            Stage::Merged => "merged",
            Stage::Persisted => "persisted",
            Stage::Responded => "responded",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a failure should be reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller sent something unusable; retrying the same payload will not help.
    Validation,
    /// Another writer advanced the dataset first; safe to retry.
    Conflict,
    /// The artifact store could not be reached or refused a write; safe to retry.
    Storage,
    /// Stored state is unreadable or inconsistent.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Payload(#[from] FlattenError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("storage failure after stage '{stage}': {source}")]
    Storage {
        stage: Stage,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    pub(crate) fn storage(stage: Stage) -> impl FnOnce(StoreError) -> IngestError {
        move |source| IngestError::Storage { stage, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Payload(_) | IngestError::Merge(_) => ErrorKind::Validation,
            IngestError::Storage { source, .. } => match source {
                StoreError::Conflict { .. } => ErrorKind::Conflict,
                StoreError::Bucket(_) => ErrorKind::Storage,
                StoreError::NotFound(_)
                | StoreError::Decode { .. }
                | StoreError::Encode(_)
                | StoreError::Manifest { .. } => ErrorKind::Internal,
            },
        }
    }

    /// Last stage completed before the failure; `Received` for payload problems.
    pub fn stage(&self) -> Stage {
        match self {
            IngestError::Payload(_) => Stage::Received,
            IngestError::Merge(_) => Stage::Resolved,
            IngestError::Storage { stage, .. } => *stage,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Storage)
    }
}

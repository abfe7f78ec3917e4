//! Typed errors for the board engine.
//!
//! Collaborators report `anyhow::Error`; the engine keeps those as the
//! `source` of the variant that says which step failed.

use std::time::Duration;

use thiserror::Error;

use crate::model::{BoardKind, PartitionKeyId};

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Failed to resolve workflow states for project {project_id}: {source}")]
    StateLookupFailed {
        project_id: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid board scope: {0}")]
    InvalidScope(String),

    #[error("Fetching column {key} failed: {source}")]
    PartitionFetchFailed {
        key: PartitionKeyId,
        #[source]
        source: anyhow::Error,
    },

    #[error("Fetching column {key} exceeded the {timeout:?} deadline")]
    DeadlineExceeded { key: PartitionKeyId, timeout: Duration },

    #[error("Fetch task for column {key} panicked")]
    FetchPanicked { key: PartitionKeyId },

    #[error("{} column fetches failed ({}); first: {first}", .failed.len(), join_keys(.failed))]
    FetchesFailed {
        failed: Vec<PartitionKeyId>,
        #[source]
        first: Box<BoardError>,
    },

    #[error("Aggregation cancelled")]
    Cancelled,

    #[error("Column {key} is not part of this board")]
    UnknownPartition { key: PartitionKeyId },

    #[error("Column {key} has no fetched result after join")]
    MissingPartition { key: PartitionKeyId },

    #[error("Items cannot be moved on a {kind} board")]
    UnsupportedTransition { kind: BoardKind },

    #[error("Moving item {item_id} to {target} failed: {source}")]
    TransitionFailed {
        item_id: String,
        target: PartitionKeyId,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to resolve user identities: {source}")]
    IdentityLookupFailed {
        #[source]
        source: anyhow::Error,
    },

    #[error("Fetch task could not be joined: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl BoardError {
    /// Column this error is attributed to, if any.
    pub fn partition(&self) -> Option<&PartitionKeyId> {
        match self {
            BoardError::PartitionFetchFailed { key, .. }
            | BoardError::DeadlineExceeded { key, .. }
            | BoardError::FetchPanicked { key }
            | BoardError::UnknownPartition { key }
            | BoardError::MissingPartition { key } => Some(key),
            _ => None,
        }
    }
}

fn join_keys(keys: &[PartitionKeyId]) -> String {
    keys.iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

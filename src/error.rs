use ncaa_api::client::ApiError;
use std::time::Duration;

use crate::state::retry::Retryable;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures while bringing the master bracket up to date.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("upstream fetch failed: {0}")]
    Fetch(#[from] ApiError),
    #[error("upstream fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("upstream payload had {dropped} game records and none were usable")]
    EmptyPayload { dropped: usize },
    #[error("cached master bracket is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Reported to readers that queued behind a refresh which failed.
    #[error("concurrent refresh failed: {0}")]
    RefreshFailed(String),
    #[error("upstream rate limit reached")]
    RateLimited,
}

impl Retryable for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            SyncError::Fetch(e) => e.is_retryable(),
            SyncError::Timeout(_) => true,
            SyncError::EmptyPayload { .. }
            | SyncError::Corrupt(_)
            | SyncError::Store(_)
            | SyncError::RefreshFailed(_)
            | SyncError::RateLimited => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("{kind} {id} not found")]
    Missing { kind: &'static str, id: String },
}

/// The master and user brackets cannot be compared.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("master bracket is for {master}, user bracket is for {user}")]
    YearMismatch { master: u16, user: u16 },
    #[error("bracket {0} is not the master bracket")]
    NotMaster(String),
    #[error("bracket {bracket_id} has a game with an empty id at position {index}")]
    EmptyGameId { bracket_id: String, index: usize },
    #[error("bracket {bracket_id} lists game {game_id} more than once")]
    DuplicateGame { bracket_id: String, game_id: String },
}

/// Errors surfaced to collaborators calling into the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Missing { kind, id } => Error::NotFound(format!("{kind} {id}")),
            other => Error::Store(other),
        }
    }
}

impl Error {
    /// Message safe to hand across the collaborator boundary. Upstream bodies
    /// and internal detail stay in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "Not found",
            Error::Scoring(_) => "Bracket cannot be scored against this tournament",
            Error::Sync(_) | Error::Store(_) => "Temporarily unavailable, please try again",
        }
    }
}

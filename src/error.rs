// src/error.rs
//! Typed errors for the storage gateway and the sync orchestrator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid database url: {0}")]
    InvalidUrl(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Terminal outcomes of one sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync run is already in progress")]
    AlreadyRunning,

    #[error("failed to fetch scholar data after {attempts} attempts")]
    FetchFailed { attempts: u32 },

    #[error("bulk replace failed, previous publications kept: {0}")]
    Storage(#[source] StoreError),

    #[error("publications replaced ({replaced}) but profile update failed: {source}")]
    ProfileUpdate {
        replaced: usize,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    /// Short machine-friendly label, used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::AlreadyRunning => "already_running",
            SyncError::FetchFailed { .. } => "fetch_failed",
            SyncError::Storage(_) => "storage",
            SyncError::ProfileUpdate { .. } => "profile_update",
        }
    }
}

//! Error taxonomy for a synchronization run
//!
//! Everything the operator can fix (configuration, directory data, failing
//! queries) is a user error and exits with status 1. `Internal` marks a broken
//! privilege catalog or another invariant the engine relies on.

use thiserror::Error;

pub const EXIT_USER_ERROR: i32 = 1;
pub const EXIT_INTERNAL_ERROR: i32 = 70;

#[derive(Debug, Error, PartialEq)]
pub enum SyncError {
    #[error("{0}")]
    User(String),

    #[error("Missing attribute {path}")]
    MissingAttribute { path: String },

    #[error("Failed to decode {value:?} as a DN for {key}")]
    Decode { value: String, key: String },

    #[error("Database {0} does not exist or is not managed")]
    UnknownDatabase(String),

    #[error("Unknown schema {database}.{schema}")]
    UnknownSchema { database: String, schema: String },

    #[error("Database limit exceeded: more than {0} databases are not supported")]
    PoolExhausted(usize),

    #[error("Membership cycle between roles: {0}")]
    MembershipCycle(String),

    #[error("{0}")]
    Internal(String),
}

impl SyncError {
    pub fn user(message: impl Into<String>) -> Self {
        SyncError::User(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SyncError::Internal(message.into())
    }

    pub fn is_user_error(&self) -> bool {
        !matches!(self, SyncError::Internal(_))
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_user_error() {
            EXIT_USER_ERROR
        } else {
            EXIT_INTERNAL_ERROR
        }
    }
}

/// Exit status for an error that bubbled up to `main`.
///
/// Errors that are not a `SyncError` come from I/O, YAML parsing or the
/// database driver and are reported as user errors.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SyncError>())
        .map(SyncError::exit_code)
        .unwrap_or(EXIT_USER_ERROR)
}

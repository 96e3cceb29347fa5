use thiserror::Error;

use crate::models::DeleteFailure;

/// Failures surfaced by credential issuance, endpoint repair, uploads and deletes.
///
/// Every variant aborts the operation that produced it. Nothing in this crate
/// retries on its own.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Credential issuance failed: {0}")]
    CredentialIssuance(String),

    #[error("Incomplete credential response: missing {0}")]
    IncompleteCredential(&'static str),

    #[error("Endpoint resolution failed: {0}")]
    EndpointResolution(String),

    #[error("Upload transport error: {0}")]
    UploadTransport(String),

    #[error("Delete reported {} per-object error(s)", .0.len())]
    PartialDelete(Vec<DeleteFailure>),

    #[error("Progress reporter cannot take a new transfer: {0}")]
    ReporterState(String),

    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        StorageError::UploadTransport(err.to_string())
    }
}

/// Publish failure on the progress channel. Always logged and dropped by the
/// reporter, never returned from a transfer.
#[derive(Error, Debug)]
pub enum ProgressChannelError {
    #[error("No subscribers on topic {0}")]
    NoSubscribers(String),

    #[error("Progress event could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Progress channel unavailable: {0}")]
    Unavailable(String),
}

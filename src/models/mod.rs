use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StorageError;

/// What a temporary credential will be allowed to do with its object path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Write,
    FullControl,
}

impl OperationKind {
    /// Channel name understood by the temporary-credential API.
    pub fn channel(&self) -> &'static str {
        match self {
            OperationKind::Write => "OSS_UPLOAD",
            OperationKind::FullControl => "OSS_FULL",
        }
    }
}

/// Exactly one bucket and one object path. Rendered as `bucket:objectPath`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadScope {
    bucket: String,
    object_path: String,
}

impl UploadScope {
    pub fn new(bucket: &str, object_path: &str) -> Result<Self, StorageError> {
        if bucket.is_empty() {
            return Err(StorageError::Config("bucket is not configured".to_string()));
        }
        validate_object_path(object_path)?;
        Ok(Self {
            bucket: bucket.to_string(),
            object_path: object_path.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }
}

impl fmt::Display for UploadScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bucket, self.object_path)
    }
}

/// Rejects paths that would widen a scope beyond a single object.
pub fn validate_object_path(path: &str) -> Result<(), StorageError> {
    if path.trim().is_empty() {
        return Err(StorageError::InvalidPath("object path is empty".to_string()));
    }
    if path.contains('*') {
        return Err(StorageError::InvalidPath(format!(
            "wildcards are not allowed in object paths: {}",
            path
        )));
    }
    Ok(())
}

/// Short-lived credential issued for a single operation. Never cached.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryCredential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    pub bucket_id: String,
    pub endpoint_host: String,
}

impl fmt::Debug for TemporaryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("bucket_id", &self.bucket_id)
            .field("endpoint_host", &self.endpoint_host)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    Started,
    Initiated,
    InProgress,
    Completed,
    Failed,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed)
    }

    /// Legal moves of the transfer state machine.
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        use TransferState::*;
        match (self, next) {
            (Started, Initiated) => true,
            (Initiated | InProgress, InProgress) => true,
            (Initiated | InProgress, Completed) => true,
            (Started | Initiated | InProgress, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferState::Started => "STARTED",
            TransferState::Initiated => "INITIATED",
            TransferState::InProgress => "IN_PROGRESS",
            TransferState::Completed => "COMPLETED",
            TransferState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub transfer_id: String,
    pub filename: String,
    pub bytes_transferred: i64,
    pub total_bytes: i64,
    pub percentage: f64,
    pub status: TransferState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Handed back to the caller once the store has confirmed the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub url: String,
    pub path: String,
    pub size: u64,
    pub filename: String,
}

/// Describes one upload: the client's filename plus optional target path and
/// content type. Without a path, one is generated under the configured prefix.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub filename: String,
    pub path: Option<String>,
    pub content_type: Option<String>,
}

impl UploadRequest {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    pub key: String,
    pub e_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub key: String,
    pub code: String,
    pub message: String,
}

/// Result of a batch delete call that completed at the transport level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub errors: Vec<DeleteFailure>,
}

impl DeleteOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Escalates provider-reported per-object errors into `PartialDelete`.
    pub fn into_strict(self) -> Result<Vec<String>, StorageError> {
        if self.errors.is_empty() {
            Ok(self.deleted)
        } else {
            Err(StorageError::PartialDelete(self.errors))
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use crate::error::StorageError;
use crate::models::{DeleteOutcome, OperationKind, validate_object_path};
use crate::services::credentials::CredentialSource;
use crate::services::endpoint::EndpointResolver;
use crate::services::session::open_session;
use crate::services::storage::{StoreConnector, bounded};

/// Removes single objects with a full-control credential scoped to that object.
pub struct DeletionExecutor {
    credentials: Arc<dyn CredentialSource>,
    connector: Arc<dyn StoreConnector>,
    resolver: Arc<EndpointResolver>,
    timeout: Duration,
}

impl DeletionExecutor {
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        connector: Arc<dyn StoreConnector>,
        resolver: Arc<EndpointResolver>,
        timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            connector,
            resolver,
            timeout,
        }
    }

    /// Succeeds whenever the batch call itself completes. Per-object errors,
    /// including a missing object, are logged and returned in the outcome.
    pub async fn delete(&self, path: &str) -> Result<DeleteOutcome, StorageError> {
        let path = path.trim_start_matches('/');
        validate_object_path(path)?;

        let session = open_session(
            self.credentials.as_ref(),
            self.connector.as_ref(),
            &self.resolver,
            path,
            OperationKind::FullControl,
        )
        .await?;

        let keys = [path.to_string()];
        let outcome = bounded(
            self.timeout,
            &format!("delete {}", path),
            session.store.delete_objects(&keys),
        )
        .await?;

        for failure in &outcome.errors {
            tracing::warn!(
                "Delete of {} in bucket {} reported {}: {}",
                failure.key,
                session.credential.bucket_id,
                failure.code,
                failure.message
            );
        }
        if !outcome.deleted.is_empty() {
            tracing::info!(
                "Deleted {:?} from bucket {}",
                outcome.deleted,
                session.credential.bucket_id
            );
        } else if outcome.is_clean() {
            tracing::info!("Delete of {} completed, store reported nothing removed", path);
        }

        Ok(outcome)
    }
}

use std::sync::Arc;

use crate::error::StorageError;
use crate::models::{OperationKind, TemporaryCredential};
use crate::services::credentials::CredentialSource;
use crate::services::endpoint::EndpointResolver;
use crate::services::storage::{ObjectStore, StoreConnector};

/// Everything one operation needs to talk to the store: a credential scoped to
/// its single path, the repaired endpoint and a client signed by that credential.
pub struct StoreSession {
    pub credential: TemporaryCredential,
    pub endpoint: String,
    pub store: Arc<dyn ObjectStore>,
}

/// Issue -> resolve -> connect. Dropped when the operation finishes.
pub async fn open_session(
    credentials: &dyn CredentialSource,
    connector: &dyn StoreConnector,
    resolver: &EndpointResolver,
    object_path: &str,
    kind: OperationKind,
) -> Result<StoreSession, StorageError> {
    let credential = credentials.issue(object_path, kind).await?;
    let endpoint = resolver.resolve(&credential.endpoint_host, &credential.bucket_id)?;
    let store = connector.connect(&credential, &endpoint).await?;

    Ok(StoreSession {
        credential,
        endpoint,
        store,
    })
}

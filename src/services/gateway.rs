use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncRead;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::models::{DeleteOutcome, OperationKind, TemporaryCredential, TransferResult, UploadRequest};
use crate::services::credentials::{CredentialBroker, CredentialSource};
use crate::services::deletion::DeletionExecutor;
use crate::services::endpoint::EndpointResolver;
use crate::services::progress::{ProgressReporter, Publisher};
use crate::services::session::open_session;
use crate::services::storage::{ObjectWriter, S3Connector, StoreConnector};
use crate::services::upload::UploadExecutor;

/// Everything a client needs to write one object itself, plus a server-side
/// writer bound to the same credential.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    pub upload_url: String,
    pub url: String,
    pub file_name: String,
    pub bucket: String,
    pub path: String,
    pub allowed_types: String,
    pub max_file_size: u64,
    pub credential: TemporaryCredential,
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    pub writer: ObjectWriter,
}

/// Entry point for the surrounding application: issue targets, upload, delete.
pub struct StorageGateway {
    config: Arc<StorageConfig>,
    credentials: Arc<dyn CredentialSource>,
    connector: Arc<dyn StoreConnector>,
    resolver: Arc<EndpointResolver>,
    uploads: UploadExecutor,
    deletions: DeletionExecutor,
}

impl StorageGateway {
    pub fn new(
        config: StorageConfig,
        credentials: Arc<dyn CredentialSource>,
        connector: Arc<dyn StoreConnector>,
    ) -> Self {
        let resolver = Arc::new(
            EndpointResolver::standard(&config.vendor_domains)
                .with_custom_domain(config.custom_domain.clone()),
        );
        let config = Arc::new(config);

        Self {
            uploads: UploadExecutor::new(
                credentials.clone(),
                connector.clone(),
                resolver.clone(),
                config.clone(),
            ),
            deletions: DeletionExecutor::new(
                credentials.clone(),
                connector.clone(),
                resolver.clone(),
                config.transfer_timeout,
            ),
            config,
            credentials,
            connector,
            resolver,
        }
    }

    /// Wires the HMAC-signing broker and the S3 connector from `config`.
    pub fn from_config(config: StorageConfig) -> Result<Self, StorageError> {
        let credentials = Arc::new(CredentialBroker::new(&config)?);
        let connector = Arc::new(S3Connector::new(
            config.region.clone(),
            config.force_path_style,
            config.transfer_timeout,
        ));
        Ok(Self::new(config, credentials, connector))
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn resolver(&self) -> &EndpointResolver {
        &self.resolver
    }

    /// Issues a write credential for one path (generated when `path` is `None`).
    pub async fn issue_upload_target(
        &self,
        path: Option<&str>,
        filename: &str,
    ) -> Result<UploadTarget, StorageError> {
        let mut request = UploadRequest::new(filename);
        if let Some(path) = path {
            request = request.with_path(path);
        }
        let path = self.uploads.object_path(&request)?;

        let session = open_session(
            self.credentials.as_ref(),
            self.connector.as_ref(),
            &self.resolver,
            &path,
            OperationKind::Write,
        )
        .await?;

        let upload_url = match (self.resolver.custom_domain(), &self.config.upload_url) {
            (Some(_), _) => self.resolver.object_url(&session.endpoint, ""),
            (None, Some(upload_url)) => upload_url.clone(),
            (None, None) => session.endpoint.clone(),
        };
        let upload_url = upload_url.trim_end_matches('/').to_string();

        tracing::info!(
            "Issued upload target for {} (bucket {}, expires {})",
            path,
            session.credential.bucket_id,
            session.credential.expires_at
        );

        Ok(UploadTarget {
            upload_url,
            url: self.resolver.object_url(&session.endpoint, &path),
            file_name: filename.to_string(),
            bucket: session.credential.bucket_id.clone(),
            writer: ObjectWriter::new(
                session.store,
                path.clone(),
                self.config.transfer_timeout,
            ),
            path,
            allowed_types: self.config.allowed_types.clone(),
            max_file_size: self.config.max_file_size,
            expires_at: session.credential.expires_at,
            credential: session.credential,
        })
    }

    pub async fn upload(
        &self,
        data: Vec<u8>,
        request: UploadRequest,
    ) -> Result<TransferResult, StorageError> {
        self.uploads.upload(data, request).await
    }

    pub async fn upload_with_progress<R>(
        &self,
        reader: R,
        request: UploadRequest,
        reporter: &mut ProgressReporter,
    ) -> Result<TransferResult, StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.uploads
            .upload_with_progress(reader, request, reporter)
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<DeleteOutcome, StorageError> {
        self.deletions.delete(path).await
    }

    /// Fresh reporter for one transfer by `username`; emits `STARTED`.
    pub async fn start_progress(
        &self,
        publisher: Arc<dyn Publisher>,
        filename: &str,
        username: &str,
    ) -> ProgressReporter {
        ProgressReporter::start(publisher, filename, username).await
    }
}

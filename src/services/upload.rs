use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::models::{
    OperationKind, TransferResult, TransferState, UploadRequest, validate_object_path,
};
use crate::services::credentials::CredentialSource;
use crate::services::endpoint::EndpointResolver;
use crate::services::progress::ProgressReporter;
use crate::services::session::open_session;
use crate::services::storage::{StoreConnector, bounded};
use crate::utils::paths::{default_object_path, format_file_size, staging_suffix};

/// Writes objects with a credential issued for exactly that object.
pub struct UploadExecutor {
    credentials: Arc<dyn CredentialSource>,
    connector: Arc<dyn StoreConnector>,
    resolver: Arc<EndpointResolver>,
    config: Arc<StorageConfig>,
}

impl UploadExecutor {
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        connector: Arc<dyn StoreConnector>,
        resolver: Arc<EndpointResolver>,
        config: Arc<StorageConfig>,
    ) -> Self {
        Self {
            credentials,
            connector,
            resolver,
            config,
        }
    }

    /// Explicit path from the request, or a generated one under the default prefix.
    pub fn object_path(&self, request: &UploadRequest) -> Result<String, StorageError> {
        let path = match &request.path {
            Some(path) => path.trim_start_matches('/').to_string(),
            None => default_object_path(&self.config.default_prefix, &request.filename),
        };
        validate_object_path(&path)?;
        Ok(path)
    }

    /// Single-shot mode: the payload goes to the store as one write.
    pub async fn upload(
        &self,
        data: Vec<u8>,
        request: UploadRequest,
    ) -> Result<TransferResult, StorageError> {
        let path = self.object_path(&request)?;
        let session = open_session(
            self.credentials.as_ref(),
            self.connector.as_ref(),
            &self.resolver,
            &path,
            OperationKind::Write,
        )
        .await?;

        let size = data.len() as u64;
        let receipt = bounded(
            self.config.transfer_timeout,
            &format!("put {}", path),
            session
                .store
                .put_object(&path, request.content_type.as_deref(), data),
        )
        .await?;

        tracing::info!(
            "Uploaded {} to {} ({}, etag {:?})",
            request.filename,
            receipt.key,
            format_file_size(size),
            receipt.e_tag
        );

        Ok(TransferResult {
            url: self.resolver.object_url(&session.endpoint, &path),
            path,
            size,
            filename: request.filename,
        })
    }

    /// Progress-instrumented mode. The payload is staged to a temp file and read
    /// back in `chunk_size` pieces, each one reported, before a single put.
    /// Progress therefore tracks the local read, not the network write.
    ///
    /// The reporter must be fresh (`STARTED`); a used one is refused before
    /// anything is staged or written.
    pub async fn upload_with_progress<R>(
        &self,
        reader: R,
        request: UploadRequest,
        reporter: &mut ProgressReporter,
    ) -> Result<TransferResult, StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if reporter.state() != TransferState::Started {
            tracing::warn!(
                "Refusing upload of {}: reporter for transfer {} is already {}",
                request.filename,
                reporter.transfer_id(),
                reporter.state()
            );
            return Err(StorageError::ReporterState(format!(
                "transfer {} is already {}",
                reporter.transfer_id(),
                reporter.state()
            )));
        }

        match self.transfer(reader, &request, reporter).await {
            Ok(result) => {
                reporter.complete().await;
                Ok(result)
            }
            Err(e) => {
                reporter.fail(e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn transfer<R>(
        &self,
        reader: R,
        request: &UploadRequest,
        reporter: &mut ProgressReporter,
    ) -> Result<TransferResult, StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let path = self.object_path(request)?;

        // Removed when this guard drops, on every exit path.
        let staged = self.stage(reader, &request.filename).await?;
        let total_bytes = staged
            .as_file()
            .metadata()
            .map_err(|e| staging_error(&request.filename, e))?
            .len();
        reporter.set_total_bytes(total_bytes).await;

        let session = open_session(
            self.credentials.as_ref(),
            self.connector.as_ref(),
            &self.resolver,
            &path,
            OperationKind::Write,
        )
        .await?;

        let mut file = tokio::fs::File::open(staged.path())
            .await
            .map_err(|e| staging_error(&request.filename, e))?;
        let mut payload = Vec::with_capacity(total_bytes as usize);
        let mut chunk = vec![0u8; self.config.chunk_size.max(1)];
        loop {
            let read = file
                .read(&mut chunk)
                .await
                .map_err(|e| staging_error(&request.filename, e))?;
            if read == 0 {
                break;
            }
            payload.extend_from_slice(&chunk[..read]);
            reporter.record_bytes(read as u64).await;
        }
        drop(file);

        let size = payload.len() as u64;
        let receipt = bounded(
            self.config.transfer_timeout,
            &format!("put {}", path),
            session
                .store
                .put_object(&path, request.content_type.as_deref(), payload),
        )
        .await?;

        tracing::info!(
            "Uploaded {} to {} ({}, transfer {}, etag {:?})",
            request.filename,
            receipt.key,
            format_file_size(size),
            reporter.transfer_id(),
            receipt.e_tag
        );

        Ok(TransferResult {
            url: self.resolver.object_url(&session.endpoint, &path),
            path,
            size,
            filename: request.filename.clone(),
        })
    }

    async fn stage<R>(&self, mut reader: R, filename: &str) -> Result<NamedTempFile, StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let dir = self
            .config
            .staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let staged = staging_file(&dir, filename).map_err(|e| staging_error(filename, e))?;

        let handle = staged.reopen().map_err(|e| staging_error(filename, e))?;
        let mut writer = tokio::fs::File::from_std(handle);
        let copied = tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(|e| staging_error(filename, e))?;
        writer
            .flush()
            .await
            .map_err(|e| staging_error(filename, e))?;

        tracing::debug!(
            "Staged {} ({}) at {}",
            filename,
            format_file_size(copied),
            staged.path().display()
        );
        Ok(staged)
    }
}

fn staging_file(dir: &Path, filename: &str) -> std::io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("upload_")
        .suffix(staging_suffix(filename))
        .tempfile_in(dir)
}

fn staging_error(filename: &str, e: std::io::Error) -> StorageError {
    StorageError::UploadTransport(format!("staging {} failed: {}", filename, e))
}

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::error::StorageError;
use crate::models::{DeleteFailure, DeleteOutcome, PutReceipt, TemporaryCredential};

/// Runs one outbound store call, failing with `UploadTransport` once `limit` passes.
pub async fn bounded<T, F>(limit: Duration, operation: &str, call: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::time::timeout(limit, call).await.map_err(|_| {
        tracing::error!("{} timed out after {:?}", operation, limit);
        StorageError::UploadTransport(format!("{} timed out after {:?}", operation, limit))
    })?
}

/// Object operations against one bucket, signed by one temporary credential.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        data: Vec<u8>,
    ) -> Result<PutReceipt, StorageError>;

    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteOutcome, StorageError>;
}

/// Builds an [`ObjectStore`] for a freshly issued credential and resolved endpoint.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(
        &self,
        credential: &TemporaryCredential,
        endpoint: &str,
    ) -> Result<Arc<dyn ObjectStore>, StorageError>;
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    timeout: Duration,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String, timeout: Duration) -> Self {
        Self {
            client,
            bucket,
            timeout,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        data: Vec<u8>,
    ) -> Result<PutReceipt, StorageError> {
        let size = data.len() as i64;
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .content_length(size)
            .body(ByteStream::from(data))
            .send();

        let output = bounded(self.timeout, &format!("put {}", key), async {
            request.await.map_err(|e| {
                tracing::error!(
                    "S3 put_object failed: bucket={}, key={}, error={}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                );
                StorageError::transport(DisplayErrorContext(&e))
            })
        })
        .await?;

        Ok(PutReceipt {
            key: key.to_string(),
            e_tag: output.e_tag().map(str::to_string),
        })
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteOutcome, StorageError> {
        let objects = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::transport)?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(StorageError::transport)?;

        let request = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send();

        let output = bounded(self.timeout, "batch delete", async {
            request.await.map_err(|e| {
                tracing::error!(
                    "S3 delete_objects failed: bucket={}, error={}",
                    self.bucket,
                    DisplayErrorContext(&e)
                );
                StorageError::transport(DisplayErrorContext(&e))
            })
        })
        .await?;

        Ok(DeleteOutcome {
            deleted: output
                .deleted()
                .iter()
                .filter_map(|d| d.key().map(str::to_string))
                .collect(),
            errors: output
                .errors()
                .iter()
                .map(|e| DeleteFailure {
                    key: e.key().unwrap_or_default().to_string(),
                    code: e.code().unwrap_or_default().to_string(),
                    message: e.message().unwrap_or_default().to_string(),
                })
                .collect(),
        })
    }
}

/// Creates an S3 client per credential; nothing is reused between operations.
pub struct S3Connector {
    region: String,
    force_path_style: bool,
    timeout: Duration,
}

impl S3Connector {
    pub fn new(region: String, force_path_style: bool, timeout: Duration) -> Self {
        Self {
            region,
            force_path_style,
            timeout,
        }
    }
}

#[async_trait]
impl StoreConnector for S3Connector {
    async fn connect(
        &self,
        credential: &TemporaryCredential,
        endpoint: &str,
    ) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let expiry: SystemTime = credential.expires_at.into();
        let aws_config = aws_config::from_env()
            .endpoint_url(endpoint)
            .region(Region::new(self.region.clone()))
            .credentials_provider(Credentials::new(
                credential.access_key_id.clone(),
                credential.secret_access_key.clone(),
                Some(credential.session_token.clone()),
                Some(expiry),
                "temporary-token",
            ))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(self.force_path_style)
            .build();

        tracing::debug!(
            "S3 client ready: endpoint={}, bucket={}",
            endpoint,
            credential.bucket_id
        );

        Ok(Arc::new(S3ObjectStore::new(
            Client::from_conf(s3_config),
            credential.bucket_id.clone(),
            self.timeout,
        )))
    }
}

/// Credential-backed writer for one issued upload target.
#[derive(Clone)]
pub struct ObjectWriter {
    store: Arc<dyn ObjectStore>,
    key: String,
    content_type: Option<String>,
    timeout: Duration,
}

impl ObjectWriter {
    pub fn new(store: Arc<dyn ObjectStore>, key: String, timeout: Duration) -> Self {
        Self {
            store,
            key,
            content_type: None,
            timeout,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn write(&self, data: Vec<u8>) -> Result<PutReceipt, StorageError> {
        bounded(
            self.timeout,
            &format!("put {}", self.key),
            self.store
                .put_object(&self.key, self.content_type.as_deref(), data),
        )
        .await
    }
}

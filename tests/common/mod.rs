#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_blog_storage::config::StorageConfig;
use rust_blog_storage::error::{ProgressChannelError, StorageError};
use rust_blog_storage::models::{
    DeleteFailure, DeleteOutcome, OperationKind, ProgressEvent, PutReceipt, TemporaryCredential,
    TransferState,
};
use rust_blog_storage::services::credentials::CredentialSource;
use rust_blog_storage::services::gateway::StorageGateway;
use rust_blog_storage::services::progress::Publisher;
use rust_blog_storage::services::storage::{ObjectStore, StoreConnector};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const BUCKET_ID: &str = "s-cd-1234-blog";

/// Issues credentials locally and records every request it saw.
#[derive(Default)]
pub struct FakeCredentialSource {
    pub endpoint_host: String,
    pub issued: Mutex<Vec<(String, OperationKind)>>,
}

impl FakeCredentialSource {
    pub fn new(endpoint_host: &str) -> Self {
        Self {
            endpoint_host: endpoint_host.to_string(),
            issued: Mutex::new(Vec::new()),
        }
    }

    pub fn issued(&self) -> Vec<(String, OperationKind)> {
        self.issued.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialSource for FakeCredentialSource {
    async fn issue(
        &self,
        object_path: &str,
        kind: OperationKind,
    ) -> Result<TemporaryCredential, StorageError> {
        self.issued
            .lock()
            .unwrap()
            .push((object_path.to_string(), kind));
        Ok(TemporaryCredential {
            access_key_id: "AKID".to_string(),
            secret_access_key: "SECRET".to_string(),
            session_token: "TOKEN".to_string(),
            expires_at: Utc::now() + Duration::hours(2),
            bucket_id: BUCKET_ID.to_string(),
            endpoint_host: self.endpoint_host.clone(),
        })
    }
}

/// Always refuses, like a provider answering code 403.
pub struct RefusingCredentialSource;

#[async_trait]
impl CredentialSource for RefusingCredentialSource {
    async fn issue(
        &self,
        _object_path: &str,
        _kind: OperationKind,
    ) -> Result<TemporaryCredential, StorageError> {
        Err(StorageError::CredentialIssuance(
            "provider returned code 403: signature mismatch".to_string(),
        ))
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    pub objects: Mutex<HashMap<String, (Option<String>, Vec<u8>)>>,
}

impl MemoryObjectStore {
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, data)| data.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .and_then(|(ct, _)| ct.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        data: Vec<u8>,
    ) -> Result<PutReceipt, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (content_type.map(str::to_string), data));
        Ok(PutReceipt {
            key: key.to_string(),
            e_tag: Some("\"etag\"".to_string()),
        })
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteOutcome, StorageError> {
        let mut objects = self.objects.lock().unwrap();
        let mut outcome = DeleteOutcome::default();
        for key in keys {
            if objects.remove(key).is_some() {
                outcome.deleted.push(key.clone());
            } else {
                outcome.errors.push(DeleteFailure {
                    key: key.clone(),
                    code: "NoSuchKey".to_string(),
                    message: "The specified key does not exist.".to_string(),
                });
            }
        }
        Ok(outcome)
    }
}

/// Every put fails at the transport level.
pub struct FailingObjectStore;

#[async_trait]
impl ObjectStore for FailingObjectStore {
    async fn put_object(
        &self,
        key: &str,
        _content_type: Option<&str>,
        _data: Vec<u8>,
    ) -> Result<PutReceipt, StorageError> {
        Err(StorageError::UploadTransport(format!(
            "connection reset while writing {}",
            key
        )))
    }

    async fn delete_objects(&self, _keys: &[String]) -> Result<DeleteOutcome, StorageError> {
        Err(StorageError::UploadTransport("connection reset".to_string()))
    }
}

/// Accepts every call and never answers.
pub struct HangingObjectStore;

#[async_trait]
impl ObjectStore for HangingObjectStore {
    async fn put_object(
        &self,
        _key: &str,
        _content_type: Option<&str>,
        _data: Vec<u8>,
    ) -> Result<PutReceipt, StorageError> {
        std::future::pending().await
    }

    async fn delete_objects(&self, _keys: &[String]) -> Result<DeleteOutcome, StorageError> {
        std::future::pending().await
    }
}

/// Hands out one shared store and records the endpoints it was asked for.
pub struct StaticConnector {
    pub store: Arc<dyn ObjectStore>,
    pub endpoints: Mutex<Vec<String>>,
}

impl StaticConnector {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            endpoints: Mutex::new(Vec::new()),
        }
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().unwrap().clone()
    }
}

#[async_trait]
impl StoreConnector for StaticConnector {
    async fn connect(
        &self,
        _credential: &TemporaryCredential,
        endpoint: &str,
    ) -> Result<Arc<dyn ObjectStore>, StorageError> {
        self.endpoints.lock().unwrap().push(endpoint.to_string());
        Ok(self.store.clone())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<(String, ProgressEvent)>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn statuses(&self) -> Vec<TransferState> {
        self.events().iter().map(|e| e.status).collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, event: &ProgressEvent) -> Result<(), ProgressChannelError> {
        self.events
            .lock()
            .unwrap()
            .push((topic.to_string(), event.clone()));
        Ok(())
    }
}

pub struct FailingPublisher;

#[async_trait]
impl Publisher for FailingPublisher {
    async fn publish(&self, topic: &str, _event: &ProgressEvent) -> Result<(), ProgressChannelError> {
        Err(ProgressChannelError::Unavailable(topic.to_string()))
    }
}

pub fn test_config(staging_dir: PathBuf) -> StorageConfig {
    StorageConfig {
        chunk_size: 100,
        staging_dir: Some(staging_dir),
        ..StorageConfig::development()
    }
}

pub fn gateway_with(
    config: StorageConfig,
    store: Arc<dyn ObjectStore>,
    endpoint_host: &str,
) -> (StorageGateway, Arc<FakeCredentialSource>, Arc<StaticConnector>) {
    let credentials = Arc::new(FakeCredentialSource::new(endpoint_host));
    let connector = Arc::new(StaticConnector::new(store));
    let gateway = StorageGateway::new(config, credentials.clone(), connector.clone());
    (gateway, credentials, connector)
}

pub fn staged_files(dir: &std::path::Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

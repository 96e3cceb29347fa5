use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use sha1::Sha1;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::models::{OperationKind, TemporaryCredential, UploadScope};

type HmacSha1 = Hmac<Sha1>;

/// Anything that can hand out a fresh credential for one object path.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn issue(
        &self,
        object_path: &str,
        kind: OperationKind,
    ) -> Result<TemporaryCredential, StorageError>;
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    channel: &'a str,
    scopes: Vec<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    code: i64,
    msg: Option<String>,
    data: Option<TokenData>,
}

#[derive(Deserialize)]
struct TokenData {
    #[serde(rename = "Credentials")]
    credentials: Option<RawCredentials>,
    #[serde(rename = "ExpiredAt")]
    expired_at: Option<i64>,
    #[serde(rename = "Buckets")]
    buckets: Option<Vec<RawBucket>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCredentials {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    session_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBucket {
    s3_bucket: Option<String>,
    s3_endpoint_host: Option<String>,
}

/// Compact JSON body for a single-scope token request.
pub fn build_request_body(scope: &UploadScope, kind: OperationKind) -> Result<String, StorageError> {
    let request = TokenRequest {
        channel: kind.channel(),
        scopes: vec![scope.to_string()],
    };
    serde_json::to_string(&request).map_err(|e| StorageError::CredentialIssuance(e.to_string()))
}

/// Lowercase hex HMAC-SHA1 over `api_path + "\n" + body`.
pub fn sign_request(secret_key: &str, api_path: &str, body: &str) -> Result<String, StorageError> {
    let mut mac = HmacSha1::new_from_slice(secret_key.as_bytes())
        .map_err(|e| StorageError::CredentialIssuance(format!("HMAC init failed: {}", e)))?;
    mac.update(api_path.as_bytes());
    mac.update(b"\n");
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn authorization_header(access_key: &str, signature: &str) -> String {
    format!("TOKEN {}:{}", access_key, signature)
}

/// Turns the provider's response text into a complete credential, or fails.
pub fn parse_token_response(text: &str) -> Result<TemporaryCredential, StorageError> {
    let response: TokenResponse = serde_json::from_str(text).map_err(|e| {
        StorageError::CredentialIssuance(format!("malformed token response: {}", e))
    })?;

    if response.code != 200 {
        return Err(StorageError::CredentialIssuance(format!(
            "provider returned code {}: {}",
            response.code,
            response.msg.unwrap_or_default()
        )));
    }

    let data = response
        .data
        .ok_or(StorageError::IncompleteCredential("data"))?;
    let credentials = data
        .credentials
        .ok_or(StorageError::IncompleteCredential("data.Credentials"))?;
    let access_key_id = credentials
        .access_key_id
        .ok_or(StorageError::IncompleteCredential("Credentials.accessKeyId"))?;
    let secret_access_key = credentials
        .secret_access_key
        .ok_or(StorageError::IncompleteCredential("Credentials.secretAccessKey"))?;
    let session_token = credentials
        .session_token
        .ok_or(StorageError::IncompleteCredential("Credentials.sessionToken"))?;
    let expired_at = data
        .expired_at
        .ok_or(StorageError::IncompleteCredential("data.ExpiredAt"))?;
    let expires_at = DateTime::<Utc>::from_timestamp(expired_at, 0)
        .ok_or(StorageError::IncompleteCredential("data.ExpiredAt"))?;

    let bucket = data
        .buckets
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or(StorageError::IncompleteCredential("data.Buckets[0]"))?;
    let bucket_id = bucket
        .s3_bucket
        .ok_or(StorageError::IncompleteCredential("Buckets[0].s3Bucket"))?;
    let endpoint_host = bucket
        .s3_endpoint_host
        .ok_or(StorageError::IncompleteCredential("Buckets[0].s3EndpointHost"))?;

    Ok(TemporaryCredential {
        access_key_id,
        secret_access_key,
        session_token,
        expires_at,
        bucket_id,
        endpoint_host,
    })
}

/// Exchanges signed single-path scopes for temporary storage credentials.
pub struct CredentialBroker {
    http: reqwest::Client,
    access_key: String,
    secret_key: String,
    bucket: String,
    api_path: String,
    endpoint: String,
}

impl CredentialBroker {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StorageError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            bucket: config.bucket.clone(),
            api_path: config.token_api_path.clone(),
            endpoint: config.token_endpoint(),
        })
    }

    pub fn scope_for(&self, object_path: &str) -> Result<UploadScope, StorageError> {
        UploadScope::new(&self.bucket, object_path)
    }
}

#[async_trait]
impl CredentialSource for CredentialBroker {
    async fn issue(
        &self,
        object_path: &str,
        kind: OperationKind,
    ) -> Result<TemporaryCredential, StorageError> {
        let scope = self.scope_for(object_path)?;
        let body = build_request_body(&scope, kind)?;
        let signature = sign_request(&self.secret_key, &self.api_path, &body)?;

        tracing::info!(
            "Requesting {} credential for scope {}",
            kind.channel(),
            scope
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, authorization_header(&self.access_key, &signature))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Token request to {} failed: {}", self.endpoint, e);
                StorageError::CredentialIssuance(e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StorageError::CredentialIssuance(e.to_string()))?;
        tracing::debug!("Token API answered HTTP {}", status);

        let credential = parse_token_response(&text).inspect_err(|e| {
            tracing::error!("Credential issuance for {} failed: {}", scope, e);
        })?;

        tracing::info!(
            "Issued credential for {} (bucket {}, endpoint {}, expires {})",
            scope,
            credential.bucket_id,
            credential.endpoint_host,
            credential.expires_at
        );
        Ok(credential)
    }
}

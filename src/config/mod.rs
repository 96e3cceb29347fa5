use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::StorageError;

/// Object storage configuration
#[derive(Clone)]
pub struct StorageConfig {
    /// Long-lived access key used only to sign temporary-credential requests
    pub access_key: String,

    /// Long-lived secret key (HMAC-SHA1 signing key)
    pub secret_key: String,

    /// Logical bucket name used in scopes
    pub bucket: String,

    /// Base URL of the temporary-credential API (default: "https://api.dogecloud.com")
    pub api_base_url: String,

    /// Path of the temporary-token endpoint, also part of the signed string
    pub token_api_path: String,

    /// Operator domain that replaces the provider endpoint in object URLs
    pub custom_domain: Option<String>,

    /// Upload URL handed to clients when no custom domain is set
    pub upload_url: Option<String>,

    /// SigV4 region for the S3-compatible endpoint (default: "automatic")
    pub region: String,

    pub force_path_style: bool,

    /// Vendor domains known to come back duplicated or bucket-prefixed
    pub vendor_domains: Vec<String>,

    /// Prefix for generated object paths (default: "images/")
    pub default_prefix: String,

    /// Advertised to clients in upload targets; not enforced here
    pub allowed_types: String,

    /// Advertised to clients in upload targets; not enforced here (default: 10 MB)
    pub max_file_size: u64,

    /// Read size for progress-instrumented uploads (default: 8 KB)
    pub chunk_size: usize,

    /// Bound on the credential exchange (default: 10s)
    pub request_timeout: Duration,

    /// Bound on a single put or batch delete (default: 120s)
    pub transfer_timeout: Duration,

    /// Directory for staging files (default: system temp dir)
    pub staging_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            bucket: String::new(),
            api_base_url: "https://api.dogecloud.com".to_string(),
            token_api_path: "/auth/tmp_token.json".to_string(),
            custom_domain: None,
            upload_url: None,
            region: "automatic".to_string(),
            force_path_style: false,
            vendor_domains: vec!["cos.ap-chengdu.myqcloud.com".to_string()],
            default_prefix: "images/".to_string(),
            allowed_types: "image/jpeg,image/png,image/gif,image/webp".to_string(),
            max_file_size: 10 * 1024 * 1024, // 10 MB
            chunk_size: 8 * 1024,            // 8 KB
            request_timeout: Duration::from_secs(10),
            transfer_timeout: Duration::from_secs(120),
            staging_dir: None,
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("api_base_url", &self.api_base_url)
            .field("token_api_path", &self.token_api_path)
            .field("custom_domain", &self.custom_domain)
            .field("upload_url", &self.upload_url)
            .field("region", &self.region)
            .field("force_path_style", &self.force_path_style)
            .field("vendor_domains", &self.vendor_domains)
            .field("default_prefix", &self.default_prefix)
            .field("max_file_size", &self.max_file_size)
            .field("chunk_size", &self.chunk_size)
            .field("request_timeout", &self.request_timeout)
            .field("transfer_timeout", &self.transfer_timeout)
            .field("staging_dir", &self.staging_dir)
            .finish_non_exhaustive()
    }
}

impl StorageConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, StorageError> {
        let default = Self::default();

        Ok(Self {
            access_key: required("STORAGE_ACCESS_KEY")?,
            secret_key: required("STORAGE_SECRET_KEY")?,
            bucket: required("STORAGE_BUCKET")?,

            api_base_url: env::var("STORAGE_API_BASE_URL").unwrap_or(default.api_base_url),

            token_api_path: env::var("STORAGE_TOKEN_API_PATH")
                .unwrap_or(default.token_api_path),

            custom_domain: non_empty("STORAGE_CUSTOM_DOMAIN"),
            upload_url: non_empty("STORAGE_UPLOAD_URL"),

            region: env::var("STORAGE_REGION").unwrap_or(default.region),

            force_path_style: env::var("STORAGE_FORCE_PATH_STYLE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.force_path_style),

            vendor_domains: env::var("STORAGE_VENDOR_DOMAINS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(default.vendor_domains),

            default_prefix: env::var("STORAGE_DEFAULT_PREFIX").unwrap_or(default.default_prefix),

            allowed_types: env::var("STORAGE_ALLOWED_TYPES").unwrap_or(default.allowed_types),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            chunk_size: env::var("CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(default.chunk_size),

            request_timeout: env::var("STORAGE_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.request_timeout),

            transfer_timeout: env::var("STORAGE_TRANSFER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.transfer_timeout),

            staging_dir: env::var("STORAGE_STAGING_DIR").ok().map(PathBuf::from),
        })
    }

    /// Config for local runs and tests (dummy keys, short timeouts)
    pub fn development() -> Self {
        Self {
            access_key: "dev-access-key".to_string(),
            secret_key: "dev-secret-key".to_string(),
            bucket: "blog-media".to_string(),
            request_timeout: Duration::from_secs(5),
            transfer_timeout: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Full URL of the temporary-token endpoint.
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}{}",
            self.api_base_url.trim_end_matches('/'),
            self.token_api_path
        )
    }
}

fn required(key: &str) -> Result<String, StorageError> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(StorageError::Config(format!("{} must be set", key))),
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

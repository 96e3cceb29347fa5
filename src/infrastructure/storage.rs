use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::services::gateway::StorageGateway;
use std::sync::Arc;
use tracing::info;

pub fn setup_gateway() -> Result<Arc<StorageGateway>, StorageError> {
    let config = StorageConfig::from_env()?;

    info!(
        "☁️  Object Storage: bucket={}, token API={}",
        config.bucket,
        config.token_endpoint()
    );
    if let Some(domain) = &config.custom_domain {
        info!("🌐 Custom domain: {}", domain);
    }
    info!(
        "⏱️  Timeouts: credential={:?}, transfer={:?}",
        config.request_timeout, config.transfer_timeout
    );

    Ok(Arc::new(StorageGateway::from_config(config)?))
}

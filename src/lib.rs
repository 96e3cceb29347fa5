pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

pub use config::StorageConfig;
pub use error::{ProgressChannelError, StorageError};
pub use services::gateway::{StorageGateway, UploadTarget};
pub use services::progress::{ProgressReporter, Publisher};

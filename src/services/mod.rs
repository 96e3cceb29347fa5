pub mod credentials;
pub mod deletion;
pub mod endpoint;
pub mod gateway;
pub mod progress;
pub mod session;
pub mod storage;
pub mod upload;

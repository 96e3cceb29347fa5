use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::ProgressChannelError;
use crate::models::{ProgressEvent, TransferState};
use crate::utils::paths::format_file_size;

/// Delivery of progress events to whatever live-update transport the host
/// application runs. Failures are reported back but never fail a transfer.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, event: &ProgressEvent)
    -> Result<(), ProgressChannelError>;
}

/// How long one publish may take before the event is dropped.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// Topic carrying progress for everything `username` uploads.
pub fn progress_topic(username: &str) -> String {
    format!("/topic/upload-progress/{}", username)
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressMessage {
    pub topic: String,
    pub event: ProgressEvent,
}

/// In-process fan-out over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<ProgressMessage>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressMessage> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Publisher for BroadcastPublisher {
    async fn publish(
        &self,
        topic: &str,
        event: &ProgressEvent,
    ) -> Result<(), ProgressChannelError> {
        self.sender
            .send(ProgressMessage {
                topic: topic.to_string(),
                event: event.clone(),
            })
            .map(|_| ())
            .map_err(|_| ProgressChannelError::NoSubscribers(topic.to_string()))
    }
}

/// Writes every event to the log as JSON. Used by the CLI.
pub struct TracingPublisher;

#[async_trait]
impl Publisher for TracingPublisher {
    async fn publish(
        &self,
        topic: &str,
        event: &ProgressEvent,
    ) -> Result<(), ProgressChannelError> {
        let body = serde_json::to_string(event)?;
        tracing::info!(target: "upload_progress", "{} {}", topic, body);
        Ok(())
    }
}

/// Progress state machine for exactly one transfer.
///
/// Owned by the task running the transfer; all mutation goes through `&mut self`.
pub struct ProgressReporter {
    publisher: Arc<dyn Publisher>,
    topic: String,
    transfer_id: String,
    filename: String,
    total_bytes: u64,
    bytes_transferred: u64,
    state: TransferState,
    last_logged_step: u64,
    publish_timeout: Duration,
}

impl ProgressReporter {
    /// Creates the reporter and emits `STARTED`.
    pub async fn start(
        publisher: Arc<dyn Publisher>,
        filename: impl Into<String>,
        username: &str,
    ) -> Self {
        Self::start_with_timeout(publisher, filename, username, DEFAULT_PUBLISH_TIMEOUT).await
    }

    /// Like [`ProgressReporter::start`], with a custom bound on each publish.
    pub async fn start_with_timeout(
        publisher: Arc<dyn Publisher>,
        filename: impl Into<String>,
        username: &str,
        publish_timeout: Duration,
    ) -> Self {
        let reporter = Self {
            publisher,
            topic: progress_topic(username),
            transfer_id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            total_bytes: 0,
            bytes_transferred: 0,
            state: TransferState::Started,
            last_logged_step: 0,
            publish_timeout,
        };
        reporter.emit(None).await;
        reporter
    }

    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_transferred as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }

    /// `STARTED -> INITIATED`.
    pub async fn set_total_bytes(&mut self, total_bytes: u64) -> bool {
        if !self.advance(TransferState::Initiated) {
            return false;
        }
        self.total_bytes = total_bytes;
        tracing::info!(
            "[upload progress] starting {} (transfer {}), total {}",
            self.filename,
            self.transfer_id,
            format_file_size(total_bytes)
        );
        self.emit(None).await;
        true
    }

    /// Adds one chunk. Reaching 100% does not complete the transfer.
    pub async fn record_bytes(&mut self, chunk: u64) -> bool {
        if !self.advance(TransferState::InProgress) {
            return false;
        }
        self.bytes_transferred += chunk;

        // roughly every 5% of the total
        let step = (self.total_bytes / 20).max(1);
        let current_step = self.bytes_transferred / step;
        if current_step > self.last_logged_step {
            self.last_logged_step = current_step;
            tracing::info!(
                "[upload progress] {}: {} of {} ({:.1}%)",
                self.filename,
                format_file_size(self.bytes_transferred),
                format_file_size(self.total_bytes),
                self.percentage()
            );
        }

        self.emit(None).await;
        true
    }

    /// Declared by the executor once the store has confirmed the write.
    pub async fn complete(&mut self) -> bool {
        if !self.advance(TransferState::Completed) {
            return false;
        }
        tracing::info!(
            "[upload progress] {} completed, {} (transfer {})",
            self.filename,
            format_file_size(self.total_bytes),
            self.transfer_id
        );
        self.emit(None).await;
        true
    }

    pub async fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.advance(TransferState::Failed) {
            return false;
        }
        let message = message.into();
        tracing::error!(
            "[upload progress] {} failed at {} ({:.1}%), transfer {}: {}",
            self.filename,
            format_file_size(self.bytes_transferred),
            self.percentage(),
            self.transfer_id,
            message
        );
        self.emit(Some(message)).await;
        true
    }

    pub fn snapshot(&self, error_message: Option<String>) -> ProgressEvent {
        ProgressEvent {
            transfer_id: self.transfer_id.clone(),
            filename: self.filename.clone(),
            bytes_transferred: self.bytes_transferred as i64,
            total_bytes: self.total_bytes as i64,
            percentage: self.percentage(),
            status: self.state,
            error_message,
        }
    }

    fn advance(&mut self, next: TransferState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            tracing::warn!(
                "Ignoring transition {} -> {} for transfer {}",
                self.state,
                next,
                self.transfer_id
            );
            false
        }
    }

    async fn emit(&self, error_message: Option<String>) {
        let event = self.snapshot(error_message);
        let delivery = tokio::time::timeout(
            self.publish_timeout,
            self.publisher.publish(&self.topic, &event),
        )
        .await;
        match delivery {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                "Progress event {} for transfer {} not delivered: {}",
                event.status,
                self.transfer_id,
                e
            ),
            Err(_) => tracing::warn!(
                "Progress event {} for transfer {} dropped after {:?}",
                event.status,
                self.transfer_id,
                self.publish_timeout
            ),
        }
    }
}

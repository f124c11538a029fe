//! Segment-style batching telemetry client
//!
//! Events are queued on a bounded channel and delivered by a background task
//! that POSTs batches every [`FLUSH_INTERVAL`] and once more when the client
//! is flushed. Delivery failures are logged and dropped. Every request and
//! the final drain are bounded in time, so an unresponsive endpoint cannot
//! hold up the step.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::event::TrackEvent;
use super::{TelemetryError, TelemetrySink};

pub const DEFAULT_ENDPOINT: &str = "https://api.segment.io/v1/batch";

const FLUSH_INTERVAL: Duration = Duration::from_millis(500);
const QUEUE_CAPACITY: usize = 1000;

/// Per-request deadline for batch delivery
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SegmentClient {
    sender: Option<mpsc::Sender<TrackEvent>>,
    worker: Option<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl SegmentClient {
    /// Must be called from within a Tokio runtime
    pub fn new(write_key: impl Into<String>) -> Self {
        Self::with_endpoint(write_key, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(write_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::with_timeout(write_key, endpoint, REQUEST_TIMEOUT)
    }

    /// Client whose requests give up after `timeout`. `flush` waits at most
    /// twice that for the queue to drain.
    pub fn with_timeout(
        write_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to build telemetry HTTP client, using defaults");
                reqwest::Client::new()
            });

        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let worker = tokio::spawn(deliver(client, endpoint.into(), write_key.into(), receiver));
        Self {
            sender: Some(sender),
            worker: Some(worker),
            drain_timeout: timeout * 2,
        }
    }
}

#[async_trait]
impl TelemetrySink for SegmentClient {
    async fn enqueue(&self, event: TrackEvent) -> Result<(), TelemetryError> {
        let sender = self.sender.as_ref().ok_or(TelemetryError::Closed)?;
        sender.send(event).await.map_err(|_| TelemetryError::Closed)
    }

    async fn flush(&mut self) {
        drop(self.sender.take());
        if let Some(mut worker) = self.worker.take() {
            match tokio::time::timeout(self.drain_timeout, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Telemetry worker stopped unexpectedly"),
                Err(_) => {
                    worker.abort();
                    error!(
                        timeout_ms = self.drain_timeout.as_millis() as u64,
                        error.type = "timeout",
                        "Telemetry flush timed out, dropping undelivered events"
                    );
                }
            }
        }
    }
}

async fn deliver(
    client: reqwest::Client,
    endpoint: String,
    write_key: String,
    mut receiver: mpsc::Receiver<TrackEvent>,
) {
    let mut buffer = Vec::new();
    let mut interval = tokio::time::interval(FLUSH_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if !buffer.is_empty() {
                    let events = std::mem::take(&mut buffer);
                    send_batch(&client, &endpoint, &write_key, events).await;
                }
            }
            event = receiver.recv() => {
                match event {
                    Some(e) => buffer.push(e),
                    None => {
                        if !buffer.is_empty() {
                            send_batch(&client, &endpoint, &write_key, buffer).await;
                        }
                        break;
                    }
                }
            }
        }
    }
}

/// Request body for a batch of `track` calls
pub fn batch_payload(events: &[TrackEvent]) -> serde_json::Value {
    let batch: Vec<_> = events
        .iter()
        .map(|e| {
            serde_json::json!({
                "type": "track",
                "messageId": uuid::Uuid::new_v4().to_string(),
                "userId": e.user_id,
                "event": e.event,
                "properties": e.properties,
                "timestamp": e.timestamp.to_rfc3339(),
            })
        })
        .collect();
    serde_json::json!({ "batch": batch })
}

#[tracing::instrument(skip(client, write_key, events), fields(event_count = events.len()))]
async fn send_batch(
    client: &reqwest::Client,
    endpoint: &str,
    write_key: &str,
    events: Vec<TrackEvent>,
) {
    let resp = client
        .post(endpoint)
        .basic_auth(write_key, None::<&str>)
        .json(&batch_payload(&events))
        .send()
        .await;

    match resp {
        Ok(r) if r.status().is_success() => debug!("Telemetry batch delivered"),
        Ok(r) => {
            error!(
                status = %r.status(),
                error.type = "http_error",
                "Failed to deliver telemetry events"
            );
        }
        Err(e) => {
            error!(
                error = %e,
                error.type = "connection_error",
                "Failed to connect to telemetry endpoint"
            );
        }
    }
}

//! Per-test telemetry
//!
//! - `event` - TrackEvent and its properties
//! - `segment` - Batching HTTP client
//!
//! Telemetry is a side channel: it is only enabled when both a write key and
//! a parent URL are configured, and delivery problems never change a run's
//! verdict.

pub mod event;
pub mod segment;

use async_trait::async_trait;

pub use event::{EventProperties, EventStatus, TrackEvent, CI_FINISHED_EVENT, UNIFIED_CI_APP_ID};
pub use segment::{batch_payload, SegmentClient, DEFAULT_ENDPOINT};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Telemetry client is closed")]
    Closed,
}

/// Enqueue/flush capability the orchestrator reports through
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Queue one event; blocks only until the event is queued
    async fn enqueue(&self, event: TrackEvent) -> Result<(), TelemetryError>;

    /// Deliver everything queued and release the client
    async fn flush(&mut self);
}

/// Telemetry settings; both values are required for telemetry to run
#[derive(Debug, Clone, Default)]
pub struct TelemetrySettings {
    pub write_key: Option<String>,
    pub parent_url: Option<String>,
    pub endpoint: Option<String>,
}

impl TelemetrySettings {
    pub fn is_enabled(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.write_key) && present(&self.parent_url)
    }

    /// Build a client when enabled. Must be called from within a Tokio runtime.
    pub fn client(&self) -> Option<(Box<dyn TelemetrySink>, String)> {
        if !self.is_enabled() {
            return None;
        }
        let write_key = self.write_key.clone()?;
        let parent_url = self.parent_url.clone()?;
        let endpoint = self
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let client: Box<dyn TelemetrySink> =
            Box::new(SegmentClient::with_endpoint(write_key, endpoint));
        Some((client, parent_url))
    }
}

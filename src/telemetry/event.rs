//! Telemetry event model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::result::TestOutcome;

/// Subject the step reports as
pub const UNIFIED_CI_APP_ID: &str = "48fa8fbee698622c";

pub const CI_FINISHED_EVENT: &str = "ci_finished";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventProperties {
    pub workflow: String,
    pub status: EventStatus,
    pub parent_url: String,
    /// Milliseconds
    pub duration: u64,
}

/// One `track` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    pub user_id: String,
    pub event: String,
    pub properties: EventProperties,
    pub timestamp: DateTime<Utc>,
}

impl TrackEvent {
    /// Event reported after each test workflow completes
    pub fn ci_finished(outcome: &TestOutcome, parent_url: &str) -> Self {
        Self {
            user_id: UNIFIED_CI_APP_ID.to_string(),
            event: CI_FINISHED_EVENT.to_string(),
            properties: EventProperties {
                workflow: outcome.workflow.clone(),
                status: if outcome.success {
                    EventStatus::Success
                } else {
                    EventStatus::Error
                },
                parent_url: parent_url.to_string(),
                duration: outcome.duration_ms(),
            },
            timestamp: Utc::now(),
        }
    }
}

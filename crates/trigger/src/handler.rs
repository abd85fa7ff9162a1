//! Invocation envelope of the trigger

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::trigger::JobTrigger;

/// Result of one trigger invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub status_code: u16,
    pub body: String,
}

impl TriggerResponse {
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Invoke the trigger and fold the outcome into a response envelope
pub async fn handle_invocation(trigger: &JobTrigger) -> TriggerResponse {
    match trigger.invoke().await {
        Ok(ack) => {
            let body = match ack.final_status {
                Some(status) => format!("Mirror run {} completed: {}", ack.run_id, status),
                None => format!("Mirror run started: {}", ack.run_id),
            };
            TriggerResponse {
                status_code: 200,
                body,
            }
        }
        Err(e) => {
            error!("Trigger invocation failed: {}", e);
            TriggerResponse {
                status_code: 500,
                body: format!("Error during mirror run: {}", e),
            }
        }
    }
}

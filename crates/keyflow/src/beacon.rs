//! Best-effort transport for abrupt teardown.
//!
//! When the pipeline is torn down without a graceful shutdown there is no
//! opportunity to await a delivery or classify its outcome. The beacon fires
//! whatever remains buffered on a detached task and forgets about it: it
//! must not block the caller, must not wait for a response, and carries only
//! the authorization context that is available synchronously.

use std::time::Duration;

use tracing::debug;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::event::{TelemetryBatch, TelemetryEvent};

/// Timeout for the detached beacon request. Short on purpose: if the
/// backend cannot be reached quickly during teardown, the events are lost
/// anyway (the cache path belongs to classified flushes, not the beacon).
const BEACON_TIMEOUT: Duration = Duration::from_secs(3);

/// Fire-and-forget transport used by the teardown guard.
///
/// Contract: `fire` returns immediately, the delivery happens (or fails)
/// unobserved in the background, and failures are never retried.
pub trait BestEffortTransport: Send + Sync {
    /// Fire the remaining events for a session without awaiting a result.
    fn fire(&self, session_id: &str, events: Vec<TelemetryEvent>);
}

/// HTTP beacon that posts the final batch on a detached tokio task.
#[derive(Debug, Clone)]
pub struct HttpBeacon {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpBeacon {
    /// Build a beacon from ingest configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(BEACON_TIMEOUT)
            .build()
            .map_err(|e| Error::internal(format!("failed to build beacon client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }
}

impl BestEffortTransport for HttpBeacon {
    fn fire(&self, session_id: &str, events: Vec<TelemetryEvent>) {
        if events.is_empty() {
            return;
        }

        let url = format!("{}/sessions/{}/telemetry", self.base_url, session_id);
        let client = self.client.clone();
        let token = self.auth_token.clone();
        let count = events.len();

        debug!(count, "firing teardown beacon");
        tokio::spawn(async move {
            let mut request = client.post(url).json(&TelemetryBatch::new(events));
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            // Outcome is unobservable by design.
            let _ = request.send().await;
        });
    }
}

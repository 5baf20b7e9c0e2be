//! Batch delivery to the session-scoped ingest endpoint.
//!
//! The delivery client ships a drained batch and classifies the result into
//! one of three outcomes. Classification matters: a transient failure is
//! cached for later retry, while a session-gone failure is dropped outright.
//! Conflating the two would accumulate an undeliverable poison pile in the
//! failure cache.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::FailureCache;
use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::event::TelemetryEvent;

/// Largest batch the ingest endpoint accepts in one request. Anything
/// bigger is rejected outright, so both the flush policy and the cache
/// drain must stay at or under this.
pub const INGEST_BATCH_LIMIT: usize = 100;

/// The classified result of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The ingest endpoint accepted the batch.
    Delivered,
    /// The backend reports the session is unknown or access is denied.
    /// Permanent: retrying can never succeed, so the batch is dropped.
    SessionGone,
    /// Network failure, server error, or timeout. Retrying may succeed, so
    /// the batch is merged into the failure cache.
    Transient(String),
}

impl DeliveryOutcome {
    /// Check if the batch was accepted.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Check if the failure is permanent (session gone).
    #[must_use]
    pub fn is_session_gone(&self) -> bool {
        matches!(self, Self::SessionGone)
    }

    /// Check if the failure is transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A transport that can ship a batch of events for a session.
///
/// The pipeline only depends on this trait; the HTTP implementation below is
/// the production transport, and tests substitute scripted ones.
#[async_trait]
pub trait IngestTransport: Send + Sync {
    /// Deliver a batch of events for the given session and classify the
    /// result. Never returns an error: every failure mode maps onto a
    /// [`DeliveryOutcome`] variant.
    async fn send_batch(&self, session_id: &str, events: &[TelemetryEvent]) -> DeliveryOutcome;
}

/// Borrowed wire payload, avoids cloning the batch for serialization.
#[derive(Serialize)]
struct BatchRef<'a> {
    events: &'a [TelemetryEvent],
}

/// HTTP delivery client for the ingest endpoint.
#[derive(Debug, Clone)]
pub struct HttpIngest {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpIngest {
    /// Build an HTTP delivery client from ingest configuration.
    ///
    /// The request timeout from the configuration applies to every delivery
    /// attempt; a timed-out request classifies as transient.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    /// The ingest URL for a session.
    #[must_use]
    pub fn endpoint(&self, session_id: &str) -> String {
        format!("{}/sessions/{}/telemetry", self.base_url, session_id)
    }
}

/// Map an HTTP response status onto a delivery outcome.
///
/// 2xx is success. 401/403/404 all mean "this session cannot be delivered
/// to" (the endpoint answers 404 for both unknown and foreign sessions).
/// Everything else is worth retrying.
#[must_use]
pub fn classify_status(status: StatusCode) -> DeliveryOutcome {
    if status.is_success() {
        return DeliveryOutcome::Delivered;
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            DeliveryOutcome::SessionGone
        }
        other => DeliveryOutcome::Transient(format!("ingest returned {other}")),
    }
}

/// Result of a cache drain attempt.
#[derive(Debug)]
pub struct DrainReport {
    /// Events delivered and removed from the cache.
    pub delivered: usize,
    /// Events still cached after the attempt.
    pub remaining: usize,
    /// The outcome that stopped the drain early, if it did not complete.
    pub halted_by: Option<DeliveryOutcome>,
}

/// Redeliver the failure cache to a session in chunks.
///
/// The cache can hold more events than the ingest endpoint accepts in one
/// request (several failed batches accumulate), so the slot is delivered in
/// chunks of at most `chunk_limit` events, capped at [`INGEST_BATCH_LIMIT`].
/// After each delivered chunk the slot is truncated to the undelivered
/// tail, so an interrupted drain never redelivers. The first non-success
/// outcome stops the drain and leaves the tail cached.
///
/// # Errors
///
/// Returns an error if the cache cannot be read or written.
pub async fn drain_cache(
    transport: &dyn IngestTransport,
    cache: &FailureCache,
    session_id: &str,
    chunk_limit: usize,
) -> Result<DrainReport> {
    let events = cache.load()?;
    if events.is_empty() {
        return Ok(DrainReport {
            delivered: 0,
            remaining: 0,
            halted_by: None,
        });
    }

    let chunk_limit = chunk_limit.clamp(1, INGEST_BATCH_LIMIT);
    let mut delivered = 0;
    let mut halted_by = None;

    for chunk in events.chunks(chunk_limit) {
        match transport.send_batch(session_id, chunk).await {
            DeliveryOutcome::Delivered => {
                delivered += chunk.len();
                cache.replace(&events[delivered..])?;
                debug!(
                    delivered,
                    remaining = events.len() - delivered,
                    "drained cache chunk"
                );
            }
            outcome => {
                halted_by = Some(outcome);
                break;
            }
        }
    }

    info!(
        delivered,
        remaining = events.len() - delivered,
        halted = halted_by.is_some(),
        "cache drain finished"
    );
    Ok(DrainReport {
        delivered,
        remaining: events.len() - delivered,
        halted_by,
    })
}

#[async_trait]
impl IngestTransport for HttpIngest {
    async fn send_batch(&self, session_id: &str, events: &[TelemetryEvent]) -> DeliveryOutcome {
        let mut request = self
            .client
            .post(self.endpoint(session_id))
            .json(&BatchRef { events });

        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => classify_status(response.status()),
            Err(err) if err.is_timeout() => {
                DeliveryOutcome::Transient("ingest request timed out".to_string())
            }
            Err(err) => DeliveryOutcome::Transient(err.to_string()),
        }
    }
}

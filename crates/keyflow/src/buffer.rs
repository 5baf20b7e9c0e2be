//! In-memory event buffer bound to the active session.
//!
//! The buffer is an ordered, append-only list of telemetry events with no
//! deduplication or reordering. It owns the session binding: with no session
//! bound, every add is a no-op and the pipeline as a whole is inert.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::event::{EventType, TelemetryEvent};
use crate::finger::FingerPosition;

/// The session the pipeline is currently capturing for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBinding {
    /// Opaque session identifier understood by the ingest endpoint.
    pub id: String,
    /// Absolute time base used to compute event offsets.
    pub started_at: DateTime<Utc>,
}

/// Ordered in-memory buffer of telemetry events for the active session.
#[derive(Debug, Default)]
pub struct EventBuffer {
    session: Option<SessionBinding>,
    events: Vec<TelemetryEvent>,
}

impl EventBuffer {
    /// Create an empty, unbound buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the buffer to a session, discarding anything buffered for a
    /// previous session.
    pub fn bind(&mut self, session_id: impl Into<String>, started_at: DateTime<Utc>) {
        self.events.clear();
        self.session = Some(SessionBinding {
            id: session_id.into(),
            started_at,
        });
    }

    /// Unbind the buffer, returning it to the inert state and discarding
    /// buffered events.
    pub fn unbind(&mut self) {
        self.events.clear();
        self.session = None;
    }

    /// Get the bound session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&SessionBinding> {
        self.session.as_ref()
    }

    /// Get the bound session id, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    /// Append a keystroke event to the buffer.
    ///
    /// With no session bound this is a no-op and returns `Ok(None)`. The
    /// event's offset is computed from `timestamp` (or now) minus the
    /// session start; fingers are classified here.
    ///
    /// Returns the new buffer length so the caller can consult the flush
    /// scheduler's size trigger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEvent`] if the computed offset is negative.
    /// The event is discarded and the buffer is untouched.
    pub fn add(
        &mut self,
        event_type: EventType,
        key_code: &str,
        is_error: bool,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Option<usize>> {
        let Some(session) = &self.session else {
            return Ok(None);
        };

        let at = timestamp.unwrap_or_else(Utc::now);
        let offset_ms = (at - session.started_at).num_milliseconds();
        if offset_ms < 0 {
            return Err(Error::invalid_event(key_code, offset_ms));
        }

        self.events.push(TelemetryEvent {
            event_type,
            key_code: key_code.to_string(),
            timestamp_offset: offset_ms,
            finger_used: FingerPosition::for_key_code(key_code),
            is_error,
        });

        Ok(Some(self.events.len()))
    }

    /// Drain the buffer, returning all events in enqueue order.
    ///
    /// The buffer is empty the moment this returns; draining before any
    /// delivery begins is what keeps an in-flight batch from racing with
    /// newly arriving events.
    pub fn drain(&mut self) -> Vec<TelemetryEvent> {
        std::mem::take(&mut self.events)
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

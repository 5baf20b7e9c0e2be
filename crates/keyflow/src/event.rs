//! Core telemetry event types for keyflow.
//!
//! This module defines the value types that flow through the capture
//! pipeline and over the wire to the ingest endpoint.

use serde::{Deserialize, Serialize};

use crate::finger::FingerPosition;

/// The key-press phase that produced this event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Key pressed.
    Down,
    /// Key released.
    Up,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Down => write!(f, "DOWN"),
            Self::Up => write!(f, "UP"),
        }
    }
}

/// A single captured keystroke event.
///
/// Immutable once created; the `timestamp_offset` invariant (finite,
/// non-negative) is enforced at construction by [`crate::buffer::EventBuffer`],
/// which never admits an event with a negative offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Key-press phase: DOWN or UP.
    pub event_type: EventType,

    /// Physical key identifier (`KeyboardEvent.code` style, e.g. `KeyA`).
    pub key_code: String,

    /// Milliseconds elapsed since the session started. Always >= 0.
    pub timestamp_offset: i64,

    /// Which finger was used for this key.
    pub finger_used: FingerPosition,

    /// True if this keystroke was incorrect in exercise context.
    pub is_error: bool,
}

/// Wire payload for a batch of telemetry events.
///
/// Order is preserved end-to-end: enqueue order equals send order. The
/// ingest endpoint caps batches at 100 events; the pipeline's size trigger
/// (50 by default) keeps batches well under that cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryBatch {
    /// The events, in enqueue order.
    pub events: Vec<TelemetryEvent>,
}

impl TelemetryBatch {
    /// Wrap a drained buffer into a wire payload.
    #[must_use]
    pub fn new(events: Vec<TelemetryEvent>) -> Self {
        Self { events }
    }

    /// Number of events in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

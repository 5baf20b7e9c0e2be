//! `keyflow` - keystroke telemetry capture and delivery for typing practice
//!
//! This library buffers classified keystroke events during a timed typing
//! exercise and delivers them in batches to a session-scoped ingest
//! endpoint. Batches flush when the buffer reaches a size threshold or
//! after an inactivity timeout; transiently failed batches persist in a
//! local failure cache, and a best-effort beacon ships whatever remains
//! when the pipeline is torn down abruptly.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod beacon;
pub mod buffer;
pub mod cache;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod event;
pub mod finger;
pub mod logging;
pub mod pipeline;
pub mod scheduler;

pub use buffer::EventBuffer;
pub use cache::FailureCache;
pub use config::Config;
pub use delivery::{drain_cache, DeliveryOutcome, DrainReport, HttpIngest, IngestTransport};
pub use error::{Error, Result};
pub use event::{EventType, TelemetryBatch, TelemetryEvent};
pub use finger::FingerPosition;
pub use logging::init_logging;
pub use pipeline::PipelineHandle;
pub use scheduler::{FlushPolicy, FlushScheduler};

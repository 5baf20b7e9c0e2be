//! The telemetry pipeline actor.
//!
//! A single task owns the event buffer, flush scheduler, delivery client,
//! failure cache, and teardown beacon. Producers (the typing state machine)
//! talk to it through a cloneable [`PipelineHandle`]; nothing in the
//! pipeline ever blocks a producer or surfaces an error to one.
//!
//! At most one flush is in flight at a time: the actor drains the buffer and
//! cancels the idle deadline before awaiting delivery, and commands arriving
//! during the await queue on the channel and land in a fresh buffer. That
//! drain-before-send ordering is the invariant that rules out double-send
//! and lost-update races.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::beacon::{BestEffortTransport, HttpBeacon};
use crate::buffer::EventBuffer;
use crate::cache::FailureCache;
use crate::config::Config;
use crate::delivery::{DeliveryOutcome, HttpIngest, IngestTransport};
use crate::error::{Error, Result};
use crate::event::EventType;
use crate::scheduler::{FlushPolicy, FlushReason, FlushScheduler};

/// Capacity of the command channel. Keystrokes arrive at human typing
/// speed, so this only fills if delivery stalls for a long time; overflow
/// drops the keystroke with a diagnostic rather than stalling the producer.
const COMMAND_CHANNEL_CAPACITY: usize = 1024;

/// Commands understood by the pipeline actor.
enum Command {
    AddEvent {
        event_type: EventType,
        key_code: String,
        is_error: bool,
        timestamp: Option<DateTime<Utc>>,
    },
    BindSession {
        session_id: Option<String>,
        started_at: DateTime<Utc>,
    },
    Flush {
        ack: oneshot::Sender<()>,
    },
    EndSession {
        ack: oneshot::Sender<()>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Cloneable entry point to the pipeline actor.
///
/// `add_event` is non-blocking; the session-lifecycle operations are awaited
/// so callers observe completion (a graceful session end, in particular,
/// completes its final classified flush before returning).
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    tx: mpsc::Sender<Command>,
}

impl PipelineHandle {
    /// Spawn a pipeline actor with explicit collaborators.
    ///
    /// Returns the handle and the actor's join handle; awaiting the latter
    /// after [`shutdown`](Self::shutdown) guarantees the actor has fully
    /// stopped. Dropping every handle without a shutdown triggers the
    /// teardown guard's best-effort beacon instead.
    #[must_use]
    pub fn spawn(
        policy: FlushPolicy,
        transport: Arc<dyn IngestTransport>,
        cache: FailureCache,
        beacon: Arc<dyn BestEffortTransport>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let worker = Worker {
            rx,
            buffer: EventBuffer::new(),
            scheduler: FlushScheduler::new(policy),
            transport,
            cache,
            beacon,
        };
        let join = tokio::spawn(worker.run());
        (Self { tx }, join)
    }

    /// Spawn a pipeline wired to the HTTP transports from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be constructed.
    pub fn from_config(config: &Config) -> Result<(Self, JoinHandle<()>)> {
        let policy = FlushPolicy {
            max_batch_size: config.flush.max_batch_size,
            idle_timeout: config.idle_timeout(),
        };
        let transport = Arc::new(HttpIngest::new(&config.ingest)?);
        let beacon = Arc::new(HttpBeacon::new(&config.ingest)?);
        let cache = FailureCache::new(config.cache_path());
        Ok(Self::spawn(policy, transport, cache, beacon))
    }

    /// Record a keystroke event, timestamped now.
    ///
    /// Non-blocking and infallible from the producer's point of view: with
    /// no session bound the event is ignored, and if the pipeline is
    /// congested or gone the event is dropped with a diagnostic.
    pub fn add_event(&self, event_type: EventType, key_code: &str, is_error: bool) {
        self.send_event(event_type, key_code, is_error, None);
    }

    /// Record a keystroke event with an explicit capture timestamp.
    pub fn add_event_at(
        &self,
        event_type: EventType,
        key_code: &str,
        is_error: bool,
        timestamp: DateTime<Utc>,
    ) {
        self.send_event(event_type, key_code, is_error, Some(timestamp));
    }

    fn send_event(
        &self,
        event_type: EventType,
        key_code: &str,
        is_error: bool,
        timestamp: Option<DateTime<Utc>>,
    ) {
        let command = Command::AddEvent {
            event_type,
            key_code: key_code.to_string(),
            is_error,
            timestamp,
        };
        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(key_code, "pipeline congested; dropping keystroke event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(key_code, "pipeline stopped; dropping keystroke event");
            }
        }
    }

    /// Bind the pipeline to a session (or unbind with `None`).
    ///
    /// Any change of session resets the pipeline to idle, discarding
    /// buffered events and the pending idle deadline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PipelineClosed`] if the actor has stopped.
    pub async fn bind_session(
        &self,
        session_id: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        self.tx
            .send(Command::BindSession {
                session_id,
                started_at,
            })
            .await
            .map_err(|_| Error::PipelineClosed)
    }

    /// Flush whatever is buffered and await the delivery outcome handling.
    ///
    /// Idempotent: with an empty buffer this performs no network call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PipelineClosed`] if the actor has stopped.
    pub async fn flush(&self) -> Result<()> {
        self.acked(|ack| Command::Flush { ack }).await
    }

    /// End the session gracefully: a final awaited flush with full outcome
    /// classification, then unbind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PipelineClosed`] if the actor has stopped.
    pub async fn end_session(&self) -> Result<()> {
        self.acked(|ack| Command::EndSession { ack }).await
    }

    /// Stop the pipeline after a final awaited flush.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PipelineClosed`] if the actor has already stopped.
    pub async fn shutdown(self) -> Result<()> {
        self.acked(|ack| Command::Shutdown { ack }).await
    }

    async fn acked(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(make(ack))
            .await
            .map_err(|_| Error::PipelineClosed)?;
        done.await.map_err(|_| Error::PipelineClosed)
    }
}

/// The actor's state, owned by a single task.
struct Worker {
    rx: mpsc::Receiver<Command>,
    buffer: EventBuffer,
    scheduler: FlushScheduler,
    transport: Arc<dyn IngestTransport>,
    cache: FailureCache,
    beacon: Arc<dyn BestEffortTransport>,
}

impl Worker {
    async fn run(mut self) {
        debug!("telemetry pipeline started");
        loop {
            let deadline = self.scheduler.deadline();
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => {
                        if self.handle(command).await {
                            break;
                        }
                    }
                    // Every handle dropped without a shutdown: the abrupt
                    // teardown path.
                    None => {
                        self.abandon();
                        return;
                    }
                },
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    self.flush(FlushReason::Idle).await;
                }
            }
        }
        debug!("telemetry pipeline stopped");
    }

    /// Handle one command; returns `true` when the actor should stop.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::AddEvent {
                event_type,
                key_code,
                is_error,
                timestamp,
            } => {
                match self.buffer.add(event_type, &key_code, is_error, timestamp) {
                    Ok(Some(buffered)) => {
                        if self.scheduler.note_event(buffered, Instant::now()) {
                            self.flush(FlushReason::Size).await;
                        }
                    }
                    // No session bound; the pipeline is inert.
                    Ok(None) => {}
                    Err(err) => debug!(%err, "discarded invalid event"),
                }
                false
            }
            Command::BindSession {
                session_id,
                started_at,
            } => {
                self.scheduler.disarm();
                match session_id {
                    Some(id) => {
                        info!(session_id = %id, "pipeline bound to session");
                        self.buffer.bind(id, started_at);
                    }
                    None => {
                        debug!("pipeline unbound");
                        self.buffer.unbind();
                    }
                }
                false
            }
            Command::Flush { ack } => {
                self.flush(FlushReason::Explicit).await;
                let _ = ack.send(());
                false
            }
            Command::EndSession { ack } => {
                self.flush(FlushReason::Explicit).await;
                self.buffer.unbind();
                self.scheduler.disarm();
                let _ = ack.send(());
                false
            }
            Command::Shutdown { ack } => {
                self.flush(FlushReason::Explicit).await;
                let _ = ack.send(());
                true
            }
        }
    }

    /// Drain the buffer and deliver the batch, feeding the outcome into the
    /// failure cache. Drains before any await; a no-op on an empty buffer.
    async fn flush(&mut self, reason: FlushReason) {
        let batch = self.buffer.drain();
        self.scheduler.disarm();
        if batch.is_empty() {
            return;
        }

        // Non-empty buffer implies a bound session; add() refuses otherwise.
        let Some(session_id) = self.buffer.session_id().map(str::to_string) else {
            error!(lost = batch.len(), "buffered events without a session");
            return;
        };

        debug!(count = batch.len(), %reason, "flushing telemetry batch");
        match self.transport.send_batch(&session_id, &batch).await {
            DeliveryOutcome::Delivered => {
                debug!(count = batch.len(), "telemetry batch delivered");
                if let Err(err) = self.cache.clear() {
                    warn!(%err, "failed to clear failure cache after delivery");
                }
            }
            DeliveryOutcome::SessionGone => {
                // Caching here would pile up events that can never be
                // delivered; the batch is dropped instead.
                warn!(
                    %session_id,
                    dropped = batch.len(),
                    "session gone; dropping telemetry batch"
                );
            }
            DeliveryOutcome::Transient(cause) => match self.cache.merge(&batch) {
                Ok(total) => {
                    error!(%cause, cached = total, "telemetry delivery failed; batch cached");
                }
                Err(err) => {
                    error!(
                        %cause,
                        %err,
                        lost = batch.len(),
                        "telemetry delivery failed and cache write failed"
                    );
                }
            },
        }
    }

    /// The teardown guard's last line of defense: fire whatever remains
    /// through the best-effort transport without awaiting anything.
    fn abandon(mut self) {
        self.scheduler.disarm();
        let Some(session_id) = self.buffer.session_id().map(str::to_string) else {
            return;
        };
        let remaining = self.buffer.drain();
        if remaining.is_empty() {
            return;
        }
        warn!(
            count = remaining.len(),
            "pipeline dropped with events buffered; firing best-effort beacon"
        );
        self.beacon.fire(&session_id, remaining);
    }
}

//! # Pipeline Events
//!
//! Events a run emits to its caller, in chronological order, and the sinks
//! that deliver them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::report::AnalysisReport;

use super::state::ProcessingState;

/// Events sent from the worker to the caller
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalysisEvent {
    /// The run moved to a new state
    StateChanged {
        from: ProcessingState,
        to: ProcessingState,
    },
    /// Encoding and row size inferred from the sample
    SampleDetected {
        encoding: String,
        confidence: f32,
        avg_row_bytes: f64,
    },
    /// Detection was not trusted; the fallback encoding is used instead
    EncodingLowConfidence {
        detected: String,
        confidence: f32,
        fallback: String,
    },
    /// Advisory size of the run
    EstimateReady {
        estimated_total_chunks: u64,
        estimated_total_rows: u64,
    },
    /// A chunk was aggregated. May be dropped under backpressure.
    Progress {
        chunk_index: u64,
        chunks_processed: u64,
        estimated_total_chunks: u64,
        rows_processed: u64,
    },
    /// A row was skipped
    RowParseWarning {
        chunk_index: u64,
        line: u64,
        raw_content: String,
        reason: String,
    },
    /// The input was read to the end
    Completed { report: AnalysisReport },
    /// Cancellation was observed between chunks
    Cancelled { partial_report: AnalysisReport },
    /// The run stopped on a fatal error
    Failed {
        kind: ErrorKind,
        message: String,
        partial_report: Option<AnalysisReport>,
    },
}

impl AnalysisEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisEvent::Completed { .. }
                | AnalysisEvent::Cancelled { .. }
                | AnalysisEvent::Failed { .. }
        )
    }

    /// Progress ticks are the only events that may be coalesced.
    pub fn is_progress(&self) -> bool {
        matches!(self, AnalysisEvent::Progress { .. })
    }
}

/// Receives events from a running analysis. Called on the worker thread.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: AnalysisEvent);
}

impl<F> EventEmitter for F
where
    F: Fn(AnalysisEvent) + Send + Sync,
{
    fn emit(&self, event: AnalysisEvent) {
        self(event)
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardEvents;

impl EventEmitter for DiscardEvents {
    fn emit(&self, _event: AnalysisEvent) {}
}

/// Delivers events over a bounded channel.
///
/// Progress uses `try_send`. When the channel is full the tick is parked as the
/// latest pending one, replacing any older parked tick, and is flushed before
/// the next blocking send. Everything else blocks until there is room. Once the
/// receiver is gone the emitter goes quiet and the run carries on.
pub struct ChannelEmitter {
    tx: Sender<AnalysisEvent>,
    pending_progress: Mutex<Option<AnalysisEvent>>,
    detached: AtomicBool,
    dropped_progress: AtomicU64,
}

impl ChannelEmitter {
    pub fn new(tx: Sender<AnalysisEvent>) -> Self {
        Self {
            tx,
            pending_progress: Mutex::new(None),
            detached: AtomicBool::new(false),
            dropped_progress: AtomicU64::new(0),
        }
    }

    /// Progress ticks superseded by a newer tick before they could be sent.
    pub fn dropped_progress(&self) -> u64 {
        self.dropped_progress.load(Ordering::Relaxed)
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Relaxed)
    }

    fn detach(&self) {
        if !self.detached.swap(true, Ordering::Relaxed) {
            warn!("event channel closed; continuing without a listener");
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<AnalysisEvent>> {
        self.pending_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn send_blocking(&self, event: AnalysisEvent) {
        if self.tx.send(event).is_err() {
            self.detach();
        }
    }

    fn emit_progress(&self, event: AnalysisEvent) {
        let mut pending = self.pending();
        if pending.take().is_some() {
            let dropped = self.dropped_progress.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("event channel full; superseded progress tick ({dropped} so far)");
        }
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => *pending = Some(event),
            Err(TrySendError::Disconnected(_)) => {
                drop(pending);
                self.detach();
            }
        }
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, event: AnalysisEvent) {
        if self.is_detached() {
            return;
        }
        if event.is_progress() {
            self.emit_progress(event);
            return;
        }
        let parked = self.pending().take();
        if let Some(progress) = parked {
            self.send_blocking(progress);
            if self.is_detached() {
                return;
            }
        }
        self.send_blocking(event);
    }
}

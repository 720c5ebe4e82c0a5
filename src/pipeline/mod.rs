//! # Pipeline Module
//!
//! Drives one analysis run: sample, estimate, then read and aggregate chunks
//! until the input ends, cancellation is observed, or I/O fails. Every run ends
//! in exactly one terminal event, and every run that reached the chunk loop
//! produces a report, partial or not.

pub mod cancel;
pub mod events;
pub mod state;
pub mod workers;

use std::path::{Path, PathBuf};

use chrono::Utc;
use crossbeam_channel::{Receiver, bounded};
use tracing::{debug, error, info, warn};

use crate::aggregate::Aggregator;
use crate::chunk::{ChunkEstimate, estimate_chunks};
use crate::config::{Config, LoadedConfig};
use crate::error::AnalysisError;
use crate::reader::{ChunkReader, ReaderOptions};
use crate::report::{AnalysisReport, CompletionStatus, RunMetadata, build_report};
use crate::sample::{FileSample, fallback_encoding, take_sample};
use crate::source::{CsvSource, FileSource};

use cancel::CancellationToken;
use events::{AnalysisEvent, ChannelEmitter, EventEmitter};
use state::{ProcessingState, StateCell};

/// How a run ended. Mirrors the terminal event.
#[derive(Debug)]
pub enum AnalysisOutcome {
    Completed(AnalysisReport),
    Cancelled(AnalysisReport),
    Failed {
        error: AnalysisError,
        partial_report: Option<AnalysisReport>,
    },
}

impl AnalysisOutcome {
    pub fn status(&self) -> CompletionStatus {
        match self {
            AnalysisOutcome::Completed(_) => CompletionStatus::Completed,
            AnalysisOutcome::Cancelled(_) => CompletionStatus::Cancelled,
            AnalysisOutcome::Failed { .. } => CompletionStatus::Failed,
        }
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            AnalysisOutcome::Completed(report) | AnalysisOutcome::Cancelled(report) => Some(report),
            AnalysisOutcome::Failed { partial_report, .. } => partial_report.as_ref(),
        }
    }

    pub fn into_report(self) -> Option<AnalysisReport> {
        match self {
            AnalysisOutcome::Completed(report) | AnalysisOutcome::Cancelled(report) => Some(report),
            AnalysisOutcome::Failed { partial_report, .. } => partial_report,
        }
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        match self {
            AnalysisOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// A run executing on its own worker thread.
pub struct AnalysisHandle {
    events: Receiver<AnalysisEvent>,
    state: StateCell,
    cancel: CancellationToken,
    worker: std::thread::JoinHandle<AnalysisOutcome>,
}

impl AnalysisHandle {
    /// Ordered event stream. Iteration ends once the worker has finished.
    pub fn events(&self) -> &Receiver<AnalysisEvent> {
        &self.events
    }

    pub fn state(&self) -> ProcessingState {
        self.state.get()
    }

    /// Request cancellation. Takes effect at the next chunk boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the worker is done. Undelivered events are discarded.
    pub fn wait(self) -> AnalysisOutcome {
        let AnalysisHandle { events, worker, .. } = self;
        // The worker may be blocked on a full channel.
        drop(events);
        workers::join_analysis_worker(worker)
    }
}

/// Start an analysis of `path` on a dedicated worker thread.
///
/// Parameters are validated before any I/O; a bad `top_n` or `chunk_size` is
/// returned here and no thread is started.
pub fn start_analysis(
    path: impl Into<PathBuf>,
    cfg: Config,
    cancel: CancellationToken,
) -> Result<AnalysisHandle, AnalysisError> {
    start_analysis_loaded(
        path,
        LoadedConfig {
            config: cfg,
            config_hash: String::new(),
        },
        cancel,
    )
}

/// [`start_analysis`] with the configuration hash recorded in the report.
pub fn start_analysis_loaded(
    path: impl Into<PathBuf>,
    loaded: LoadedConfig,
    cancel: CancellationToken,
) -> Result<AnalysisHandle, AnalysisError> {
    loaded.config.validate()?;

    let path = path.into();
    let (tx, rx) = bounded(loaded.config.event_capacity);
    let state = StateCell::new();

    let worker_state = state.clone();
    let worker_cancel = cancel.clone();
    let worker = workers::spawn_analysis_worker(move || {
        let emitter = ChannelEmitter::new(tx);
        let outcome = run_path(
            &path,
            &loaded.config,
            &loaded.config_hash,
            &worker_cancel,
            &emitter,
            worker_state,
        );
        if emitter.dropped_progress() > 0 {
            debug!("dropped {} progress events", emitter.dropped_progress());
        }
        outcome
    })?;

    Ok(AnalysisHandle {
        events: rx,
        state,
        cancel,
        worker,
    })
}

/// Analyse the file at `path` on the calling thread.
pub fn analyze_path(
    path: &Path,
    cfg: &Config,
    config_hash: &str,
    cancel: &CancellationToken,
    events: &dyn EventEmitter,
) -> AnalysisOutcome {
    run_path(path, cfg, config_hash, cancel, events, StateCell::new())
}

/// Analyse an already opened source on the calling thread.
pub fn analyze_source(
    source: &dyn CsvSource,
    cfg: &Config,
    config_hash: &str,
    cancel: &CancellationToken,
    events: &dyn EventEmitter,
) -> AnalysisOutcome {
    let runner = AnalysisRunner::new(cfg, config_hash, cancel, events, StateCell::new());
    match runner.start() {
        Ok(()) => runner.run(source),
        Err(err) => runner.fail(err, None),
    }
}

fn run_path(
    path: &Path,
    cfg: &Config,
    config_hash: &str,
    cancel: &CancellationToken,
    events: &dyn EventEmitter,
    state: StateCell,
) -> AnalysisOutcome {
    let runner = AnalysisRunner::new(cfg, config_hash, cancel, events, state);
    match runner.start().and_then(|()| FileSource::open(path)) {
        Ok(source) => runner.run(&source),
        Err(err) => runner.fail(err, None),
    }
}

/// Counters owned by the processing loop.
struct RunProgress {
    aggregator: Aggregator,
    rows_read: u64,
    malformed_rows: u64,
    chunks_processed: u64,
}

enum LoopEnd {
    Exhausted,
    Cancelled,
    Failed(AnalysisError),
}

struct AnalysisRunner<'a> {
    cfg: &'a Config,
    config_hash: &'a str,
    cancel: &'a CancellationToken,
    events: &'a dyn EventEmitter,
    state: StateCell,
}

impl<'a> AnalysisRunner<'a> {
    fn new(
        cfg: &'a Config,
        config_hash: &'a str,
        cancel: &'a CancellationToken,
        events: &'a dyn EventEmitter,
        state: StateCell,
    ) -> Self {
        Self {
            cfg,
            config_hash,
            cancel,
            events,
            state,
        }
    }

    fn start(&self) -> Result<(), AnalysisError> {
        self.cfg.validate()?;
        info!(
            "starting run_id={} top_n={} chunk_size={}",
            self.cfg.run_id, self.cfg.top_n, self.cfg.chunk_size
        );
        self.transition(ProcessingState::Sampling);
        Ok(())
    }

    fn run(self, source: &dyn CsvSource) -> AnalysisOutcome {
        let sample = match take_sample(source, self.cfg) {
            Ok(sample) => sample,
            Err(err) => return self.fail(err, None),
        };
        self.report_sample(&sample);

        let estimate = estimate_chunks(
            sample.file_size(),
            sample.avg_row_bytes(),
            self.cfg.chunk_size,
        );
        info!(
            "estimate: total_rows~{} total_chunks~{} chunk_size={}",
            estimate.estimated_total_rows, estimate.estimated_total_chunks, self.cfg.chunk_size
        );
        self.events.emit(AnalysisEvent::EstimateReady {
            estimated_total_chunks: estimate.estimated_total_chunks,
            estimated_total_rows: estimate.estimated_total_rows,
        });

        let mut reader = match ChunkReader::open(source, &sample, ReaderOptions::from(self.cfg)) {
            Ok(reader) => reader,
            Err(err) => return self.fail(err, None),
        };

        self.transition(ProcessingState::Processing);
        let mut progress = RunProgress {
            aggregator: Aggregator::with_columns(reader.columns()),
            rows_read: 0,
            malformed_rows: 0,
            chunks_processed: 0,
        };
        let end = self.process_loop(&mut reader, &mut progress, estimate);
        self.finalize(source, &sample, estimate, progress, end)
    }

    fn report_sample(&self, sample: &FileSample) {
        let detected = sample.detected();
        info!(
            "sample: encoding={} confidence={:.2} avg_row_bytes={:.1}",
            detected.encoding.name(),
            detected.confidence,
            sample.avg_row_bytes()
        );
        self.events.emit(AnalysisEvent::SampleDetected {
            encoding: detected.encoding.name().to_string(),
            confidence: detected.confidence,
            avg_row_bytes: sample.avg_row_bytes(),
        });
        if sample.fell_back() {
            self.events.emit(AnalysisEvent::EncodingLowConfidence {
                detected: detected.encoding.name().to_string(),
                confidence: detected.confidence,
                fallback: fallback_encoding().name().to_string(),
            });
        }
    }

    fn process_loop(
        &self,
        reader: &mut ChunkReader,
        progress: &mut RunProgress,
        estimate: ChunkEstimate,
    ) -> LoopEnd {
        loop {
            if self.cancel.is_cancelled() {
                return LoopEnd::Cancelled;
            }
            let chunk = match reader.next_chunk() {
                Ok(Some(chunk)) => chunk,
                Ok(None) => return LoopEnd::Exhausted,
                Err(err) => return LoopEnd::Failed(err),
            };

            let chunk_index = chunk.batch.index();
            let rows_read = chunk.rows_read();
            let malformed = chunk.malformed.len() as u64;
            for row in chunk.malformed {
                warn!(
                    "skipping malformed row at line {} (chunk {}): {}",
                    row.line, chunk_index, row.reason
                );
                self.events.emit(AnalysisEvent::RowParseWarning {
                    chunk_index,
                    line: row.line,
                    raw_content: row.raw_content,
                    reason: row.reason,
                });
            }

            progress.aggregator.ingest(chunk.batch);
            progress.rows_read += rows_read;
            progress.malformed_rows += malformed;
            progress.chunks_processed += 1;
            debug_assert_eq!(
                progress.rows_read,
                progress.aggregator.rows() + progress.malformed_rows
            );

            debug!(
                "chunk {} done: rows_read={} malformed={} rows_processed={}",
                chunk_index,
                rows_read,
                malformed,
                progress.aggregator.rows()
            );
            self.events.emit(AnalysisEvent::Progress {
                chunk_index,
                chunks_processed: progress.chunks_processed,
                estimated_total_chunks: estimate.estimated_total_chunks,
                rows_processed: progress.aggregator.rows(),
            });
        }
    }

    fn finalize(
        self,
        source: &dyn CsvSource,
        sample: &FileSample,
        estimate: ChunkEstimate,
        progress: RunProgress,
        end: LoopEnd,
    ) -> AnalysisOutcome {
        let status = match &end {
            LoopEnd::Exhausted => CompletionStatus::Completed,
            LoopEnd::Cancelled => CompletionStatus::Cancelled,
            LoopEnd::Failed(_) => CompletionStatus::Failed,
        };
        if status == CompletionStatus::Cancelled {
            self.transition(ProcessingState::Cancelling);
            info!(
                "shutdown requested; stopping after {} chunks",
                progress.chunks_processed
            );
        }

        let metadata = RunMetadata {
            run_id: self.cfg.run_id.clone(),
            file: source.path().to_path_buf(),
            encoding: sample.encoding_name().to_string(),
            encoding_confidence: sample.confidence(),
            top_n: self.cfg.top_n,
            chunk_size: self.cfg.chunk_size,
            rows_read: progress.rows_read,
            rows_processed: progress.aggregator.rows(),
            malformed_rows: progress.malformed_rows,
            chunks_processed: progress.chunks_processed,
            estimated_total_chunks: estimate.estimated_total_chunks,
            status,
            generated_at: Utc::now(),
            config_hash: self.config_hash.to_string(),
        };
        info!(
            "run_summary status={} rows_read={} rows_processed={} malformed_rows={} chunks_processed={} estimated_total_chunks={}",
            status,
            metadata.rows_read,
            metadata.rows_processed,
            metadata.malformed_rows,
            metadata.chunks_processed,
            metadata.estimated_total_chunks
        );

        let report = match build_report(progress.aggregator.table(), self.cfg.top_n, metadata) {
            Ok(report) => report,
            Err(err) => return self.fail(err, None),
        };

        match end {
            LoopEnd::Exhausted => {
                self.transition(ProcessingState::Completed);
                self.events.emit(AnalysisEvent::Completed {
                    report: report.clone(),
                });
                AnalysisOutcome::Completed(report)
            }
            LoopEnd::Cancelled => {
                self.transition(ProcessingState::Cancelled);
                self.events.emit(AnalysisEvent::Cancelled {
                    partial_report: report.clone(),
                });
                AnalysisOutcome::Cancelled(report)
            }
            LoopEnd::Failed(err) => self.fail(err, Some(report)),
        }
    }

    fn fail(&self, err: AnalysisError, partial_report: Option<AnalysisReport>) -> AnalysisOutcome {
        error!("analysis failed: {err}");
        self.transition(ProcessingState::Failed);
        self.events.emit(AnalysisEvent::Failed {
            kind: err.kind(),
            message: err.to_string(),
            partial_report: partial_report.clone(),
        });
        AnalysisOutcome::Failed {
            error: err,
            partial_report,
        }
    }

    fn transition(&self, to: ProcessingState) {
        let from = self.state.get();
        debug_assert!(
            from.can_transition_to(to),
            "illegal state transition {from} -> {to}"
        );
        self.state.set(to);
        info!("state {from} -> {to}");
        self.events.emit(AnalysisEvent::StateChanged { from, to });
    }
}

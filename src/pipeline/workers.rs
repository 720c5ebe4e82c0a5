//! # Pipeline Workers
//!
//! Spawning and joining the dedicated analysis thread.

use std::any::Any;
use std::thread;

use tracing::error;

use crate::constants::WORKER_THREAD_NAME;
use crate::error::AnalysisError;

use super::AnalysisOutcome;

/// Spawn the named worker thread that drives one run.
pub fn spawn_analysis_worker<F>(job: F) -> Result<thread::JoinHandle<AnalysisOutcome>, AnalysisError>
where
    F: FnOnce() -> AnalysisOutcome + Send + 'static,
{
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(job)
        .map_err(|err| AnalysisError::Worker(format!("failed to spawn worker thread: {err}")))
}

/// Wait for the worker. A panic becomes a failed outcome without a report.
pub fn join_analysis_worker(handle: thread::JoinHandle<AnalysisOutcome>) -> AnalysisOutcome {
    match handle.join() {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("analysis worker panicked: {message}");
            AnalysisOutcome::Failed {
                error: AnalysisError::Worker(format!("worker panicked: {message}")),
                partial_report: None,
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

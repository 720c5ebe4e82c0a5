//! Shared helpers for the end-to-end analysis tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use topvals::config::Config;
use topvals::pipeline::cancel::CancellationToken;
use topvals::pipeline::events::{AnalysisEvent, EventEmitter};
use topvals::pipeline::{self, AnalysisOutcome};
use topvals::report::AnalysisReport;

/// Write `contents` to `dir/name` and return the path.
pub fn write_csv(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write csv");
    path
}

/// Default configuration with a fixed run id and the chunk minimum lowered,
/// so small fixtures can span several chunks.
pub fn test_config(chunk_size: usize, top_n: usize) -> Config {
    Config {
        run_id: "test_run".to_string(),
        chunk_size,
        min_chunk_size: 1,
        top_n,
        ..Config::default()
    }
}

/// `rows` data rows of `id,group`, where group cycles through `g0..g6`.
pub fn grouped_rows(rows: usize) -> String {
    let mut out = String::from("id,group\n");
    for i in 0..rows {
        out.push_str(&format!("{i},g{}\n", i % 7));
    }
    out
}

/// Records every event in emission order.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<AnalysisEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AnalysisEvent> {
        self.events.lock().expect("event log lock").clone()
    }

    pub fn count(&self, pred: impl Fn(&AnalysisEvent) -> bool) -> usize {
        self.events
            .lock()
            .expect("event log lock")
            .iter()
            .filter(|event| pred(event))
            .count()
    }
}

impl EventEmitter for EventLog {
    fn emit(&self, event: AnalysisEvent) {
        self.events.lock().expect("event log lock").push(event);
    }
}

/// Run an analysis of `path` on the current thread and capture its events.
pub fn run_with_events(path: &Path, cfg: &Config) -> (AnalysisOutcome, Vec<AnalysisEvent>) {
    let log = EventLog::new();
    let outcome = pipeline::analyze_path(path, cfg, "", &CancellationToken::new(), &log);
    (outcome, log.events())
}

/// `(value, count)` pairs of one column of a report.
pub fn top_values(report: &AnalysisReport, column: &str) -> Vec<(String, u64)> {
    report
        .column(column)
        .expect("column in report")
        .top
        .iter()
        .map(|entry| (entry.value.clone(), entry.count))
        .collect()
}

pub fn pairs(items: &[(&str, u64)]) -> Vec<(String, u64)> {
    items
        .iter()
        .map(|(value, count)| (value.to_string(), *count))
        .collect()
}

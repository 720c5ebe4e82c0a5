//! # Report Builder
//!
//! Turns frequency tables into ranked top-N lists. Ranking is deterministic:
//! descending count, then earliest first occurrence in the input, then the
//! value itself.

use std::cmp::Ordering;
use std::fmt::{self, Write as _};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{ColumnFrequencies, FrequencyTable, ValueTally};
use crate::constants::REPORT_RULE_WIDTH;
use crate::error::AnalysisError;
use crate::util::display_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CompletionStatus::Completed => "completed",
            CompletionStatus::Cancelled => "cancelled",
            CompletionStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedValue {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnReport {
    pub name: String,
    /// Values counted in this column.
    pub total: u64,
    pub distinct: usize,
    pub top: Vec<RankedValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub file: PathBuf,
    pub encoding: String,
    pub encoding_confidence: f32,
    pub top_n: usize,
    pub chunk_size: usize,
    /// Data rows read, malformed ones included.
    pub rows_read: u64,
    /// Well-formed rows that were aggregated.
    pub rows_processed: u64,
    pub malformed_rows: u64,
    pub chunks_processed: u64,
    pub estimated_total_chunks: u64,
    pub status: CompletionStatus,
    pub generated_at: DateTime<Utc>,
    pub config_hash: String,
}

/// Final or partial result of one run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub metadata: RunMetadata,
    pub columns: Vec<ColumnReport>,
}

impl AnalysisReport {
    pub fn column(&self, name: &str) -> Option<&ColumnReport> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn status(&self) -> CompletionStatus {
        self.metadata.status
    }

    /// Plain-text rendering, one block per column in column order.
    pub fn render_text(&self) -> String {
        let meta = &self.metadata;
        let mut out = String::new();
        let _ = writeln!(out, "--- CSV Analysis Report ---");
        let _ = writeln!(out, "File: {}", display_name(&meta.file));
        let _ = writeln!(
            out,
            "Analysis Date: {}",
            meta.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(
            out,
            "Status: {} (rows processed: {}, malformed rows: {}, chunks: {})",
            meta.status, meta.rows_processed, meta.malformed_rows, meta.chunks_processed
        );
        let _ = writeln!(out, "Top {} values:", meta.top_n);
        let _ = writeln!(out, "{}", "=".repeat(REPORT_RULE_WIDTH));
        out.push('\n');

        for (idx, column) in self.columns.iter().enumerate() {
            let _ = writeln!(out, "--- Column {}: '{}' ---", idx + 1, column.name);
            if column.top.is_empty() {
                out.push_str("No values found.\n\n");
                continue;
            }
            for entry in &column.top {
                let _ = writeln!(out, "  - Value: '{}' | Count: {}", entry.value, entry.count);
            }
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn rank_order(a: &(&str, ValueTally), b: &(&str, ValueTally)) -> Ordering {
    b.1.count
        .cmp(&a.1.count)
        .then(a.1.first_seen.cmp(&b.1.first_seen))
        .then_with(|| a.0.cmp(b.0))
}

/// The `n` highest-ranked values of one column, best first.
pub fn rank_top_n(freq: &ColumnFrequencies, n: usize) -> Vec<RankedValue> {
    if n == 0 {
        return Vec::new();
    }
    let mut entries: Vec<(&str, ValueTally)> = freq.iter().collect();
    if entries.len() > n {
        entries.select_nth_unstable_by(n, rank_order);
        entries.truncate(n);
    }
    entries.sort_unstable_by(rank_order);
    entries
        .into_iter()
        .map(|(value, tally)| RankedValue {
            value: value.to_string(),
            count: tally.count,
        })
        .collect()
}

/// Rank every column of `table`. `top_n` must be at least 1.
pub fn build_report(
    table: &FrequencyTable,
    top_n: usize,
    metadata: RunMetadata,
) -> Result<AnalysisReport, AnalysisError> {
    if top_n == 0 {
        return Err(AnalysisError::InvalidParameter(
            "top_n must be at least 1, got 0".to_string(),
        ));
    }
    let columns = table
        .columns()
        .map(|(name, freq)| ColumnReport {
            name: name.to_string(),
            total: freq.total(),
            distinct: freq.distinct(),
            top: rank_top_n(freq, top_n),
        })
        .collect();
    Ok(AnalysisReport { metadata, columns })
}

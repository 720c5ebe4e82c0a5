//! Shared constants for the analysis engine.

/// Bytes read from the start of the file for encoding and row-size detection.
pub const DEFAULT_SAMPLE_BYTES: usize = 50_000;

pub const DEFAULT_CHUNK_SIZE: usize = 9_000;
pub const MIN_CHUNK_SIZE: usize = 500;
pub const DEFAULT_TOP_N: usize = 10;

/// Average row size assumed when the sample contains no newline.
pub const FALLBACK_ROW_BYTES: f64 = 150.0;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;
pub const DEFAULT_MAX_WARNING_CHARS: usize = 256;

/// Width of the `=` rule under the text report header.
pub const REPORT_RULE_WIDTH: usize = 40;

pub const WORKER_THREAD_NAME: &str = "topvals-worker";

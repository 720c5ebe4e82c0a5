//! # Sampler
//!
//! Reads a bounded prefix of the input, detects its character encoding and
//! derives the average row size used by the chunk estimator.

use std::io::Read;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AnalysisError;
use crate::source::CsvSource;

/// Encoding used when detection is not trustworthy.
pub fn fallback_encoding() -> &'static Encoding {
    UTF_8
}

/// Outcome of encoding detection over a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodingGuess {
    pub encoding: &'static Encoding,
    /// Share of sample lines that decode cleanly, in `[0, 1]`.
    pub confidence: f32,
    /// Length of a byte-order mark at the start of the buffer, if any.
    pub bom_len: usize,
}

/// Prefix of the input file plus what was learned from it. Immutable once built.
#[derive(Debug, Clone)]
pub struct FileSample {
    bytes: Vec<u8>,
    file_size: u64,
    detected: EncodingGuess,
    encoding: &'static Encoding,
    low_confidence: bool,
    lines: usize,
    avg_row_bytes: f64,
}

impl FileSample {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Encoding the reader will use (the detected one, or the fallback).
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn encoding_name(&self) -> &'static str {
        self.encoding.name()
    }

    /// What detection produced before any fallback was applied.
    pub fn detected(&self) -> EncodingGuess {
        self.detected
    }

    pub fn confidence(&self) -> f32 {
        self.detected.confidence
    }

    /// Detection confidence was at or below the configured floor, so the
    /// fallback encoding is in use.
    pub fn fell_back(&self) -> bool {
        self.low_confidence
    }

    /// BOM bytes the reader must skip. Zero when the fallback replaced a BOM guess.
    pub fn bom_len(&self) -> usize {
        if self.fell_back() { 0 } else { self.detected.bom_len }
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn avg_row_bytes(&self) -> f64 {
        self.avg_row_bytes
    }
}

/// Read up to `cfg.sample_bytes` from the start of `source` and analyse them.
pub fn take_sample(source: &dyn CsvSource, cfg: &Config) -> Result<FileSample, AnalysisError> {
    let path = source.path();
    let reader = source
        .open()
        .map_err(|err| AnalysisError::file_access(path, err))?;

    let mut bytes = Vec::with_capacity(cfg.sample_bytes.min(source.len() as usize));
    reader
        .take(cfg.sample_bytes as u64)
        .read_to_end(&mut bytes)
        .map_err(|err| AnalysisError::file_access(path, err))?;
    if bytes.is_empty() {
        return Err(AnalysisError::file_access(path, "file is empty"));
    }

    let is_prefix = (bytes.len() as u64) < source.len();
    let detected = detect_encoding(&bytes, is_prefix);
    let low_confidence = detected.confidence <= cfg.min_encoding_confidence;
    let encoding = if low_confidence {
        warn!(
            "encoding detection confidence {:.2} for {} is too low; falling back to {}",
            detected.confidence,
            detected.encoding.name(),
            fallback_encoding().name()
        );
        fallback_encoding()
    } else {
        detected.encoding
    };

    let lines = count_lines(&bytes);
    let avg_row_bytes = average_row_bytes(&bytes, cfg.fallback_row_bytes);
    debug!(
        "sampled {} of {} bytes: lines={} avg_row_bytes={:.2}",
        bytes.len(),
        source.len(),
        lines,
        avg_row_bytes
    );

    Ok(FileSample {
        bytes,
        file_size: source.len(),
        detected,
        encoding,
        low_confidence,
        lines,
        avg_row_bytes,
    })
}

/// Detect the encoding of `buf`.
///
/// A byte-order mark wins outright. Otherwise valid UTF-8 is taken as UTF-8 and
/// anything else goes to a statistical guess. `is_prefix` says the buffer was
/// cut from a longer input, so its last partial line is ignored.
pub fn detect_encoding(buf: &[u8], is_prefix: bool) -> EncodingGuess {
    if let Some((encoding, bom_len)) = Encoding::for_bom(buf) {
        return EncodingGuess {
            encoding,
            confidence: 1.0,
            bom_len,
        };
    }

    let body = if is_prefix {
        match memchr::memrchr(b'\n', buf) {
            Some(pos) => &buf[..=pos],
            None => trim_split_utf8_tail(buf),
        }
    } else {
        buf
    };

    let encoding = if Encoding::utf8_valid_up_to(body) == body.len() {
        UTF_8
    } else {
        let mut detector = EncodingDetector::new();
        detector.feed(body, true);
        detector.guess(None, true)
    };

    EncodingGuess {
        encoding,
        confidence: clean_line_ratio(body, encoding),
        bom_len: 0,
    }
}

/// Drop an incomplete UTF-8 sequence left at the end of a cut buffer.
fn trim_split_utf8_tail(buf: &[u8]) -> &[u8] {
    let valid = Encoding::utf8_valid_up_to(buf);
    let tail = &buf[valid..];
    let needed = match tail.first() {
        Some(0xC2..=0xDF) => 2,
        Some(0xE0..=0xEF) => 3,
        Some(0xF0..=0xF4) => 4,
        _ => return buf,
    };
    let continuation = tail[1..].iter().all(|&b| (0x80..=0xBF).contains(&b));
    if tail.len() < needed && continuation {
        &buf[..valid]
    } else {
        buf
    }
}

/// Fraction of non-empty lines that decode without errors and hold no stray
/// control characters.
fn clean_line_ratio(body: &[u8], encoding: &'static Encoding) -> f32 {
    let mut total = 0u32;
    let mut clean = 0u32;
    for line in body.split(|&b| b == b'\n') {
        if line.is_empty() || line == b"\r" {
            continue;
        }
        total += 1;
        let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(line) else {
            continue;
        };
        if !text
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\t' | '\r'))
        {
            clean += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    clean as f32 / total as f32
}

fn count_lines(buf: &[u8]) -> usize {
    memchr::memchr_iter(b'\n', buf).count()
}

/// Bytes per newline in `buf`, or `fallback` when it holds no newline.
pub fn average_row_bytes(buf: &[u8], fallback: f64) -> f64 {
    match count_lines(buf) {
        0 => fallback,
        lines => buf.len() as f64 / lines as f64,
    }
}

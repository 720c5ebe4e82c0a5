mod common;

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use topvals::config::Config;
use topvals::error::{AnalysisError, ErrorKind};
use topvals::pipeline::cancel::CancellationToken;
use topvals::pipeline::events::AnalysisEvent;
use topvals::pipeline::{self, AnalysisOutcome};
use topvals::report::CompletionStatus;
use topvals::source::CsvSource;

use common::{EventLog, pairs, run_with_events, test_config, top_values, write_csv};

fn estimate_of(events: &[AnalysisEvent]) -> (u64, u64) {
    events
        .iter()
        .find_map(|event| match event {
            AnalysisEvent::EstimateReady {
                estimated_total_chunks,
                estimated_total_rows,
            } => Some((*estimated_total_chunks, *estimated_total_rows)),
            _ => None,
        })
        .expect("estimate event")
}

#[test]
fn file_smaller_than_sample_still_estimates_one_chunk() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let path = write_csv(temp_dir.path(), "tiny.csv", "a\n1\n");

    let (outcome, events) = run_with_events(&path, &Config::default());
    assert_eq!(outcome.status(), CompletionStatus::Completed);
    let (chunks, rows) = estimate_of(&events);
    assert_eq!(chunks, 1);
    assert!(rows >= 1);
    assert_eq!(
        outcome.report().expect("report").metadata.estimated_total_chunks,
        1
    );
}

#[test]
fn header_without_newline_uses_fallback_row_size() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let path = write_csv(temp_dir.path(), "header.csv", "only,columns");

    let (outcome, events) = run_with_events(&path, &Config::default());
    assert_eq!(estimate_of(&events), (1, 1));
    let sample_rows = events.iter().find_map(|event| match event {
        AnalysisEvent::SampleDetected { avg_row_bytes, .. } => Some(*avg_row_bytes),
        _ => None,
    });
    assert_eq!(sample_rows, Some(150.0));

    let report = outcome.into_report().expect("report");
    assert_eq!(report.metadata.chunks_processed, 0);
    let names: Vec<&str> = report.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["only", "columns"]);
    assert!(report.render_text().contains("--- Column 2: 'columns' ---\nNo values found.\n"));
}

#[test]
fn missing_file_fails_with_file_access() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let path = temp_dir.path().join("absent.csv");

    let (outcome, events) = run_with_events(&path, &test_config(10, 3));
    match &outcome {
        AnalysisOutcome::Failed {
            error,
            partial_report,
        } => {
            assert_eq!(error.kind(), ErrorKind::FileAccess);
            assert!(partial_report.is_none());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, AnalysisEvent::SampleDetected { .. }))
    );
    assert!(matches!(
        events.last(),
        Some(AnalysisEvent::Failed {
            kind: ErrorKind::FileAccess,
            ..
        })
    ));
}

#[test]
fn empty_file_fails_with_file_access() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let path = write_csv(temp_dir.path(), "empty.csv", "");

    let (outcome, _) = run_with_events(&path, &test_config(10, 3));
    assert_eq!(outcome.error().expect("failed").kind(), ErrorKind::FileAccess);
}

#[test]
fn directory_input_fails_with_file_access() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let (outcome, _) = run_with_events(temp_dir.path(), &test_config(10, 3));
    assert_eq!(outcome.error().expect("failed").kind(), ErrorKind::FileAccess);
}

#[test]
fn invalid_parameters_are_rejected_before_io() {
    let missing = Path::new("/no/such/dir/input.csv");

    for cfg in [
        Config {
            top_n: 0,
            ..Config::default()
        },
        Config {
            chunk_size: 499,
            ..Config::default()
        },
    ] {
        let err = pipeline::start_analysis(missing, cfg, CancellationToken::new())
            .err()
            .expect("must fail");
        assert!(matches!(err, AnalysisError::InvalidParameter(_)));
    }
}

#[test]
fn threaded_missing_file_reports_failure_through_events() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let path = temp_dir.path().join("absent.csv");

    let handle = pipeline::start_analysis(&path, test_config(10, 3), CancellationToken::new())
        .expect("parameters are valid");
    let events: Vec<AnalysisEvent> = handle.events().iter().collect();
    assert!(matches!(
        events.last(),
        Some(AnalysisEvent::Failed {
            kind: ErrorKind::FileAccess,
            ..
        })
    ));
    assert_eq!(handle.wait().status(), CompletionStatus::Failed);
}

#[test]
fn byte_order_mark_is_not_part_of_the_header() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let path = write_csv(temp_dir.path(), "bom.csv", "\u{feff}color\nred\nred\nblue\n");

    let (outcome, _) = run_with_events(&path, &test_config(10, 5));
    let report = outcome.into_report().expect("report");
    assert_eq!(report.metadata.encoding, "UTF-8");
    assert_eq!(top_values(&report, "color"), pairs(&[("red", 2), ("blue", 1)]));
}

#[test]
fn utf16_file_with_bom_is_analysed() {
    let text = "name,city\nann,Łódź\nbob,Łódź\ncid,Kraków\n";
    let mut data = vec![0xFF, 0xFE];
    data.extend(text.encode_utf16().flat_map(|unit| unit.to_le_bytes()));
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let path = write_csv(temp_dir.path(), "utf16.csv", data);

    let (outcome, _) = run_with_events(&path, &test_config(10, 5));
    let report = outcome.into_report().expect("report");
    assert_eq!(report.metadata.encoding, "UTF-16LE");
    assert_eq!(
        top_values(&report, "city"),
        pairs(&[("Łódź", 2), ("Kraków", 1)])
    );
}

#[test]
fn legacy_encoding_is_detected_and_decoded() {
    let mut data = b"word,n\n".to_vec();
    for _ in 0..20 {
        data.extend_from_slice(b"caf\xE9,1\nna\xEFve,2\nd\xE9j\xE0,3\n");
    }
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let path = write_csv(temp_dir.path(), "latin.csv", data);

    let (outcome, events) = run_with_events(&path, &test_config(10, 5));
    let report = outcome.into_report().expect("report");
    assert_ne!(report.metadata.encoding, "UTF-8");
    assert_eq!(report.metadata.malformed_rows, 0);
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, AnalysisEvent::EncodingLowConfidence { .. }))
    );
    let word = report.column("word").expect("word");
    assert_eq!(word.distinct, 3);
    assert_eq!(word.top[0].value, "café");
    assert_eq!(word.top[0].count, 20);
}

#[test]
fn unreadable_sample_falls_back_to_utf8_and_completes() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let path = write_csv(
        temp_dir.path(),
        "noise.csv",
        b"\x00\x01\n\x02\x03\n\x02\x03\n".to_vec(),
    );

    let (outcome, events) = run_with_events(&path, &test_config(10, 3));
    let fallback = events.iter().find_map(|event| match event {
        AnalysisEvent::EncodingLowConfidence {
            confidence,
            fallback,
            ..
        } => Some((*confidence, fallback.clone())),
        _ => None,
    });
    assert_eq!(fallback, Some((0.0, "UTF-8".to_string())));

    assert_eq!(outcome.status(), CompletionStatus::Completed);
    let report = outcome.into_report().expect("report");
    assert_eq!(report.metadata.encoding, "UTF-8");
    assert_eq!(report.metadata.rows_processed, 2);
    let column = &report.columns[0];
    assert_eq!(column.name, "\u{0}\u{1}");
    assert_eq!(column.top[0].value, "\u{2}\u{3}");
    assert_eq!(column.top[0].count, 2);
}

/// Source whose reads start failing after `limit` bytes.
struct FlakySource {
    path: PathBuf,
    data: Vec<u8>,
    limit: u64,
}

struct FlakyReader {
    inner: Cursor<Vec<u8>>,
    limit: u64,
}

impl Read for FlakyReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.limit.saturating_sub(self.inner.position());
        if remaining == 0 {
            return Err(std::io::Error::other("device error"));
        }
        let len = buf.len().min(remaining as usize);
        self.inner.read(&mut buf[..len])
    }
}

impl CsvSource for FlakySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn open(&self) -> std::io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(FlakyReader {
            inner: Cursor::new(self.data.clone()),
            limit: self.limit,
        }))
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[test]
fn io_failure_mid_stream_keeps_a_partial_report() {
    let mut data = String::from("k,v\n");
    for i in 0..500 {
        data.push_str(&format!("k{},{}\n", i % 4, i % 10));
    }
    let source = FlakySource {
        path: PathBuf::from("flaky.csv"),
        data: data.into_bytes(),
        limit: 1_000,
    };
    let mut cfg = test_config(10, 3);
    cfg.sample_bytes = 200;

    let log = EventLog::new();
    let outcome = pipeline::analyze_source(&source, &cfg, "", &CancellationToken::new(), &log);

    let (error, partial) = match outcome {
        AnalysisOutcome::Failed {
            error,
            partial_report,
        } => (error, partial_report.expect("partial report")),
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(error.kind(), ErrorKind::Io);
    assert_eq!(partial.metadata.status, CompletionStatus::Failed);
    assert!(partial.metadata.chunks_processed > 0);
    assert!(partial.metadata.rows_processed < 500);
    assert_eq!(
        partial.metadata.rows_processed,
        partial.metadata.chunks_processed * 10
    );
    assert_eq!(
        partial.column("k").expect("k").total,
        partial.metadata.rows_processed
    );
    assert_eq!(
        log.count(|event| matches!(event, AnalysisEvent::Failed { kind: ErrorKind::Io, .. })),
        1
    );
}

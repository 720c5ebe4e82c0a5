//! # Chunk Reader
//!
//! Presents a CSV source as an ordered sequence of row batches. A malformed row
//! never ends the sequence: it is set aside as a [`MalformedRow`] and reading
//! continues. End of input is the only thing that stops iteration.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;
use tracing::debug;

use crate::config::{Config, FieldCountPolicy};
use crate::error::AnalysisError;
use crate::sample::FileSample;
use crate::source::CsvSource;
use crate::util::truncate_chars;

/// Upper bound on the row vector preallocated per chunk.
const MAX_PREALLOCATED_ROWS: usize = 4096;

/// One well-formed data row. `values[i]` belongs to column `i` of its batch;
/// a row shorter than the batch's column list simply has no value for the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 0-based position among all data records of the input, malformed ones included.
    pub ordinal: u64,
    pub values: Vec<String>,
}

impl Row {
    pub fn new(ordinal: u64, values: Vec<String>) -> Self {
        Self { ordinal, values }
    }
}

/// A chunk: up to `chunk_size` consecutive rows, consumed once by the aggregator.
#[derive(Debug, Clone)]
pub struct RowBatch {
    index: u64,
    columns: Arc<[String]>,
    rows: Vec<Row>,
}

impl RowBatch {
    pub fn new(index: u64, columns: impl Into<Arc<[String]>>, rows: Vec<Row>) -> Self {
        Self {
            index,
            columns: columns.into(),
            rows,
        }
    }

    /// 0-based position of this chunk in the stream.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(column, value)` pairs of one row.
    pub fn fields<'a>(&'a self, row: &'a Row) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.columns
            .iter()
            .zip(row.values.iter())
            .map(|(column, value)| (column.as_str(), value.as_str()))
    }

    pub fn into_parts(self) -> (Arc<[String]>, Vec<Row>) {
        (self.columns, self.rows)
    }
}

/// A row that was read but could not be used.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MalformedRow {
    /// 1-based line of the input where the row starts.
    pub line: u64,
    pub raw_content: String,
    pub reason: String,
}

/// Everything one `next_chunk` call read.
#[derive(Debug, Clone)]
pub struct ChunkRead {
    pub batch: RowBatch,
    pub malformed: Vec<MalformedRow>,
}

impl ChunkRead {
    /// Rows consumed from the input for this chunk, usable or not.
    pub fn rows_read(&self) -> u64 {
        (self.batch.len() + self.malformed.len()) as u64
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    pub chunk_size: usize,
    pub delimiter: u8,
    pub field_count: FieldCountPolicy,
    pub max_warning_chars: usize,
}

impl From<&Config> for ReaderOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            chunk_size: cfg.chunk_size,
            delimiter: cfg.delimiter_byte(),
            field_count: cfg.field_count,
            max_warning_chars: cfg.max_warning_chars,
        }
    }
}

pub struct ChunkReader {
    records: csv::Reader<Box<dyn Read + Send>>,
    field_encoding: &'static Encoding,
    columns: Arc<[String]>,
    header_width: usize,
    options: ReaderOptions,
    record: csv::ByteRecord,
    next_index: u64,
    next_ordinal: u64,
    finished: bool,
}

impl ChunkReader {
    /// Open `source` from the start for a full pass, using what the sample found.
    pub fn open(
        source: &dyn CsvSource,
        sample: &FileSample,
        options: ReaderOptions,
    ) -> Result<Self, AnalysisError> {
        let path = source.path();
        let mut input = source
            .open()
            .map_err(|err| AnalysisError::file_access(path, err))?;
        if sample.bom_len() > 0 {
            let mut bom = vec![0u8; sample.bom_len()];
            input
                .read_exact(&mut bom)
                .map_err(|err| AnalysisError::file_access(path, err))?;
        }
        Self::from_reader(input, sample.encoding(), options)
    }

    /// Build a reader over raw bytes in `encoding` (any BOM already consumed).
    /// The first record is taken as the header.
    pub fn from_reader(
        input: Box<dyn Read + Send>,
        encoding: &'static Encoding,
        options: ReaderOptions,
    ) -> Result<Self, AnalysisError> {
        // ASCII-compatible input is split on raw bytes so every field can be
        // decoded strictly; anything else is transcoded to UTF-8 first.
        let (input, field_encoding): (Box<dyn Read + Send>, &'static Encoding) =
            if encoding.is_ascii_compatible() {
                (input, encoding)
            } else {
                let transcoded = DecodeReaderBytesBuilder::new()
                    .encoding(Some(encoding))
                    .build(input);
                (Box::new(transcoded), UTF_8)
            };

        let mut records = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(options.delimiter)
            .from_reader(input);

        let mut header = csv::ByteRecord::new();
        let has_header = records.read_byte_record(&mut header).map_err(csv_io_error)?;
        let columns = if has_header {
            header_names(
                header
                    .iter()
                    .map(|field| field_encoding.decode_without_bom_handling(field).0.into_owned())
                    .collect(),
            )
        } else {
            Vec::new()
        };
        debug!(
            "reader opened: encoding={} columns={}",
            encoding.name(),
            columns.len()
        );

        Ok(Self {
            records,
            field_encoding,
            header_width: columns.len(),
            columns: columns.into(),
            options,
            record: csv::ByteRecord::new(),
            next_index: 0,
            next_ordinal: 0,
            finished: false,
        })
    }

    /// Column names from the header row, deduplicated.
    pub fn columns(&self) -> &[String] {
        &self.columns[..self.header_width]
    }

    /// Read the next chunk of up to `chunk_size` rows.
    ///
    /// Returns `Ok(None)` once the input is exhausted. An `Err` is always an I/O
    /// failure of the underlying reader; the rows of the interrupted chunk are
    /// discarded.
    pub fn next_chunk(&mut self) -> Result<Option<ChunkRead>, AnalysisError> {
        if self.finished {
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(self.options.chunk_size.min(MAX_PREALLOCATED_ROWS));
        let mut malformed = Vec::new();
        let mut read = 0usize;

        while read < self.options.chunk_size {
            match self.records.read_byte_record(&mut self.record) {
                Ok(true) => {}
                Ok(false) => {
                    self.finished = true;
                    break;
                }
                Err(err) if err.is_io_error() => return Err(csv_io_error(err)),
                Err(err) => {
                    read += 1;
                    self.next_ordinal += 1;
                    malformed.push(MalformedRow {
                        line: err.position().map(|pos| pos.line()).unwrap_or(0),
                        raw_content: String::new(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            }
            read += 1;
            let ordinal = self.next_ordinal;
            self.next_ordinal += 1;

            match self.decode_record(ordinal) {
                Ok(row) => rows.push(row),
                Err(reason) => malformed.push(MalformedRow {
                    line: self.record.position().map(|pos| pos.line()).unwrap_or(0),
                    raw_content: self.raw_content(),
                    reason,
                }),
            }
        }

        if read == 0 {
            return Ok(None);
        }

        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(ChunkRead {
            batch: RowBatch::new(index, self.columns.clone(), rows),
            malformed,
        }))
    }

    fn decode_record(&mut self, ordinal: u64) -> Result<Row, String> {
        let width = self.record.len();
        if self.options.field_count == FieldCountPolicy::Strict && width != self.header_width {
            return Err(format!(
                "expected {} fields, found {}",
                self.header_width, width
            ));
        }

        let mut values = Vec::with_capacity(width);
        for (idx, field) in self.record.iter().enumerate() {
            match self
                .field_encoding
                .decode_without_bom_handling_and_without_replacement(field)
            {
                Some(text) => values.push(text.into_owned()),
                None => return Err(format!("undecodable bytes in field {}", idx + 1)),
            }
        }

        if width > self.columns.len() {
            let mut columns = self.columns.to_vec();
            for pos in self.columns.len()..width {
                let mut name = positional_name(pos);
                while columns.contains(&name) {
                    name.push('_');
                }
                columns.push(name);
            }
            self.columns = columns.into();
        }

        Ok(Row { ordinal, values })
    }

    fn raw_content(&self) -> String {
        let separator = char::from(self.options.delimiter).to_string();
        let joined = self
            .record
            .iter()
            .map(|field| self.field_encoding.decode_without_bom_handling(field).0)
            .collect::<Vec<_>>()
            .join(&separator);
        truncate_chars(&joined, self.options.max_warning_chars)
    }
}

fn csv_io_error(err: csv::Error) -> AnalysisError {
    AnalysisError::Io(std::io::Error::other(err))
}

fn positional_name(pos: usize) -> String {
    format!("column_{}", pos + 1)
}

/// Blank header cells get a positional name; repeated names get `.1`, `.2`, ...
fn header_names(fields: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    fields
        .into_iter()
        .enumerate()
        .map(|(pos, name)| {
            let base = if name.is_empty() {
                positional_name(pos)
            } else {
                name
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let unique = if *count == 0 {
                base
            } else {
                format!("{base}.{count}")
            };
            *count += 1;
            unique
        })
        .collect()
}

//! # Aggregator
//!
//! Per-column frequency maps. Memory grows with the number of distinct values
//! per column, never with the number of rows read.
//!
//! Merging two tables sums counts and keeps the earliest first-seen position,
//! so it is associative and commutative: chunk-local tables can be combined in
//! any grouping and produce the same counts.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::reader::RowBatch;

/// Occurrences of one value in one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueTally {
    pub count: u64,
    /// Ordinal of the first row the value was seen in.
    pub first_seen: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnFrequencies {
    values: HashMap<String, ValueTally>,
    total: u64,
}

impl ColumnFrequencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `value` in the row with the given ordinal.
    pub fn record(&mut self, value: &str, ordinal: u64) {
        if let Some(tally) = self.values.get_mut(value) {
            tally.count += 1;
            tally.first_seen = tally.first_seen.min(ordinal);
        } else {
            self.values.insert(
                value.to_string(),
                ValueTally {
                    count: 1,
                    first_seen: ordinal,
                },
            );
        }
        self.total += 1;
    }

    /// Owned-value variant of [`record`](Self::record), avoiding a copy for new values.
    pub fn record_owned(&mut self, value: String, ordinal: u64) {
        match self.values.entry(value) {
            Entry::Occupied(mut entry) => {
                let tally = entry.get_mut();
                tally.count += 1;
                tally.first_seen = tally.first_seen.min(ordinal);
            }
            Entry::Vacant(entry) => {
                entry.insert(ValueTally {
                    count: 1,
                    first_seen: ordinal,
                });
            }
        }
        self.total += 1;
    }

    pub fn merge(&mut self, other: ColumnFrequencies) {
        for (value, incoming) in other.values {
            match self.values.entry(value) {
                Entry::Occupied(mut entry) => {
                    let tally = entry.get_mut();
                    tally.count += incoming.count;
                    tally.first_seen = tally.first_seen.min(incoming.first_seen);
                }
                Entry::Vacant(entry) => {
                    entry.insert(incoming);
                }
            }
        }
        self.total += other.total;
    }

    pub fn get(&self, value: &str) -> Option<ValueTally> {
        self.values.get(value).copied()
    }

    /// Number of distinct values seen.
    pub fn distinct(&self) -> usize {
        self.values.len()
    }

    /// Number of values counted, i.e. rows that had this column.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ValueTally)> {
        self.values.iter().map(|(value, tally)| (value.as_str(), *tally))
    }
}

/// Frequencies for every column, in the order columns were first registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    columns: Vec<(String, ColumnFrequencies)>,
    index: HashMap<String, usize>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the given columns present but empty.
    pub fn with_columns<S: AsRef<str>>(names: &[S]) -> Self {
        let mut table = Self::new();
        for name in names {
            table.column_mut(name.as_ref());
        }
        table
    }

    /// Chunk-local counts for one batch. Consumes the batch.
    pub fn from_batch(batch: RowBatch) -> Self {
        let (columns, rows) = batch.into_parts();
        let mut table = Self::new();
        let slots: Vec<usize> = columns.iter().map(|name| table.slot(name)).collect();
        for row in rows {
            for (value, &slot) in row.values.into_iter().zip(slots.iter()) {
                table.columns[slot].1.record_owned(value, row.ordinal);
            }
        }
        table
    }

    fn slot(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.index.get(name) {
            return slot;
        }
        let slot = self.columns.len();
        self.columns.push((name.to_string(), ColumnFrequencies::new()));
        self.index.insert(name.to_string(), slot);
        slot
    }

    fn column_mut(&mut self, name: &str) -> &mut ColumnFrequencies {
        let slot = self.slot(name);
        &mut self.columns[slot].1
    }

    pub fn record(&mut self, column: &str, value: &str, ordinal: u64) {
        self.column_mut(column).record(value, ordinal);
    }

    /// Fold `other` into `self`. Columns new to `self` are appended in `other`'s order.
    pub fn merge(&mut self, other: FrequencyTable) {
        for (name, freq) in other.columns {
            self.column_mut(&name).merge(freq);
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnFrequencies> {
        self.index.get(name).map(|&slot| &self.columns[slot].1)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnFrequencies)> {
        self.columns.iter().map(|(name, freq)| (name.as_str(), freq))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Running totals for one analysis. Only the worker that owns it mutates it.
#[derive(Debug, Default)]
pub struct Aggregator {
    table: FrequencyTable,
    rows: u64,
    batches: u64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register header columns so they are reported even without values.
    pub fn with_columns<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            table: FrequencyTable::with_columns(names),
            ..Self::default()
        }
    }

    /// Count a batch and fold it into the running totals.
    pub fn ingest(&mut self, batch: RowBatch) {
        let rows = batch.len() as u64;
        self.merge(FrequencyTable::from_batch(batch), rows);
    }

    /// Fold chunk-local counts covering `rows` rows into the running totals.
    pub fn merge(&mut self, batch_counts: FrequencyTable, rows: u64) {
        self.table.merge(batch_counts);
        self.rows += rows;
        self.batches += 1;
    }

    pub fn table(&self) -> &FrequencyTable {
        &self.table
    }

    pub fn into_table(self) -> FrequencyTable {
        self.table
    }

    /// Well-formed rows aggregated so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }
}

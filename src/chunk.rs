/// Advisory size of a run, derived once from the sample. Never used to decide
/// when reading stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ChunkEstimate {
    pub estimated_total_rows: u64,
    pub estimated_total_chunks: u64,
}

pub fn estimate_chunks(file_size: u64, avg_row_bytes: f64, chunk_size: usize) -> ChunkEstimate {
    let estimated_total_rows = if avg_row_bytes.is_finite() && avg_row_bytes > 0.0 {
        let rows = (file_size as f64 / avg_row_bytes).floor();
        if rows.is_finite() { rows as u64 } else { 1 }
    } else {
        1
    };
    let estimated_total_rows = estimated_total_rows.max(1);

    ChunkEstimate {
        estimated_total_rows,
        estimated_total_chunks: chunk_count(estimated_total_rows, chunk_size as u64),
    }
}

/// Number of `chunk_size` batches needed for `total_rows`, at least one.
pub fn chunk_count(total_rows: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 1;
    }
    total_rows.div_ceil(chunk_size).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_rows_and_chunks() {
        let est = estimate_chunks(1_000_000, 100.0, 9000);
        assert_eq!(est.estimated_total_rows, 10_000);
        assert_eq!(est.estimated_total_chunks, 2);
    }

    #[test]
    fn small_file_still_has_one_chunk() {
        let est = estimate_chunks(10, 150.0, 500);
        assert_eq!(est.estimated_total_rows, 1);
        assert_eq!(est.estimated_total_chunks, 1);
    }

    #[test]
    fn degenerate_row_size_is_guarded() {
        for avg in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let est = estimate_chunks(4096, avg, 500);
            assert_eq!(est.estimated_total_chunks, 1);
        }
        let est = estimate_chunks(u64::MAX, f64::MIN_POSITIVE, 500);
        assert!(est.estimated_total_chunks >= 1);
    }

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(10_050, 9000), 2);
        assert_eq!(chunk_count(9000, 9000), 1);
        assert_eq!(chunk_count(0, 9000), 1);
        assert_eq!(chunk_count(7, 0), 1);
    }
}

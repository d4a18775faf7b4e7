//! Date-range chunk planning.
//!
//! Platforms cap how much history a single report request may cover, so a
//! backfill is split into contiguous, non-overlapping sub-ranges that are
//! fetched independently.

use std::num::NonZeroU32;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// An inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDateRange`] when `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// A single-day range, used by daily collection.
    #[must_use]
    pub fn single_day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Number of calendar days covered, counting both ends.
    #[must_use]
    pub fn days(&self) -> u64 {
        // start <= end is guaranteed by construction.
        u64::try_from((self.end - self.start).num_days()).unwrap_or(0) + 1
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Maximum span of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSize {
    Days(NonZeroU32),
    /// The whole range is one chunk. Used for collections that are not
    /// date-partitioned, such as creative assets.
    Unbounded,
}

/// Splits `range` into ordered sub-ranges of at most `size` days.
///
/// The last chunk is clamped to `range.end`. The output always contains at
/// least one chunk, never overlaps and covers `range` exactly.
#[must_use]
pub fn plan_chunks(range: DateRange, size: ChunkSize) -> Vec<DateRange> {
    let step = match size {
        ChunkSize::Unbounded => return vec![range],
        ChunkSize::Days(days) => u64::from(days.get()),
    };

    let mut chunks = Vec::new();
    let mut cursor = range.start;
    loop {
        let tentative_end = cursor
            .checked_add_days(Days::new(step - 1))
            .unwrap_or(NaiveDate::MAX);
        let end = tentative_end.min(range.end);
        chunks.push(DateRange { start: cursor, end });

        if end >= range.end {
            break;
        }
        match end.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(date(start), date(end)).expect("valid range")
    }

    fn days(n: u32) -> ChunkSize {
        ChunkSize::Days(NonZeroU32::new(n).expect("non-zero"))
    }

    #[test]
    fn rejects_inverted_range() {
        let err = DateRange::new(date("2024-01-10"), date("2024-01-01")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDateRange { .. }));
    }

    #[test]
    fn single_day_range_yields_one_chunk() {
        let chunks = plan_chunks(range("2024-03-05", "2024-03-05"), days(7));
        assert_eq!(chunks, vec![range("2024-03-05", "2024-03-05")]);
    }

    #[test]
    fn exact_multiple_has_no_remainder_chunk() {
        let chunks = plan_chunks(range("2024-01-01", "2024-01-14"), days(7));
        assert_eq!(
            chunks,
            vec![
                range("2024-01-01", "2024-01-07"),
                range("2024-01-08", "2024-01-14"),
            ]
        );
    }

    #[test]
    fn off_by_one_length_adds_single_day_tail() {
        let chunks = plan_chunks(range("2024-01-01", "2024-01-15"), days(7));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], range("2024-01-15", "2024-01-15"));
    }

    #[test]
    fn twenty_days_by_seven() {
        let chunks = plan_chunks(range("2024-01-01", "2024-01-20"), days(7));
        assert_eq!(
            chunks,
            vec![
                range("2024-01-01", "2024-01-07"),
                range("2024-01-08", "2024-01-14"),
                range("2024-01-15", "2024-01-20"),
            ]
        );
    }

    #[test]
    fn unbounded_collapses_to_whole_range() {
        let whole = range("2024-01-01", "2024-01-30");
        assert_eq!(plan_chunks(whole, ChunkSize::Unbounded), vec![whole]);
    }

    #[test]
    fn chunks_tile_the_range_for_many_sizes() {
        let start = date("2023-12-25");
        for len in 1..=62_u64 {
            let end = start.checked_add_days(Days::new(len - 1)).unwrap();
            let whole = DateRange::new(start, end).unwrap();
            for size in 1..=31_u32 {
                let chunks = plan_chunks(whole, days(size));

                let expected = len.div_ceil(u64::from(size));
                assert_eq!(chunks.len() as u64, expected, "len={len} size={size}");

                assert_eq!(chunks.first().unwrap().start, whole.start);
                assert_eq!(chunks.last().unwrap().end, whole.end);
                for pair in chunks.windows(2) {
                    assert_eq!(pair[0].end.succ_opt().unwrap(), pair[1].start);
                }
                assert!(chunks.iter().all(|c| c.days() <= u64::from(size)));
            }
        }
    }

    #[test]
    fn days_counts_inclusive_ends() {
        assert_eq!(range("2024-01-01", "2024-01-01").days(), 1);
        assert_eq!(range("2024-01-01", "2024-01-31").days(), 31);
    }
}

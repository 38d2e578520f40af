// src/align.rs
//
// Joint time alignment of the two stores' outputs: minute-truncate both
// time axes, optionally pre-filter one side to an interval window, then
// intersect. No interpolation or resampling, only set intersection.

use std::collections::BTreeSet;

use arrow::array::UInt32Array;
use arrow::compute::take;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};

use crate::error::Result;

/// Sampling interval of the raster feed, in minutes.
pub const DEFAULT_INTERVAL: u32 = 60;
/// Width of the tolerance window, in minutes of the interval.
pub const DEFAULT_TOLERANCE: u32 = 1;

/// Row selections restricting two datasets to their common minutes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    pub left: Vec<usize>,
    pub right: Vec<usize>,
}

/// Intersect two time axes on minute-truncated instants. Sub-minute jitter
/// is discarded on both sides first, so sources reporting a few seconds
/// apart still match. The left axis is additionally pre-filtered to the
/// instants whose minute-of-interval falls inside the tolerance window;
/// pass `interval = 1, tolerance = 1` to disable the window.
pub fn fit_times(
    left: &[DateTime<Utc>],
    right: &[DateTime<Utc>],
    interval: u32,
    tolerance: u32,
) -> Alignment {
    let interval = interval.max(1);
    let left_minutes: Vec<DateTime<Utc>> = left.iter().map(truncate_to_minute).collect();
    let right_minutes: Vec<DateTime<Utc>> = right.iter().map(truncate_to_minute).collect();

    let in_window = |t: &DateTime<Utc>| t.minute() % interval < tolerance;

    let right_set: BTreeSet<&DateTime<Utc>> = right_minutes.iter().collect();
    let common: BTreeSet<&DateTime<Utc>> = left_minutes
        .iter()
        .filter(|t| in_window(t) && right_set.contains(t))
        .collect();

    Alignment {
        left: indices_in(&left_minutes, &common),
        right: indices_in(&right_minutes, &common),
    }
}

fn truncate_to_minute(t: &DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(Duration::minutes(1)).unwrap_or(*t)
}

fn indices_in(minutes: &[DateTime<Utc>], keep: &BTreeSet<&DateTime<Utc>>) -> Vec<usize> {
    minutes
        .iter()
        .enumerate()
        .filter(|(_, t)| keep.contains(t))
        .map(|(i, _)| i)
        .collect()
}

/// Apply a row selection to a record batch with the take kernel.
pub fn select_rows(batch: &RecordBatch, indices: &[usize]) -> Result<RecordBatch> {
    let idx = UInt32Array::from(indices.iter().map(|&i| i as u32).collect::<Vec<_>>());
    let columns = batch
        .columns()
        .iter()
        .map(|col| take(col.as_ref(), &idx, None))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    RecordBatch::try_new(batch.schema(), columns).map_err(Into::into)
}

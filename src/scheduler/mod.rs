// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Splitting visibility batches into baseline ranges and processing them in
//! parallel.

mod error;
#[cfg(test)]
mod tests;

pub use error::{RangeError, SchedulerError};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_utils::atomic::AtomicCell;
use log::{debug, trace, warn};
use marlu::UVW;
use rayon::prelude::*;
use scopeguard::defer_on_unwind;

use crate::math::{baseline_number, resident_memory_kib};

/// A contiguous run of rows (in sorted order) belonging to one baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineRange {
    pub ant1: usize,
    pub ant2: usize,

    /// The first and last (inclusive) indices into the sorted row order.
    pub start: usize,
    pub end: usize,

    /// The mean of the first and last rows' w \[metres\].
    pub mean_w: f64,
}

impl BaselineRange {
    /// The row indices of this range.
    pub fn rows<'a>(&self, order: &'a [usize]) -> &'a [usize] {
        &order[self.start..=self.end]
    }

    /// The number of rows in this range. Never zero.
    pub fn num_rows(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Sort rows by baseline and split them into ranges worth resampling.
///
/// Rows are ordered by `num_antennas * ant1 + ant2`; rows of the same baseline
/// keep their relative order. A run of rows is dropped if it is an
/// auto-correlation (unless `use_zero` is set), if every row in it is flagged,
/// or if the mean of its first and last rows' w exceeds `w_max` in magnitude.
///
/// Returns the sorted row order and the ranges, which index into it.
pub fn make_baseline_ranges(
    num_antennas: usize,
    antenna1: &[usize],
    antenna2: &[usize],
    uvw: &[UVW],
    flag_row: &[bool],
    w_max: f64,
    use_zero: bool,
) -> (Vec<usize>, Vec<BaselineRange>) {
    let bl = |row: usize| baseline_number(num_antennas, antenna1[row], antenna2[row]);
    let mut order: Vec<usize> = (0..antenna1.len()).collect();
    // `sort_by_key` is stable.
    order.sort_by_key(|&row| bl(row));

    let mut ranges = vec![];
    let mut start = 0;
    while start < order.len() {
        let this_bl = bl(order[start]);
        let mut end = start;
        while end + 1 < order.len() && bl(order[end + 1]) == this_bl {
            end += 1;
        }

        let first = order[start];
        let last = order[end];
        let (ant1, ant2) = (antenna1[first], antenna2[first]);
        let mean_w = 0.5 * (uvw[first].w + uvw[last].w);
        let all_flagged = order[start..=end].iter().all(|&row| flag_row[row]);
        if (use_zero || ant1 != ant2) && !all_flagged && mean_w.abs() <= w_max {
            ranges.push(BaselineRange {
                ant1,
                ant2,
                start,
                end,
                mean_w,
            });
        } else {
            trace!("Skipping baseline {ant1}-{ant2} (w = {mean_w:.2} m, all flagged: {all_flagged})");
        }

        start = end + 1;
    }

    (order, ranges)
}

/// Process every range once, in parallel. Each accumulator is handed to
/// exactly one worker, and workers claim ranges in order as they become free.
///
/// A range is only marked as done when `work` succeeds on it. If `work` fails
/// with a retryable error, the range is attempted again in another sub-pass
/// once every other range has been attempted; `work` must therefore leave its
/// accumulator untouched when it fails. At most `max_retry_passes` extra
/// sub-passes are run. Any other error stops the pass.
///
/// Returns the number of sub-passes that were run.
pub(crate) fn run_pass<A, W>(
    pool: &rayon::ThreadPool,
    ranges: &[BaselineRange],
    accumulators: &mut [A],
    max_retry_passes: usize,
    work: W,
) -> Result<usize, SchedulerError>
where
    A: Send,
    W: Fn(usize, &BaselineRange, &mut A) -> Result<(), RangeError> + Sync,
{
    let done: Vec<AtomicBool> = ranges.iter().map(|_| AtomicBool::new(false)).collect();
    // Use a variable to track whether any workers have an issue.
    let error = AtomicCell::new(false);

    let mut passes = 0;
    loop {
        let pending: Vec<usize> = done
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.load(Ordering::Acquire))
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return Ok(passes);
        }
        if passes > max_retry_passes {
            return Err(SchedulerError::RetryBudgetExhausted {
                pending: pending.len(),
                passes,
            });
        }
        if passes > 0 {
            warn!(
                "Retrying {} baseline ranges (attempt {passes} of {max_retry_passes})",
                pending.len()
            );
        }
        debug!(
            "Sub-pass {passes}: {} baseline ranges over {} workers",
            pending.len(),
            accumulators.len()
        );

        let cursor = AtomicUsize::new(0);
        pool.install(|| {
            accumulators
                .par_iter_mut()
                .with_max_len(1)
                .try_for_each(|acc| -> Result<(), RangeError> {
                    // If a panic happens, update our atomic error.
                    defer_on_unwind! { error.store(true); }

                    loop {
                        if error.load() {
                            return Ok(());
                        }
                        let claimed = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(&i_range) = pending.get(claimed) else {
                            return Ok(());
                        };
                        let range = &ranges[i_range];
                        match work(i_range, range, acc) {
                            Ok(()) => done[i_range].store(true, Ordering::Release),
                            Err(e) if e.is_retryable() => {
                                let rss = resident_memory_kib()
                                    .map(|kib| format!("{kib} KiB"))
                                    .unwrap_or_else(|| "unknown".to_string());
                                warn!(
                                    "Baseline {}-{} will be retried: {e} (resident memory: {rss})",
                                    range.ant1, range.ant2
                                );
                            }
                            Err(e) => {
                                error.store(true);
                                return Err(e);
                            }
                        }
                    }
                })
        })?;
        passes += 1;
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use approx::assert_abs_diff_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::*;
use crate::cf::CfError;

fn pool(num_threads: usize) -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .unwrap()
}

#[derive(Clone)]
struct Rows {
    num_antennas: usize,
    antenna1: Vec<usize>,
    antenna2: Vec<usize>,
    uvw: Vec<UVW>,
    flag_row: Vec<bool>,
}

impl Rows {
    fn random(rng: &mut StdRng, num_antennas: usize, num_rows: usize) -> Rows {
        let mut rows = Rows {
            num_antennas,
            antenna1: vec![],
            antenna2: vec![],
            uvw: vec![],
            flag_row: vec![],
        };
        for _ in 0..num_rows {
            let ant1 = rng.gen_range(0..num_antennas);
            let ant2 = rng.gen_range(ant1..num_antennas);
            rows.antenna1.push(ant1);
            rows.antenna2.push(ant2);
            // Give each baseline its own w so that some are cut.
            let w = (ant2 as f64 - ant1 as f64) * 10.0 + rng.gen_range(-1.0..1.0);
            rows.uvw.push(UVW { u: 1.0, v: 1.0, w });
            rows.flag_row.push(rng.gen_bool(0.3));
        }
        rows
    }

    fn ranges(&self, w_max: f64, use_zero: bool) -> (Vec<usize>, Vec<BaselineRange>) {
        make_baseline_ranges(
            self.num_antennas,
            &self.antenna1,
            &self.antenna2,
            &self.uvw,
            &self.flag_row,
            w_max,
            use_zero,
        )
    }
}

#[test]
fn test_single_baseline() {
    let rows = Rows {
        num_antennas: 2,
        antenna1: vec![0],
        antenna2: vec![1],
        uvw: vec![UVW::default()],
        flag_row: vec![false],
    };
    let (order, ranges) = rows.ranges(100.0, false);
    assert_eq!(order, vec![0]);
    assert_eq!(
        ranges,
        vec![BaselineRange {
            ant1: 0,
            ant2: 1,
            start: 0,
            end: 0,
            mean_w: 0.0
        }]
    );
    assert_eq!(ranges[0].rows(&order), &[0]);
}

#[test]
fn test_w_max_is_an_inclusive_limit() {
    let rows = Rows {
        num_antennas: 2,
        antenna1: vec![0],
        antenna2: vec![1],
        uvw: vec![UVW::default()],
        flag_row: vec![false],
    };
    // |mean w| <= w_max keeps the baseline, so a w of exactly 0 survives a
    // w_max of 0.
    let (_, ranges) = rows.ranges(0.0, false);
    assert_eq!(ranges.len(), 1);

    // Any nonzero w is cut by a w_max of 0.
    for w in [0.1, -0.1, 1e-9] {
        let rows = Rows {
            uvw: vec![UVW { u: 0.0, v: 0.0, w }],
            ..rows.clone()
        };
        let (_, ranges) = rows.ranges(0.0, false);
        assert!(ranges.is_empty(), "w = {w}");
    }

    // The limit itself is inside.
    let rows = Rows {
        uvw: vec![UVW { u: 0.0, v: 0.0, w: -2.5 }],
        ..rows
    };
    assert_eq!(rows.ranges(2.5, false).1.len(), 1);
    assert!(rows.ranges(2.4999, false).1.is_empty());
}

#[test]
fn test_sort_is_stable_and_grouped() {
    let rows = Rows {
        num_antennas: 3,
        antenna1: vec![1, 0, 1, 0, 0, 1],
        antenna2: vec![2, 1, 2, 2, 1, 2],
        uvw: vec![UVW::default(); 6],
        flag_row: vec![false; 6],
    };
    let (order, ranges) = rows.ranges(1.0, false);
    // Baseline numbers: 0-1 => 1, 0-2 => 2, 1-2 => 5.
    assert_eq!(order, vec![1, 4, 3, 0, 2, 5]);
    let pairs: Vec<_> = ranges.iter().map(|r| (r.ant1, r.ant2, r.num_rows())).collect();
    assert_eq!(pairs, vec![(0, 1, 2), (0, 2, 1), (1, 2, 3)]);
}

#[test]
fn test_autos_and_flags() {
    let rows = Rows {
        num_antennas: 2,
        antenna1: vec![0, 0, 1, 0, 0],
        antenna2: vec![0, 1, 1, 1, 0],
        uvw: vec![UVW::default(); 5],
        flag_row: vec![false, true, false, false, true],
    };
    let (order, ranges) = rows.ranges(1.0, false);
    // A partially flagged run is kept whole.
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0].rows(&order), &[1, 3]);

    let (order, ranges) = rows.ranges(1.0, true);
    assert_eq!(ranges.len(), 3);
    assert_eq!(ranges[0].rows(&order), &[0, 4]);

    // A fully flagged run is dropped.
    let rows = Rows {
        flag_row: vec![false, true, false, true, false],
        ..rows
    };
    let (_, ranges) = rows.ranges(1.0, false);
    assert!(ranges.is_empty());
}

#[test]
fn test_mean_w_uses_first_and_last_rows() {
    let rows = Rows {
        num_antennas: 2,
        antenna1: vec![0, 0, 0],
        antenna2: vec![1, 1, 1],
        uvw: [-3.0, 500.0, 5.0]
            .into_iter()
            .map(|w| UVW { u: 0.0, v: 0.0, w })
            .collect(),
        flag_row: vec![false; 3],
    };
    let (_, ranges) = rows.ranges(1.0, false);
    assert_eq!(ranges.len(), 1);
    assert_abs_diff_eq!(ranges[0].mean_w, 1.0);
    let (_, ranges) = rows.ranges(0.99, false);
    assert!(ranges.is_empty());
}

#[test]
fn test_random_batches() {
    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..20 {
        let rows = Rows::random(&mut rng, 8, 300);
        let w_max = 35.0;
        let (order, ranges) = rows.ranges(w_max, false);

        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..300).collect::<Vec<_>>());

        let mut emitted = HashSet::new();
        for range in &ranges {
            for &row in range.rows(&order) {
                // No autos.
                assert_ne!(rows.antenna1[row], rows.antenna2[row]);
                // One baseline per range.
                assert_eq!(
                    (rows.antenna1[row], rows.antenna2[row]),
                    (range.ant1, range.ant2)
                );
                assert!(emitted.insert(row));
            }
        }

        // The emitted rows are exactly the rows of baselines that are
        // cross-correlations, not completely flagged, and within w_max.
        let mut expected = HashSet::new();
        for ant1 in 0..8 {
            for ant2 in ant1 + 1..8 {
                let bl_rows: Vec<usize> = (0..300)
                    .filter(|&r| rows.antenna1[r] == ant1 && rows.antenna2[r] == ant2)
                    .collect();
                let (Some(&first), Some(&last)) = (bl_rows.first(), bl_rows.last()) else {
                    continue;
                };
                let mean_w = 0.5 * (rows.uvw[first].w + rows.uvw[last].w);
                let all_flagged = bl_rows.iter().all(|&r| rows.flag_row[r]);
                if !all_flagged && mean_w.abs() <= w_max {
                    expected.extend(bl_rows);
                }
            }
        }
        assert_eq!(emitted, expected);

        // A w_max of 0 excludes every baseline, as no w is 0.
        let (_, ranges) = rows.ranges(0.0, false);
        assert!(ranges.is_empty());
    }
}

fn ranges(n: usize) -> Vec<BaselineRange> {
    (0..n)
        .map(|i| BaselineRange {
            ant1: 0,
            ant2: i + 1,
            start: i,
            end: i,
            mean_w: 0.0,
        })
        .collect()
}

#[test]
fn test_run_pass_processes_everything_once() {
    let ranges = ranges(100);
    let counts: Vec<AtomicUsize> = (0..100).map(|_| AtomicUsize::new(0)).collect();
    let mut accumulators = vec![0usize; 4];
    let passes = run_pass(&pool(4), &ranges, &mut accumulators, 16, |i, range, acc| {
        assert_eq!(range.start, i);
        counts[i].fetch_add(1, Ordering::Relaxed);
        *acc += i;
        Ok(())
    })
    .unwrap();
    assert_eq!(passes, 1);
    assert!(counts.iter().all(|c| c.load(Ordering::Relaxed) == 1));
    assert_eq!(accumulators.iter().sum::<usize>(), (0..100).sum::<usize>());
}

#[test]
fn test_run_pass_with_nothing_to_do() {
    let mut accumulators = vec![0usize; 2];
    let passes = run_pass(&pool(2), &[], &mut accumulators, 16, |_, _, _| {
        unreachable!()
    })
    .unwrap();
    assert_eq!(passes, 0);
}

#[test]
fn test_run_pass_retries_allocation_failures() {
    let ranges = ranges(50);
    // Every third range fails on its first attempt.
    let failed: Vec<AtomicBool> = (0..50).map(|_| AtomicBool::new(false)).collect();
    let counts: Vec<AtomicUsize> = (0..50).map(|_| AtomicUsize::new(0)).collect();
    let mut accumulators = vec![0usize; 3];
    let passes = run_pass(&pool(3), &ranges, &mut accumulators, 16, |i, range, acc| {
        if i % 3 == 0 && !failed[i].swap(true, Ordering::Relaxed) {
            return Err(RangeError::Allocation {
                ant1: range.ant1,
                ant2: range.ant2,
                bytes: 1024,
            });
        }
        counts[i].fetch_add(1, Ordering::Relaxed);
        *acc += i;
        Ok(())
    })
    .unwrap();
    assert_eq!(passes, 2);
    assert!(counts.iter().all(|c| c.load(Ordering::Relaxed) == 1));
    assert_eq!(accumulators.iter().sum::<usize>(), (0..50).sum::<usize>());
}

#[test]
fn test_run_pass_retry_budget() {
    let ranges = ranges(10);
    let mut accumulators = vec![(); 2];
    let result = run_pass(&pool(2), &ranges, &mut accumulators, 3, |i, range, _| {
        if i < 4 {
            Err(RangeError::ConvolutionFunction(CfError::Allocation { bytes: 8 }))
        } else {
            assert!(range.ant2 > 4);
            Ok(())
        }
    });
    assert!(matches!(
        result,
        Err(SchedulerError::RetryBudgetExhausted {
            pending: 4,
            passes: 4
        })
    ));
}

#[test]
fn test_run_pass_fatal_error() {
    let ranges = ranges(20);
    let mut accumulators = vec![(); 4];
    let result = run_pass(&pool(4), &ranges, &mut accumulators, 16, |i, _, _| {
        if i == 7 {
            Err(RangeError::ConvolutionFunction(CfError::NotPrepared))
        } else {
            Ok(())
        }
    });
    assert!(matches!(
        result,
        Err(SchedulerError::Range(RangeError::ConvolutionFunction(
            CfError::NotPrepared
        )))
    ));
}

#[test]
fn test_retryability() {
    assert!(RangeError::Allocation {
        ant1: 0,
        ant2: 1,
        bytes: 1
    }
    .is_retryable());
    assert!(RangeError::ConvolutionFunction(CfError::Allocation { bytes: 1 }).is_retryable());
    assert!(!RangeError::ConvolutionFunction(CfError::ZeroOversample).is_retryable());
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use rustfft::FftDirection;

use super::{fft::*, *};

fn filled<F: GridFloat>(value: f64, shape: (usize, usize, usize, usize)) -> ThreadAccumulator<F> {
    let mut acc = ThreadAccumulator::new(shape.0, shape.1, shape.2, shape.3);
    acc.grid
        .indexed_iter_mut()
        .for_each(|((c, p, y, x), v)| {
            *v = F::from_c64(c64::new(value * (1 + c + p + y + x) as f64, -value));
        });
    acc.sum_weights.fill(value);
    acc.pb.sum_flat_pb = value;
    acc.pb.sum_cf_weight = 2.0 * value;
    acc
}

#[test]
fn test_sum_grids_into() {
    let shape = (2, 2, 4, 6);
    let accs: Vec<ThreadAccumulator<f64>> =
        [1.0, 2.0, 3.0].iter().map(|&v| filled(v, shape)).collect();
    let mut target = Array4::zeros(shape);
    sum_grids_into(target.view_mut(), &accs);
    for ((c, p, y, x), v) in target.indexed_iter() {
        assert_abs_diff_eq!(*v, c64::new(6.0 * (1 + c + p + y + x) as f64, -6.0));
    }

    // Summing into a non-zero target adds.
    sum_grids_into(target.view_mut(), &accs[..1]);
    assert_abs_diff_eq!(target[(0, 0, 0, 0)], c64::new(7.0, -7.0));
}

#[test]
#[should_panic]
fn test_sum_grids_into_shape_mismatch() {
    let accs = vec![filled::<f32>(1.0, (1, 1, 4, 4))];
    let mut target = Array4::zeros((1, 1, 4, 5));
    sum_grids_into(target.view_mut(), &accs);
}

#[test]
fn test_merge_is_independent_of_grouping() {
    // Single-precision sums are compared exactly; the same additions happen
    // in the same order regardless of how often we merge.
    let shape = (1, 1, 8, 8);
    let accs: Vec<ThreadAccumulator<f32>> = [0.1, 0.7, 1.3, 2.9]
        .iter()
        .map(|&v| filled(v, shape))
        .collect();
    let mut a = Array4::zeros(shape);
    sum_grids_into(a.view_mut(), &accs);
    let mut b = Array4::zeros(shape);
    for acc in accs.chunks(1) {
        sum_grids_into(b.view_mut(), acc);
    }
    assert_eq!(a, b);
}

#[test]
fn test_reduce_accumulators() {
    let shape = (2, 3, 4, 4);
    let mut accs: Vec<ThreadAccumulator<f64>> =
        [1.0, 2.0, 4.0].iter().map(|&v| filled(v, shape)).collect();
    reduce_accumulators(&mut accs);
    assert!(accs[0].sum_weights.iter().all(|&w| w == 7.0));
    assert_abs_diff_eq!(accs[0].pb.sum_flat_pb, 7.0);
    assert_abs_diff_eq!(accs[0].pb.sum_cf_weight, 14.0);
    for acc in &accs[1..] {
        assert!(acc.sum_weights.iter().all(|&w| w == 0.0));
        assert_abs_diff_eq!(acc.pb.sum_cf_weight, 0.0);
    }
    // Grids are untouched.
    assert_abs_diff_eq!(accs[2].grid[(0, 0, 0, 0)], c64::new(4.0, -4.0));

    // Reducing again doesn't double count.
    reduce_accumulators(&mut accs);
    assert!(accs[0].sum_weights.iter().all(|&w| w == 7.0));

    // Nothing to do for nothing.
    reduce_accumulators::<f64>(&mut []);
}

#[test]
fn test_zeroing() {
    let mut acc = filled::<f32>(1.0, (1, 2, 3, 3));
    acc.zero_grid();
    assert!(acc.grid.iter().all(|v| *v == c32::new(0.0, 0.0)));
    assert!(acc.sum_weights.iter().all(|&w| w == 1.0));
    acc.zero();
    assert!(acc.sum_weights.iter().all(|&w| w == 0.0));
    assert_abs_diff_eq!(acc.pb.sum_flat_pb, 0.0);
}

#[test]
fn test_demote_promote() {
    let acc = filled::<f64>(0.5, (1, 1, 2, 2));
    let demoted = demote(acc.grid.view());
    assert_eq!(demoted[(0, 0, 1, 1)], c32::new(1.5, -0.5));
    let promoted: Array4<c64> = promote(demoted.view());
    assert_eq!(promoted, acc.grid);
}

#[test]
fn test_centred_point_transforms_to_constant() {
    for (ny, nx) in [(8, 8), (6, 10), (5, 7)] {
        let mut plane = Array2::<c64>::zeros((ny, nx));
        plane[(ny / 2, nx / 2)] = c64::new(1.0, 0.0);
        CentredFft2::new(ny, nx, FftDirection::Inverse, false).process(plane.view_mut());
        for v in plane.iter() {
            assert_abs_diff_eq!(*v, c64::new(1.0, 0.0), epsilon = 1e-12);
        }
    }
}

#[test]
fn test_offset_point_transforms_to_phase_ramp() {
    let (ny, nx) = (8, 16);
    let mut plane = Array2::<c64>::zeros((ny, nx));
    // One pixel right of the centre.
    plane[(ny / 2, nx / 2 + 1)] = c64::new(1.0, 0.0);
    CentredFft2::new(ny, nx, FftDirection::Forward, false).process(plane.view_mut());
    for ((_, x), v) in plane.indexed_iter() {
        let k = x as f64 - (nx / 2) as f64;
        let expected = crate::math::cexp(-crate::constants::TAU * k / nx as f64);
        assert_abs_diff_eq!(*v, expected, epsilon = 1e-12);
    }
}

#[test]
fn test_fft_round_trip() {
    let shape = (2, 2, 6, 10);
    let acc = filled::<f64>(0.25, shape);
    let mut grid = acc.grid.clone();
    fft_planes(&mut grid, FftDirection::Inverse, true);
    assert!(grid.iter().zip(acc.grid.iter()).any(|(a, b)| (a - b).norm() > 1e-3));
    fft_planes(&mut grid, FftDirection::Forward, false);
    for (a, b) in grid.iter().zip(acc.grid.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
    }
}

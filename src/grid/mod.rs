// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! uv grids, per-thread accumulators and merging them.
//!
//! Grids are laid out as (channel, polarisation, v, u). During a gridding pass
//! every worker owns one [`ThreadAccumulator`]; nothing is shared, so nothing
//! is locked. After a pass the accumulators are merged in thread-index order so
//! that the results don't depend on which worker processed which baseline.

pub(crate) mod fft;
#[cfg(test)]
mod tests;

use std::fmt::Debug;

use marlu::{c32, c64};
use ndarray::{prelude::*, Zip};
use num_complex::Complex;
use num_traits::{Float, NumAssign};
use rustfft::FftNum;

use crate::cf::PbAccumulator;

/// The precision of a uv grid. Accumulating many visibilities onto a
/// single-precision grid can drift; a double-precision grid is only demoted
/// to single precision immediately before the FFT to the image domain.
pub trait GridFloat: Float + FftNum + NumAssign + Default + Debug + Send + Sync + 'static {
    /// A human-readable name of this precision.
    const NAME: &'static str;

    fn from_c64(c: c64) -> Complex<Self>;

    fn to_c64(c: Complex<Self>) -> c64;

    fn from_c32(c: c32) -> Complex<Self>;

    fn to_c32(c: Complex<Self>) -> c32;
}

impl GridFloat for f32 {
    const NAME: &'static str = "single";

    #[inline]
    fn from_c64(c: c64) -> c32 {
        c32::new(c.re as f32, c.im as f32)
    }

    #[inline]
    fn to_c64(c: c32) -> c64 {
        c64::new(c.re as f64, c.im as f64)
    }

    #[inline]
    fn from_c32(c: c32) -> c32 {
        c
    }

    #[inline]
    fn to_c32(c: c32) -> c32 {
        c
    }
}

impl GridFloat for f64 {
    const NAME: &'static str = "double";

    #[inline]
    fn from_c64(c: c64) -> c64 {
        c
    }

    #[inline]
    fn to_c64(c: c64) -> c64 {
        c
    }

    #[inline]
    fn from_c32(c: c32) -> c64 {
        c64::new(c.re as f64, c.im as f64)
    }

    #[inline]
    fn to_c32(c: c64) -> c32 {
        c32::new(c.re as f32, c.im as f32)
    }
}

/// Everything a single worker accumulates during gridding.
#[derive(Debug, Clone)]
pub struct ThreadAccumulator<F: GridFloat> {
    /// Shape (num_chans, num_pols, ny_padded, nx_padded).
    pub grid: Array4<Complex<F>>,

    /// Shape (num_pols, num_chans).
    pub sum_weights: Array2<f64>,

    pub pb: PbAccumulator,
}

impl<F: GridFloat> ThreadAccumulator<F> {
    pub fn new(num_chans: usize, num_pols: usize, ny: usize, nx: usize) -> Self {
        Self {
            grid: Array4::zeros((num_chans, num_pols, ny, nx)),
            sum_weights: Array2::zeros((num_pols, num_chans)),
            pb: PbAccumulator::new(ny, nx),
        }
    }

    /// Reset everything.
    pub fn zero(&mut self) {
        self.zero_grid();
        self.sum_weights.fill(0.0);
        self.pb.zero();
    }

    /// Reset the grid only; weights and primary beams keep accumulating.
    pub fn zero_grid(&mut self) {
        self.grid.fill(Complex::new(F::zero(), F::zero()));
    }
}

/// Add every accumulator's grid into `target`. Accumulators are added in
/// thread-index order, so each cell sees the same sequence of additions
/// regardless of scheduling.
pub fn sum_grids_into<F: GridFloat>(
    mut target: ArrayViewMut4<Complex<F>>,
    accumulators: &[ThreadAccumulator<F>],
) {
    for acc in accumulators {
        assert_eq!(
            target.dim(),
            acc.grid.dim(),
            "Accumulator grid doesn't match the target grid"
        );
        Zip::from(&mut target)
            .and(&acc.grid)
            .par_for_each(|t, &a| *t += a);
    }
}

/// Sum the weights and primary-beam accumulators of every worker into the
/// first accumulator. The other accumulators' weights are zeroed, so the
/// totals stay correct if this is called more than once.
pub fn reduce_accumulators<F: GridFloat>(accumulators: &mut [ThreadAccumulator<F>]) {
    if let Some((first, others)) = accumulators.split_first_mut() {
        for other in others {
            first.sum_weights += &other.sum_weights;
            other.sum_weights.fill(0.0);
            first.pb.add_assign(&other.pb);
            other.pb.zero();
        }
    }
}

/// Convert a grid to single precision.
pub fn demote<F: GridFloat>(grid: ArrayView4<Complex<F>>) -> Array4<c32> {
    Zip::from(&grid).par_map_collect(|&c| F::to_c32(c))
}

/// Convert a single-precision grid to the grid precision.
pub fn promote<F: GridFloat>(grid: ArrayView4<c32>) -> Array4<Complex<F>> {
    Zip::from(&grid).par_map_collect(|&c| F::from_c32(c))
}

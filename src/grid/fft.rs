// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Centred 2-D FFTs.
//!
//! Pixel `n/2` of each axis is the origin in both domains. An inverse
//! transform takes a uv grid to an image, a forward transform takes an image
//! to a uv grid.

use std::sync::Arc;

use ndarray::prelude::*;
use num_complex::Complex;
use num_traits::{Float, Zero};
use rayon::prelude::*;
use rustfft::{Fft, FftDirection, FftNum, FftPlanner};

/// A planned 2-D FFT for planes of a fixed shape.
pub(crate) struct CentredFft2<T: FftNum> {
    ny: usize,
    nx: usize,
    row_fft: Arc<dyn Fft<T>>,
    col_fft: Arc<dyn Fft<T>>,
    /// Divide by the number of pixels after transforming?
    normalise: bool,
}

impl<T: FftNum + Float> CentredFft2<T> {
    pub(crate) fn new(ny: usize, nx: usize, direction: FftDirection, normalise: bool) -> Self {
        let mut planner = FftPlanner::new();
        let row_fft = planner.plan_fft(nx, direction);
        let col_fft = planner.plan_fft(ny, direction);
        Self {
            ny,
            nx,
            row_fft,
            col_fft,
            normalise,
        }
    }

    /// Transform a plane in place.
    pub(crate) fn process(&self, mut plane: ArrayViewMut2<Complex<T>>) {
        let (ny, nx) = (self.ny, self.nx);
        assert_eq!(plane.dim(), (ny, nx), "Plane doesn't match the FFT plan");
        // Move the origin from pixel n/2 to pixel 0.
        let sy = |y: usize| (y + ny - ny / 2) % ny;
        let sx = |x: usize| (x + nx - nx / 2) % nx;

        let mut rows = vec![Complex::zero(); ny * nx];
        for ((y, x), v) in plane.indexed_iter() {
            rows[sy(y) * nx + sx(x)] = *v;
        }
        let mut scratch = vec![
            Complex::zero();
            self.row_fft
                .get_inplace_scratch_len()
                .max(self.col_fft.get_inplace_scratch_len())
        ];
        self.row_fft.process_with_scratch(&mut rows, &mut scratch);

        let mut cols = vec![Complex::zero(); ny * nx];
        for y in 0..ny {
            for x in 0..nx {
                cols[x * ny + y] = rows[y * nx + x];
            }
        }
        self.col_fft.process_with_scratch(&mut cols, &mut scratch);

        let scale = if self.normalise {
            T::one() / T::from_usize(ny * nx).unwrap_or_else(T::one)
        } else {
            T::one()
        };
        for ((y, x), v) in plane.indexed_iter_mut() {
            *v = cols[sx(x) * ny + sy(y)] * scale;
        }
    }
}

/// Transform every (channel, polarisation) plane of a grid in place. The
/// planes are processed in parallel.
pub(crate) fn fft_planes<T: FftNum + Float>(
    grid: &mut Array4<Complex<T>>,
    direction: FftDirection,
    normalise: bool,
) {
    let (_, _, ny, nx) = grid.dim();
    let fft = CentredFft2::new(ny, nx, direction, normalise);
    grid.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut chan| {
            chan.axis_iter_mut(Axis(0))
                .into_par_iter()
                .for_each(|plane| fft.process(plane))
        });
}

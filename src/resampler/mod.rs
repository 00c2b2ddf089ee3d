// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scattering visibilities onto a uv grid, and gathering them back out.
//!
//! A visibility at (u, v) \[wavelengths\] lands at grid position
//! `u * nx_padded * cell_x + nx_padded / 2` (and likewise for v). With
//! oversampled kernels, the visibility goes to the nearest cell and the kernel
//! is sampled at the visibility's sub-pixel offset from that cell. In linear
//! interpolation mode, only the whole-pixel kernel samples are used, and the
//! visibility is split bilinearly over its four nearest cells.
//!
//! All scratch space for a baseline range is allocated before the grid is
//! touched, so a range that fails can be attempted again without having
//! written anything.


use marlu::{c32, c64, constants::VEL_C};
use ndarray::prelude::*;
use num_complex::Complex;

use crate::{
    cf::{CfStore, GridGeometry},
    constants::TAU,
    grid::GridFloat,
    math::cexp,
    scheduler::{BaselineRange, RangeError},
    vis::{VisBuffer, VisBufferStore},
};

/// Where visibility channels and polarisations go on the grid.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResampleMaps<'a> {
    /// Visibility channel to image channel.
    pub(crate) chan_map: &'a [Option<usize>],

    /// Visibility polarisation to grid plane.
    pub(crate) pol_map: &'a [Option<usize>],

    /// Visibility polarisation to the grid plane its conjugate at (-u, -v)
    /// belongs to.
    pub(crate) conj_pol_map: &'a [Option<usize>],
}

impl ResampleMaps<'_> {
    fn uses_conj(&self) -> bool {
        self.conj_pol_map.iter().any(Option::is_some)
    }
}

/// One grid cell a visibility touches, and where the kernel applied there
/// starts.
#[derive(Debug, Clone, Copy, Default)]
struct Tap {
    /// The first grid cell covered by the kernel.
    gx: usize,
    gy: usize,

    /// The kernel sample applied to the first grid cell.
    kx: usize,
    ky: usize,

    /// The fraction of the visibility given to this tap.
    frac: f64,
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    taps: [Tap; 4],
    num_taps: usize,
}

impl Placement {
    fn taps(&self) -> &[Tap] {
        &self.taps[..self.num_taps]
    }
}

/// Space for resampling one baseline range.
pub(crate) struct ResampleScratch {
    placements: Vec<Option<Placement>>,

    /// Degridding results (range row, channel, polarisation). Empty when
    /// gridding.
    predictions: Array3<c32>,

    /// 2 if conjugate positions are needed, otherwise 1.
    num_signs: usize,
}

/// Grids and degrids baseline ranges.
#[derive(Debug, Clone)]
pub struct VisibilityResampler {
    /// Metres-per-wavelength to pixels, for u and v.
    uv_scale: (f64, f64),

    /// The grid position of (u, v) = (0, 0).
    offset: (f64, f64),

    /// (ny, nx) of the padded grid.
    grid_size: (usize, usize),

    linear: bool,
}

impl VisibilityResampler {
    pub fn new(geometry: &GridGeometry, linear: bool) -> Self {
        Self {
            uv_scale: (
                geometry.nx_padded as f64 * geometry.cell_x,
                geometry.ny_padded as f64 * geometry.cell_y,
            ),
            offset: (
                (geometry.nx_padded / 2) as f64,
                (geometry.ny_padded / 2) as f64,
            ),
            grid_size: (geometry.ny_padded, geometry.nx_padded),
            linear,
        }
    }

    pub fn is_linear(&self) -> bool {
        self.linear
    }

    /// Work out where a visibility goes. `None` if any of the cells its kernel
    /// touches are off the grid.
    fn place(&self, u: f64, v: f64, freq: f64, cf: &CfStore) -> Option<Placement> {
        let support = cf.support();
        let os = cf.oversample();
        // The kernel sample at a whole-pixel offset of -support.
        let k_first = cf.centre() - support * os;
        let pos_x = u * freq / VEL_C * self.uv_scale.0 + self.offset.0;
        let pos_y = v * freq / VEL_C * self.uv_scale.1 + self.offset.1;
        if !pos_x.is_finite() || !pos_y.is_finite() {
            return None;
        }
        let (ny, nx) = self.grid_size;
        // The first and last cells the kernel covers must be on the grid.
        let fits = |lo: f64, hi: f64, n: usize| {
            lo - support as f64 >= 0.0 && hi + (support as f64) < n as f64
        };

        let mut taps = [Tap::default(); 4];
        if self.linear {
            let (x0, y0) = (pos_x.floor(), pos_y.floor());
            if !fits(x0, x0 + 1.0, nx) || !fits(y0, y0 + 1.0, ny) {
                return None;
            }
            let (fx, fy) = (pos_x - x0, pos_y - y0);
            let (x0, y0) = (x0 as usize - support, y0 as usize - support);
            for (tap, (dy, dx, frac)) in taps.iter_mut().zip([
                (0, 0, (1.0 - fy) * (1.0 - fx)),
                (0, 1, (1.0 - fy) * fx),
                (1, 0, fy * (1.0 - fx)),
                (1, 1, fy * fx),
            ]) {
                *tap = Tap {
                    gx: x0 + dx,
                    gy: y0 + dy,
                    kx: k_first,
                    ky: k_first,
                    frac,
                };
            }
            Some(Placement { taps, num_taps: 4 })
        } else {
            let (loc_x, loc_y) = (pos_x.round(), pos_y.round());
            if !fits(loc_x, loc_x, nx) || !fits(loc_y, loc_y, ny) {
                return None;
            }
            let half = (os / 2) as isize;
            let offset = |loc: f64, pos: f64| {
                let off = (((loc - pos) * os as f64).round() as isize).clamp(-half, half);
                (k_first as isize + off) as usize
            };
            taps[0] = Tap {
                gx: loc_x as usize - support,
                gy: loc_y as usize - support,
                kx: offset(loc_x, pos_x),
                ky: offset(loc_y, pos_y),
                frac: 1.0,
            };
            Some(Placement { taps, num_taps: 1 })
        }
    }

    /// Allocate everything needed to resample a range. This is the only
    /// fallible step of resampling; nothing is allocated once the grid is
    /// being written to.
    pub(crate) fn allocate_scratch(
        &self,
        vis: &VisBuffer,
        range: &BaselineRange,
        maps: &ResampleMaps,
        degrid: bool,
    ) -> Result<ResampleScratch, RangeError> {
        let num_signs = if maps.uses_conj() { 2 } else { 1 };
        let placements = try_vec(range.num_rows() * vis.num_chans() * num_signs, range)?;
        let predictions = if degrid {
            let shape = (range.num_rows(), vis.num_chans(), vis.num_pols());
            let n = shape.0 * shape.1 * shape.2;
            let mut v = try_vec(n, range)?;
            v.resize(n, c32::new(0.0, 0.0));
            Array3::from_shape_vec(shape, v).map_err(|_| RangeError::Allocation {
                ant1: range.ant1,
                ant2: range.ant2,
                bytes: n * std::mem::size_of::<c32>(),
            })?
        } else {
            Array3::zeros((0, 0, 0))
        };
        Ok(ResampleScratch {
            placements,
            predictions,
            num_signs,
        })
    }

    /// Work out where every (row, channel) of a range goes. Placements are
    /// indexed by `(row * num_chans + chan) * num_signs + sign`, where sign 1
    /// is the conjugate position (-u, -v).
    fn place_range(
        &self,
        store: &VisBufferStore,
        rows: &[usize],
        cf: &CfStore,
        scratch: &mut ResampleScratch,
    ) {
        scratch.placements.clear();
        for &row in rows {
            let uvw = store.uvw[row];
            for &freq in &store.vis.freqs {
                scratch.placements.push(self.place(uvw.u, uvw.v, freq, cf));
                if scratch.num_signs == 2 {
                    scratch
                        .placements
                        .push(self.place(-uvw.u, -uvw.v, freq, cf));
                }
            }
        }
    }

    /// Grid the unflagged visibilities of a range. `grid` has the shape
    /// (image channel, grid plane, v, u) and `sum_weights` (grid plane, image
    /// channel). Each sample adds `weight * |Σ kernel|` to its sum of weights.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn data_to_grid<F: GridFloat>(
        &self,
        store: &VisBufferStore,
        order: &[usize],
        range: &BaselineRange,
        maps: &ResampleMaps,
        cf: &CfStore,
        scratch: &mut ResampleScratch,
        mut grid: ArrayViewMut4<Complex<F>>,
        mut sum_weights: ArrayViewMut2<f64>,
    ) {
        let vis = store.vis;
        let rows = range.rows(order);
        let num_chans = vis.num_chans();
        self.place_range(store, rows, cf, scratch);
        let (placements, num_signs) = (&scratch.placements, scratch.num_signs);

        for (i_row, &row) in rows.iter().enumerate() {
            if vis.flag_row[row] {
                continue;
            }
            for (i_chan, &freq) in vis.freqs.iter().enumerate() {
                let Some(img_chan) = maps.chan_map[i_chan] else {
                    continue;
                };
                let weight = vis.weights[(row, i_chan)] as f64;
                let phasor = cexp(TAU * freq / VEL_C * store.dphase[row]);
                let i_place = (i_row * num_chans + i_chan) * num_signs;

                for (i_pol, (&pol_plane, &conj_plane)) in
                    maps.pol_map.iter().zip(maps.conj_pol_map).enumerate()
                {
                    if vis.flags[(row, i_chan, i_pol)] {
                        continue;
                    }
                    let data = vis.data[(row, i_chan, i_pol)];
                    let sample = c64::new(data.re as f64, data.im as f64) * phasor * weight;

                    let conj_placement = if num_signs == 2 {
                        placements[i_place + 1]
                    } else {
                        None
                    };
                    let targets = [
                        (pol_plane, placements[i_place], false),
                        (conj_plane, conj_placement, true),
                    ];
                    for (plane, placement, conjugate) in targets {
                        let (Some(plane), Some(placement)) = (plane, placement) else {
                            continue;
                        };
                        let Some(kernel) = cf.kernel(plane) else {
                            continue;
                        };
                        let sample = if conjugate { sample.conj() } else { sample };
                        let k_sum = scatter(
                            grid.slice_mut(s![img_chan, plane, .., ..]),
                            kernel,
                            cf,
                            &placement,
                            sample,
                            conjugate,
                        );
                        sum_weights[(plane, img_chan)] += weight * k_sum.norm();
                    }
                }
            }
        }
    }

    /// Predict the visibilities of a range from a grid of shape (image
    /// channel, grid plane, v, u). The result has the shape (range row,
    /// channel, polarisation). Samples that can't be predicted (no image
    /// channel, no grid plane, or off the grid) keep their current model
    /// values.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn grid_to_data<F: GridFloat>(
        &self,
        store: &VisBufferStore,
        order: &[usize],
        range: &BaselineRange,
        maps: &ResampleMaps,
        cf: &CfStore,
        mut scratch: ResampleScratch,
        grid: ArrayView4<Complex<F>>,
    ) -> Array3<c32> {
        let vis = store.vis;
        let rows = range.rows(order);
        let num_chans = vis.num_chans();
        self.place_range(store, rows, cf, &mut scratch);
        let ResampleScratch {
            placements,
            mut predictions,
            num_signs,
        } = scratch;
        for (mut prediction, &row) in predictions.outer_iter_mut().zip(rows) {
            prediction.assign(&vis.model.slice(s![row, .., ..]));
        }

        for (i_row, &row) in rows.iter().enumerate() {
            for (i_chan, &freq) in vis.freqs.iter().enumerate() {
                let Some(img_chan) = maps.chan_map[i_chan] else {
                    continue;
                };
                let unphasor = cexp(-TAU * freq / VEL_C * store.dphase[row]);
                let i_place = (i_row * num_chans + i_chan) * num_signs;

                for (i_pol, (&pol_plane, &conj_plane)) in
                    maps.pol_map.iter().zip(maps.conj_pol_map).enumerate()
                {
                    // Prefer the visibility's own plane; its conjugate's plane
                    // only serves if the image doesn't have it.
                    let (plane, placement, conjugate) = match (pol_plane, conj_plane) {
                        (Some(p), _) => (p, placements[i_place], false),
                        (None, Some(p)) if num_signs == 2 => (p, placements[i_place + 1], true),
                        _ => continue,
                    };
                    let (Some(placement), Some(kernel)) = (placement, cf.kernel(plane)) else {
                        continue;
                    };
                    let (sum, k_sum) = gather(
                        grid.slice(s![img_chan, plane, .., ..]),
                        kernel,
                        cf,
                        &placement,
                        conjugate,
                    );
                    let k_norm = k_sum.norm();
                    if k_norm == 0.0 {
                        continue;
                    }
                    let sum = sum / k_norm;
                    let predicted = (if conjugate { sum.conj() } else { sum }) * unphasor;
                    predictions[(i_row, i_chan, i_pol)] =
                        c32::new(predicted.re as f32, predicted.im as f32);
                }
            }
        }

        predictions
    }
}

/// Allocate an empty vector with room for `n` elements, reporting failure
/// instead of aborting.
fn try_vec<T>(n: usize, range: &BaselineRange) -> Result<Vec<T>, RangeError> {
    let mut v = Vec::new();
    v.try_reserve_exact(n)
        .map_err(|_| RangeError::Allocation {
            ant1: range.ant1,
            ant2: range.ant2,
            bytes: n * std::mem::size_of::<T>(),
        })?;
    Ok(v)
}

/// Add a sample convolved with a kernel onto a grid plane. Returns the sum of
/// the kernel samples used.
fn scatter<F: GridFloat>(
    mut plane: ArrayViewMut2<Complex<F>>,
    kernel: &Array2<c32>,
    cf: &CfStore,
    placement: &Placement,
    sample: c64,
    conjugate_kernel: bool,
) -> c64 {
    let width = 2 * cf.support() + 1;
    let os = cf.oversample();
    let mut k_sum = c64::new(0.0, 0.0);
    for tap in placement.taps() {
        for j in 0..width {
            let ky = tap.ky + j * os;
            for i in 0..width {
                let k = kernel[(ky, tap.kx + i * os)];
                let k = c64::new(k.re as f64, k.im as f64) * tap.frac;
                let k = if conjugate_kernel { k.conj() } else { k };
                k_sum += k;
                plane[(tap.gy + j, tap.gx + i)] += F::from_c64(sample * k);
            }
        }
    }
    k_sum
}

/// Sum grid cells weighted by a kernel. Returns the weighted sum and the sum of
/// the kernel samples used.
fn gather<F: GridFloat>(
    plane: ArrayView2<Complex<F>>,
    kernel: &Array2<c32>,
    cf: &CfStore,
    placement: &Placement,
    conjugate_kernel: bool,
) -> (c64, c64) {
    let width = 2 * cf.support() + 1;
    let os = cf.oversample();
    let mut sum = c64::new(0.0, 0.0);
    let mut k_sum = c64::new(0.0, 0.0);
    for tap in placement.taps() {
        for j in 0..width {
            let ky = tap.ky + j * os;
            for i in 0..width {
                let k = kernel[(ky, tap.kx + i * os)];
                let k = c64::new(k.re as f64, k.im as f64) * tap.frac;
                let k = if conjugate_kernel { k.conj() } else { k };
                k_sum += k;
                sum += F::to_c64(plane[(tap.gy + j, tap.gx + i)]) * k;
            }
        }
    }
    (sum, k_sum)
}

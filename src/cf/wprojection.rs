// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! W-projection convolution functions.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use log::{debug, trace};
use marlu::constants::VEL_C;
use ndarray::prelude::*;
use rustfft::FftDirection;

use super::{spheroidal::taper, *};
use crate::{
    constants::TAU,
    grid::fft::CentredFft2,
    math::cexp,
};

/// Kernels are the Fourier transform of a prolate spheroidal taper multiplied
/// by the w-term phase screen `exp(2πi w (sqrt(1 - l² - m²) - 1))`. w is
/// quantised into planes spaced quadratically up to `w_max`; each plane's
/// kernel is computed the first time it is needed and cached.
///
/// There is no A-term; every baseline sees the same (flat) primary beam.
pub struct WProjectionProvider {
    support: usize,
    oversample: usize,
    num_w_planes: usize,
    geometry: Option<GridGeometry>,

    /// The sum of the zero-offset samples of the w = 0 kernel. All kernels are
    /// divided by this.
    normaliser: f64,

    /// Kernels keyed by (w-plane, conjugated).
    pub(super) cache: RwLock<HashMap<(usize, bool), Arc<Array2<c32>>>>,

    /// The time of the last A-term computation.
    pub(super) aterm_time: Mutex<Option<f64>>,
}

impl WProjectionProvider {
    pub fn new(support: usize, oversample: usize, num_w_planes: usize) -> Result<Self, CfError> {
        if oversample == 0 {
            return Err(CfError::ZeroOversample);
        }
        if num_w_planes == 0 {
            return Err(CfError::NoWPlanes);
        }
        Ok(Self {
            support,
            oversample,
            num_w_planes,
            geometry: None,
            normaliser: 1.0,
            cache: RwLock::new(HashMap::new()),
            aterm_time: Mutex::new(None),
        })
    }

    /// The w-plane a w value \[metres\] falls into. Planes are spaced so that
    /// plane `p` is at `w_max * (p / (n - 1))²`.
    pub fn w_plane(&self, w: f64) -> usize {
        let w_max = self.geometry.as_ref().map(|g| g.w_max).unwrap_or(0.0);
        if self.num_w_planes == 1 || w_max <= 0.0 {
            return 0;
        }
        let last = (self.num_w_planes - 1) as f64;
        let plane = ((w.abs() / w_max).sqrt() * last).round();
        (plane as usize).min(self.num_w_planes - 1)
    }

    /// The w value at the centre of a plane \[metres\].
    fn plane_w(&self, plane: usize, w_max: f64) -> f64 {
        if self.num_w_planes == 1 {
            return 0.0;
        }
        let frac = plane as f64 / (self.num_w_planes - 1) as f64;
        frac * frac * w_max
    }

    /// Compute an unnormalised kernel for `w_lambda` \[wavelengths\].
    fn compute_kernel(
        &self,
        geometry: &GridGeometry,
        w_lambda: f64,
    ) -> Result<Array2<c64>, CfError> {
        let os = self.oversample;
        // The taper is sampled at `n` points across the whole padded field of
        // view; zero padding by the oversampling factor then samples the kernel
        // at 1/os of a uv cell.
        let n = 2 * self.support + 2;
        let m = n * os;
        let mut screen = try_zeros(m, m)?;

        let fov_l = geometry.nx_padded as f64 * geometry.cell_x;
        let fov_m = geometry.ny_padded as f64 * geometry.cell_y;
        let half = (n / 2) as f64;
        let nf = n as f64;
        for iy in 0..n {
            let y = iy as f64 - half;
            let taper_y = taper(2.0 * y / nf);
            for ix in 0..n {
                let x = ix as f64 - half;
                let t = taper_y * taper(2.0 * x / nf);
                if t == 0.0 {
                    continue;
                }
                let l = x * fov_l / nf;
                let mm = y * fov_m / nf;
                let r2 = l * l + mm * mm;
                let phase = if r2 < 1.0 {
                    TAU * w_lambda * ((1.0 - r2).sqrt() - 1.0)
                } else {
                    0.0
                };
                screen[(m / 2 + iy - n / 2, m / 2 + ix - n / 2)] = cexp(phase) * t;
            }
        }

        CentredFft2::new(m, m, FftDirection::Forward, false).process(screen.view_mut());

        let size = kernel_size(self.support, os);
        let start = m / 2 - size / 2;
        Ok(screen
            .slice(s![start..start + size, start..start + size])
            .to_owned())
    }

    /// Get the kernel of a w-plane, computing it if it isn't cached.
    fn kernel(&self, plane: usize, conjugate: bool) -> Result<Arc<Array2<c32>>, CfError> {
        if let Some(kernel) = self
            .cache
            .read()
            .map_err(|_| CfError::Poisoned("kernel cache"))?
            .get(&(plane, conjugate))
        {
            return Ok(Arc::clone(kernel));
        }

        let geometry = self.geometry.as_ref().ok_or(CfError::NotPrepared)?;
        let w_lambda = self.plane_w(plane, geometry.w_max) * geometry.ref_freq / VEL_C;
        trace!("Computing the kernel of w-plane {plane} (w = {w_lambda:.3} λ)");
        let norm = self.normaliser;
        let kernel = self.compute_kernel(geometry, w_lambda)?.mapv(|k| {
            let k = if conjugate { k.conj() } else { k };
            c32::new((k.re / norm) as f32, (k.im / norm) as f32)
        });

        let mut cache = self
            .cache
            .write()
            .map_err(|_| CfError::Poisoned("kernel cache"))?;
        // Another worker may have beaten us to it; keep theirs.
        let kernel = cache
            .entry((plane, conjugate))
            .or_insert_with(|| Arc::new(kernel));
        Ok(Arc::clone(kernel))
    }
}

/// Allocate a zeroed 2-D array, reporting allocation failure instead of
/// aborting.
fn try_zeros(ny: usize, nx: usize) -> Result<Array2<c64>, CfError> {
    let n = ny * nx;
    let mut v: Vec<c64> = Vec::new();
    v.try_reserve_exact(n).map_err(|_| CfError::Allocation {
        bytes: n * std::mem::size_of::<c64>(),
    })?;
    v.resize(n, c64::new(0.0, 0.0));
    Array2::from_shape_vec((ny, nx), v).map_err(|_| CfError::Allocation {
        bytes: n * std::mem::size_of::<c64>(),
    })
}

impl ConvolutionFunctionProvider for WProjectionProvider {
    fn name(&self) -> &str {
        "wprojection"
    }

    fn prepare(&mut self, geometry: &GridGeometry) -> Result<(), CfError> {
        debug!(
            "W-projection with {} w-planes up to {} m, support {}, oversampling {}",
            self.num_w_planes, geometry.w_max, self.support, self.oversample
        );
        let k0 = self.compute_kernel(geometry, 0.0)?;
        let centre = kernel_size(self.support, self.oversample) / 2;
        let os = self.oversample;
        let mut sum = 0.0;
        for j in 0..=2 * self.support {
            for i in 0..=2 * self.support {
                let y = centre + j * os - self.support * os;
                let x = centre + i * os - self.support * os;
                sum += k0[(y, x)].re;
            }
        }
        self.normaliser = if sum > 0.0 { sum } else { 1.0 };
        self.geometry = Some(geometry.clone());
        self.cache
            .write()
            .map_err(|_| CfError::Poisoned("kernel cache"))?
            .clear();
        Ok(())
    }

    fn compute_aterm(&self, time: f64) -> Result<(), CfError> {
        let mut last = self
            .aterm_time
            .lock()
            .map_err(|_| CfError::Poisoned("A-term"))?;
        if *last != Some(time) {
            trace!("A-term for time {time} (flat beam)");
            *last = Some(time);
        }
        Ok(())
    }

    fn make_convolution_function(
        &self,
        request: &CfRequest,
        pb: &mut PbAccumulator,
    ) -> Result<CfStore, CfError> {
        let plane = self.w_plane(request.mean_w);
        // Negative w uses the conjugate kernel, and so does degridding; both
        // together cancel.
        let conjugate = (request.mean_w < 0.0) != request.is_degrid;
        let kernel = self.kernel(plane, conjugate)?;
        let cf = CfStore::uniform(
            kernel,
            request.mueller,
            request.num_pols,
            self.support,
            self.oversample,
            plane,
        )?;
        pb.sum_flat_pb += request.average_weight;
        pb.sum_cf_weight += request.average_weight;
        Ok(cf)
    }

    fn spheroidal(&self, ny: usize, nx: usize) -> Array2<f32> {
        spheroidal::spheroidal_image(ny, nx)
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Convolution functions.
//!
//! A [`ConvolutionFunctionProvider`] hands out the kernel used to grid (or
//! degrid) one baseline at one time and w. Providers may cache kernels
//! internally, but what they return is an immutable [`CfStore`]; the gridder
//! never mutates a provider's state during a pass. Providers are called from
//! many workers at once, so they must be `Send + Sync`.

mod boxcar;
mod error;
pub(crate) mod spheroidal;
mod wprojection;

pub use boxcar::BoxcarProvider;
pub use error::CfError;
pub use wprojection::WProjectionProvider;

use std::sync::Arc;

use marlu::{c32, c64};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::constants::SPHEROIDAL_CUT;

/// The kinds of convolution functions that can be constructed from
/// configuration alone.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GridFunction {
    /// A one-pixel box; gridding simply places each visibility in its nearest
    /// cell.
    #[strum(serialize = "boxcar")]
    Boxcar,

    /// A prolate spheroidal taper with a w-dependent phase screen.
    #[default]
    #[strum(serialize = "wprojection")]
    WProjection,
}

/// Construct a convolution-function provider.
pub fn new_provider(
    grid_function: GridFunction,
    support: usize,
    oversample: usize,
    num_w_planes: usize,
) -> Result<Box<dyn ConvolutionFunctionProvider>, CfError> {
    let provider: Box<dyn ConvolutionFunctionProvider> = match grid_function {
        GridFunction::Boxcar => Box::new(BoxcarProvider::new(oversample)?),
        GridFunction::WProjection => Box::new(WProjectionProvider::new(
            support,
            oversample,
            num_w_planes,
        )?),
    };
    Ok(provider)
}

/// The geometry of the padded grid. Providers receive this once, before any
/// kernels are requested.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    /// The image size \[pixels\].
    pub nx: usize,
    pub ny: usize,

    /// The padded grid size \[pixels\].
    pub nx_padded: usize,
    pub ny_padded: usize,

    /// The image pixel sizes \[radians\].
    pub cell_x: f64,
    pub cell_y: f64,

    pub num_pols: usize,
    pub num_chans: usize,

    /// The frequency kernels are computed for \[Hz\].
    pub ref_freq: f64,

    /// The largest |w| that will be gridded \[metres\].
    pub w_max: f64,
}

/// Which polarisation products a convolution function is computed for.
/// Element `[out][in]` enables the contribution of input polarisation `in` to
/// output polarisation `out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuellerMask(pub [[bool; 4]; 4]);

impl MuellerMask {
    /// Only the parallel terms (i.e. no polarisation leakage).
    pub fn diagonal() -> Self {
        let mut mask = [[false; 4]; 4];
        for (i, row) in mask.iter_mut().enumerate() {
            row[i] = true;
        }
        Self(mask)
    }

    pub fn full() -> Self {
        Self([[true; 4]; 4])
    }

    /// Does grid plane `plane` receive a kernel?
    pub fn plane_enabled(&self, plane: usize) -> bool {
        plane < 4 && self.0[plane][plane]
    }
}

impl Default for MuellerMask {
    fn default() -> Self {
        Self::diagonal()
    }
}

/// Everything a provider needs to know to produce the kernel of one baseline
/// range.
#[derive(Debug, Clone)]
pub struct CfRequest<'a> {
    pub ant1: usize,
    pub ant2: usize,

    /// \[seconds\]
    pub time: f64,

    /// The mean w of the range \[metres\].
    pub mean_w: f64,

    pub mueller: &'a MuellerMask,

    /// The number of polarisation planes on the grid.
    pub num_pols: usize,

    pub is_degrid: bool,

    /// The mean imaging weight of the range's rows.
    pub average_weight: f64,

    pub spw: usize,

    pub taylor_term: usize,

    /// \[Hz\]
    pub ref_freq: f64,
}

/// The number of samples along each axis of a kernel with the given support
/// and oversampling.
#[inline]
pub fn kernel_size(support: usize, oversample: usize) -> usize {
    2 * (support * oversample + oversample / 2) + 1
}

/// A sampled convolution function: one kernel per grid polarisation plane
/// (`None` when the Mueller mask disables that plane). Kernels are square,
/// [`kernel_size`] samples wide and centred; the sample at offset `d` pixels
/// from the centre is at index `centre + d * oversample`.
#[derive(Debug, Clone)]
pub struct CfStore {
    kernels: Vec<Option<Arc<Array2<c32>>>>,
    support: usize,
    oversample: usize,
    w_plane: usize,
}

impl CfStore {
    pub fn new(
        kernels: Vec<Option<Arc<Array2<c32>>>>,
        support: usize,
        oversample: usize,
        w_plane: usize,
    ) -> Result<Self, CfError> {
        if oversample == 0 {
            return Err(CfError::ZeroOversample);
        }
        let size = kernel_size(support, oversample);
        for (plane, kernel) in kernels.iter().enumerate() {
            if let Some(kernel) = kernel {
                if kernel.dim() != (size, size) {
                    return Err(CfError::BadKernelShape {
                        plane,
                        got: kernel.dim(),
                        support,
                        oversample,
                        size,
                    });
                }
            }
        }
        Ok(Self {
            kernels,
            support,
            oversample,
            w_plane,
        })
    }

    /// Use the same kernel for every enabled polarisation plane.
    pub fn uniform(
        kernel: Arc<Array2<c32>>,
        mueller: &MuellerMask,
        num_pols: usize,
        support: usize,
        oversample: usize,
        w_plane: usize,
    ) -> Result<Self, CfError> {
        let kernels = (0..num_pols)
            .map(|p| mueller.plane_enabled(p).then(|| Arc::clone(&kernel)))
            .collect();
        Self::new(kernels, support, oversample, w_plane)
    }

    pub fn kernel(&self, plane: usize) -> Option<&Array2<c32>> {
        self.kernels.get(plane).and_then(|k| k.as_deref())
    }

    /// The half-width of the kernels \[pixels\].
    pub fn support(&self) -> usize {
        self.support
    }

    pub fn oversample(&self) -> usize {
        self.oversample
    }

    pub fn w_plane(&self) -> usize {
        self.w_plane
    }

    /// The index of the central sample along either axis.
    pub fn centre(&self) -> usize {
        self.support * self.oversample + self.oversample / 2
    }
}

/// Primary-beam sums made by one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct PbAccumulator {
    /// Direction-dependent contributions across the padded image (ny, nx).
    pub sum_pb: Array2<c64>,

    /// Direction-independent contributions; these apply to every pixel of
    /// `sum_pb`.
    pub sum_flat_pb: f64,

    pub sum_cf_weight: f64,
}

impl PbAccumulator {
    pub fn new(ny: usize, nx: usize) -> Self {
        Self {
            sum_pb: Array2::zeros((ny, nx)),
            sum_flat_pb: 0.0,
            sum_cf_weight: 0.0,
        }
    }

    pub fn zero(&mut self) {
        self.sum_pb.fill(c64::new(0.0, 0.0));
        self.sum_flat_pb = 0.0;
        self.sum_cf_weight = 0.0;
    }

    pub fn add_assign(&mut self, other: &PbAccumulator) {
        self.sum_pb += &other.sum_pb;
        self.sum_flat_pb += other.sum_flat_pb;
        self.sum_cf_weight += other.sum_cf_weight;
    }
}

/// The interface between the gridder and whatever computes convolution
/// functions. Only [`ConvolutionFunctionProvider::prepare`] takes `&mut self`;
/// everything else may be called concurrently from many workers.
pub trait ConvolutionFunctionProvider: Send + Sync {
    /// A short name used in logs and persisted records.
    fn name(&self) -> &str;

    /// Receive the grid geometry. This is called once, before anything else.
    fn prepare(&mut self, geometry: &GridGeometry) -> Result<(), CfError>;

    /// Compute the time-dependent A-terms (station beams) for `time`. This is
    /// called once per batch before any kernels for that batch are requested,
    /// and calling it again with the same time must be cheap.
    fn compute_aterm(&self, time: f64) -> Result<(), CfError>;

    /// Get the kernels of one baseline range. On success, the range's primary
    /// beam and kernel weight are added to `pb`; on failure `pb` must be left
    /// untouched, so that the range can be attempted again.
    fn make_convolution_function(
        &self,
        request: &CfRequest,
        pb: &mut PbAccumulator,
    ) -> Result<CfStore, CfError>;

    /// Apply a time-dependent element-beam correction to a whole grid
    /// (channel, polarisation, v, u). The input is not modified.
    fn apply_element_beam(
        &self,
        grid: ArrayView4<c64>,
        _time: f64,
        _spw: usize,
        _mueller: &MuellerMask,
        _is_degrid: bool,
    ) -> Result<Array4<c64>, CfError> {
        Ok(grid.to_owned())
    }

    /// Reduce primary-beam sums into the average primary beam,
    /// `sqrt(|sum_pb| / sum_cf_weight)`. Without any weight the beam is zero
    /// everywhere.
    fn compute_avg_pb(&self, pb: &PbAccumulator) -> Array2<f32> {
        if pb.sum_cf_weight <= 0.0 {
            return Array2::zeros(pb.sum_pb.dim());
        }
        pb.sum_pb
            .mapv(|p| ((p + pb.sum_flat_pb).norm() / pb.sum_cf_weight).sqrt() as f32)
    }

    /// The image-domain taper introduced by gridding with this provider's
    /// kernels, across the padded image.
    fn spheroidal(&self, ny: usize, nx: usize) -> Array2<f32> {
        Array2::ones((ny, nx))
    }

    /// The gridding taper with insignificant values set to 0.
    fn spheroidal_cut(&self, ny: usize, nx: usize) -> Array2<f32> {
        self.spheroidal(ny, nx)
            .mapv(|s| if s >= SPHEROIDAL_CUT { s } else { 0.0 })
    }

    /// The taper of the element-beam correction across the padded image.
    fn element_spheroidal_cut(&self, ny: usize, nx: usize) -> Array2<f32> {
        Array2::ones((ny, nx))
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A box-car convolution function.

use std::sync::Arc;

use log::debug;
use ndarray::prelude::*;

use super::*;

/// A kernel that is 1 within half a pixel of the visibility and 0 elsewhere,
/// with no A-term. With no sub-pixel offset, gridding with this kernel puts
/// each visibility into exactly one cell, and degridding reads exactly that
/// cell back.
pub struct BoxcarProvider {
    kernel: Arc<Array2<c32>>,
    oversample: usize,
}

impl BoxcarProvider {
    /// The half-width of the box-car's kernel \[pixels\].
    pub const SUPPORT: usize = 1;

    pub fn new(oversample: usize) -> Result<Self, CfError> {
        if oversample == 0 {
            return Err(CfError::ZeroOversample);
        }
        let size = kernel_size(Self::SUPPORT, oversample);
        let centre = (size / 2) as f64;
        // A sample's distance from the visibility [pixels].
        let inside = |i: usize| {
            let d = (i as f64 - centre) / oversample as f64;
            (-0.5..0.5).contains(&d)
        };
        let kernel = Array2::from_shape_fn((size, size), |(j, i)| {
            if inside(j) && inside(i) {
                c32::new(1.0, 0.0)
            } else {
                c32::new(0.0, 0.0)
            }
        });
        Ok(Self {
            kernel: Arc::new(kernel),
            oversample,
        })
    }
}

impl ConvolutionFunctionProvider for BoxcarProvider {
    fn name(&self) -> &str {
        "boxcar"
    }

    fn prepare(&mut self, geometry: &GridGeometry) -> Result<(), CfError> {
        debug!(
            "Box-car convolution function for a {}x{} grid (oversampling {})",
            geometry.nx_padded, geometry.ny_padded, self.oversample
        );
        Ok(())
    }

    fn compute_aterm(&self, _time: f64) -> Result<(), CfError> {
        Ok(())
    }

    fn make_convolution_function(
        &self,
        request: &CfRequest,
        pb: &mut PbAccumulator,
    ) -> Result<CfStore, CfError> {
        let cf = CfStore::uniform(
            Arc::clone(&self.kernel),
            request.mueller,
            request.num_pols,
            Self::SUPPORT,
            self.oversample,
            0,
        )?;
        pb.sum_flat_pb += request.average_weight;
        pb.sum_cf_weight += request.average_weight;
        Ok(cf)
    }
}

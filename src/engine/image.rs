// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sky images.

use marlu::{c32, RADec};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::vis::Polarisation;

/// A (channel, polarisation, y, x) image of the sky. Pixel (ny/2, nx/2) is at
/// the phase centre; x and y increase with decreasing l and m.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyImage {
    pub data: Array4<c32>,

    /// The centre frequency of each channel \[Hz\].
    pub chan_freqs: Vec<f64>,

    /// \[Hz\]
    pub chan_width: f64,

    pub pols: Vec<Polarisation>,

    pub phase_centre: RADec,

    /// The pixel sizes \[radians\].
    pub cell_x: f64,
    pub cell_y: f64,
}

impl SkyImage {
    /// A blank image.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nx: usize,
        ny: usize,
        chan_freqs: Vec<f64>,
        chan_width: f64,
        pols: Vec<Polarisation>,
        phase_centre: RADec,
        cell_x: f64,
        cell_y: f64,
    ) -> Self {
        Self {
            data: Array4::zeros((chan_freqs.len(), pols.len(), ny, nx)),
            chan_freqs,
            chan_width,
            pols,
            phase_centre,
            cell_x,
            cell_y,
        }
    }

    pub fn nx(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    pub fn ny(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn num_chans(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn num_pols(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    /// The (l, m) direction cosines of a pixel.
    pub fn pixel_to_lm(&self, y: usize, x: usize) -> (f64, f64) {
        let dx = x as f64 - (self.nx() / 2) as f64;
        let dy = y as f64 - (self.ny() / 2) as f64;
        (-dx * self.cell_x, -dy * self.cell_y)
    }

    /// The pixel nearest to (l, m), if it is in the image.
    pub fn lm_to_pixel(&self, l: f64, m: f64) -> Option<(usize, usize)> {
        let x = (-l / self.cell_x).round() + (self.nx() / 2) as f64;
        let y = (-m / self.cell_y).round() + (self.ny() / 2) as f64;
        if x < 0.0 || y < 0.0 || x >= self.nx() as f64 || y >= self.ny() as f64 {
            return None;
        }
        Some((y as usize, x as usize))
    }
}

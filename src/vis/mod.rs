// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Visibility buffers.
//!
//! A [`VisBuffer`] is a batch of visibility rows (one row per baseline per
//! timestep) with all of the metadata needed to grid them. The gridding engine
//! doesn't read visibilities from disk; callers fill these buffers however
//! they like.

mod error;
mod store;
#[cfg(test)]
mod tests;

pub use error::VisError;
pub(crate) use store::VisBufferStore;

use marlu::{c32, RADec, UVW};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Correlation products and image polarisations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
pub enum Polarisation {
    #[strum(serialize = "XX")]
    XX,
    #[strum(serialize = "XY")]
    XY,
    #[strum(serialize = "YX")]
    YX,
    #[strum(serialize = "YY")]
    YY,
    /// Stokes I. Visibility XX and YY both contribute to this.
    #[strum(serialize = "I")]
    I,
}

impl Polarisation {
    /// The correlation holding the complex conjugates of this one on the
    /// reversed baseline.
    pub fn hermitian_partner(self) -> Self {
        match self {
            Polarisation::XY => Polarisation::YX,
            Polarisation::YX => Polarisation::XY,
            p => p,
        }
    }
}

/// A batch of visibilities. All per-row vectors must have the same length, and
/// the cubes are laid out as (row, channel, polarisation).
#[derive(Debug, Clone)]
pub struct VisBuffer {
    /// The total number of antennas in the array. This is used to generate
    /// baseline numbers.
    pub num_antennas: usize,

    pub antenna1: Vec<usize>,

    pub antenna2: Vec<usize>,

    /// The baseline coordinates of every row \[metres\].
    pub uvw: Vec<UVW>,

    /// The centroid time of every row \[seconds\].
    pub time: Vec<f64>,

    /// Entire rows may be flagged.
    pub flag_row: Vec<bool>,

    /// Per-sample flags.
    pub flags: Array3<bool>,

    /// Imaging weights per row and channel.
    pub weights: Array2<f32>,

    /// The observed visibilities.
    pub data: Array3<c32>,

    /// Model visibilities; these are overwritten by degridding.
    pub model: Array3<c32>,

    /// The centre frequency of each channel \[Hz\].
    pub freqs: Vec<f64>,

    /// The correlation products along the polarisation axis.
    pub pols: Vec<Polarisation>,

    /// The direction the visibilities are phased to.
    pub phase_centre: RADec,

    /// The spectral window these data belong to.
    pub spw: usize,
}

impl VisBuffer {
    /// Make a new buffer with zero-valued visibilities, unit weights and no
    /// flags.
    pub fn new(
        num_antennas: usize,
        num_rows: usize,
        freqs: Vec<f64>,
        pols: Vec<Polarisation>,
        phase_centre: RADec,
    ) -> Self {
        let shape = (num_rows, freqs.len(), pols.len());
        Self {
            num_antennas,
            antenna1: vec![0; num_rows],
            antenna2: vec![0; num_rows],
            uvw: vec![UVW::default(); num_rows],
            time: vec![0.0; num_rows],
            flag_row: vec![false; num_rows],
            flags: Array3::from_elem(shape, false),
            weights: Array2::ones((num_rows, freqs.len())),
            data: Array3::zeros(shape),
            model: Array3::zeros(shape),
            freqs,
            pols,
            phase_centre,
            spw: 0,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.antenna1.len()
    }

    pub fn num_chans(&self) -> usize {
        self.freqs.len()
    }

    pub fn num_pols(&self) -> usize {
        self.pols.len()
    }

    /// The earliest and latest row times, if there are any rows.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        let mut iter = self.time.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
    }

    /// The largest visibility amplitude among unflagged samples.
    pub fn max_abs_data(&self) -> f32 {
        let mut max = 0.0_f32;
        for ((data, flags), &flag_row) in self
            .data
            .outer_iter()
            .zip(self.flags.outer_iter())
            .zip(self.flag_row.iter())
        {
            if flag_row {
                continue;
            }
            for (d, &f) in data.iter().zip(flags.iter()) {
                if !f {
                    max = max.max(d.norm());
                }
            }
        }
        max
    }

    /// Check that all of the buffer's members agree on their dimensions.
    pub fn validate(&self) -> Result<(), VisError> {
        let num_rows = self.num_rows();
        if self.num_chans() == 0 {
            return Err(VisError::NoChannels);
        }
        for (what, got) in [
            ("antenna2", self.antenna2.len()),
            ("uvw", self.uvw.len()),
            ("time", self.time.len()),
            ("flag_row", self.flag_row.len()),
            ("weights", self.weights.len_of(Axis(0))),
        ] {
            if got != num_rows {
                return Err(VisError::RowMismatch {
                    what,
                    expected: num_rows,
                    got,
                });
            }
        }
        let expected = (num_rows, self.num_chans(), self.num_pols());
        for (what, got) in [
            ("flags", self.flags.dim()),
            ("data", self.data.dim()),
            ("model", self.model.dim()),
        ] {
            if got != expected {
                return Err(VisError::ShapeMismatch {
                    what,
                    expected,
                    got,
                });
            }
        }
        if self.weights.len_of(Axis(1)) != self.num_chans() {
            return Err(VisError::ShapeMismatch {
                what: "weights",
                expected,
                got: (num_rows, self.weights.len_of(Axis(1)), self.num_pols()),
            });
        }
        for (row, (&ant1, &ant2)) in self.antenna1.iter().zip(&self.antenna2).enumerate() {
            for ant in [ant1, ant2] {
                if ant >= self.num_antennas {
                    return Err(VisError::BadAntenna {
                        row,
                        ant,
                        num_antennas: self.num_antennas,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Map each visibility channel to an image channel. A channel maps to the image
/// channel whose centre is within half a channel width of it. Single-channel
/// images take every channel (multi-frequency synthesis).
pub(crate) fn channel_map(
    vis_freqs: &[f64],
    image_freqs: &[f64],
    image_chan_width: f64,
) -> Vec<Option<usize>> {
    if image_freqs.len() == 1 {
        return vec![Some(0); vis_freqs.len()];
    }
    let half_width = image_chan_width.abs() / 2.0;
    vis_freqs
        .iter()
        .map(|&f| {
            image_freqs
                .iter()
                .enumerate()
                .map(|(i, &fi)| (i, (f - fi).abs()))
                .filter(|&(_, d)| d <= half_width * (1.0 + 1e-9))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i)
        })
        .collect()
}

/// The polarisation maps of a visibility buffer against an image. The first
/// map sends each visibility polarisation to the grid plane it is gridded on.
/// The second sends it to the plane its Hermitian conjugate is gridded on, and
/// is only populated if `use_conj_pols` is set.
pub(crate) fn polarisation_maps(
    vis_pols: &[Polarisation],
    image_pols: &[Polarisation],
    use_conj_pols: bool,
) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
    let find = |p: Polarisation| image_pols.iter().position(|&ip| ip == p);
    let pol_map = vis_pols
        .iter()
        .map(|&p| match find(p) {
            Some(i) => Some(i),
            None => match p {
                Polarisation::XX | Polarisation::YY => find(Polarisation::I),
                _ => None,
            },
        })
        .collect();
    let conj_pol_map = vis_pols
        .iter()
        .map(|&p| {
            if use_conj_pols && p.hermitian_partner() != p {
                find(p.hermitian_partner())
            } else {
                None
            }
        })
        .collect();
    (pol_map, conj_pol_map)
}

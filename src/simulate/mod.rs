// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Simulate the visibilities of point sources seen by an array of antennas.
//!
//! Nothing here knows about real telescopes; layouts and observations are
//! generated deterministically, so the results can be used to test and
//! benchmark the gridder.

mod error;

pub use error::SimulateError;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};
use marlu::{c32, c64, constants::VEL_C, HADec, RADec, XyzGeodetic, ENH, LMN, UVW};
use ndarray::{parallel::prelude::*, prelude::*};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{SIDEREAL_RATE, TAU},
    coord::path_difference,
    math::cexp,
    vis::{Polarisation, VisBuffer},
    PROGRESS_BARS,
};

/// The angle between successive antennas of a [`ArrayLayout::spiral`]
/// \[radians\].
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// The positions of an array's antennas.
#[derive(Debug, Clone)]
pub struct ArrayLayout {
    pub xyzs: Vec<XyzGeodetic>,
}

impl ArrayLayout {
    /// Antennas on a flat, golden-angle spiral with the given radius, at the
    /// given latitude. The spiral fills its disc evenly.
    pub fn spiral(
        num_antennas: usize,
        radius_metres: f64,
        latitude_rad: f64,
    ) -> Result<Self, SimulateError> {
        if num_antennas < 2 {
            return Err(SimulateError::TooFewAntennas(num_antennas));
        }
        if !(radius_metres > 0.0) {
            return Err(SimulateError::BadRadius(radius_metres));
        }

        let xyzs = (0..num_antennas)
            .map(|i| {
                let r = radius_metres * ((i as f64 + 0.5) / num_antennas as f64).sqrt();
                let (s, c) = (i as f64 * GOLDEN_ANGLE).sin_cos();
                ENH {
                    e: r * c,
                    n: r * s,
                    h: 0.0,
                }
                .to_xyz(latitude_rad)
            })
            .collect();
        Ok(Self { xyzs })
    }

    pub fn num_antennas(&self) -> usize {
        self.xyzs.len()
    }

    /// The antenna pairs this layout forms, in baseline order.
    pub fn baselines(&self, include_autos: bool) -> Vec<(usize, usize)> {
        let n = self.num_antennas();
        (0..n)
            .flat_map(|i| {
                let first = if include_autos { i } else { i + 1 };
                (first..n).map(move |j| (i, j))
            })
            .collect()
    }
}

/// An unpolarised point source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSource {
    pub radec: RADec,

    /// \[Jy\]
    pub flux_density: f64,
}

/// What to simulate.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub phase_centre: RADec,

    /// The local sidereal time at the start of the observation \[radians\].
    pub lst_start_rad: f64,

    /// \[seconds\]
    pub time_res: f64,

    pub num_timesteps: usize,

    /// Timesteps are simulated into batches of this many.
    pub timesteps_per_batch: usize,

    /// \[Hz\]
    pub freqs: Vec<f64>,

    pub pols: Vec<Polarisation>,

    pub include_autos: bool,
}

impl Observation {
    fn validate(&self) -> Result<(), SimulateError> {
        if self.num_timesteps == 0 {
            return Err(SimulateError::NoTimesteps);
        }
        if self.timesteps_per_batch == 0 {
            return Err(SimulateError::NoTimestepsPerBatch);
        }
        if !(self.time_res > 0.0) {
            return Err(SimulateError::BadTimeResolution(self.time_res));
        }
        if self.freqs.is_empty() {
            return Err(SimulateError::NoFrequencies);
        }
        if let Some(&f) = self.freqs.iter().find(|&&f| !(f > 0.0)) {
            return Err(SimulateError::BadFrequency(f));
        }
        if self.pols.is_empty() {
            return Err(SimulateError::NoPolarisations);
        }
        Ok(())
    }

    /// The centroid time of a timestep \[seconds\].
    pub fn timestep_time(&self, timestep: usize) -> f64 {
        (timestep as f64 + 0.5) * self.time_res
    }

    /// The hour angle of the phase centre at a time \[radians\].
    pub fn hour_angle(&self, time: f64) -> f64 {
        self.lst_start_rad + time * SIDEREAL_RATE - self.phase_centre.ra
    }
}

/// The UVWs of antenna pairs towards a phase centre \[metres\]. Each antenna's
/// UVW is computed once; baselines are the differences.
pub fn xyzs_to_uvws(xyzs: &[XyzGeodetic], baselines: &[(usize, usize)], phase_centre: HADec) -> Vec<UVW> {
    let antenna_uvws: Vec<UVW> = xyzs
        .iter()
        .map(|&xyz| UVW::from_xyz(xyz, phase_centre))
        .collect();
    baselines
        .iter()
        .map(|&(i, j)| {
            let (a, b) = (antenna_uvws[i], antenna_uvws[j]);
            UVW {
                u: a.u - b.u,
                v: a.v - b.v,
                w: a.w - b.w,
            }
        })
        .collect()
}

/// The visibility of a point source at `lmn` on a baseline with `uvw`
/// \[metres\] at `freq` \[Hz\].
#[inline]
pub fn point_source_vis(uvw: UVW, lmn: LMN, freq: f64, flux_density: f64) -> c64 {
    cexp(-TAU * path_difference(uvw, lmn) * freq / VEL_C) * flux_density
}

/// The response of a polarisation to unpolarised flux.
fn pol_response(pol: Polarisation) -> f64 {
    match pol {
        Polarisation::XX | Polarisation::YY | Polarisation::I => 1.0,
        Polarisation::XY | Polarisation::YX => 0.0,
    }
}

/// Simulate batches of visibilities.
pub fn simulate(
    layout: &ArrayLayout,
    obs: &Observation,
    sources: &[PointSource],
) -> Result<Vec<VisBuffer>, SimulateError> {
    if layout.num_antennas() < 2 {
        return Err(SimulateError::TooFewAntennas(layout.num_antennas()));
    }
    obs.validate()?;

    let baselines = layout.baselines(obs.include_autos);
    let lmns: Vec<(LMN, f64)> = sources
        .iter()
        .map(|s| (s.radec.to_lmn(obs.phase_centre), s.flux_density))
        .collect();
    let responses: Vec<f64> = obs.pols.iter().map(|&p| pol_response(p)).collect();
    let num_batches = obs.num_timesteps.div_ceil(obs.timesteps_per_batch);
    info!(
        "Simulating {} sources on {} baselines over {} timesteps ({num_batches} batches)",
        sources.len(),
        baselines.len(),
        obs.num_timesteps
    );

    let progress = ProgressBar::with_draw_target(
        Some(num_batches as u64),
        if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg:16}: [{wide_bar:.blue}] {pos:3}/{len:3} ({elapsed_precise}<{eta_precise})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    )
    .with_message("Simulating");

    let mut batches = Vec::with_capacity(num_batches);
    for (i_batch, first) in (0..obs.num_timesteps)
        .step_by(obs.timesteps_per_batch)
        .enumerate()
    {
        let last = (first + obs.timesteps_per_batch).min(obs.num_timesteps);
        let num_rows = (last - first) * baselines.len();
        let mut vis = VisBuffer::new(
            layout.num_antennas(),
            num_rows,
            obs.freqs.clone(),
            obs.pols.clone(),
            obs.phase_centre,
        );

        for (i_step, timestep) in (first..last).enumerate() {
            let time = obs.timestep_time(timestep);
            let hadec = HADec::from_radians(obs.hour_angle(time), obs.phase_centre.dec);
            let uvws = xyzs_to_uvws(&layout.xyzs, &baselines, hadec);
            let rows = i_step * baselines.len()..(i_step + 1) * baselines.len();
            for (row, (&(i, j), uvw)) in rows.zip(baselines.iter().zip(uvws)) {
                vis.antenna1[row] = i;
                vis.antenna2[row] = j;
                vis.uvw[row] = uvw;
                vis.time[row] = time;
            }
        }

        vis.data
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(vis.uvw.par_iter())
            .for_each(|(mut row, &uvw)| {
                for (mut chan, &freq) in row.outer_iter_mut().zip(&obs.freqs) {
                    let sum: c64 = lmns
                        .iter()
                        .map(|&(lmn, flux)| point_source_vis(uvw, lmn, freq, flux))
                        .sum();
                    for (v, &response) in chan.iter_mut().zip(&responses) {
                        *v = c32::new((sum.re * response) as f32, (sum.im * response) as f32);
                    }
                }
            });

        debug!("Simulated batch {i_batch} ({num_rows} rows)");
        batches.push(vis);
        progress.inc(1);
    }
    progress.finish_with_message("Simulated");

    Ok(batches)
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The gridding engine.
//!
//! A [`GriddingEngine`] goes through these states:
//!
//! - `Uninitialized` until it first sees an image;
//! - `ToSky` after [`FtMachine::initialize_to_sky`], while visibilities are
//!   gridded with [`FtMachine::put`];
//! - `Finalized(ToSky)` after [`FtMachine::finalize_to_sky`], when the dirty
//!   image can be made with [`FtMachine::get_image`];
//! - `ToVis` after [`FtMachine::initialize_to_vis`], while model visibilities
//!   are predicted with [`FtMachine::get`];
//! - `Finalized(ToVis)` after [`FtMachine::finalize_to_vis`].
//!
//! The engine can be re-initialised in either direction from any state.

mod config;
mod element_beam;
mod error;
mod image;
mod record;

pub use config::GridderConfig;
pub use error::{EngineError, RecordError};
pub use image::SkyImage;
pub use record::{Record, RecordField, IMAGE_FIELD_NAME, NUM_RECORD_FIELDS, RECORD_FIELD_NAMES};

use std::fmt::Display;

use log::{debug, info, trace, warn};
use marlu::{c32, c64, RADec};
use ndarray::{prelude::*, Zip};
use num_complex::Complex;
use rustfft::FftDirection;

use element_beam::ElementBeamCycle;

use crate::{
    cf::{
        new_provider, CfError, CfRequest, ConvolutionFunctionProvider, GridFunction,
        GridGeometry, MuellerMask,
    },
    grid::{
        demote, fft::fft_planes, promote, reduce_accumulators, sum_grids_into, GridFloat,
        ThreadAccumulator,
    },
    math::{centred_offset, padded_size},
    resampler::{ResampleMaps, VisibilityResampler},
    scheduler::{make_baseline_ranges, run_pass, BaselineRange},
    vis::{channel_map, polarisation_maps, Polarisation, VisBuffer, VisBufferStore},
};

/// The name engines write into their records.
pub const ENGINE_NAME: &str = "GriddingEngine";

/// Which way an engine transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Visibilities to an image.
    ToSky,

    /// An image to visibilities.
    ToVis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initialized,
    ToSky,
    ToVis,
    Finalized(Direction),
}

impl Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Uninitialized => write!(f, "uninitialised"),
            EngineState::Initialized => write!(f, "initialised"),
            EngineState::ToSky => write!(f, "gridding"),
            EngineState::ToVis => write!(f, "degridding"),
            EngineState::Finalized(Direction::ToSky) => write!(f, "finished gridding"),
            EngineState::Finalized(Direction::ToVis) => write!(f, "finished degridding"),
        }
    }
}

/// Something that grids visibilities into images and degrids images into
/// visibilities.
pub trait FtMachine: Send {
    /// The grid precision (e.g. "single").
    fn precision(&self) -> &'static str;

    fn state(&self) -> EngineState;

    fn config(&self) -> &GridderConfig;

    /// Prepare to grid visibilities for `image`. Returns zeroed (polarisation,
    /// channel) weights.
    fn initialize_to_sky(&mut self, image: &SkyImage) -> Result<Array2<f64>, EngineError>;

    /// Grid a batch of visibilities.
    fn put(&mut self, vis: &VisBuffer) -> Result<(), EngineError>;

    /// Finish gridding.
    fn finalize_to_sky(&mut self) -> Result<(), EngineError>;

    /// Transform the grid into `image`. Returns the (polarisation, channel)
    /// sums of weights. If `normalize` is false, planes are not divided by
    /// their sums of weights.
    fn get_image(
        &mut self,
        image: &mut SkyImage,
        normalize: bool,
    ) -> Result<Array2<f64>, EngineError>;

    /// Prepare to predict visibilities from `image`.
    fn initialize_to_vis(&mut self, image: &SkyImage) -> Result<(), EngineError>;

    /// Predict the model visibilities of a batch. Rows that are flagged, or
    /// that aren't gridded (auto-correlations, large w), keep their model
    /// values.
    fn get(&mut self, vis: &mut VisBuffer) -> Result<(), EngineError>;

    /// Finish degridding.
    fn finalize_to_vis(&mut self) -> Result<(), EngineError>;

    /// The (polarisation, channel) sums of weights of the last gridding.
    fn sum_of_weights(&self) -> &Array2<f64>;

    /// The largest unflagged visibility amplitude seen.
    fn max_abs_data(&self) -> f32;

    /// Persist the engine's configuration and weights, and optionally an
    /// image.
    fn to_record(&self, image: Option<&SkyImage>) -> Record;

    /// Restore the engine's configuration and weights from a record. Returns
    /// the record's image, if it has one. On error the engine is unchanged.
    fn from_record(&mut self, record: &Record) -> Result<Option<SkyImage>, RecordError>;
}

/// Make an engine with the grid precision given by the configuration.
pub fn new_ft_machine(
    config: GridderConfig,
    provider: Box<dyn ConvolutionFunctionProvider>,
) -> Result<Box<dyn FtMachine>, EngineError> {
    if config.double_precision_grid {
        Ok(Box::new(GriddingEngine::<f64>::new(config, provider)?))
    } else {
        Ok(Box::new(GriddingEngine::<f32>::new(config, provider)?))
    }
}

/// Everything derived from the image being made or predicted from.
#[derive(Debug, Clone)]
struct ImageLayout {
    geometry: GridGeometry,
    chan_freqs: Vec<f64>,
    chan_width: f64,
    pols: Vec<Polarisation>,

    /// The direction visibilities are rotated to.
    tangent: RADec,
}

/// A W-projection/A-projection gridder and degridder. `F` is the precision of
/// the grids.
pub struct GriddingEngine<F: GridFloat> {
    config: GridderConfig,
    provider: Box<dyn ConvolutionFunctionProvider>,
    pool: rayon::ThreadPool,
    state: EngineState,

    /// The geometry the provider was prepared with.
    prepared: Option<GridGeometry>,
    layout: Option<ImageLayout>,
    resampler: Option<VisibilityResampler>,
    mueller: MuellerMask,

    /// One per worker.
    accumulators: Vec<ThreadAccumulator<F>>,

    /// The merged grid, or when degridding, the FFT'd image.
    stacked_grid: Array4<Complex<F>>,

    /// The element-beam-corrected grid to degrid from.
    degrid_grid: Option<Array4<Complex<F>>>,

    /// Gridding corrections across the padded image.
    spheroidal: Array2<f32>,
    spheroidal_cut: Array2<f32>,
    element_spheroidal_cut: Array2<f32>,

    /// The average primary beam of the last gridding.
    avg_pb: Option<Array2<f32>>,

    sum_weights: Array2<f64>,
    cycle: ElementBeamCycle,
    max_abs_data: f32,

    /// The spectral window of the last batch.
    spw: usize,

    /// The last direction gridded to.
    tangent: Option<RADec>,

    /// The grid pixel of (u, v) = (0, 0).
    centre_loc: [usize; 2],

    /// The grid pixel of the image's first pixel.
    offset_loc: [usize; 2],
}

impl<F: GridFloat> GriddingEngine<F> {
    pub fn new(
        config: GridderConfig,
        provider: Box<dyn ConvolutionFunctionProvider>,
    ) -> Result<Self, EngineError> {
        if config.tiled {
            return Err(EngineError::TiledGridding);
        }
        if !(config.padding >= 1.0) {
            return Err(EngineError::BadPadding(config.padding));
        }
        let num_threads = match config.num_threads {
            Some(0) => return Err(EngineError::NoThreads),
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("gridder {i}"))
            .build()
            .map_err(|e| EngineError::ThreadPool(e.to_string()))?;
        debug!(
            "New {} engine with {} precision grids and {num_threads} workers",
            provider.name(),
            F::NAME
        );

        Ok(Self {
            cycle: ElementBeamCycle::new(config.step_apply_element),
            config,
            provider,
            pool,
            state: EngineState::Uninitialized,
            prepared: None,
            layout: None,
            resampler: None,
            mueller: MuellerMask::default(),
            accumulators: vec![],
            stacked_grid: Array4::zeros((0, 0, 0, 0)),
            degrid_grid: None,
            spheroidal: Array2::zeros((0, 0)),
            spheroidal_cut: Array2::zeros((0, 0)),
            element_spheroidal_cut: Array2::zeros((0, 0)),
            avg_pb: None,
            sum_weights: Array2::zeros((0, 0)),
            max_abs_data: 0.0,
            spw: 0,
            tangent: None,
            centre_loc: [0, 0],
            offset_loc: [0, 0],
        })
    }

    /// The number of workers (and accumulators).
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn provider(&self) -> &dyn ConvolutionFunctionProvider {
        self.provider.as_ref()
    }

    /// Select which polarisation products convolution functions are made for.
    pub fn set_mueller_mask(&mut self, mueller: MuellerMask) {
        self.mueller = mueller;
    }

    fn require(&self, operation: &'static str, state: EngineState) -> Result<(), EngineError> {
        if self.state == state {
            Ok(())
        } else {
            Err(EngineError::WrongState {
                operation,
                state: self.state,
            })
        }
    }

    /// Check an image against the configuration, and set up everything that
    /// depends on it. The provider is prepared only the first time, or when the
    /// grid geometry changes.
    fn setup(&mut self, image: &SkyImage) -> Result<(), EngineError> {
        let (num_chans, num_pols, ny, nx) = image.data.dim();
        if num_chans == 0 {
            return Err(EngineError::NoImageChannels);
        }
        if num_pols == 0 {
            return Err(EngineError::NoImagePolarisations);
        }
        if (ny, nx) != (self.config.ny, self.config.nx) {
            return Err(EngineError::ImageShape {
                got: image.data.dim(),
                expected: (num_chans, num_pols, self.config.ny, self.config.nx),
            });
        }
        if !(image.cell_x > 0.0 && image.cell_y > 0.0) {
            return Err(EngineError::BadCellSize {
                cell_x: image.cell_x,
                cell_y: image.cell_y,
            });
        }

        let nx_padded = padded_size(nx, self.config.padding);
        let ny_padded = padded_size(ny, self.config.padding);
        let geometry = GridGeometry {
            nx,
            ny,
            nx_padded,
            ny_padded,
            cell_x: image.cell_x,
            cell_y: image.cell_y,
            num_pols,
            num_chans,
            ref_freq: image.chan_freqs.iter().sum::<f64>() / num_chans as f64,
            w_max: self.config.w_max,
        };

        if self.prepared.as_ref() != Some(&geometry) {
            info!(
                "Gridding a {nx}x{ny} image on a {nx_padded}x{ny_padded} grid ({} channels, {} polarisations)",
                num_chans, num_pols
            );
            self.provider.prepare(&geometry)?;
            self.spheroidal = self.provider.spheroidal(ny_padded, nx_padded);
            self.spheroidal_cut = self.provider.spheroidal_cut(ny_padded, nx_padded);
            self.element_spheroidal_cut =
                self.provider.element_spheroidal_cut(ny_padded, nx_padded);
            self.prepared = Some(geometry.clone());
        }

        let shape = (num_chans, num_pols, ny_padded, nx_padded);
        let num_threads = self.num_threads();
        if self.accumulators.len() != num_threads
            || self.accumulators.iter().any(|a| a.grid.dim() != shape)
        {
            self.accumulators = (0..num_threads)
                .map(|_| ThreadAccumulator::new(num_chans, num_pols, ny_padded, nx_padded))
                .collect();
        } else {
            self.accumulators.iter_mut().for_each(|a| a.zero());
        }
        if self.stacked_grid.dim() == shape {
            self.stacked_grid.fill(Complex::new(F::zero(), F::zero()));
        } else {
            self.stacked_grid = Array4::zeros(shape);
        }
        self.degrid_grid = None;

        self.resampler = Some(VisibilityResampler::new(
            &geometry,
            self.config.linear_interpolation,
        ));
        self.centre_loc = [nx_padded / 2, ny_padded / 2];
        self.offset_loc = [
            centred_offset(nx_padded, nx),
            centred_offset(ny_padded, ny),
        ];
        let tangent = self.config.phase_centre.unwrap_or(image.phase_centre);
        self.tangent = Some(tangent);
        self.layout = Some(ImageLayout {
            geometry,
            chan_freqs: image.chan_freqs.clone(),
            chan_width: image.chan_width,
            pols: image.pols.clone(),
            tangent,
        });
        self.cycle.reset();
        self.state = EngineState::Initialized;
        Ok(())
    }

    /// Merge the workers' grids, correct them for the element beam at `time`
    /// and add them to the stacked grid.
    fn apply_element_beam_cycle(&mut self, time: f64) -> Result<(), EngineError> {
        debug!("Applying the element beam for time {time}");
        let shape = self.stacked_grid.dim();
        let mut merged = Array4::<Complex<F>>::zeros(shape);
        sum_grids_into(merged.view_mut(), &self.accumulators);
        let merged = merged.mapv(F::to_c64);

        self.provider.compute_aterm(time)?;
        let corrected = self.element_beam(merged.view(), time, false)?;
        Zip::from(&mut self.stacked_grid)
            .and(&corrected)
            .par_for_each(|s, &c| *s += F::from_c64(c));
        self.accumulators.iter_mut().for_each(|a| a.zero_grid());
        Ok(())
    }

    /// Apply the provider's element beam to a grid, masking the result if
    /// requested.
    fn element_beam(
        &self,
        grid: ArrayView4<c64>,
        time: f64,
        is_degrid: bool,
    ) -> Result<Array4<c64>, EngineError> {
        let mut corrected =
            self.provider
                .apply_element_beam(grid, time, self.spw, &self.mueller, is_degrid)?;
        if corrected.dim() != grid.dim() {
            return Err(CfError::ElementBeamShape {
                got: corrected.dim(),
                expected: grid.dim(),
            }
            .into());
        }
        if self.config.mask_grid {
            Zip::from(&mut corrected).and(&grid).par_for_each(|c, &g| {
                if g == c64::new(0.0, 0.0) {
                    *c = c64::new(0.0, 0.0);
                }
            });
        }
        Ok(corrected)
    }

    /// The average primary beam, or a flat one if nothing has been gridded.
    fn avg_pb_or_flat(&self, ny: usize, nx: usize) -> Array2<f32> {
        match &self.avg_pb {
            Some(pb) if pb.dim() == (ny, nx) => pb.clone(),
            _ => Array2::ones((ny, nx)),
        }
    }
}

/// Everything a batch needs before its baseline ranges can be resampled.
struct BatchPlan<'a> {
    store: VisBufferStore<'a>,
    order: Vec<usize>,
    ranges: Vec<BaselineRange>,
    chan_map: Vec<Option<usize>>,
    pol_map: Vec<Option<usize>>,
    conj_pol_map: Vec<Option<usize>>,
    time_range: (f64, f64),
}

impl BatchPlan<'_> {
    fn maps(&self) -> ResampleMaps {
        ResampleMaps {
            chan_map: &self.chan_map,
            pol_map: &self.pol_map,
            conj_pol_map: &self.conj_pol_map,
        }
    }

    /// The mean weight of the unflagged rows of a range.
    fn average_weight(&self, range: &BaselineRange) -> f64 {
        let vis = self.store.vis;
        let mut sum = 0.0;
        let mut count = 0;
        for &row in range.rows(&self.order) {
            if vis.flag_row[row] {
                continue;
            }
            for &w in vis.weights.row(row) {
                sum += w as f64;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }
}

/// Work out what to do with a batch. `None` if none of it maps into the image.
fn plan_batch<'a>(
    vis: &'a VisBuffer,
    layout: &ImageLayout,
    config: &GridderConfig,
) -> Result<Option<BatchPlan<'a>>, EngineError> {
    vis.validate()?;
    let chan_map = channel_map(&vis.freqs, &layout.chan_freqs, layout.chan_width);
    if chan_map.iter().all(Option::is_none) {
        debug!("No channel of this batch maps into the image; skipping it");
        return Ok(None);
    }
    let Some(time_range) = vis.time_range() else {
        debug!("Batch has no rows; skipping it");
        return Ok(None);
    };
    let (pol_map, conj_pol_map) = polarisation_maps(&vis.pols, &layout.pols, config.use_conj_pols);
    if pol_map.iter().chain(&conj_pol_map).all(Option::is_none) {
        debug!("No polarisation of this batch maps into the image; skipping it");
        return Ok(None);
    }

    let store = VisBufferStore::new(vis, layout.tangent);
    let (order, ranges) = make_baseline_ranges(
        vis.num_antennas,
        &vis.antenna1,
        &vis.antenna2,
        &store.uvw,
        &vis.flag_row,
        config.w_max,
        config.use_zero,
    );
    debug!(
        "Batch of {} rows has {} baseline ranges",
        vis.num_rows(),
        ranges.len()
    );
    Ok(Some(BatchPlan {
        store,
        order,
        ranges,
        chan_map,
        pol_map,
        conj_pol_map,
        time_range,
    }))
}

impl<F: GridFloat> FtMachine for GriddingEngine<F> {
    fn precision(&self) -> &'static str {
        F::NAME
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn config(&self) -> &GridderConfig {
        &self.config
    }

    fn initialize_to_sky(&mut self, image: &SkyImage) -> Result<Array2<f64>, EngineError> {
        self.setup(image)?;
        self.avg_pb = None;
        self.sum_weights = Array2::zeros((image.num_pols(), image.num_chans()));
        self.state = EngineState::ToSky;
        Ok(self.sum_weights.clone())
    }

    fn put(&mut self, vis: &VisBuffer) -> Result<(), EngineError> {
        self.require("grid visibilities", EngineState::ToSky)?;
        let (Some(layout), Some(resampler)) = (&self.layout, &self.resampler) else {
            return Err(EngineError::WrongState {
                operation: "grid visibilities",
                state: EngineState::Uninitialized,
            });
        };
        let Some(plan) = plan_batch(vis, layout, &self.config)? else {
            return Ok(());
        };
        self.max_abs_data = self.max_abs_data.max(vis.max_abs_data());
        self.spw = vis.spw;

        let (t_start, t_end) = plan.time_range;
        let time = 0.5 * (t_start + t_end);
        self.provider.compute_aterm(time)?;

        let maps = plan.maps();
        let num_pols = layout.pols.len();
        let ref_freq = layout.geometry.ref_freq;
        let passes = run_pass(
            &self.pool,
            &plan.ranges,
            &mut self.accumulators,
            self.config.max_retry_passes,
            |_, range, acc| {
                let mut scratch = resampler.allocate_scratch(vis, range, &maps, false)?;
                let request = CfRequest {
                    ant1: range.ant1,
                    ant2: range.ant2,
                    time,
                    mean_w: range.mean_w,
                    mueller: &self.mueller,
                    num_pols,
                    is_degrid: false,
                    average_weight: plan.average_weight(range),
                    spw: vis.spw,
                    taylor_term: 0,
                    ref_freq,
                };
                let cf = self
                    .provider
                    .make_convolution_function(&request, &mut acc.pb)?;
                trace!(
                    "Gridding baseline {}-{} ({} rows, w-plane {})",
                    range.ant1,
                    range.ant2,
                    range.num_rows(),
                    cf.w_plane()
                );
                resampler.data_to_grid(
                    &plan.store,
                    &plan.order,
                    range,
                    &maps,
                    &cf,
                    &mut scratch,
                    acc.grid.view_mut(),
                    acc.sum_weights.view_mut(),
                );
                Ok(())
            },
        )?;
        debug!("Gridded {} baseline ranges in {passes} passes", plan.ranges.len());
        drop(plan);

        if self.config.apply_element_beam {
            if let Some(time) = self.cycle.grid_batch(t_start, t_end) {
                self.apply_element_beam_cycle(time)?;
            }
        }
        Ok(())
    }

    fn finalize_to_sky(&mut self) -> Result<(), EngineError> {
        self.require("finish gridding", EngineState::ToSky)?;
        if self.config.apply_element_beam {
            if let Some(time) = self.cycle.flush() {
                self.apply_element_beam_cycle(time)?;
            }
        } else {
            sum_grids_into(self.stacked_grid.view_mut(), &self.accumulators);
            self.accumulators.iter_mut().for_each(|a| a.zero_grid());
        }
        reduce_accumulators(&mut self.accumulators);
        if let Some(acc) = self.accumulators.first() {
            self.sum_weights.assign(&acc.sum_weights);
        }
        info!("Finished gridding; sums of weights: {}", self.sum_weights);
        self.state = EngineState::Finalized(Direction::ToSky);
        Ok(())
    }

    fn get_image(
        &mut self,
        image: &mut SkyImage,
        normalize: bool,
    ) -> Result<Array2<f64>, EngineError> {
        self.require("make an image", EngineState::Finalized(Direction::ToSky))?;
        let (num_chans, num_pols, ny_padded, nx_padded) = self.stacked_grid.dim();
        let expected = (num_chans, num_pols, self.config.ny, self.config.nx);
        if image.data.dim() != expected {
            return Err(EngineError::ImageShape {
                got: image.data.dim(),
                expected,
            });
        }

        let avg_pb = match self.accumulators.first() {
            Some(acc) => self.provider.compute_avg_pb(&acc.pb),
            None => Array2::zeros((ny_padded, nx_padded)),
        };
        self.avg_pb = Some(avg_pb.clone());

        if self.sum_weights.iter().all(|&w| w == 0.0) {
            warn!("All sums of weights are zero; the image is empty");
            image.data.fill(c32::new(0.0, 0.0));
            return Ok(self.sum_weights.clone());
        }

        let mut grid = demote(self.stacked_grid.view());
        fft_planes(&mut grid, FftDirection::Inverse, true);

        let num_pixels = (nx_padded * ny_padded) as f64;
        for (i_chan, mut chan) in grid.outer_iter_mut().enumerate() {
            for (i_pol, mut plane) in chan.outer_iter_mut().enumerate() {
                let weight = self.sum_weights[(i_pol, i_chan)];
                let factor = if !normalize {
                    num_pixels
                } else if weight == 0.0 {
                    0.0
                } else {
                    num_pixels / weight
                };
                plane.mapv_inplace(|p| p * factor as f32);
            }
        }

        let max_pb = avg_pb.iter().copied().fold(0.0_f32, f32::max) as f64;
        let pb_floor = (self.config.pb_cut * max_pb).max(2.0 * self.config.min_pb);
        let [ox, oy] = self.offset_loc;
        let (ny, nx) = (self.config.ny, self.config.nx);
        let correction = Array2::from_shape_fn((ny, nx), |(y, x)| {
            let (py, px) = (y + oy, x + ox);
            let sph = self.spheroidal[(py, px)];
            let cut = self.spheroidal_cut[(py, px)];
            let pb = avg_pb[(py, px)];
            // Outside the useful area of the gridding taper, or where the
            // beam is too weak, pixels are blanked.
            if sph == 0.0 || cut == 0.0 || (pb as f64) < pb_floor {
                0.0
            } else {
                1.0 / (sph * pb)
            }
        });
        let cropped = grid.slice(s![.., .., oy..oy + ny, ox..ox + nx]);
        Zip::from(&mut image.data)
            .and(&cropped)
            .and_broadcast(&correction)
            .par_for_each(|i, &g, &c| *i = g * c);

        Ok(self.sum_weights.clone())
    }

    fn initialize_to_vis(&mut self, image: &SkyImage) -> Result<(), EngineError> {
        self.setup(image)?;
        let (num_chans, num_pols, ny_padded, nx_padded) = self.stacked_grid.dim();
        let avg_pb = self.avg_pb_or_flat(ny_padded, nx_padded);
        let [ox, oy] = self.offset_loc;
        let (ny, nx) = (self.config.ny, self.config.nx);

        // The inverse of the corrections made by `get_image`.
        let correction = Array2::from_shape_fn((ny, nx), |(y, x)| {
            let (py, px) = (y + oy, x + ox);
            let mut c = if self.config.predict_ft {
                let cut = self.spheroidal_cut[(py, px)];
                if cut == 0.0 {
                    0.0
                } else {
                    1.0 / cut
                }
            } else {
                let sph = self.spheroidal[(py, px)];
                if sph == 0.0 {
                    0.0
                } else {
                    avg_pb[(py, px)] / sph
                }
            };
            if self.config.apply_element_beam {
                let esc = self.element_spheroidal_cut[(py, px)];
                c = if esc == 0.0 { 0.0 } else { c / esc };
            }
            c
        });

        let mut padded = Array4::<c32>::zeros((num_chans, num_pols, ny_padded, nx_padded));
        Zip::from(padded.slice_mut(s![.., .., oy..oy + ny, ox..ox + nx]))
            .and(&image.data)
            .and_broadcast(&correction)
            .par_for_each(|p, &i, &c| *p = i * c);
        fft_planes(&mut padded, FftDirection::Forward, false);
        self.stacked_grid = promote(padded.view());

        self.sum_weights = Array2::zeros((num_pols, num_chans));
        self.state = EngineState::ToVis;
        Ok(())
    }

    fn get(&mut self, vis: &mut VisBuffer) -> Result<(), EngineError> {
        self.require("predict visibilities", EngineState::ToVis)?;
        let (Some(layout), Some(resampler)) = (&self.layout, &self.resampler) else {
            return Err(EngineError::WrongState {
                operation: "predict visibilities",
                state: EngineState::Uninitialized,
            });
        };
        let vis_ref: &VisBuffer = vis;
        let Some(plan) = plan_batch(vis_ref, &layout, &self.config)? else {
            return Ok(());
        };
        self.max_abs_data = self.max_abs_data.max(vis_ref.max_abs_data());
        self.spw = vis_ref.spw;

        let (t_start, t_end) = plan.time_range;
        if self.config.apply_element_beam {
            if let Some(mid) = self.cycle.degrid_batch(t_start, t_end) {
                debug!("Correcting the degridding grid for the element beam at time {mid}");
                self.provider.compute_aterm(mid)?;
                let grid = self.stacked_grid.mapv(F::to_c64);
                let corrected = self.element_beam(grid.view(), mid, true)?;
                self.degrid_grid = Some(corrected.mapv(F::from_c64));
            }
        }
        let time = 0.5 * (t_start + t_end);
        self.provider.compute_aterm(time)?;

        let maps = plan.maps();
        let num_pols = layout.pols.len();
        let source = self.degrid_grid.as_ref().unwrap_or(&self.stacked_grid);
        let (tx, rx) = crossbeam_channel::unbounded();
        let passes = run_pass(
            &self.pool,
            &plan.ranges,
            &mut self.accumulators,
            self.config.max_retry_passes,
            |i_range, range, acc| {
                let scratch = resampler.allocate_scratch(vis_ref, range, &maps, true)?;
                let request = CfRequest {
                    ant1: range.ant1,
                    ant2: range.ant2,
                    time,
                    mean_w: range.mean_w,
                    mueller: &self.mueller,
                    num_pols,
                    is_degrid: true,
                    average_weight: plan.average_weight(range),
                    spw: vis_ref.spw,
                    taylor_term: 0,
                    ref_freq: layout.geometry.ref_freq,
                };
                let cf = self
                    .provider
                    .make_convolution_function(&request, &mut acc.pb)?;
                trace!(
                    "Degridding baseline {}-{} ({} rows, w-plane {})",
                    range.ant1,
                    range.ant2,
                    range.num_rows(),
                    cf.w_plane()
                );
                let predictions = resampler.grid_to_data(
                    &plan.store,
                    &plan.order,
                    range,
                    &maps,
                    &cf,
                    scratch,
                    source.view(),
                );
                match tx.send((i_range, predictions)) {
                    Ok(()) => (),
                    // The receiver outlives the pass, so this can't happen.
                    Err(_) => return Ok(()),
                }
                Ok(())
            },
        )?;
        drop(tx);
        debug!("Degridded {} baseline ranges in {passes} passes", plan.ranges.len());

        let BatchPlan { order, ranges, .. } = plan;
        for (i_range, predictions) in rx {
            for (&row, prediction) in ranges[i_range]
                .rows(&order)
                .iter()
                .zip(predictions.outer_iter())
            {
                // Flagged rows keep their model values.
                if !vis.flag_row[row] {
                    vis.model.slice_mut(s![row, .., ..]).assign(&prediction);
                }
            }
        }
        Ok(())
    }

    fn finalize_to_vis(&mut self) -> Result<(), EngineError> {
        self.require("finish degridding", EngineState::ToVis)?;
        self.degrid_grid = None;
        self.state = EngineState::Finalized(Direction::ToVis);
        Ok(())
    }

    fn sum_of_weights(&self) -> &Array2<f64> {
        &self.sum_weights
    }

    fn max_abs_data(&self) -> f32 {
        self.max_abs_data
    }

    fn to_record(&self, image: Option<&SkyImage>) -> Record {
        let phase_centre = self
            .config
            .phase_centre
            .or(self.tangent)
            .unwrap_or_default();
        let mut record = Record::new();
        record.insert("name", RecordField::String(ENGINE_NAME.to_string()));
        record.insert("cache_size", RecordField::Int(self.config.cache_size as u64));
        record.insert("tile_size", RecordField::Int(self.config.tile_size as u64));
        record.insert(
            "grid_function",
            RecordField::String(self.provider.name().to_string()),
        );
        record.insert(
            "array_location",
            RecordField::Location(self.config.array_location),
        );
        record.insert(
            "tangent_specified",
            RecordField::Bool(self.config.phase_centre.is_some()),
        );
        record.insert("phase_centre", RecordField::Direction(phase_centre));
        record.insert("padding", RecordField::Float(self.config.padding));
        record.insert(
            "max_abs_data",
            RecordField::Float(self.max_abs_data as f64),
        );
        record.insert("centre_loc", RecordField::Pixel(self.centre_loc));
        record.insert("offset_loc", RecordField::Pixel(self.offset_loc));
        record.insert(
            "sum_of_weights",
            RecordField::Matrix(self.sum_weights.clone()),
        );
        if let Some(image) = image {
            record.insert(IMAGE_FIELD_NAME, RecordField::Image(image.clone()));
        }
        record
    }

    fn from_record(&mut self, record: &Record) -> Result<Option<SkyImage>, RecordError> {
        record.check_layout()?;
        let name = record.string("name")?;
        if name != ENGINE_NAME {
            return Err(RecordError::BadValue {
                field: "name",
                reason: format!("expected '{ENGINE_NAME}', got '{name}'"),
            });
        }
        let cache_size = record.int("cache_size")?;
        let tile_size = record.int("tile_size")?;
        let grid_function_name = record.string("grid_function")?;
        let grid_function: GridFunction =
            grid_function_name
                .parse()
                .map_err(|_| RecordError::BadValue {
                    field: "grid_function",
                    reason: format!("unknown grid function '{grid_function_name}'"),
                })?;
        let array_location = record.location("array_location")?;
        let tangent_specified = record.bool("tangent_specified")?;
        let phase_centre = record.direction("phase_centre")?;
        let padding = record.float("padding")?;
        if !(padding >= 1.0) {
            return Err(RecordError::BadValue {
                field: "padding",
                reason: format!("padding must be at least 1, got {padding}"),
            });
        }
        let max_abs_data = record.float("max_abs_data")?;
        let centre_loc = record.pixel("centre_loc")?;
        let offset_loc = record.pixel("offset_loc")?;
        let sum_of_weights = record.matrix("sum_of_weights")?.clone();
        let image = record.image()?.cloned();

        // A different grid function needs a new provider; a different padding
        // needs a new grid geometry.
        let replacement = if grid_function_name != self.provider.name() {
            Some(
                new_provider(
                    grid_function,
                    self.config.support,
                    self.config.oversample,
                    self.config.num_w_planes,
                )
                .map_err(|e| RecordError::BadValue {
                    field: "grid_function",
                    reason: e.to_string(),
                })?,
            )
        } else {
            None
        };
        if replacement.is_some() || padding != self.config.padding {
            self.prepared = None;
            self.layout = None;
            self.resampler = None;
            self.state = EngineState::Uninitialized;
        }
        if let Some(provider) = replacement {
            self.provider = provider;
        }

        self.config.cache_size = cache_size;
        self.config.tile_size = tile_size;
        self.config.grid_function = grid_function;
        self.config.array_location = array_location;
        self.config.phase_centre = tangent_specified.then_some(phase_centre);
        self.tangent = Some(phase_centre);
        self.config.padding = padding;
        self.max_abs_data = max_abs_data as f32;
        self.centre_loc = centre_loc;
        self.offset_loc = offset_loc;
        self.sum_weights = sum_of_weights;
        debug!("Restored the engine from a record");

        Ok(image)
    }
}

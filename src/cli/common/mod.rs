// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Common arguments for command-line interfaces. The `image`, `predict` and
//! `verify-config` subcommands all configure a gridding engine, and the first
//! two also simulate an observation, so those arguments are shared here.

mod printers;

pub(super) use printers::InfoPrinter;
pub(crate) use printers::{display_warnings, Warn};

use std::str::FromStr;

use clap::Parser;
use itertools::Itertools;
use log::debug;
use marlu::{LatLngHeight, RADec};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use super::AwGridderError;
use crate::{
    cf::{new_provider, GridFunction},
    constants::*,
    engine::{new_ft_machine, FtMachine, GridderConfig},
    simulate::{ArrayLayout, Observation},
    vis::Polarisation,
};

pub(super) const DEFAULT_NUM_ANTENNAS: usize = 32;
pub(super) const DEFAULT_ARRAY_RADIUS_M: f64 = 500.0;
pub(super) const DEFAULT_ARRAY_LAT_DEG: f64 = -26.703319;
pub(super) const DEFAULT_RA_DEG: f64 = 0.0;
pub(super) const DEFAULT_DEC_DEG: f64 = -27.0;
pub(super) const DEFAULT_TIME_RES_SECONDS: f64 = 8.0;
pub(super) const DEFAULT_NUM_TIMESTEPS: usize = 8;
pub(super) const DEFAULT_TIMESTEPS_PER_BATCH: usize = 2;
pub(super) const DEFAULT_MIDDLE_FREQ_MHZ: f64 = 150.0;
pub(super) const DEFAULT_NUM_CHANNELS: usize = 4;
pub(super) const DEFAULT_FREQ_RES_KHZ: f64 = 1000.0;

lazy_static::lazy_static! {
    pub(super) static ref ARG_FILE_TYPES_COMMA_SEPARATED: String = ArgFileTypes::iter().join(", ");

    pub(super) static ref ARG_FILE_HELP: String =
        format!("All arguments may be specified in a file. Any CLI arguments override arguments set in the file. Supported formats: {}", *ARG_FILE_TYPES_COMMA_SEPARATED);

    static ref GRID_FUNCTIONS_COMMA_SEPARATED: String = GridFunction::iter().join(", ");

    static ref GRID_FUNCTION_HELP: String =
        format!("The convolution function to grid with. Supported: {}. Default: {}", *GRID_FUNCTIONS_COMMA_SEPARATED, GridFunction::default());

    static ref PADDING_HELP: String =
        format!("The padded grid is at least this many times bigger than the image. Default: {DEFAULT_PADDING}");

    static ref W_MAX_HELP: String =
        format!("Baselines with a larger |w| than this are not gridded [metres]. Default: {DEFAULT_W_MAX}");

    static ref NUM_W_PLANES_HELP: String =
        format!("The number of w-planes used by W-projection. Default: {DEFAULT_NUM_W_PLANES}");

    static ref SUPPORT_HELP: String =
        format!("The half-width of the convolution functions [pixels]. Default: {DEFAULT_SUPPORT}");

    static ref OVERSAMPLE_HELP: String =
        format!("The oversampling factor of the convolution functions. Default: {DEFAULT_OVERSAMPLE}");

    static ref STEP_APPLY_ELEMENT_HELP: String =
        format!("The number of batches between element-beam corrections. Default: {DEFAULT_STEP_APPLY_ELEMENT}");

    static ref PB_CUT_HELP: String =
        format!("Blank pixels where the average primary beam is below this fraction of its peak. Default: {DEFAULT_PB_CUT}");

    static ref MIN_PB_HELP: String =
        format!("Blank pixels where the average primary beam is below twice this. Default: {DEFAULT_MIN_PB}");

    static ref MAX_RETRY_PASSES_HELP: String =
        format!("How many times baselines that ran out of resources are re-attempted. Default: {DEFAULT_MAX_RETRY_PASSES}");

    static ref ARRAY_POSITION_HELP: String =
        format!("The Earth longitude, latitude, and height of the array [degrees, degrees, meters]. Default latitude: {DEFAULT_ARRAY_LAT_DEG}°");

    static ref NUM_ANTENNAS_HELP: String =
        format!("The number of antennas in the simulated array. Default: {DEFAULT_NUM_ANTENNAS}");

    static ref ARRAY_RADIUS_HELP: String =
        format!("The radius of the simulated array [metres]. Default: {DEFAULT_ARRAY_RADIUS_M}");

    static ref RA_HELP: String =
        format!("The RA of the phase centre [degrees]. Default: {DEFAULT_RA_DEG}");

    static ref DEC_HELP: String =
        format!("The Dec. of the phase centre [degrees]. Default: {DEFAULT_DEC_DEG}");

    static ref TIME_RES_HELP: String =
        format!("The time resolution [seconds]. Default: {DEFAULT_TIME_RES_SECONDS}");

    static ref NUM_TIMESTEPS_HELP: String =
        format!("The number of timesteps. Default: {DEFAULT_NUM_TIMESTEPS}");

    static ref TIMESTEPS_PER_BATCH_HELP: String =
        format!("The number of timesteps gridded together. Default: {DEFAULT_TIMESTEPS_PER_BATCH}");

    static ref MIDDLE_FREQ_HELP: String =
        format!("The middle frequency of the band [MHz]. Default: {DEFAULT_MIDDLE_FREQ_MHZ}");

    static ref NUM_CHANNELS_HELP: String =
        format!("The number of frequency channels. Default: {DEFAULT_NUM_CHANNELS}");

    static ref FREQ_RES_HELP: String =
        format!("The frequency resolution [kHz]. Default: {DEFAULT_FREQ_RES_KHZ}");

    static ref POLS_HELP: String =
        format!("The visibility polarisations. Supported: {}. Default: XX YY", Polarisation::iter().join(", "));
}

#[derive(Debug, Display, EnumIter, EnumString)]
pub(super) enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

macro_rules! unpack_arg_file {
    ($arg_file:expr) => ({
        use std::{fs::File, io::Read, str::FromStr};

        use crate::cli::common::{ArgFileTypes, ARG_FILE_TYPES_COMMA_SEPARATED};

        debug!("Attempting to parse argument file {}", $arg_file.display());

        let mut contents = String::new();
        let arg_file_type = $arg_file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileTypes::from_str(&e).ok());

        match arg_file_type {
            Some(ArgFileTypes::Toml) => {
                debug!("Parsing toml file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match toml::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(AwGridderError::ArgFile(format!(
                            "Couldn't decode toml structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }
            Some(ArgFileTypes::Json) => {
                debug!("Parsing json file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match serde_json::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(AwGridderError::ArgFile(format!(
                            "Couldn't decode json structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }

            _ => {
                return Err(AwGridderError::ArgFile(format!(
                    "Argument file '{:?}' doesn't have a recognised file extension! Valid extensions are: {}", $arg_file, *ARG_FILE_TYPES_COMMA_SEPARATED)
                ))
            }
        }
    });
}

/// Arguments that configure the gridding engine.
#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct GridderArgs {
    /// The number of image pixels along x.
    #[clap(long, help_heading = "IMAGE")]
    pub(super) nx: Option<usize>,

    /// The number of image pixels along y.
    #[clap(long, help_heading = "IMAGE")]
    pub(super) ny: Option<usize>,

    /// The size of image pixels [arcseconds].
    #[clap(long, help_heading = "IMAGE")]
    pub(super) cell: Option<f64>,

    #[clap(long, help = PADDING_HELP.as_str(), help_heading = "GRIDDING")]
    pub(super) padding: Option<f64>,

    #[clap(long, help = GRID_FUNCTION_HELP.as_str(), help_heading = "GRIDDING")]
    pub(super) grid_function: Option<String>,

    #[clap(long, help = W_MAX_HELP.as_str(), help_heading = "GRIDDING")]
    pub(super) w_max: Option<f64>,

    #[clap(long, help = NUM_W_PLANES_HELP.as_str(), help_heading = "GRIDDING")]
    pub(super) num_w_planes: Option<usize>,

    #[clap(long, help = SUPPORT_HELP.as_str(), help_heading = "GRIDDING")]
    pub(super) support: Option<usize>,

    #[clap(long, help = OVERSAMPLE_HELP.as_str(), help_heading = "GRIDDING")]
    pub(super) oversample: Option<usize>,

    /// Accumulate onto double-precision grids.
    #[clap(long, help_heading = "GRIDDING")]
    #[serde(default)]
    pub(super) double_precision: bool,

    /// Split visibilities over their nearest cells rather than using
    /// oversampled convolution functions.
    #[clap(long, help_heading = "GRIDDING")]
    #[serde(default)]
    pub(super) linear_interpolation: bool,

    /// Also grid auto-correlations.
    #[clap(long, help_heading = "GRIDDING")]
    #[serde(default)]
    pub(super) use_autos: bool,

    /// Also grid the conjugates of cross-hand visibilities onto their partner
    /// polarisation.
    #[clap(long, help_heading = "GRIDDING")]
    #[serde(default)]
    pub(super) use_conj_pols: bool,

    /// Periodically correct the grid for the element beam.
    #[clap(long, help_heading = "BEAM")]
    #[serde(default)]
    pub(super) element_beam: bool,

    #[clap(long, help = STEP_APPLY_ELEMENT_HELP.as_str(), help_heading = "BEAM")]
    pub(super) step_apply_element: Option<usize>,

    /// After element-beam corrections, zero the cells that were empty before
    /// them.
    #[clap(long, help_heading = "BEAM")]
    #[serde(default)]
    pub(super) mask_grid: bool,

    #[clap(long, help = PB_CUT_HELP.as_str(), help_heading = "BEAM")]
    pub(super) pb_cut: Option<f64>,

    #[clap(long, help = MIN_PB_HELP.as_str(), help_heading = "BEAM")]
    pub(super) min_pb: Option<f64>,

    /// When predicting, only correct the image for the gridding taper, not the
    /// primary beam.
    #[clap(long, help_heading = "BEAM")]
    #[serde(default)]
    pub(super) predict_ft: bool,

    #[clap(long = "array-position", help = ARRAY_POSITION_HELP.as_str(), help_heading = "BEAM", number_of_values = 3, allow_hyphen_values = true, value_names = &["LONG_DEG", "LAT_DEG", "HEIGHT_M"])]
    pub(super) array_position: Option<Vec<f64>>,

    /// The number of threads to grid with. Default: all available.
    #[clap(long, help_heading = "RESOURCES")]
    pub(super) num_threads: Option<usize>,

    #[clap(long, help = MAX_RETRY_PASSES_HELP.as_str(), help_heading = "RESOURCES")]
    pub(super) max_retry_passes: Option<usize>,
}

impl GridderArgs {
    /// Prefer the values in `self` over those in `other`.
    pub(super) fn merge(self, other: Self) -> Self {
        Self {
            nx: self.nx.or(other.nx),
            ny: self.ny.or(other.ny),
            cell: self.cell.or(other.cell),
            padding: self.padding.or(other.padding),
            grid_function: self.grid_function.or(other.grid_function),
            w_max: self.w_max.or(other.w_max),
            num_w_planes: self.num_w_planes.or(other.num_w_planes),
            support: self.support.or(other.support),
            oversample: self.oversample.or(other.oversample),
            double_precision: self.double_precision || other.double_precision,
            linear_interpolation: self.linear_interpolation || other.linear_interpolation,
            use_autos: self.use_autos || other.use_autos,
            use_conj_pols: self.use_conj_pols || other.use_conj_pols,
            element_beam: self.element_beam || other.element_beam,
            step_apply_element: self.step_apply_element.or(other.step_apply_element),
            mask_grid: self.mask_grid || other.mask_grid,
            pb_cut: self.pb_cut.or(other.pb_cut),
            min_pb: self.min_pb.or(other.min_pb),
            predict_ft: self.predict_ft || other.predict_ft,
            array_position: self.array_position.or(other.array_position),
            num_threads: self.num_threads.or(other.num_threads),
            max_retry_passes: self.max_retry_passes.or(other.max_retry_passes),
        }
    }

    pub(super) fn parse(self) -> Result<GridderConfig, AwGridderError> {
        // Expose all the struct fields to ensure they're all used.
        let GridderArgs {
            nx,
            ny,
            cell,
            padding,
            grid_function,
            w_max,
            num_w_planes,
            support,
            oversample,
            double_precision,
            linear_interpolation,
            use_autos,
            use_conj_pols,
            element_beam,
            step_apply_element,
            mask_grid,
            pb_cut,
            min_pb,
            predict_ft,
            array_position,
            num_threads,
            max_retry_passes,
        } = self;

        let mut config = GridderConfig::default();
        if let Some(nx) = nx {
            config.nx = nx;
        }
        if let Some(ny) = ny {
            config.ny = ny;
        }
        if config.nx == 0 || config.ny == 0 {
            return Err(AwGridderError::Args(format!(
                "The image must have at least one pixel on each side; got {}x{}",
                config.nx, config.ny
            )));
        }
        if let Some(cell) = cell {
            if !(cell > 0.0) {
                return Err(AwGridderError::Args(format!(
                    "The cell size must be positive; got {cell}"
                )));
            }
            config.cell_x_arcsec = cell;
            config.cell_y_arcsec = cell;
        }
        if let Some(padding) = padding {
            config.padding = padding;
        }
        if let Some(gf) = grid_function {
            config.grid_function = GridFunction::from_str(&gf.to_lowercase()).map_err(|_| {
                AwGridderError::Args(format!(
                    "Unrecognised grid function '{gf}'. Supported: {}",
                    *GRID_FUNCTIONS_COMMA_SEPARATED
                ))
            })?;
        }
        if let Some(w_max) = w_max {
            config.w_max = w_max;
        }
        if let Some(n) = num_w_planes {
            config.num_w_planes = n;
        }
        if let Some(support) = support {
            config.support = support;
        }
        if let Some(oversample) = oversample {
            config.oversample = oversample;
        }
        config.double_precision_grid = double_precision;
        config.linear_interpolation = linear_interpolation;
        config.use_zero = use_autos;
        config.use_conj_pols = use_conj_pols;
        config.apply_element_beam = element_beam;
        if let Some(step) = step_apply_element {
            if step == 0 {
                return Err(AwGridderError::Args(
                    "The element-beam step must be at least 1".to_string(),
                ));
            }
            config.step_apply_element = step;
        }
        config.mask_grid = mask_grid;
        if let Some(pb_cut) = pb_cut {
            config.pb_cut = pb_cut;
        }
        if let Some(min_pb) = min_pb {
            config.min_pb = min_pb;
        }
        config.predict_ft = predict_ft;
        if let Some(pos) = array_position {
            match pos.as_slice() {
                &[long, lat, height] => {
                    config.array_location = Some(LatLngHeight {
                        longitude_rad: long.to_radians(),
                        latitude_rad: lat.to_radians(),
                        height_metres: height,
                    })
                }
                _ => {
                    return Err(AwGridderError::Args(format!(
                        "Three values are needed for the array position; got {}",
                        pos.len()
                    )))
                }
            }
        }
        config.num_threads = num_threads;
        if let Some(n) = max_retry_passes {
            config.max_retry_passes = n;
        }

        if config.predict_ft && config.apply_element_beam {
            "--predict-ft ignores the average primary beam, but the element beam is still divided out when predicting".warn();
        }

        debug!("{config:#?}");
        Ok(config)
    }
}

/// Make an engine, and the convolution-function provider it needs, from a
/// configuration.
pub(super) fn make_engine(config: GridderConfig) -> Result<Box<dyn FtMachine>, AwGridderError> {
    let provider = new_provider(
        config.grid_function,
        config.support,
        config.oversample,
        config.num_w_planes,
    )?;
    Ok(new_ft_machine(config, provider)?)
}

/// Summarise a configuration for the user.
pub(super) fn print_config(config: &GridderConfig, printer: &mut InfoPrinter) {
    printer.push_block(vec![
        format!(
            "Image: {}x{} pixels of {}\"x{}\"",
            config.nx, config.ny, config.cell_x_arcsec, config.cell_y_arcsec
        )
        .into(),
        format!("Padding: {}", config.padding).into(),
    ]);
    let mut block = vec![format!("Grid function: {}", config.grid_function).into()];
    if config.grid_function == GridFunction::WProjection {
        block.push(
            format!(
                "{} w-planes up to |w| = {} m, support {}, oversampling {}",
                config.num_w_planes, config.w_max, config.support, config.oversample
            )
            .into(),
        );
    }
    block.push(
        format!(
            "{} precision grids{}",
            if config.double_precision_grid {
                "Double"
            } else {
                "Single"
            },
            if config.linear_interpolation {
                ", linear interpolation"
            } else {
                ""
            }
        )
        .into(),
    );
    printer.push_block(block);
    if config.apply_element_beam {
        printer.push_line(
            format!(
                "Element beam corrected every {} batch(es)",
                config.step_apply_element
            )
            .into(),
        );
    }
    printer.push_line(
        match config.num_threads {
            Some(n) => format!("Using {n} threads"),
            None => "Using all available threads".to_string(),
        }
        .into(),
    );
}

/// Arguments that describe the simulated observation.
#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct ObservationArgs {
    #[clap(long, help = NUM_ANTENNAS_HELP.as_str(), help_heading = "OBSERVATION")]
    pub(super) num_antennas: Option<usize>,

    #[clap(long, help = ARRAY_RADIUS_HELP.as_str(), help_heading = "OBSERVATION")]
    pub(super) array_radius: Option<f64>,

    #[clap(long, help = RA_HELP.as_str(), help_heading = "OBSERVATION", allow_hyphen_values = true)]
    pub(super) ra: Option<f64>,

    #[clap(long, help = DEC_HELP.as_str(), help_heading = "OBSERVATION", allow_hyphen_values = true)]
    pub(super) dec: Option<f64>,

    /// The local sidereal time at the start of the observation [degrees].
    /// Default: the phase centre's RA, less half of the observation.
    #[clap(long, help_heading = "OBSERVATION", allow_hyphen_values = true)]
    pub(super) lst: Option<f64>,

    #[clap(long, help = TIME_RES_HELP.as_str(), help_heading = "OBSERVATION")]
    pub(super) time_res: Option<f64>,

    #[clap(long, help = NUM_TIMESTEPS_HELP.as_str(), help_heading = "OBSERVATION")]
    pub(super) num_timesteps: Option<usize>,

    #[clap(long, help = TIMESTEPS_PER_BATCH_HELP.as_str(), help_heading = "OBSERVATION")]
    pub(super) timesteps_per_batch: Option<usize>,

    #[clap(long, help = MIDDLE_FREQ_HELP.as_str(), help_heading = "OBSERVATION")]
    pub(super) middle_freq: Option<f64>,

    #[clap(long, help = NUM_CHANNELS_HELP.as_str(), help_heading = "OBSERVATION")]
    pub(super) num_channels: Option<usize>,

    #[clap(long, help = FREQ_RES_HELP.as_str(), help_heading = "OBSERVATION")]
    pub(super) freq_res: Option<f64>,

    #[clap(long, help = POLS_HELP.as_str(), help_heading = "OBSERVATION", multiple_values(true))]
    pub(super) pols: Option<Vec<String>>,
}

impl ObservationArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        Self {
            num_antennas: self.num_antennas.or(other.num_antennas),
            array_radius: self.array_radius.or(other.array_radius),
            ra: self.ra.or(other.ra),
            dec: self.dec.or(other.dec),
            lst: self.lst.or(other.lst),
            time_res: self.time_res.or(other.time_res),
            num_timesteps: self.num_timesteps.or(other.num_timesteps),
            timesteps_per_batch: self.timesteps_per_batch.or(other.timesteps_per_batch),
            middle_freq: self.middle_freq.or(other.middle_freq),
            num_channels: self.num_channels.or(other.num_channels),
            freq_res: self.freq_res.or(other.freq_res),
            pols: self.pols.or(other.pols),
        }
    }

    /// Build the array and observation to simulate. If `phase_centre` is
    /// given, it is used instead of any RA and Dec. arguments.
    pub(super) fn parse(
        self,
        config: &GridderConfig,
        phase_centre: Option<RADec>,
    ) -> Result<(ArrayLayout, Observation), AwGridderError> {
        let ObservationArgs {
            num_antennas,
            array_radius,
            ra,
            dec,
            lst,
            time_res,
            num_timesteps,
            timesteps_per_batch,
            middle_freq,
            num_channels,
            freq_res,
            pols,
        } = self;

        let phase_centre = match phase_centre {
            Some(pc) => {
                if ra.is_some() || dec.is_some() {
                    format!("Ignoring the given RA and Dec.; using the image's phase centre {pc}")
                        .warn();
                }
                pc
            }
            None => {
                let ra = ra.unwrap_or(DEFAULT_RA_DEG);
                let dec = dec.unwrap_or(DEFAULT_DEC_DEG);
                if !(-90.0..=90.0).contains(&dec) {
                    return Err(AwGridderError::Args(format!(
                        "The Dec. must be between -90 and 90 degrees; got {dec}"
                    )));
                }
                RADec::from_degrees(ra, dec)
            }
        };

        let latitude_rad = config
            .array_location
            .map(|l| l.latitude_rad)
            .unwrap_or_else(|| DEFAULT_ARRAY_LAT_DEG.to_radians());
        let layout = ArrayLayout::spiral(
            num_antennas.unwrap_or(DEFAULT_NUM_ANTENNAS),
            array_radius.unwrap_or(DEFAULT_ARRAY_RADIUS_M),
            latitude_rad,
        )?;

        let time_res = time_res.unwrap_or(DEFAULT_TIME_RES_SECONDS);
        let num_timesteps = num_timesteps.unwrap_or(DEFAULT_NUM_TIMESTEPS);
        let lst_start_rad = match lst {
            Some(lst) => lst.to_radians(),
            // Put the phase centre at transit in the middle of the observation.
            None => phase_centre.ra - SIDEREAL_RATE * time_res * num_timesteps as f64 / 2.0,
        };

        let num_channels = num_channels.unwrap_or(DEFAULT_NUM_CHANNELS);
        let middle_freq_hz = middle_freq.unwrap_or(DEFAULT_MIDDLE_FREQ_MHZ) * 1e6;
        let freq_res_hz = freq_res.unwrap_or(DEFAULT_FREQ_RES_KHZ) * 1e3;
        let freqs = (0..num_channels)
            .map(|i| middle_freq_hz + (i as f64 - (num_channels as f64 - 1.0) / 2.0) * freq_res_hz)
            .collect();

        let pols = match pols {
            None => vec![Polarisation::XX, Polarisation::YY],
            Some(pols) => pols
                .iter()
                .map(|p| {
                    Polarisation::from_str(&p.to_uppercase()).map_err(|_| {
                        AwGridderError::Args(format!("Unrecognised polarisation '{p}'"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        let obs = Observation {
            phase_centre,
            lst_start_rad,
            time_res,
            num_timesteps,
            timesteps_per_batch: timesteps_per_batch.unwrap_or(DEFAULT_TIMESTEPS_PER_BATCH),
            freqs,
            pols,
            include_autos: config.use_zero,
        };
        Ok((layout, obs))
    }
}

/// Summarise an observation for the user.
pub(super) fn print_observation(layout: &ArrayLayout, obs: &Observation, printer: &mut InfoPrinter) {
    printer.push_line(format!("Phase centre: {}", obs.phase_centre).into());
    printer.push_block(vec![
        format!("{} antennas", layout.num_antennas()).into(),
        format!(
            "{} timesteps at {} s resolution, {} per batch",
            obs.num_timesteps, obs.time_res, obs.timesteps_per_batch
        )
        .into(),
    ]);
    let (first, last) = (
        obs.freqs.first().copied().unwrap_or_default(),
        obs.freqs.last().copied().unwrap_or_default(),
    );
    printer.push_block(vec![
        format!(
            "{} channels from {:.3} to {:.3} MHz",
            obs.freqs.len(),
            first / 1e6,
            last / 1e6
        )
        .into(),
        format!("Polarisations: {}", obs.pols.iter().join(", ")).into(),
    ]);
}

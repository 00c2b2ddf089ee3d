// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Simulate the visibilities of point sources, grid them, and write out the
//! dirty image.

#[cfg(test)]
mod tests;

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    str::FromStr,
};

use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use log::{debug, info, trace};
use marlu::RADec;
use serde::{Deserialize, Serialize};

use super::common::{
    display_warnings, make_engine, print_config, print_observation, GridderArgs, InfoPrinter,
    ObservationArgs, Warn, ARG_FILE_HELP,
};
use crate::{
    coord::radec_from_lm,
    engine::{GridderConfig, SkyImage},
    simulate::{simulate, ArrayLayout, Observation, PointSource},
    vis::Polarisation,
    AwGridderError, PROGRESS_BARS,
};

const DEFAULT_OUTPUT_IMAGE_FILENAME: &str = "awgridder_image.json";

lazy_static::lazy_static! {
    static ref OUTPUT_HELP: String =
        format!("Path to the output image (JSON). Default: {DEFAULT_OUTPUT_IMAGE_FILENAME}");
}

#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct ImageCliArgs {
    /// Point sources to simulate, each as "RA,DEC,FLUX" [degrees, degrees,
    /// Jy]. Default: a 1 Jy source at the phase centre.
    #[clap(long, multiple_values(true), allow_hyphen_values = true, help_heading = "SKY MODEL")]
    pub(super) sources: Option<Vec<String>>,

    /// The image polarisations. Default: I
    #[clap(long, multiple_values(true), help_heading = "IMAGE")]
    pub(super) image_pols: Option<Vec<String>>,

    /// Make one image channel per visibility channel, rather than a single
    /// multi-frequency image.
    #[clap(long, help_heading = "IMAGE")]
    #[serde(default)]
    pub(super) cube: bool,

    /// Don't divide the image by the sum of the weights.
    #[clap(long, help_heading = "IMAGE")]
    #[serde(default)]
    pub(super) no_normalise: bool,

    #[clap(short, long, help = OUTPUT_HELP.as_str(), help_heading = "OUTPUT FILES")]
    pub(super) output: Option<PathBuf>,

    /// Also write the engine's state and the image to this record file (JSON).
    #[clap(long, help_heading = "OUTPUT FILES")]
    pub(super) record: Option<PathBuf>,
}

impl ImageCliArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            sources: self.sources.or(other.sources),
            image_pols: self.image_pols.or(other.image_pols),
            cube: self.cube || other.cube,
            no_normalise: self.no_normalise || other.no_normalise,
            output: self.output.or(other.output),
            record: self.record.or(other.record),
        }
    }
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct ImageArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "gridder")]
    #[serde(default)]
    pub(super) gridder_args: GridderArgs,

    #[clap(flatten)]
    #[serde(rename = "observation")]
    #[serde(default)]
    pub(super) observation_args: ObservationArgs,

    #[clap(flatten)]
    #[serde(rename = "image")]
    #[serde(default)]
    pub(super) image_args: ImageCliArgs,
}

impl ImageArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified
    /// into a single struct. Where applicable, it will prefer CLI parameters
    /// over those in the file.
    pub(super) fn merge(self) -> Result<ImageArgs, AwGridderError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            // Read in the file arguments. Ensure all of the file args are
            // accounted for by pattern matching.
            let ImageArgs {
                args_file: _,
                gridder_args,
                observation_args,
                image_args,
            } = unpack_arg_file!(arg_file);

            // Merge all the arguments, preferring the CLI args when available.
            Ok(ImageArgs {
                args_file: None,
                gridder_args: cli_args.gridder_args.merge(gridder_args),
                observation_args: cli_args.observation_args.merge(observation_args),
                image_args: cli_args.image_args.merge(image_args),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<ImageParams, AwGridderError> {
        debug!("{:#?}", self);

        let ImageArgs {
            args_file: _,
            gridder_args,
            observation_args,
            image_args:
                ImageCliArgs {
                    sources,
                    image_pols,
                    cube,
                    no_normalise,
                    output,
                    record,
                },
        } = self;

        let config = gridder_args.parse()?;
        let (layout, obs) = observation_args.parse(&config, None)?;

        let sources = match sources {
            None => vec![PointSource {
                radec: obs.phase_centre,
                flux_density: 1.0,
            }],
            Some(sources) => sources
                .iter()
                .map(|s| parse_source(s))
                .collect::<Result<Vec<_>, _>>()?,
        };
        if sources.is_empty() {
            "No sources were given; the image will be empty".warn();
        }

        let image_pols = match image_pols {
            None => vec![Polarisation::I],
            Some(pols) => pols
                .iter()
                .map(|p| {
                    Polarisation::from_str(&p.to_uppercase()).map_err(|_| {
                        AwGridderError::Args(format!("Unrecognised image polarisation '{p}'"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };
        if image_pols.is_empty() {
            return Err(AwGridderError::Args(
                "At least one image polarisation is needed".to_string(),
            ));
        }

        let output = output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_IMAGE_FILENAME));
        check_output_is_json(&output)?;
        if let Some(record) = record.as_ref() {
            check_output_is_json(record)?;
        }

        let image = blank_image(&config, &obs, image_pols, cube);

        let mut printer = InfoPrinter::new("Imaging simulated visibilities".into());
        print_observation(&layout, &obs, &mut printer);
        printer.push_block(
            std::iter::once(format!("{} point source(s)", sources.len()).into())
                .chain(sources.iter().take(5).map(|s| {
                    format!("{:.3} Jy at {}", s.flux_density, s.radec).into()
                }))
                .collect(),
        );
        print_config(&config, &mut printer);
        printer.push_block(vec![
            format!(
                "{} channel(s), polarisations {}",
                image.num_chans(),
                image.pols.iter().join(", ")
            )
            .into(),
            format!("Writing the image to {}", output.display()).into(),
        ]);
        printer.display();
        display_warnings();

        Ok(ImageParams {
            config,
            layout,
            obs,
            sources,
            image,
            normalise: !no_normalise,
            output,
            record,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), AwGridderError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        params.run()
    }
}

struct ImageParams {
    config: GridderConfig,
    layout: ArrayLayout,
    obs: Observation,
    sources: Vec<PointSource>,
    image: SkyImage,
    normalise: bool,
    output: PathBuf,
    record: Option<PathBuf>,
}

impl ImageParams {
    fn run(self) -> Result<(), AwGridderError> {
        let ImageParams {
            config,
            layout,
            obs,
            sources,
            mut image,
            normalise,
            output,
            record,
        } = self;

        let batches = simulate(&layout, &obs, &sources)?;
        let mut engine = make_engine(config)?;
        info!("Gridding with a {} precision engine", engine.precision());

        engine.initialize_to_sky(&image)?;
        let progress = ProgressBar::with_draw_target(
            Some(batches.len() as u64),
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
        .with_message("Gridding");
        for vis in &batches {
            engine.put(vis)?;
            progress.inc(1);
        }
        progress.abandon_with_message("Finished gridding");
        engine.finalize_to_sky()?;

        let weights = engine.get_image(&mut image, normalise)?;
        debug!("Sums of weights: {weights}");
        let (peak, (i_chan, i_pol, y, x)) = image
            .data
            .indexed_iter()
            .map(|((c, p, y, x), v)| (v.re, (c, p, y, x)))
            .fold((f32::NEG_INFINITY, (0, 0, 0, 0)), |acc, v| {
                if v.0 > acc.0 {
                    v
                } else {
                    acc
                }
            });
        let (l, m) = image.pixel_to_lm(y, x);
        let peak_radec = radec_from_lm(l, m, image.phase_centre);
        info!(
            "Image peak {peak:.4} in channel {i_chan}, polarisation {} at pixel ({x}, {y}), {peak_radec}",
            image.pols[i_pol]
        );

        write_json(&output, &image)?;
        info!("Wrote the image to {}", output.display());

        if let Some(record) = record {
            engine.to_record(Some(&image)).save(&record)?;
            info!("Wrote the engine record to {}", record.display());
        }

        Ok(())
    }
}

/// Parse a point source from "RA,DEC,FLUX".
fn parse_source(s: &str) -> Result<PointSource, AwGridderError> {
    let err = || {
        AwGridderError::Args(format!(
            "Couldn't parse source '{s}'; expected RA,DEC,FLUX in degrees, degrees and Jy"
        ))
    };
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|_| err()))
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        &[ra, dec, flux_density] if (-90.0..=90.0).contains(&dec) => Ok(PointSource {
            radec: RADec::from_degrees(ra, dec),
            flux_density,
        }),
        _ => Err(err()),
    }
}

/// An empty image covering the observation's band.
fn blank_image(
    config: &GridderConfig,
    obs: &Observation,
    pols: Vec<Polarisation>,
    cube: bool,
) -> SkyImage {
    let (cell_x, cell_y) = config.cell_sizes_rad();
    let chan_width = match obs.freqs.as_slice() {
        [f0, f1, ..] => (f1 - f0).abs(),
        _ => 0.0,
    };
    let (chan_freqs, chan_width) = if cube {
        (obs.freqs.clone(), chan_width)
    } else {
        let mean = obs.freqs.iter().sum::<f64>() / obs.freqs.len().max(1) as f64;
        (vec![mean], chan_width * obs.freqs.len() as f64)
    };
    SkyImage::new(
        config.nx,
        config.ny,
        chan_freqs,
        chan_width,
        pols,
        obs.phase_centre,
        cell_x,
        cell_y,
    )
}

pub(super) fn check_output_is_json(path: &Path) -> Result<(), AwGridderError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(e) if e.eq_ignore_ascii_case("json") => Ok(()),
        _ => Err(AwGridderError::Args(format!(
            "Output file '{}' must have a .json extension",
            path.display()
        ))),
    }
}

pub(super) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AwGridderError> {
    let f = BufWriter::new(File::create(path)?);
    serde_json::to_writer(f, value)?;
    Ok(())
}

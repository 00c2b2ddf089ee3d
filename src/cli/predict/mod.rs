// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Predict model visibilities of an image by degridding.


use std::{fs::File, io::BufReader, path::PathBuf};

use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, trace};
use marlu::c32;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use super::{
    common::{
        display_warnings, make_engine, print_config, print_observation, GridderArgs, InfoPrinter,
        ObservationArgs, ARG_FILE_HELP,
    },
    image::{check_output_is_json, write_json},
};
use crate::{
    engine::{GridderConfig, Record, RecordField, SkyImage, IMAGE_FIELD_NAME},
    simulate::{simulate, ArrayLayout, Observation},
    vis::Polarisation,
    AwGridderError, PROGRESS_BARS,
};

const DEFAULT_OUTPUT_VIS_FILENAME: &str = "awgridder_model.json";

lazy_static::lazy_static! {
    static ref OUTPUT_HELP: String =
        format!("Path to the output model visibilities (JSON). Default: {DEFAULT_OUTPUT_VIS_FILENAME}");
}

#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct PredictCliArgs {
    /// Path to the image to predict from (JSON), as written by `awgridder
    /// image`.
    #[clap(short, long, parse(from_str), help_heading = "INPUT FILES")]
    pub(super) image: Option<PathBuf>,

    /// Path to an engine record holding the image to predict from (JSON). The
    /// engine is restored from the record before predicting.
    #[clap(long, parse(from_str), conflicts_with("image"), help_heading = "INPUT FILES")]
    pub(super) record: Option<PathBuf>,

    #[clap(short, long, help = OUTPUT_HELP.as_str(), help_heading = "OUTPUT FILES")]
    pub(super) output: Option<PathBuf>,
}

impl PredictCliArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            image: self.image.or(other.image),
            record: self.record.or(other.record),
            output: self.output.or(other.output),
        }
    }
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct PredictArgs {
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
    #[serde(rename = "predict")]
    #[serde(default)]
    pub(super) predict_args: PredictCliArgs,
}

/// Where the image comes from.
#[derive(Debug)]
enum ImageSource {
    Image(SkyImage),
    Record(Record),
}

/// Model visibilities, one row per baseline and timestep.
#[derive(Debug, Serialize, Deserialize)]
struct ModelVis {
    /// \[Hz\]
    freqs: Vec<f64>,
    pols: Vec<Polarisation>,
    antenna1: Vec<usize>,
    antenna2: Vec<usize>,
    /// \[seconds\]
    time: Vec<f64>,
    /// \[metres\]
    uvw: Vec<[f64; 3]>,
    /// (row, channel, polarisation)
    model: Array3<c32>,
}

impl PredictArgs {
    pub(super) fn merge(self) -> Result<PredictArgs, AwGridderError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let PredictArgs {
                args_file: _,
                gridder_args,
                observation_args,
                predict_args,
            } = unpack_arg_file!(arg_file);

            Ok(PredictArgs {
                args_file: None,
                gridder_args: cli_args.gridder_args.merge(gridder_args),
                observation_args: cli_args.observation_args.merge(observation_args),
                predict_args: cli_args.predict_args.merge(predict_args),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<PredictParams, AwGridderError> {
        debug!("{:#?}", self);

        let PredictArgs {
            args_file: _,
            gridder_args,
            observation_args,
            predict_args:
                PredictCliArgs {
                    image,
                    record,
                    output,
                },
        } = self;

        let mut config = gridder_args.parse()?;

        let (source, image) = match (image, record) {
            (Some(image_file), None) => {
                debug!("Reading image {}", image_file.display());
                let image: SkyImage = serde_json::from_reader(BufReader::new(
                    File::open(&image_file)?,
                ))?;
                (ImageSource::Image(image.clone()), image)
            }
            (None, Some(record_file)) => {
                debug!("Reading record {}", record_file.display());
                let record = Record::load(&record_file)?;
                let image = match record.get(IMAGE_FIELD_NAME) {
                    Some(RecordField::Image(image)) => image.clone(),
                    _ => {
                        return Err(AwGridderError::Record(format!(
                            "Record {} doesn't hold an image",
                            record_file.display()
                        )))
                    }
                };
                (ImageSource::Record(record), image)
            }
            (Some(_), Some(_)) => {
                return Err(AwGridderError::Args(
                    "Only one of --image and --record may be given".to_string(),
                ))
            }
            (None, None) => {
                return Err(AwGridderError::Args(
                    "An image (--image) or record (--record) to predict from is needed"
                        .to_string(),
                ))
            }
        };

        // The image, not the arguments, decides the image geometry.
        config.nx = image.nx();
        config.ny = image.ny();
        config.cell_x_arcsec = image.cell_x.to_degrees() * 3600.0;
        config.cell_y_arcsec = image.cell_y.to_degrees() * 3600.0;

        let (layout, obs) = observation_args.parse(&config, Some(image.phase_centre))?;

        let output = output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_VIS_FILENAME));
        check_output_is_json(&output)?;

        let mut printer = InfoPrinter::new("Predicting model visibilities".into());
        printer.push_line(
            format!(
                "Image: {}x{}, {} channel(s), {} polarisation(s)",
                image.nx(),
                image.ny(),
                image.num_chans(),
                image.num_pols()
            )
            .into(),
        );
        print_observation(&layout, &obs, &mut printer);
        print_config(&config, &mut printer);
        printer.push_line(format!("Writing model visibilities to {}", output.display()).into());
        printer.display();
        display_warnings();

        Ok(PredictParams {
            config,
            layout,
            obs,
            source,
            output,
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

struct PredictParams {
    config: GridderConfig,
    layout: ArrayLayout,
    obs: Observation,
    source: ImageSource,
    output: PathBuf,
}

impl PredictParams {
    fn run(self) -> Result<(), AwGridderError> {
        let PredictParams {
            config,
            layout,
            obs,
            source,
            output,
        } = self;

        let mut engine = make_engine(config)?;
        let image = match source {
            ImageSource::Image(image) => image,
            ImageSource::Record(record) => {
                let image = engine.from_record(&record)?.ok_or_else(|| {
                    AwGridderError::Record("The record doesn't hold an image".to_string())
                })?;
                info!("Restored the engine from its record");
                image
            }
        };

        // No sources; the data columns stay zero and only the model is
        // filled.
        let mut batches = simulate(&layout, &obs, &[])?;

        engine.initialize_to_vis(&image)?;
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
        .with_message("Degridding");
        for vis in batches.iter_mut() {
            engine.get(vis)?;
            progress.inc(1);
        }
        progress.abandon_with_message("Finished degridding");
        engine.finalize_to_vis()?;

        let model_views: Vec<_> = batches.iter().map(|vis| vis.model.view()).collect();
        let model = ndarray::concatenate(Axis(0), &model_views)
            .map_err(|e| AwGridderError::Generic(e.to_string()))?;
        let model_vis = ModelVis {
            freqs: obs.freqs,
            pols: obs.pols,
            antenna1: batches.iter().flat_map(|v| v.antenna1.iter().copied()).collect(),
            antenna2: batches.iter().flat_map(|v| v.antenna2.iter().copied()).collect(),
            time: batches.iter().flat_map(|v| v.time.iter().copied()).collect(),
            uvw: batches
                .iter()
                .flat_map(|v| v.uvw.iter().map(|uvw| [uvw.u, uvw.v, uvw.w]))
                .collect(),
            model,
        };
        info!(
            "Predicted {} rows; largest model amplitude {:.4}",
            model_vis.antenna1.len(),
            model_vis
                .model
                .iter()
                .map(|v| v.norm())
                .fold(0.0_f32, f32::max)
        );

        write_json(&output, &model_vis)?;
        info!("Wrote model visibilities to {}", output.display());
        Ok(())
    }
}

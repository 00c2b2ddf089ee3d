// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io::Write;

use approx::assert_abs_diff_eq;
use indoc::indoc;
use tempfile::{Builder, TempDir};

use super::*;
use crate::cli::common::ObservationArgs;

#[test]
fn test_parse_source() {
    let s = parse_source("10.0, -30.5,2").unwrap();
    assert_abs_diff_eq!(s.radec.ra, 10.0_f64.to_radians());
    assert_abs_diff_eq!(s.radec.dec, (-30.5_f64).to_radians());
    assert_abs_diff_eq!(s.flux_density, 2.0);

    assert!(parse_source("10.0,-30.5").is_err());
    assert!(parse_source("10.0,-30.5,1,1").is_err());
    assert!(parse_source("10.0,-95,1").is_err());
    assert!(parse_source("ten,-30,1").is_err());
}

#[test]
fn test_outputs_must_be_json() {
    assert!(check_output_is_json(Path::new("image.json")).is_ok());
    assert!(check_output_is_json(Path::new("image.JSON")).is_ok());
    assert!(check_output_is_json(Path::new("image.fits")).is_err());
    assert!(check_output_is_json(Path::new("image")).is_err());
}

#[test]
fn test_blank_image_channels() {
    let config = GridderConfig::default();
    let (_, obs) = ObservationArgs::default().parse(&config, None).unwrap();

    let mfs = blank_image(&config, &obs, vec![Polarisation::I], false);
    assert_eq!(mfs.data.dim(), (1, 1, config.ny, config.nx));
    let mean = obs.freqs.iter().sum::<f64>() / obs.freqs.len() as f64;
    assert_abs_diff_eq!(mfs.chan_freqs[0], mean);
    assert_abs_diff_eq!(mfs.chan_width, 1e6 * obs.freqs.len() as f64, epsilon = 1e-6);

    let cube = blank_image(
        &config,
        &obs,
        vec![Polarisation::XX, Polarisation::YY],
        true,
    );
    assert_eq!(cube.data.dim(), (obs.freqs.len(), 2, config.ny, config.nx));
    assert_eq!(cube.chan_freqs, obs.freqs);
    assert_abs_diff_eq!(cube.chan_width, 1e6, epsilon = 1e-6);
}

#[test]
fn test_arg_file_is_merged_under_cli_args() {
    let mut arg_file = Builder::new().suffix(".toml").tempfile().unwrap();
    arg_file
        .write_all(
            indoc! {r#"
            [gridder]
            nx = 32
            ny = 48
            grid_function = "boxcar"

            [observation]
            num_antennas = 6

            [image]
            cube = true
            sources = ["0.0,-27.0,3.0"]
            "#}
            .as_bytes(),
        )
        .unwrap();

    let cli = ImageArgs {
        args_file: Some(arg_file.path().to_path_buf()),
        gridder_args: GridderArgs {
            nx: Some(16),
            ..Default::default()
        },
        ..Default::default()
    };
    let merged = cli.merge().unwrap();
    assert!(merged.args_file.is_none());
    assert_eq!(merged.gridder_args.nx, Some(16));
    assert_eq!(merged.gridder_args.ny, Some(48));
    assert_eq!(merged.gridder_args.grid_function.as_deref(), Some("boxcar"));
    assert_eq!(merged.observation_args.num_antennas, Some(6));
    assert!(merged.image_args.cube);
    assert_eq!(
        merged.image_args.sources,
        Some(vec!["0.0,-27.0,3.0".to_string()])
    );
}

#[test]
fn test_arg_file_needs_known_extension() {
    let arg_file = Builder::new().suffix(".yaml").tempfile().unwrap();
    let cli = ImageArgs {
        args_file: Some(arg_file.path().to_path_buf()),
        ..Default::default()
    };
    assert!(matches!(cli.merge(), Err(AwGridderError::ArgFile(_))));
}

#[test]
fn test_bad_arg_file_contents() {
    let mut arg_file = Builder::new().suffix(".json").tempfile().unwrap();
    arg_file.write_all(b"{\"gridder\": {\"nx\": \"big\"}}").unwrap();
    let cli = ImageArgs {
        args_file: Some(arg_file.path().to_path_buf()),
        ..Default::default()
    };
    assert!(matches!(cli.merge(), Err(AwGridderError::ArgFile(_))));
}

#[test]
fn test_image_of_source_at_phase_centre() {
    let tmp_dir = TempDir::new().unwrap();
    let output = tmp_dir.path().join("image.json");
    let record = tmp_dir.path().join("record.json");

    let args = ImageArgs {
        args_file: None,
        gridder_args: GridderArgs {
            nx: Some(32),
            ny: Some(32),
            cell: Some(300.0),
            grid_function: Some("boxcar".to_string()),
            num_threads: Some(2),
            ..Default::default()
        },
        observation_args: ObservationArgs {
            num_antennas: Some(8),
            array_radius: Some(100.0),
            num_timesteps: Some(2),
            timesteps_per_batch: Some(1),
            num_channels: Some(2),
            ..Default::default()
        },
        image_args: ImageCliArgs {
            output: Some(output.clone()),
            record: Some(record.clone()),
            ..Default::default()
        },
    };
    args.run(false).unwrap();

    let image: SkyImage =
        serde_json::from_reader(std::io::BufReader::new(File::open(&output).unwrap())).unwrap();
    assert_eq!(image.data.dim(), (1, 1, 32, 32));
    let centre = image.data[(0, 0, 16, 16)];
    assert_abs_diff_eq!(centre.re, 1.0, epsilon = 1e-3);
    assert!(image.data.iter().all(|v| v.re <= centre.re + 1e-4));

    let record = crate::engine::Record::load(&record).unwrap();
    assert!(record.has_image());
}

#[test]
fn test_dry_run_writes_nothing() {
    let tmp_dir = TempDir::new().unwrap();
    let output = tmp_dir.path().join("image.json");
    let args = ImageArgs {
        image_args: ImageCliArgs {
            output: Some(output.clone()),
            ..Default::default()
        },
        ..Default::default()
    };
    args.run(true).unwrap();
    assert!(!output.exists());
}

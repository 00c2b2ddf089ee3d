// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod arg_files;
mod image;
mod no_stderr;
mod predict;

use std::{fs::File, io::BufReader, path::Path, process::Output, str::from_utf8};

use assert_cmd::{output::OutputError, Command};

use awgridder::engine::SkyImage;

fn awgridder() -> Command {
    Command::cargo_bin("awgridder").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

/// Arguments for a small, quick observation.
const SMALL_OBS_ARGS: &[&str] = &[
    "--num-antennas", "8",
    "--array-radius", "100",
    "--num-timesteps", "2",
    "--timesteps-per-batch", "1",
    "--num-channels", "2",
];

/// Arguments for a small image that a small observation fits in.
const SMALL_IMAGE_ARGS: &[&str] = &[
    "--nx", "32",
    "--ny", "32",
    "--cell", "300",
    "--grid-function", "boxcar",
];

fn read_image(path: &Path) -> SkyImage {
    serde_json::from_reader(BufReader::new(File::open(path).unwrap())).unwrap()
}

/// Image a source at the phase centre into `output`.
fn make_image(output: &Path, extra_args: &[&str]) -> Output {
    awgridder()
        .arg("image")
        .args(SMALL_OBS_ARGS)
        .args(SMALL_IMAGE_ARGS)
        .args(["--no-progress-bars", "--output"])
        .arg(output)
        .args(extra_args)
        .ok()
        .unwrap()
}

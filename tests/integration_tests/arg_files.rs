// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests of argument files.

use std::fs;

use indoc::indoc;
use tempfile::TempDir;

use crate::{awgridder, get_cmd_output, read_image};

#[test]
fn test_image_from_toml_arg_file() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let output = tmp_dir.path().join("image.json");
    let arg_file = tmp_dir.path().join("args.toml");
    fs::write(
        &arg_file,
        format!(
            indoc! {r#"
            [gridder]
            nx = 24
            ny = 24
            cell = 300.0
            grid_function = "boxcar"

            [observation]
            num_antennas = 6
            array_radius = 80.0
            num_timesteps = 1
            num_channels = 1

            [image]
            output = "{}"
            "#},
            output.display()
        ),
    )
    .unwrap();

    // The CLI overrides the file.
    awgridder()
        .args(["image", "--no-progress-bars", "--nx", "16"])
        .arg(&arg_file)
        .ok()
        .unwrap();
    let image = read_image(&output);
    assert_eq!(image.data.dim(), (1, 1, 24, 16));
}

#[test]
fn test_save_toml_reproduces_args() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let saved = tmp_dir.path().join("saved.toml");

    awgridder()
        .args(["verify-config", "--nx", "40", "--use-conj-pols", "--save-toml"])
        .arg(&saved)
        .ok()
        .unwrap();
    let contents = fs::read_to_string(&saved).unwrap();
    assert!(contents.contains("nx = 40"), "{contents}");
    assert!(contents.contains("use_conj_pols = true"), "{contents}");

    // The saved file is itself a valid argument file.
    let cmd = awgridder().arg("verify-config").arg(&saved).ok();
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("nx = 40"), "{stdout}");
}

#[test]
fn test_unknown_arg_file_extension() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let arg_file = tmp_dir.path().join("args.yaml");
    fs::write(&arg_file, "nx: 4").unwrap();

    let cmd = awgridder().arg("verify-config").arg(&arg_file).ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("recognised file extension"), "{stderr}");
}

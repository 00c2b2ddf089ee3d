// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests to ensure there is no stderr output for successful commands.

use tempfile::TempDir;

use crate::{awgridder, get_cmd_output, SMALL_IMAGE_ARGS, SMALL_OBS_ARGS};

#[test]
fn test_image_no_stderr() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let output = tmp_dir.path().join("image.json");

    let cmd = awgridder()
        .arg("image")
        .args(SMALL_OBS_ARGS)
        .args(SMALL_IMAGE_ARGS)
        .arg("--output")
        .arg(&output)
        .ok();
    assert!(
        cmd.is_ok(),
        "image failed on simple test data: {}",
        cmd.err().unwrap()
    );
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
}

#[test]
fn test_verify_config_no_stderr() {
    let cmd = awgridder()
        .args(["verify-config", "--nx", "64", "--ny", "64"])
        .ok();
    assert!(
        cmd.is_ok(),
        "verify-config failed: {}",
        cmd.err().unwrap()
    );
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
    assert!(stdout.contains("nx = 64"), "{stdout}");
}

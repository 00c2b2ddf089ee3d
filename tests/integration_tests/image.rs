// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::s;
use tempfile::TempDir;

use crate::{awgridder, get_cmd_output, make_image, read_image, SMALL_IMAGE_ARGS, SMALL_OBS_ARGS};

#[test]
fn test_image_source_at_phase_centre() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let output = tmp_dir.path().join("image.json");
    make_image(&output, &[]);

    let image = read_image(&output);
    assert_eq!(image.data.dim(), (1, 1, 32, 32));
    let centre = image.data[(0, 0, 16, 16)];
    assert_abs_diff_eq!(centre.re, 1.0, epsilon = 1e-3);
    assert!(image.data.iter().all(|v| v.re <= centre.re + 1e-4));
}

#[test]
fn test_image_cube_with_offset_source() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let output = tmp_dir.path().join("cube.json");
    // 3 pixels east of the phase centre is 3 pixels towards lower x.
    let ra = 3.0 * 300.0 / 3600.0 / (-27.0_f64).to_radians().cos();
    let source = format!("{ra},-27,2");
    make_image(
        &output,
        &["--cube", "--image-pols", "XX", "YY", "--sources", &source],
    );

    let image = read_image(&output);
    assert_eq!(image.data.dim(), (2, 2, 32, 32));
    for i_chan in 0..2 {
        for i_pol in 0..2 {
            let (peak_index, _) = image
                .data
                .slice(s![i_chan, i_pol, .., ..])
                .indexed_iter()
                .max_by(|a, b| a.1.re.total_cmp(&b.1.re))
                .unwrap();
            assert_eq!(peak_index, (16usize, 13usize));
        }
    }
}

#[test]
fn test_image_writes_record() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let output = tmp_dir.path().join("image.json");
    let record = tmp_dir.path().join("record.json");
    make_image(&output, &["--record", &format!("{}", record.display())]);

    let record = awgridder::engine::Record::load(&record).unwrap();
    assert!(record.has_image());
    assert_eq!(
        record.names().take(2).collect::<Vec<_>>(),
        vec!["name", "cache_size"]
    );
}

#[test]
fn test_image_rejects_non_json_output() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let output = tmp_dir.path().join("image.fits");

    let cmd = awgridder()
        .arg("image")
        .args(SMALL_OBS_ARGS)
        .args(SMALL_IMAGE_ARGS)
        .args(["--no-progress-bars", "--output"])
        .arg(&output)
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains(".json"), "{stderr}");
    assert!(!output.exists());
}

#[test]
fn test_image_dry_run() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let output = tmp_dir.path().join("image.json");

    let cmd = awgridder()
        .arg("image")
        .args(SMALL_OBS_ARGS)
        .args(["--dry-run", "--output"])
        .arg(&output)
        .ok();
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Dry run"), "{stdout}");
    assert!(!output.exists());
}

#[test]
fn test_bad_grid_function() {
    let cmd = awgridder()
        .args(["image", "--grid-function", "gaussian", "--dry-run"])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("gaussian"), "{stderr}");
}

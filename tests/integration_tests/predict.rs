// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{fs::File, io::BufReader, path::Path};

use approx::assert_abs_diff_eq;
use serde_json::Value;
use tempfile::TempDir;

use crate::{awgridder, get_cmd_output, make_image, SMALL_OBS_ARGS};

fn predict(input_flag: &str, input: &Path, output: &Path) {
    awgridder()
        .arg("predict")
        .args(SMALL_OBS_ARGS)
        .args(["--grid-function", "boxcar", "--no-progress-bars", input_flag])
        .arg(input)
        .arg("--output")
        .arg(output)
        .ok()
        .unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_reader(BufReader::new(File::open(path).unwrap())).unwrap()
}

#[test]
fn test_predict_from_image() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let image = tmp_dir.path().join("image.json");
    let model = tmp_dir.path().join("model.json");
    make_image(&image, &[]);
    predict("--image", &image, &model);

    let model = read_json(&model);
    // 8 antennas make 28 baselines; 2 timesteps.
    assert_eq!(model["antenna1"].as_array().unwrap().len(), 56);
    assert_eq!(model["uvw"].as_array().unwrap().len(), 56);
    assert_eq!(model["pols"], serde_json::json!(["XX", "YY"]));
    assert_eq!(model["freqs"].as_array().unwrap().len(), 2);
    assert_eq!(model["model"]["dim"], serde_json::json!([56, 2, 2]));
}

#[test]
fn test_predict_from_record_matches_image() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let image = tmp_dir.path().join("image.json");
    let record = tmp_dir.path().join("record.json");
    let from_image = tmp_dir.path().join("from_image.json");
    let from_record = tmp_dir.path().join("from_record.json");
    make_image(&image, &["--record", &format!("{}", record.display())]);
    predict("--image", &image, &from_image);
    predict("--record", &record, &from_record);

    let a = read_json(&from_image)["model"]["data"].clone();
    let b = read_json(&from_record)["model"]["data"].clone();
    let (a, b) = (a.as_array().unwrap(), b.as_array().unwrap());
    assert_eq!(a.len(), b.len());
    for (a, b) in a.iter().zip(b) {
        let (a, b) = (a.as_array().unwrap(), b.as_array().unwrap());
        for (x, y) in a.iter().zip(b) {
            assert_abs_diff_eq!(x.as_f64().unwrap(), y.as_f64().unwrap(), epsilon = 1e-6);
        }
    }
}

#[test]
fn test_predict_without_input_fails() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let model = tmp_dir.path().join("model.json");
    let cmd = awgridder()
        .args(["predict", "--no-progress-bars", "--output"])
        .arg(&model)
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("--image"), "{stderr}");
    assert!(!model.exists());
}

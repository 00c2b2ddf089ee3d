// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use marlu::c32;

use super::*;
use crate::coord::rotate_uvw;

fn buffer(num_rows: usize) -> VisBuffer {
    VisBuffer::new(
        4,
        num_rows,
        vec![150e6, 151e6],
        vec![Polarisation::XX, Polarisation::YY],
        RADec::from_degrees(0.0, -27.0),
    )
}

#[test]
fn test_new_buffer_is_valid() {
    let vis = buffer(6);
    assert_eq!(vis.num_rows(), 6);
    assert_eq!(vis.num_chans(), 2);
    assert_eq!(vis.num_pols(), 2);
    assert!(vis.validate().is_ok());
}

#[test]
fn test_validate_catches_bad_shapes() {
    let mut vis = buffer(3);
    vis.time.pop();
    assert!(matches!(
        vis.validate(),
        Err(VisError::RowMismatch { what: "time", .. })
    ));

    let mut vis = buffer(3);
    vis.data = Array3::zeros((3, 1, 2));
    assert!(matches!(
        vis.validate(),
        Err(VisError::ShapeMismatch { what: "data", .. })
    ));

    let mut vis = buffer(3);
    vis.antenna2[1] = 4;
    assert!(matches!(
        vis.validate(),
        Err(VisError::BadAntenna { row: 1, ant: 4, .. })
    ));
}

#[test]
fn test_time_range() {
    let mut vis = buffer(3);
    assert_eq!(buffer(0).time_range(), None);
    vis.time = vec![5.0, 2.0, 9.0];
    assert_eq!(vis.time_range(), Some((2.0, 9.0)));
}

#[test]
fn test_max_abs_data_ignores_flags() {
    let mut vis = buffer(2);
    vis.data[(0, 0, 0)] = c32::new(3.0, 4.0);
    vis.data[(1, 1, 1)] = c32::new(10.0, 0.0);
    vis.data[(0, 1, 1)] = c32::new(20.0, 0.0);
    vis.flags[(0, 1, 1)] = true;
    vis.flag_row[1] = true;
    assert_abs_diff_eq!(vis.max_abs_data(), 5.0);
}

#[test]
fn test_channel_map_single_channel_image_takes_everything() {
    let map = channel_map(&[100e6, 200e6], &[150e6], 1e3);
    assert_eq!(map, vec![Some(0), Some(0)]);
}

#[test]
fn test_channel_map_nearest_within_half_width() {
    let map = channel_map(&[99.9e6, 100.6e6, 101.0e6, 105e6], &[100e6, 101e6], 1e6);
    assert_eq!(map, vec![Some(0), Some(1), Some(1), None]);
}

#[test]
fn test_polarisation_maps_stokes_i() {
    let (pol_map, conj_map) = polarisation_maps(
        &[
            Polarisation::XX,
            Polarisation::XY,
            Polarisation::YX,
            Polarisation::YY,
        ],
        &[Polarisation::I],
        true,
    );
    assert_eq!(pol_map, vec![Some(0), None, None, Some(0)]);
    assert_eq!(conj_map, vec![None, None, None, None]);
}

#[test]
fn test_polarisation_maps_conjugates() {
    let image_pols = [
        Polarisation::XX,
        Polarisation::XY,
        Polarisation::YX,
        Polarisation::YY,
    ];
    let (pol_map, conj_map) = polarisation_maps(&[Polarisation::XY], &image_pols, true);
    assert_eq!(pol_map, vec![Some(1)]);
    assert_eq!(conj_map, vec![Some(2)]);

    let (_, conj_map) = polarisation_maps(&[Polarisation::XY], &image_pols, false);
    assert_eq!(conj_map, vec![None]);
}

#[test]
fn test_store_negates_u_and_v() {
    let mut vis = buffer(1);
    vis.uvw[0] = UVW {
        u: 10.0,
        v: -20.0,
        w: 5.0,
    };
    let store = VisBufferStore::new(&vis, vis.phase_centre);
    assert_abs_diff_eq!(store.uvw[0].u, -10.0);
    assert_abs_diff_eq!(store.uvw[0].v, 20.0);
    assert_abs_diff_eq!(store.uvw[0].w, 5.0);
    assert_abs_diff_eq!(store.dphase[0], 0.0);
}

#[test]
fn test_store_phase_shift() {
    let mut vis = buffer(1);
    vis.uvw[0] = UVW {
        u: 100.0,
        v: 50.0,
        w: 10.0,
    };
    let new_centre = RADec::from_degrees(1.0, -26.5);
    let store = VisBufferStore::new(&vis, new_centre);
    let lmn = new_centre.to_lmn(vis.phase_centre);
    assert_abs_diff_eq!(
        store.dphase[0],
        100.0 * lmn.l + 50.0 * lmn.m + 10.0 * (lmn.n - 1.0),
        epsilon = 1e-9
    );
    let rotated = rotate_uvw(vis.uvw[0], vis.phase_centre, new_centre);
    assert_abs_diff_eq!(store.uvw[0].u, -rotated.u, epsilon = 1e-9);
    assert_abs_diff_eq!(store.uvw[0].w, rotated.w, epsilon = 1e-9);
}

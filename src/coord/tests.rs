// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;

#[test]
fn test_radec_from_lm_inverts_to_lmn() {
    let phase_centre = RADec::from_degrees(60.0, -27.0);
    let radec = RADec::from_degrees(62.0, -27.5);
    let lmn = radec.to_lmn(phase_centre);
    let result = radec_from_lm(lmn.l, lmn.m, phase_centre);
    assert_abs_diff_eq!(result.ra, radec.ra, epsilon = 1e-12);
    assert_abs_diff_eq!(result.dec, radec.dec, epsilon = 1e-12);
}

#[test]
fn test_radec_from_lm_at_origin_is_phase_centre() {
    let phase_centre = RADec::from_degrees(200.0, 10.0);
    let result = radec_from_lm(0.0, 0.0, phase_centre);
    assert_abs_diff_eq!(result.ra, phase_centre.ra, epsilon = 1e-12);
    assert_abs_diff_eq!(result.dec, phase_centre.dec, epsilon = 1e-12);
}

#[test]
fn test_lmn_from_lm_is_on_unit_sphere() {
    let lmn = lmn_from_lm(0.3, -0.4);
    assert_abs_diff_eq!(lmn.n, (0.75_f64).sqrt(), epsilon = 1e-15);

    // Beyond the horizon n is clamped rather than NaN.
    let lmn = lmn_from_lm(0.9, 0.9);
    assert_abs_diff_eq!(lmn.n, 0.0);
}

#[test]
fn test_uvw_to_xyz_inverts_from_xyz() {
    let xyz = XyzGeodetic {
        x: 289.5692922664971 - 750.5194624923599,
        y: -585.6749877929688 + 565.4390258789063,
        z: -259.3106530519151 - 665.2348852011041,
    };
    let pointing = HADec::from_radians(6.0163, -0.453121);
    let uvw = UVW::from_xyz(xyz, pointing);
    let back = uvw_to_xyz(uvw, pointing);
    assert_abs_diff_eq!(back.x, xyz.x, epsilon = 1e-9);
    assert_abs_diff_eq!(back.y, xyz.y, epsilon = 1e-9);
    assert_abs_diff_eq!(back.z, xyz.z, epsilon = 1e-9);
}

#[test]
fn test_rotate_to_same_centre_is_identity() {
    let uvw = UVW {
        u: 100.0,
        v: -50.0,
        w: 3.0,
    };
    let pc = RADec::from_degrees(30.0, -45.0);
    assert_abs_diff_eq!(rotate_uvw(uvw, pc, pc), uvw, epsilon = 1e-10);
}

#[test]
fn test_rotate_matches_direct_projection() {
    let xyz = XyzGeodetic {
        x: 120.0,
        y: -340.0,
        z: 55.0,
    };
    let lst = 0.7;
    let old = RADec::from_degrees(40.0, -26.0);
    let new = RADec::from_degrees(42.5, -24.0);
    let uvw_old = UVW::from_xyz(xyz, old.to_hadec(lst));
    let expected = UVW::from_xyz(xyz, new.to_hadec(lst));
    assert_abs_diff_eq!(rotate_uvw(uvw_old, old, new), expected, epsilon = 1e-9);
}

#[test]
fn test_path_difference() {
    let uvw = UVW {
        u: 10.0,
        v: 20.0,
        w: 30.0,
    };
    assert_abs_diff_eq!(path_difference(uvw, lmn_from_lm(0.0, 0.0)), 0.0);

    let lmn = lmn_from_lm(0.1, -0.2);
    let expected = 10.0 * 0.1 - 20.0 * 0.2 + 30.0 * (lmn.n - 1.0);
    assert_abs_diff_eq!(path_difference(uvw, lmn), expected, epsilon = 1e-12);
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Coordinate helpers that `marlu` doesn't provide: phase-centre rotation of
//! UVWs, the inverse of [`RADec::to_lmn`] and tangent-plane path differences.

#[cfg(test)]
mod tests;

use marlu::{HADec, RADec, XyzGeodetic, LMN, UVW};

/// The inverse of [`UVW::from_xyz`]. The rotation matrix is orthonormal, so
/// its transpose is used.
pub fn uvw_to_xyz(uvw: UVW, phase_centre: HADec) -> XyzGeodetic {
    let (s_ha, c_ha) = phase_centre.ha.sin_cos();
    let (s_dec, c_dec) = phase_centre.dec.sin_cos();
    XyzGeodetic {
        x: s_ha * uvw.u - s_dec * c_ha * uvw.v + c_dec * c_ha * uvw.w,
        y: c_ha * uvw.u + s_dec * s_ha * uvw.v - c_dec * s_ha * uvw.w,
        z: c_dec * uvw.v + s_dec * uvw.w,
    }
}

/// Rotate UVWs from one phase centre to another. The local sidereal time
/// cancels out of the rotation, so none is needed.
pub fn rotate_uvw(uvw: UVW, from: RADec, to: RADec) -> UVW {
    let xyz = uvw_to_xyz(uvw, from.to_hadec(0.0));
    UVW::from_xyz(xyz, to.to_hadec(0.0))
}

/// Make a direction from l and m, deriving n so that the direction lies on
/// the unit sphere.
pub fn lmn_from_lm(l: f64, m: f64) -> LMN {
    LMN {
        l,
        m,
        n: (1.0 - l * l - m * m).max(0.0).sqrt(),
    }
}

/// Get the coordinates of the direction (l,m) relative to a phase centre.
pub fn radec_from_lm(l: f64, m: f64, phase_centre: RADec) -> RADec {
    let n = lmn_from_lm(l, m).n;
    let (pc_s_dec, pc_c_dec) = phase_centre.dec.sin_cos();
    let dec = (m * pc_c_dec + n * pc_s_dec).clamp(-1.0, 1.0).asin();
    let ra = phase_centre.ra + l.atan2(n * pc_c_dec - m * pc_s_dec);
    RADec::from_radians(ra, dec)
}

/// The path-length difference (in units of the UVW) of a baseline towards a
/// direction, relative to the phase centre: `u*l + v*m + w*(n-1)`.
pub fn path_difference(uvw: UVW, lmn: LMN) -> f64 {
    uvw.u * lmn.l + uvw.v * lmn.m + uvw.w * (lmn.n - 1.0)
}

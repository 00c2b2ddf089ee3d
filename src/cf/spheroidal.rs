// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The prolate spheroidal wave function used to taper convolution functions.

use ndarray::prelude::*;

/// Evaluate the prolate spheroidal function (m = 6, α = 1) at `nu` (0 at the
/// centre, 1 at the edge of the taper). Values outside of \[-1, 1\] are 0.
///
/// This is the rational approximation of F. R. Schwab, "Optimal gridding of
/// visibility data in radio interferometry" (1984).
pub(crate) fn grdsf(nu: f64) -> f64 {
    #[rustfmt::skip]
    const P: [[f64; 5]; 2] = [
        [8.203343e-2, -3.644705e-1, 6.278660e-1, -5.335581e-1, 2.312756e-1],
        [4.028559e-3, -3.697768e-2, 1.021332e-1, -1.201436e-1, 6.412774e-2],
    ];
    #[rustfmt::skip]
    const Q: [[f64; 3]; 2] = [
        [1.0000000e0, 8.212018e-1, 2.078043e-1],
        [1.0000000e0, 9.599102e-1, 2.918724e-1],
    ];

    let nu = nu.abs();
    let (part, end) = if nu < 0.75 {
        (0, 0.75)
    } else if nu <= 1.0 {
        (1, 1.0)
    } else {
        return 0.0;
    };

    let nu_squared = nu * nu;
    let del = nu_squared - end * end;
    let top = P[part]
        .iter()
        .rev()
        .fold(0.0, |acc, &coeff| acc * del + coeff);
    let bottom = Q[part]
        .iter()
        .rev()
        .fold(0.0, |acc, &coeff| acc * del + coeff);

    if bottom == 0.0 {
        0.0
    } else {
        (1.0 - nu_squared) * (top / bottom)
    }
}

/// The spheroidal taper normalised to 1 at the centre.
pub(crate) fn taper(nu: f64) -> f64 {
    grdsf(nu) / grdsf(0.0)
}

/// The 2-D spheroidal taper across an image of (ny, nx) pixels, centred on
/// pixel (ny/2, nx/2). The taper falls to 0 at the edges of the image.
pub(crate) fn spheroidal_image(ny: usize, nx: usize) -> Array2<f32> {
    let axis = |n: usize| -> Vec<f64> {
        (0..n)
            .map(|i| taper(2.0 * (i as f64 - (n / 2) as f64) / n as f64))
            .collect()
    };
    let (y_taper, x_taper) = (axis(ny), axis(nx));
    Array2::from_shape_fn((ny, nx), |(y, x)| (y_taper[y] * x_taper[x]) as f32)
}

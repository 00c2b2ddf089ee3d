// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The per-batch view of a [`VisBuffer`] used during resampling.

use log::trace;
use marlu::{RADec, UVW};

use super::VisBuffer;
use crate::coord::{path_difference, rotate_uvw};

/// Phase centres closer than this are treated as the same \[radians\].
const SAME_DIRECTION_TOLERANCE: f64 = 1e-12;

/// Visibilities with their UVWs rotated to the image's phase centre. The u and
/// v coordinates are negated (w is not) so that the FFT produces an image with
/// right ascension increasing to the left.
pub(crate) struct VisBufferStore<'a> {
    pub(crate) vis: &'a VisBuffer,

    /// Rotated and sign-flipped UVWs \[metres\].
    pub(crate) uvw: Vec<UVW>,

    /// Per-row path-length differences introduced by the phase-centre shift
    /// \[metres\]. Multiply by 2π/λ to get a phase.
    pub(crate) dphase: Vec<f64>,
}

impl<'a> VisBufferStore<'a> {
    pub(crate) fn new(vis: &'a VisBuffer, image_phase_centre: RADec) -> Self {
        let shift = vis.phase_centre.separation(image_phase_centre) > SAME_DIRECTION_TOLERANCE;
        let lmn = image_phase_centre.to_lmn(vis.phase_centre);
        if shift {
            trace!(
                "Rotating UVWs from {} to {}",
                vis.phase_centre,
                image_phase_centre
            );
        }

        let (uvw, dphase) = vis
            .uvw
            .iter()
            .map(|&uvw| {
                let (rotated, dphase) = if shift {
                    (
                        rotate_uvw(uvw, vis.phase_centre, image_phase_centre),
                        path_difference(uvw, lmn),
                    )
                } else {
                    (uvw, 0.0)
                };
                (
                    UVW {
                        u: -rotated.u,
                        v: -rotated.v,
                        w: rotated.w,
                    },
                    dphase,
                )
            })
            .unzip();

        Self { vis, uvw, dphase }
    }
}

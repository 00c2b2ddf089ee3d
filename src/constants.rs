// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision. `awgridder` should do as many
calculations as possible in double precision before converting to a lower
precision, if it is ever required.
 */

pub use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// The default grid padding factor.
pub const DEFAULT_PADDING: f64 = 1.2;

/// The default largest |w| a baseline may have before it is excluded from
/// gridding \[metres\].
pub const DEFAULT_W_MAX: f64 = 10_000.0;

/// The default number of w-planes used by W-projection.
pub const DEFAULT_NUM_W_PLANES: usize = 16;

/// The default half-width of convolution functions \[pixels\].
pub const DEFAULT_SUPPORT: usize = 3;

/// The default oversampling factor of convolution functions.
pub const DEFAULT_OVERSAMPLE: usize = 8;

/// The default number of gridding passes between element-beam corrections.
pub const DEFAULT_STEP_APPLY_ELEMENT: usize = 1;

/// Pixels with an average primary beam lower than this fraction of the peak
/// are blanked.
pub const DEFAULT_PB_CUT: f64 = 1e-2;

/// The default floor on the average primary beam.
pub const DEFAULT_MIN_PB: f64 = 1e-3;

/// The default number of times unfinished baseline ranges are re-attempted
/// before a pass gives up.
pub const DEFAULT_MAX_RETRY_PASSES: usize = 16;

/// A batch is the last chunk of an observation if its time span is smaller
/// than this fraction of the first batch's time span.
pub const LAST_CHUNK_FRACTION: f64 = 0.95;

/// Spheroidal values below this are considered outside of the gridding
/// correction's useful area.
pub const SPHEROIDAL_CUT: f32 = 1e-2;

/// The rotation rate of the Earth relative to the stars \[radians/second\].
pub const SIDEREAL_RATE: f64 = TAU / 86_164.0905;

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with visibility buffers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisError {
    #[error("The visibility buffer has {expected} rows, but its {what} has {got}")]
    RowMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("The visibility buffer's {what} has shape {got:?}, but {expected:?} was expected")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },

    #[error("Row {row} refers to antenna {ant}, but there are only {num_antennas} antennas")]
    BadAntenna {
        row: usize,
        ant: usize,
        num_antennas: usize,
    },

    #[error("The visibility buffer has no channels")]
    NoChannels,
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from convolution-function providers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CfError {
    #[error("The convolution-function provider was used before it was prepared with a grid geometry")]
    NotPrepared,

    #[error("Couldn't allocate {bytes} bytes for a convolution function")]
    Allocation { bytes: usize },

    #[error("Kernel {plane} has shape {got:?}, but a support of {support} with oversampling {oversample} needs ({size}, {size})")]
    BadKernelShape {
        plane: usize,
        got: (usize, usize),
        support: usize,
        oversample: usize,
        size: usize,
    },

    #[error("An oversampling factor of 0 is invalid")]
    ZeroOversample,

    #[error("W-projection needs at least one w-plane")]
    NoWPlanes,

    #[error("Couldn't compute the A-term at time {time}: {reason}")]
    ATerm { time: f64, reason: String },

    #[error("The element-beam correction received a grid of shape {got:?}, but {expected:?} was expected")]
    ElementBeamShape {
        got: (usize, usize, usize, usize),
        expected: (usize, usize, usize, usize),
    },

    #[error("The {0} lock was poisoned by a panicking worker")]
    Poisoned(&'static str),
}

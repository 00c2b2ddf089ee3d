// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from processing baseline ranges.

use thiserror::Error;

use crate::cf::CfError;

/// An error from gridding or degridding one baseline range.
#[derive(Error, Debug)]
pub enum RangeError {
    #[error("Couldn't allocate {bytes} bytes while resampling baseline {ant1}-{ant2}")]
    Allocation {
        ant1: usize,
        ant2: usize,
        bytes: usize,
    },

    #[error(transparent)]
    ConvolutionFunction(#[from] CfError),
}

impl RangeError {
    /// Can the range be attempted again? Only running out of memory is
    /// considered transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RangeError::Allocation { .. }
                | RangeError::ConvolutionFunction(CfError::Allocation { .. })
        )
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("{pending} baseline ranges were still unfinished after {passes} passes; giving up")]
    RetryBudgetExhausted { pending: usize, passes: usize },

    #[error(transparent)]
    Range(#[from] RangeError),
}

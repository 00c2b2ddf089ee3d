// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from simulating visibilities.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimulateError {
    #[error("At least 2 antennas are needed to form baselines, but {0} were given")]
    TooFewAntennas(usize),

    #[error("The array radius must be positive, but {0} metres was given")]
    BadRadius(f64),

    #[error("The number of timesteps cannot be 0")]
    NoTimesteps,

    #[error("The number of timesteps per batch cannot be 0")]
    NoTimestepsPerBatch,

    #[error("The time resolution must be positive, but {0} seconds was given")]
    BadTimeResolution(f64),

    #[error("No frequencies were given")]
    NoFrequencies,

    #[error("Frequency {0} Hz isn't positive")]
    BadFrequency(f64),

    #[error("No polarisations were given")]
    NoPolarisations,
}

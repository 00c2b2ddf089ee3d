// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error-handling code for the command line.
//!
//! Library errors are converted into the variants here, which add a hint about
//! what the user can do about them.

use thiserror::Error;

use crate::{
    cf::CfError,
    engine::{EngineError, RecordError},
    scheduler::SchedulerError,
    simulate::SimulateError,
};

/// The *only* publicly visible error from `awgridder`. Each error message
/// should include suggestions on how to fix the problem.
#[derive(Error, Debug)]
pub enum AwGridderError {
    /// An error related to command-line arguments.
    #[error("{0}\n\nSee `awgridder <subcommand> --help` for the available arguments.")]
    Args(String),

    /// An error related to argument files.
    #[error("{0}\n\nArgument files must be TOML or JSON, with a .toml or .json extension.")]
    ArgFile(String),

    /// An error related to simulating visibilities.
    #[error("{0}")]
    Simulate(String),

    /// An error from a convolution-function provider.
    #[error("{0}\n\nCheck the support, oversampling and number of w-planes.")]
    ConvolutionFunction(String),

    /// An error from the gridding engine.
    #[error("{0}")]
    Engine(String),

    /// Gridding gave up after running out of resources too many times.
    #[error("{0}\n\nTry using fewer threads (--num-threads) or fewer timesteps per batch.")]
    Resources(String),

    /// An error related to persisted engine records.
    #[error("{0}\n\nRecords are written by `awgridder image --record`.")]
    Record(String),

    /// A generic error that can't be clarified further with documentation, e.g.
    /// IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

impl From<SimulateError> for AwGridderError {
    fn from(e: SimulateError) -> Self {
        Self::Simulate(e.to_string())
    }
}

impl From<CfError> for AwGridderError {
    fn from(e: CfError) -> Self {
        let s = e.to_string();
        match e {
            CfError::Allocation { .. } => Self::Resources(s),
            CfError::NotPrepared
            | CfError::BadKernelShape { .. }
            | CfError::ZeroOversample
            | CfError::NoWPlanes
            | CfError::ATerm { .. }
            | CfError::ElementBeamShape { .. }
            | CfError::Poisoned(_) => Self::ConvolutionFunction(s),
        }
    }
}

impl From<SchedulerError> for AwGridderError {
    fn from(e: SchedulerError) -> Self {
        let s = e.to_string();
        match e {
            SchedulerError::RetryBudgetExhausted { .. } => Self::Resources(s),
            SchedulerError::Range(e) if e.is_retryable() => Self::Resources(e.to_string()),
            SchedulerError::Range(_) => Self::Engine(s),
        }
    }
}

impl From<EngineError> for AwGridderError {
    fn from(e: EngineError) -> Self {
        let s = e.to_string();
        match e {
            EngineError::ConvolutionFunction(e) => Self::from(e),
            EngineError::Scheduler(e) => Self::from(e),
            EngineError::TiledGridding
            | EngineError::BadPadding(_)
            | EngineError::NoThreads
            | EngineError::BadCellSize { .. } => Self::Args(s),
            EngineError::WrongState { .. }
            | EngineError::ImageShape { .. }
            | EngineError::NoImageChannels
            | EngineError::NoImagePolarisations
            | EngineError::ThreadPool(_)
            | EngineError::Vis(_) => Self::Engine(s),
        }
    }
}

impl From<RecordError> for AwGridderError {
    fn from(e: RecordError) -> Self {
        let s = e.to_string();
        match e {
            RecordError::IO(_) => Self::Generic(s),
            _ => Self::Record(s),
        }
    }
}

impl From<std::io::Error> for AwGridderError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<serde_json::Error> for AwGridderError {
    fn from(e: serde_json::Error) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<toml::ser::Error> for AwGridderError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Generic(e.to_string())
    }
}

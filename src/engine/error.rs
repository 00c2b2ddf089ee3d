// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from the gridding engine.

use thiserror::Error;

use super::EngineState;
use crate::{cf::CfError, scheduler::SchedulerError, vis::VisError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Can't {operation} while the engine is {state}")]
    WrongState {
        operation: &'static str,
        state: EngineState,
    },

    #[error("Tiled (on-disk) gridding is not supported")]
    TiledGridding,

    #[error("The image has shape {got:?} (channels, polarisations, y, x), but the engine was configured for {expected:?}")]
    ImageShape {
        got: (usize, usize, usize, usize),
        expected: (usize, usize, usize, usize),
    },

    #[error("The image has no channels")]
    NoImageChannels,

    #[error("The image has no polarisations")]
    NoImagePolarisations,

    #[error("The image's cell sizes must be positive; got ({cell_x}, {cell_y}) radians")]
    BadCellSize { cell_x: f64, cell_y: f64 },

    #[error("The padding factor must be at least 1; got {0}")]
    BadPadding(f64),

    #[error("The number of threads must be at least 1")]
    NoThreads,

    #[error("Couldn't build a thread pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Vis(#[from] VisError),

    #[error(transparent)]
    ConvolutionFunction(#[from] CfError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Errors from restoring an engine from a [`super::Record`]. These are never
/// fatal to the engine; it keeps its previous configuration.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("A record needs at least {expected} fields, but this one has {got}")]
    TooFewFields { expected: usize, got: usize },

    #[error("Record field {index} should be '{expected}', but it is '{got}'")]
    UnexpectedField {
        index: usize,
        expected: &'static str,
        got: String,
    },

    #[error("Record field '{field}' should hold {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Record field '{field}' has an invalid value: {reason}")]
    BadValue { field: &'static str, reason: String },

    #[error("Couldn't parse the record: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! W-projection and A-projection visibility gridding and degridding for radio
//! interferometric imaging.
//!
//! The centre of this crate is the [`GriddingEngine`], which scatters
//! visibilities onto a padded uv grid with baseline-dependent convolution
//! functions (`toSky`) and gathers model visibilities back out of a grid made
//! from an image (`toVis`).

pub mod cf;
pub mod cli;
pub mod constants;
pub mod coord;
pub mod engine;
pub mod grid;
pub(crate) mod math;
pub mod resampler;
pub mod scheduler;
pub mod simulate;
pub mod vis;

use crossbeam_utils::atomic::AtomicCell;

// Re-exports.
pub use cf::{
    new_provider, BoxcarProvider, CfError, CfRequest, CfStore, ConvolutionFunctionProvider,
    GridFunction, GridGeometry, MuellerMask, PbAccumulator, WProjectionProvider,
};
pub use cli::{AwGridder, AwGridderError};
pub use engine::{
    new_ft_machine, Direction, EngineError, EngineState, FtMachine, GridderConfig, GriddingEngine,
    Record, RecordError, RecordField, SkyImage,
};
pub use grid::GridFloat;
pub use scheduler::{make_baseline_ranges, BaselineRange, RangeError, SchedulerError};
pub use vis::{Polarisation, VisBuffer};

lazy_static::lazy_static! {
    /// Are progress bars being drawn? This should only ever be enabled by CLI
    /// code.
    pub(crate) static ref PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Gridding-engine configuration.

use marlu::{LatLngHeight, RADec};
use serde::{Deserialize, Serialize};

use crate::{cf::GridFunction, constants::*};

/// (De)serialise an optional [`LatLngHeight`] field by field.
pub(crate) mod opt_lat_lng_height {
    use marlu::LatLngHeight;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(remote = "LatLngHeight")]
    struct LatLngHeightDef {
        longitude_rad: f64,
        latitude_rad: f64,
        height_metres: f64,
    }

    #[derive(Serialize, Deserialize)]
    struct Location(#[serde(with = "LatLngHeightDef")] LatLngHeight);

    pub(crate) fn serialize<S: Serializer>(
        location: &Option<LatLngHeight>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        (*location).map(Location).serialize(serializer)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<LatLngHeight>, D::Error> {
        Ok(Option::<Location>::deserialize(deserializer)?.map(|Location(l)| l))
    }
}

/// Everything that controls how visibilities are gridded and degridded. Every
/// field has a default, so configuration files need only list what they
/// change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridderConfig {
    /// The image size \[pixels\].
    pub nx: usize,
    pub ny: usize,

    /// The image pixel sizes \[arcseconds\].
    pub cell_x_arcsec: f64,
    pub cell_y_arcsec: f64,

    /// The padded grid is at least this many times bigger than the image.
    pub padding: f64,

    /// Baselines whose |w| exceeds this are not gridded \[metres\].
    pub w_max: f64,

    pub num_w_planes: usize,

    /// The half-width of the convolution functions \[pixels\].
    pub support: usize,

    pub oversample: usize,

    pub grid_function: GridFunction,

    /// Accumulate onto double-precision grids.
    pub double_precision_grid: bool,

    /// Split visibilities bilinearly over their nearest cells rather than
    /// using oversampled kernels.
    pub linear_interpolation: bool,

    /// Grid auto-correlations too.
    pub use_zero: bool,

    /// Also grid the conjugates of cross-hand visibilities onto their
    /// Hermitian partners' planes.
    pub use_conj_pols: bool,

    /// Periodically correct the grid for the element beam.
    pub apply_element_beam: bool,

    /// The number of batches between element-beam corrections.
    pub step_apply_element: usize,

    /// After an element-beam correction, zero the cells that were empty before
    /// it.
    pub mask_grid: bool,

    /// Blank pixels where the average primary beam is less than this fraction
    /// of its peak.
    pub pb_cut: f64,

    /// Blank pixels where the average primary beam is less than twice this.
    pub min_pb: f64,

    /// When predicting, only divide the image by the gridding correction, not
    /// the primary beam.
    pub predict_ft: bool,

    /// The number of workers. Defaults to the available parallelism.
    pub num_threads: Option<usize>,

    /// How many times unfinished baseline ranges are re-attempted before
    /// gridding gives up.
    pub max_retry_passes: usize,

    /// The phase centre to grid to. If this isn't given, the image's phase
    /// centre is used.
    pub phase_centre: Option<RADec>,

    #[serde(with = "opt_lat_lng_height")]
    pub array_location: Option<LatLngHeight>,

    /// Grid tile by tile on disk. This is not supported, but is kept for
    /// compatibility with persisted records.
    pub tiled: bool,
    pub cache_size: usize,
    pub tile_size: usize,
}

impl Default for GridderConfig {
    fn default() -> Self {
        Self {
            nx: 128,
            ny: 128,
            cell_x_arcsec: 60.0,
            cell_y_arcsec: 60.0,
            padding: DEFAULT_PADDING,
            w_max: DEFAULT_W_MAX,
            num_w_planes: DEFAULT_NUM_W_PLANES,
            support: DEFAULT_SUPPORT,
            oversample: DEFAULT_OVERSAMPLE,
            grid_function: GridFunction::default(),
            double_precision_grid: false,
            linear_interpolation: false,
            use_zero: false,
            use_conj_pols: false,
            apply_element_beam: false,
            step_apply_element: DEFAULT_STEP_APPLY_ELEMENT,
            mask_grid: false,
            pb_cut: DEFAULT_PB_CUT,
            min_pb: DEFAULT_MIN_PB,
            predict_ft: false,
            num_threads: None,
            max_retry_passes: DEFAULT_MAX_RETRY_PASSES,
            phase_centre: None,
            array_location: None,
            tiled: false,
            cache_size: 0,
            tile_size: 16,
        }
    }
}

impl GridderConfig {
    /// The image pixel sizes \[radians\].
    pub fn cell_sizes_rad(&self) -> (f64, f64) {
        (
            (self.cell_x_arcsec / 3600.0).to_radians(),
            (self.cell_y_arcsec / 3600.0).to_radians(),
        )
    }
}

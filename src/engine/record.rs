// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Persisted engine state.
//!
//! A [`Record`] holds the engine's configuration and its accumulated weights
//! (not its grids) as an ordered set of named fields. There are always
//! [`NUM_RECORD_FIELDS`] fields in a fixed order; a record with more fields
//! also holds an image.

use std::{fs::File, io::BufReader, path::Path};

use indexmap::IndexMap;
use marlu::{LatLngHeight, RADec};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use super::{RecordError, SkyImage};

/// The names of the fields every record has, in order.
pub const RECORD_FIELD_NAMES: [&str; 12] = [
    "name",
    "cache_size",
    "tile_size",
    "grid_function",
    "array_location",
    "tangent_specified",
    "phase_centre",
    "padding",
    "max_abs_data",
    "centre_loc",
    "offset_loc",
    "sum_of_weights",
];

pub const NUM_RECORD_FIELDS: usize = RECORD_FIELD_NAMES.len();

/// The name of the optional field following the fixed fields.
pub const IMAGE_FIELD_NAME: &str = "image";

/// A value in a [`Record`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    String(String),
    Int(u64),
    Float(f64),
    Bool(bool),
    Location(#[serde(with = "super::config::opt_lat_lng_height")] Option<LatLngHeight>),
    Direction(RADec),
    Pixel([usize; 2]),
    Matrix(Array2<f64>),
    Image(SkyImage),
}

/// An ordered collection of named values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, RecordField>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: RecordField) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&RecordField> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn to_json(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RecordError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RecordError> {
        let file = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(file)?)
    }

    /// Check that the fixed fields are present and in order, and that any
    /// extra field is an image.
    pub(crate) fn check_layout(&self) -> Result<(), RecordError> {
        if self.len() < NUM_RECORD_FIELDS {
            return Err(RecordError::TooFewFields {
                expected: NUM_RECORD_FIELDS,
                got: self.len(),
            });
        }
        let expected = RECORD_FIELD_NAMES
            .iter()
            .copied()
            .chain(std::iter::once(IMAGE_FIELD_NAME));
        for (index, (got, expected)) in self.names().zip(expected).enumerate() {
            if got != expected {
                return Err(RecordError::UnexpectedField {
                    index,
                    expected,
                    got: got.to_string(),
                });
            }
        }
        if self.len() > NUM_RECORD_FIELDS + 1 {
            return Err(RecordError::UnexpectedField {
                index: NUM_RECORD_FIELDS + 1,
                expected: "nothing",
                got: self.names().nth(NUM_RECORD_FIELDS + 1).unwrap_or("").to_string(),
            });
        }
        Ok(())
    }

    /// Does this record carry an image?
    pub fn has_image(&self) -> bool {
        self.len() > NUM_RECORD_FIELDS
    }

    pub(crate) fn string(&self, field: &'static str) -> Result<&str, RecordError> {
        match self.get(field) {
            Some(RecordField::String(s)) => Ok(s),
            _ => Err(wrong_type(field, "a string")),
        }
    }

    pub(crate) fn int(&self, field: &'static str) -> Result<usize, RecordError> {
        match self.get(field) {
            Some(RecordField::Int(i)) => usize::try_from(*i).map_err(|e| RecordError::BadValue {
                field,
                reason: e.to_string(),
            }),
            _ => Err(wrong_type(field, "an integer")),
        }
    }

    pub(crate) fn float(&self, field: &'static str) -> Result<f64, RecordError> {
        match self.get(field) {
            Some(RecordField::Float(f)) => Ok(*f),
            _ => Err(wrong_type(field, "a number")),
        }
    }

    pub(crate) fn bool(&self, field: &'static str) -> Result<bool, RecordError> {
        match self.get(field) {
            Some(RecordField::Bool(b)) => Ok(*b),
            _ => Err(wrong_type(field, "a boolean")),
        }
    }

    pub(crate) fn location(
        &self,
        field: &'static str,
    ) -> Result<Option<LatLngHeight>, RecordError> {
        match self.get(field) {
            Some(RecordField::Location(l)) => Ok(*l),
            _ => Err(wrong_type(field, "an array location")),
        }
    }

    pub(crate) fn direction(&self, field: &'static str) -> Result<RADec, RecordError> {
        match self.get(field) {
            Some(RecordField::Direction(d)) => Ok(*d),
            _ => Err(wrong_type(field, "a direction")),
        }
    }

    pub(crate) fn pixel(&self, field: &'static str) -> Result<[usize; 2], RecordError> {
        match self.get(field) {
            Some(RecordField::Pixel(p)) => Ok(*p),
            _ => Err(wrong_type(field, "a pixel position")),
        }
    }

    pub(crate) fn matrix(&self, field: &'static str) -> Result<&Array2<f64>, RecordError> {
        match self.get(field) {
            Some(RecordField::Matrix(m)) => Ok(m),
            _ => Err(wrong_type(field, "a matrix")),
        }
    }

    pub(crate) fn image(&self) -> Result<Option<&SkyImage>, RecordError> {
        match self.get(IMAGE_FIELD_NAME) {
            None => Ok(None),
            Some(RecordField::Image(i)) => Ok(Some(i)),
            Some(_) => Err(wrong_type(IMAGE_FIELD_NAME, "an image")),
        }
    }
}

fn wrong_type(field: &'static str, expected: &'static str) -> RecordError {
    RecordError::WrongType { field, expected }
}

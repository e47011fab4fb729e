//! Coordinate dimensions and tile coordinates.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// A single-character dimension identifier, restricted to `a..z` and `A..Z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dimension(char);

impl Dimension {
    pub fn new(c: char) -> Result<Self> {
        if c.is_ascii_alphabetic() {
            Ok(Self(c))
        } else {
            Err(Error::InvalidArgument(format!(
                "'{c}' is not a valid dimension identifier; must be a..z or A..Z"
            )))
        }
    }

    pub fn as_char(self) -> char {
        self.0
    }

    /// Name of the column this dimension occupies in the tiles-info table.
    pub fn column_name(self) -> String {
        format!("Dim_{}", self.0)
    }

    /// Name of the non-unique index covering this dimension, when indexed.
    pub fn index_name(self) -> String {
        format!("IndexForDim_{}", self.0)
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered mapping from dimension to coordinate value. Inserting an already-present
/// dimension overwrites its value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileCoordinate {
    values: BTreeMap<Dimension, i32>,
}

impl TileCoordinate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, dimension: Dimension, value: i32) -> &mut Self {
        self.values.insert(dimension, value);
        self
    }

    pub fn get(&self, dimension: Dimension) -> Option<i32> {
        self.values.get(&dimension).copied()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.values.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, i32)> + '_ {
        self.values.iter().map(|(d, v)| (*d, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with work units.

use std::path::PathBuf;

use thiserror::Error;

use crate::io::GlobError;

/// Errors found while decomposing an observation into work units. All of these
/// are found before any processing starts, and all of them are fatal.
#[derive(Error, Debug)]
pub enum UnitsError {
    #[error("Observation {obsid} beam {beam}: expected {expected} subband files, but found {found}")]
    InventoryMismatch {
        obsid: String,
        beam: usize,
        expected: usize,
        found: usize,
    },

    #[error("Output {path:?} already exists; refusing to overwrite the products of a previous run")]
    OutputCollision { path: PathBuf },

    #[error("No sky model for beam {beam} (looked for {path:?})")]
    MissingSkymodel { beam: usize, path: Option<PathBuf> },

    #[error("Invalid band sizes {0:?}; there must be at least one band and no band can be empty")]
    InvalidBands(Vec<usize>),

    #[error("Observation {0} has no beams")]
    NoBeams(String),

    #[error(transparent)]
    Glob(#[from] GlobError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Metadata key '{key}' was already set by an earlier stage")]
    AlreadySet { key: String },

    #[error("Metadata key '{key}' hasn't been set")]
    Missing { key: String },

    #[error("Metadata key '{key}' isn't a {expected}")]
    WrongType { key: String, expected: &'static str },
}

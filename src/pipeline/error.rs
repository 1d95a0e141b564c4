// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from running pipeline stages.

use std::fmt::Display;

use thiserror::Error;

use crate::{
    catalog::CatalogError,
    fits::FitsError,
    mask::MaskError,
    noise::NoiseError,
    parset::ParsetError,
    scratch::ScratchError,
    tool::ToolError,
    units::{MetadataError, UnitId},
};

/// Anything that can go wrong inside a stage body.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("No calibrator unit for band {band}")]
    MissingCalibrator { band: usize },

    #[error("{0}")]
    Generic(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Parset(#[from] ParsetError),

    #[error(transparent)]
    Scratch(#[from] ScratchError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Mask(#[from] MaskError),

    #[error(transparent)]
    Noise(#[from] NoiseError),

    #[error(transparent)]
    Fits(#[from] FitsError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

/// The first failure of a pipeline run.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: String,
    /// `None` for collective stages.
    pub unit: Option<UnitId>,
    pub source: StageError,
}

impl Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "Stage '{}' failed on {unit}: {}", self.stage, self.source),
            None => write!(f, "Stage '{}' failed: {}", self.stage, self.source),
        }
    }
}

impl std::error::Error for StageFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

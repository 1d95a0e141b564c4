// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all rsm-imaging errors. This should be the *only* error enum
//! that is publicly visible from the binary.

use thiserror::Error;

use crate::{
    catalog::CatalogError,
    fits::FitsError,
    imaging::ImagingError,
    mask::MaskError,
    noise::NoiseError,
    parset::ParsetError,
    pipeline::StageFailure,
    scratch::ScratchError,
    units::UnitsError,
};

/// The *only* publicly visible error from rsm-imaging. Lower-level errors are
/// flattened into a message and a hint about where to look.
#[derive(Error, Debug)]
pub enum RsmError {
    /// A problem with the parset, i.e. the user's configuration.
    #[error("{0}\n\nCheck the parset; every key the run needs is listed in the README.")]
    Parset(String),

    /// The input data doesn't look like the configuration says it should.
    #[error("{0}\n\nCheck input_dir, n_beams, band_size and skymodels in the parset.")]
    Inventory(String),

    /// A stage failed part-way through a run.
    #[error("{0}\n\nThe tool's log file is in the unit's output directory. Use --keep-scratch to inspect intermediate products.")]
    Stage(String),

    /// A sky model couldn't be read.
    #[error("{0}\n\nSky models must be in the makesourcedb text format with a 'format = ...' header.")]
    Skymodel(String),

    /// A cfitsio error. Because these are usually quite spartan, some
    /// suggestions are provided here.
    #[error("cfitsio error: {0}\n\nIf you don't know what this means, try turning up verbosity (-v or -vv).")]
    Cfitsio(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

impl From<ParsetError> for RsmError {
    fn from(e: ParsetError) -> Self {
        let s = e.to_string();
        match e {
            ParsetError::MissingKey { .. }
            | ParsetError::Type { .. }
            | ParsetError::Parse { .. } => Self::Parset(s),
            ParsetError::Persist(_) | ParsetError::IO(_) => Self::Generic(s),
        }
    }
}

impl From<UnitsError> for RsmError {
    fn from(e: UnitsError) -> Self {
        let s = e.to_string();
        match e {
            UnitsError::InventoryMismatch { .. }
            | UnitsError::OutputCollision { .. }
            | UnitsError::MissingSkymodel { .. }
            | UnitsError::NoBeams(_) => Self::Inventory(s),
            UnitsError::InvalidBands(_) => Self::Parset(s),
            UnitsError::Glob(_) | UnitsError::IO(_) => Self::Generic(s),
        }
    }
}

impl From<ImagingError> for RsmError {
    fn from(e: ImagingError) -> Self {
        let s = e.to_string();
        match e {
            ImagingError::ExplicitInputsNeedOneBeam { .. } | ImagingError::EmptySubset { .. } => {
                Self::Parset(s)
            }
            ImagingError::Parset(e) => Self::from(e),
            ImagingError::Units(e) => Self::from(e),
            ImagingError::Scratch(e) => Self::from(e),
            ImagingError::IO(e) => Self::from(e),
        }
    }
}

impl From<StageFailure> for RsmError {
    fn from(e: StageFailure) -> Self {
        Self::Stage(e.to_string())
    }
}

impl From<MaskError> for RsmError {
    fn from(e: MaskError) -> Self {
        let s = e.to_string();
        match e {
            MaskError::UnsupportedProjection(_) => Self::Generic(s),
            MaskError::Catalog(e) => Self::from(e),
            MaskError::Fits(e) => Self::from(e),
        }
    }
}

impl From<NoiseError> for RsmError {
    fn from(e: NoiseError) -> Self {
        let s = e.to_string();
        match e {
            NoiseError::NoPlane { .. } | NoiseError::BoxTooBig { .. } | NoiseError::EmptyBox => {
                Self::Generic(s)
            }
            NoiseError::Fits(e) => Self::from(e),
        }
    }
}

impl From<CatalogError> for RsmError {
    fn from(e: CatalogError) -> Self {
        let s = e.to_string();
        match e {
            CatalogError::IO { .. } => Self::Generic(s),
            _ => Self::Skymodel(s),
        }
    }
}

impl From<FitsError> for RsmError {
    fn from(e: FitsError) -> Self {
        Self::Cfitsio(e.to_string())
    }
}

impl From<ScratchError> for RsmError {
    fn from(e: ScratchError) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<std::io::Error> for RsmError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors setting up an imaging run. Nothing has been run when one of these
//! is returned.

use thiserror::Error;

use crate::{parset::ParsetError, scratch::ScratchError, units::UnitsError};

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("target.msin lists explicit inputs, which only works with one beam, but n_beams is {num_beams}")]
    ExplicitInputsNeedOneBeam { num_beams: usize },

    #[error("No parset keys start with '{prefix}.'; this stage can't run without them")]
    EmptySubset { prefix: String },

    #[error(transparent)]
    Parset(#[from] ParsetError),

    #[error(transparent)]
    Units(#[from] UnitsError),

    #[error(transparent)]
    Scratch(#[from] ScratchError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

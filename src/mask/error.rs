// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::{catalog::CatalogError, fits::FitsError};

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("Can't make a mask on a '{0}' projection; only SIN is supported")]
    UnsupportedProjection(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Fits(#[from] FitsError),
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with parsets.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParsetError {
    /// The key is absent. This is distinct from [`ParsetError::Type`] so that
    /// callers can tell missing configuration from malformed configuration.
    #[error("Parset key '{key}' is not present")]
    MissingKey { key: String },

    #[error("Parset key '{key}' has value '{value}', which is not a valid {expected}")]
    Type {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("{file:?}, line {line}: expected 'key = value', but got '{text}'")]
    Parse {
        file: PathBuf,
        line: usize,
        text: String,
    },

    #[error("Couldn't persist parset file: {0}")]
    Persist(#[from] tempfile::PathPersistError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

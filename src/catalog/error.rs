// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Sky model has no format line; expected something like '# (Name, Type, Ra, Dec, ...) = format'")]
    NoFormat,

    #[error("Sky model format doesn't have a '{0}' column")]
    MissingColumn(&'static str),

    #[error("Sky model line {line_num}: couldn't parse {field} from '{value}'")]
    Parse {
        line_num: usize,
        field: &'static str,
        value: String,
    },

    #[error("Couldn't read sky model {path:?}: {source}")]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
}

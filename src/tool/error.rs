// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from running external tools.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    /// The tool ran, but didn't exit cleanly. The exit code is `None` if the
    /// process was killed by a signal.
    #[error("{executable} failed with exit code {exit_code:?}")]
    NonZeroExit {
        executable: String,
        exit_code: Option<i32>,
    },

    #[error("Couldn't start {executable}: {source}")]
    Spawn {
        executable: String,
        source: std::io::Error,
    },

    #[error("Sourcing initialisation script {script:?} failed with exit code {exit_code:?}")]
    InitScript {
        script: PathBuf,
        exit_code: Option<i32>,
    },

    #[error("Couldn't open tool log file {path:?}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Resolving a tool environment from a shell initialisation script.
//!
//! Some LOFAR builds are only usable after sourcing their `lofarinit.sh`. The
//! script is sourced in a throwaway shell and the resulting variables are
//! captured; the calling process' environment is never touched.

use std::{collections::HashMap, path::Path, process::Command};

use log::{debug, warn};

use super::ToolError;
use crate::constants::{ENV_DENYLIST, INIT_SHELL};

pub type Environment = HashMap<String, String>;

/// Source `script` and return the environment it leaves behind. If the script
/// doesn't exist, a warning is logged and `None` is returned, meaning that the
/// unmodified environment should be used.
pub fn resolve_environment(script: &Path) -> Result<Option<Environment>, ToolError> {
    if !script.exists() {
        warn!(
            "Initialisation script {} not found; using the unmodified environment",
            script.display()
        );
        return Ok(None);
    }

    debug!("Reading environment from {}", script.display());
    // The script path is passed as a positional parameter rather than being
    // interpolated into the command string.
    let output = Command::new(INIT_SHELL)
        .arg("-c")
        .arg(". \"$1\" >/dev/null; env")
        .arg(INIT_SHELL)
        .arg(script)
        .output()
        .map_err(|source| ToolError::Spawn {
            executable: INIT_SHELL.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(ToolError::InitScript {
            script: script.to_path_buf(),
            exit_code: output.status.code(),
        });
    }

    Ok(Some(parse_env_output(&String::from_utf8_lossy(
        &output.stdout,
    ))))
}

/// Parse the output of `env`. Lines that aren't `NAME=value` (e.g.
/// continuation lines of multi-line values) are dropped, as are denylisted
/// names.
pub(crate) fn parse_env_output(output: &str) -> Environment {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .filter(|(name, _)| !name.is_empty() && !name.contains(char::is_whitespace))
        .filter(|(name, _)| !ENV_DENYLIST.contains(name))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

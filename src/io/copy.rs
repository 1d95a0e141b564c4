// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Staging input data into working areas.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::trace;

/// Copy each input (a measurement set directory, or a plain file) into
/// `work_area`, keeping its file name. Inputs already present in the work area
/// are not copied again, so an interrupted run can be restarted. The paths of
/// the copies are returned in input order.
pub(crate) fn copy_to_work_area<P: AsRef<Path>>(
    inputs: &[P],
    work_area: &Path,
) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(work_area)?;
    let mut outputs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let input = input.as_ref();
        let name = input.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", input.display()),
            )
        })?;
        let output = work_area.join(name);
        if output.exists() {
            trace!("{} already staged", output.display());
        } else {
            trace!("Copying {} to {}", input.display(), output.display());
            copy_recursive(input, &output)?;
        }
        outputs.push(output);
    }
    Ok(outputs)
}

fn copy_recursive(from: &Path, to: &Path) -> io::Result<()> {
    if from.is_dir() {
        fs::create_dir(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else {
        fs::copy(from, to)?;
    }
    Ok(())
}

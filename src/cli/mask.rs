// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Draw a sky model into a FITS mask outside of a pipeline run.

use std::path::PathBuf;

use clap::Parser;
use log::info;

use super::{display_warnings, RsmError};
use crate::mask::make_mask_file;

#[derive(Parser, Debug)]
pub(super) struct MaskArgs {
    /// The FITS image to draw into. Its WCS must use a SIN projection. Unless
    /// --output is given, the image is modified in place.
    #[clap(name = "IMAGE", parse(from_os_str))]
    image: PathBuf,

    /// The sky model (makesourcedb text format) whose sources are drawn.
    #[clap(name = "SKYMODEL", parse(from_os_str))]
    skymodel: PathBuf,

    /// Write the mask to this file instead of modifying IMAGE.
    #[clap(short, long, parse(from_os_str))]
    output: Option<PathBuf>,
}

impl MaskArgs {
    pub(super) fn run(self) -> Result<(), RsmError> {
        let mask = match self.output {
            Some(output) => {
                std::fs::copy(&self.image, &output)?;
                output
            }
            None => self.image,
        };
        let summary = make_mask_file(&mask, &self.skymodel)?;
        display_warnings();
        info!(
            "Wrote {}: {} sources drawn ({} crossing the edge), {} outside the image",
            mask.display(),
            summary.drawn,
            summary.clipped,
            summary.outside
        );
        Ok(())
    }
}

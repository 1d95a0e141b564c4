// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;
use log::info;

use super::RsmError;
use crate::{
    constants::{DEFAULT_NOISE_BOX_SIZE, DEFAULT_NOISE_MULTIPLIER},
    noise::{estimate_noise_from_file, threshold},
};

#[derive(Parser, Debug)]
pub(super) struct NoiseArgs {
    /// The FITS image whose central box is measured.
    #[clap(name = "IMAGE", parse(from_os_str))]
    pub(super) image: PathBuf,

    /// Half the side length of the central box [pixels].
    #[clap(short, long, default_value_t = DEFAULT_NOISE_BOX_SIZE)]
    pub(super) box_size: usize,

    /// The cleaning threshold is this many times the noise.
    #[clap(short, long, default_value_t = DEFAULT_NOISE_MULTIPLIER)]
    pub(super) multiplier: f64,
}

impl NoiseArgs {
    pub(super) fn run(self) -> Result<(), RsmError> {
        let noise = estimate_noise_from_file(&self.image, self.box_size)?;
        info!("{}: noise {noise:.6e} Jy", self.image.display());
        println!("noise = {noise:e}");
        println!("threshold = {:e}", threshold(noise, self.multiplier));
        Ok(())
    }
}

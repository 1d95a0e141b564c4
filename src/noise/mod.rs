// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Estimating image noise, to decide how deep to clean.

#[cfg(test)]
mod tests;

use std::path::Path;

use log::debug;
use ndarray::prelude::*;
use thiserror::Error;

use crate::{constants::NOISE_STOKES_PLANE, fits::{read_image, FitsError}};

#[derive(Error, Debug)]
pub enum NoiseError {
    #[error("Image has shape {shape:?}, which doesn't have plane [0, {plane}]")]
    NoPlane { shape: Vec<usize>, plane: usize },

    #[error("A noise box of half-size {box_size} doesn't fit in a {num_rows}x{num_cols} image")]
    BoxTooBig {
        box_size: usize,
        num_rows: usize,
        num_cols: usize,
    },

    #[error("The noise box can't be empty")]
    EmptyBox,

    #[error(transparent)]
    Fits(#[from] FitsError),
}

/// The standard deviation of a square box of half-size `box_size` at the
/// centre of the image plane `[0, NOISE_STOKES_PLANE]`. This is the population
/// standard deviation (no degrees-of-freedom correction).
pub fn estimate_noise(cube: ArrayView4<f32>, box_size: usize) -> Result<f64, NoiseError> {
    let (num_freqs, num_planes, num_rows, num_cols) = cube.dim();
    if num_freqs == 0 || num_planes <= NOISE_STOKES_PLANE {
        return Err(NoiseError::NoPlane {
            shape: cube.shape().to_vec(),
            plane: NOISE_STOKES_PLANE,
        });
    }
    if box_size == 0 {
        return Err(NoiseError::EmptyBox);
    }
    let (cy, cx) = (num_rows / 2, num_cols / 2);
    if box_size > cy || box_size > cx || cy + box_size > num_rows || cx + box_size > num_cols {
        return Err(NoiseError::BoxTooBig {
            box_size,
            num_rows,
            num_cols,
        });
    }

    let region = cube.slice(s![
        0,
        NOISE_STOKES_PLANE,
        cy - box_size..cy + box_size,
        cx - box_size..cx + box_size
    ]);
    let n = region.len() as f64;
    let mean = region.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = region
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let noise = variance.sqrt();
    debug!("Noise in the central {0}x{0} box: {noise}", 2 * box_size);
    Ok(noise)
}

/// The cleaning threshold for a noise estimate.
pub fn threshold(noise: f64, multiplier: f64) -> f64 {
    noise * multiplier
}

/// Estimate the noise of a FITS image.
pub fn estimate_noise_from_file<P: AsRef<Path>>(image: P, box_size: usize) -> Result<f64, NoiseError> {
    let cube = read_image(image)?;
    estimate_noise(cube.data.view(), box_size)
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod cli_args;
mod image_tools;
mod run;

use std::path::Path;
use std::process::Output;
use std::str::from_utf8;

use assert_cmd::{output::OutputError, Command};
use ndarray::prelude::*;

use rsm_imaging::fits::{write_image, CelestialWcs, ImageCube};

fn rsm_imaging() -> Command {
    Command::cargo_bin("rsm-imaging").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

/// Write a (1, 4, npix, npix) SIN image centred on RA 120 deg, Dec 50 deg with
/// 30 arcsec pixels.
fn write_sin_image(path: &Path, data: Array4<f32>) {
    let npix = data.dim().2;
    let cell = (30.0_f64 / 3600.0).to_radians();
    write_image(
        path,
        &ImageCube {
            data,
            wcs: CelestialWcs {
                ctype1: "RA---SIN".to_string(),
                ctype2: "DEC--SIN".to_string(),
                crval1: 120.0_f64.to_radians(),
                crval2: 50.0_f64.to_radians(),
                crpix1: (npix / 2) as f64,
                crpix2: (npix / 2) as f64,
                cdelt1: -cell,
                cdelt2: cell,
            },
        },
    )
    .unwrap();
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `mask` and `noise` subcommands.

use indoc::indoc;
use rsm_imaging::fits::read_image;
use tempfile::tempdir;

use crate::*;

#[test]
fn test_noise() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("image.fits");
    // +-2 checkerboard in the central 8x8 box of the Stokes V plane.
    let mut data = Array4::<f32>::zeros((1, 4, 32, 32));
    for y in 12..20 {
        for x in 12..20 {
            data[(0, 3, y, x)] = if (x + y) % 2 == 0 { 2.0 } else { -2.0 };
        }
    }
    write_sin_image(&image, data);

    let (stdout, stderr) = get_cmd_output(
        rsm_imaging()
            .args(["--no-progress-bars", "noise", "--box-size", "4", "--multiplier", "3"])
            .arg(&image)
            .ok(),
    );
    assert!(stderr.is_empty(), "{stderr}");
    assert!(stdout.contains("noise = 2e0"), "{stdout}");
    assert!(stdout.contains("threshold = 6e0"), "{stdout}");
}

#[test]
fn test_noise_box_too_big() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("image.fits");
    write_sin_image(&image, Array4::zeros((1, 4, 16, 16)));

    let result = rsm_imaging().arg("noise").arg(&image).ok();
    assert!(result.is_err());
    let (_, stderr) = get_cmd_output(result);
    assert!(stderr.contains("doesn't fit in a 16x16 image"), "{stderr}");
}

#[test]
fn test_mask() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("empty.fits");
    let mask = dir.path().join("mask.fits");
    let skymodel = dir.path().join("sky.model");
    write_sin_image(&image, Array4::zeros((1, 1, 64, 64)));
    std::fs::write(
        &skymodel,
        indoc! {"
            format = Name, Type, Ra, Dec, I, MajorAxis, MinorAxis, Orientation
            centre, POINT, 08:00:00.0, +50.00.00.0, 1.0, , ,
            faraway, POINT, 20:00:00.0, -30.00.00.0, 1.0, , ,
        "},
    )
    .unwrap();

    let (stdout, _) = get_cmd_output(
        rsm_imaging()
            .arg("mask")
            .arg(&image)
            .arg(&skymodel)
            .arg("--output")
            .arg(&mask)
            .ok(),
    );
    assert!(stdout.contains("1 sources drawn"), "{stdout}");
    assert!(stdout.contains("1 outside the image"), "{stdout}");

    // The input image is untouched.
    let empty = read_image(&image).unwrap();
    assert!(empty.data.iter().all(|&v| v == 0.0));

    let mask = read_image(&mask).unwrap();
    assert_eq!(mask.data[(0, 0, 32, 32)], 1.0);
    assert_eq!(mask.data[(0, 0, 0, 0)], 0.0);
    assert!(mask.data.iter().all(|&v| v == 0.0 || v == 1.0));
}

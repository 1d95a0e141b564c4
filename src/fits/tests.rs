// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use tempfile::tempdir;

use super::*;

fn wcs() -> CelestialWcs {
    CelestialWcs {
        ctype1: "RA---SIN".to_string(),
        ctype2: "DEC--SIN".to_string(),
        crval1: 123.4_f64.to_radians(),
        crval2: 48.2_f64.to_radians(),
        crpix1: 31.0,
        crpix2: 31.0,
        cdelt1: -(30.0_f64 / 3600.0).to_radians(),
        cdelt2: (30.0_f64 / 3600.0).to_radians(),
    }
}

#[test]
fn test_write_then_read_keeps_axes_apart() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("image.fits");
    let mut data = Array4::zeros((1, 4, 8, 16));
    // Mark one pixel so a transposed read would be noticed.
    data[(0, 3, 2, 11)] = 7.0;
    let cube = ImageCube { data, wcs: wcs() };
    write_image(&file, &cube).unwrap();

    let read = read_image(&file).unwrap();
    assert_eq!(read.data.dim(), (1, 4, 8, 16));
    assert_abs_diff_eq!(read.data[(0, 3, 2, 11)], 7.0);
    assert_abs_diff_eq!(read.data.sum(), 7.0);

    assert_eq!(read.wcs.ctype1, "RA---SIN");
    assert_eq!(read.wcs.projection(), "SIN");
    assert_abs_diff_eq!(read.wcs.crpix1, 31.0, epsilon = 1e-9);
    assert_abs_diff_eq!(read.wcs.crval2, cube.wcs.crval2, epsilon = 1e-12);
    assert_abs_diff_eq!(read.wcs.cdelt1, cube.wcs.cdelt1, epsilon = 1e-12);
}

#[test]
fn test_update_image_in_place() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("mask.fits");
    let cube = ImageCube {
        data: Array4::zeros((1, 1, 4, 4)),
        wcs: wcs(),
    };
    write_image(&file, &cube).unwrap();

    let n = update_image(&file, |c| {
        c.data.slice_mut(s![0, 0, 1.., ..2]).fill(1.0);
        c.data.len()
    })
    .unwrap();
    assert_eq!(n, 16);

    let read = read_image(&file).unwrap();
    assert_abs_diff_eq!(read.data.sum(), 6.0);
    assert_abs_diff_eq!(read.data[(0, 0, 0, 0)], 0.0);
    assert_abs_diff_eq!(read.data[(0, 0, 3, 1)], 1.0);
    // The header is untouched.
    assert_eq!(read.wcs.ctype2, "DEC--SIN");
    assert_abs_diff_eq!(read.wcs.crpix2, 31.0, epsilon = 1e-9);
}

#[test]
fn test_missing_file() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        read_image(dir.path().join("nope.fits")),
        Err(FitsError::Open { .. })
    ));
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tempfile::tempdir;

use super::*;
use crate::fits::{write_image, CelestialWcs, ImageCube};

#[test]
fn test_constant_region_has_no_noise() {
    let cube = Array4::from_elem((1, 4, 64, 64), 3.5_f32);
    let noise = estimate_noise(cube.view(), 10).unwrap();
    assert_abs_diff_eq!(noise, 0.0);
    assert_abs_diff_eq!(threshold(noise, 5.0), 0.0);
}

#[test]
fn test_gaussian_noise_converges() {
    let mut rng = StdRng::seed_from_u64(1234);
    let normal = Normal::new(0.0, 0.5).unwrap();
    let mut cube = Array4::<f32>::zeros((1, 4, 128, 128));
    cube.slice_mut(s![0, 3, .., ..])
        .mapv_inplace(|_| normal.sample(&mut rng) as f32);
    // Other planes are ignored.
    cube.slice_mut(s![0, 0, .., ..]).fill(100.0);

    let noise = estimate_noise(cube.view(), 50).unwrap();
    assert_abs_diff_eq!(noise, 0.5, epsilon = 0.02);
    assert_abs_diff_eq!(threshold(noise, 2.0), 2.0 * noise);
}

#[test]
fn test_only_the_central_box_is_used() {
    let mut cube = Array4::<f32>::zeros((1, 4, 20, 20));
    // Alternating +-1 in the central 4x4 box, a mess outside it.
    cube.slice_mut(s![0, 3, .., ..]).fill(50.0);
    for y in 8..12 {
        for x in 8..12 {
            cube[(0, 3, y, x)] = if (x + y) % 2 == 0 { 1.0 } else { -1.0 };
        }
    }
    let noise = estimate_noise(cube.view(), 2).unwrap();
    // Population standard deviation: exactly 1.
    assert_abs_diff_eq!(noise, 1.0, epsilon = 1e-12);
}

#[test]
fn test_bad_shapes() {
    let cube = Array4::<f32>::zeros((1, 3, 64, 64));
    assert!(matches!(
        estimate_noise(cube.view(), 10),
        Err(NoiseError::NoPlane { plane: 3, .. })
    ));

    let cube = Array4::<f32>::zeros((1, 4, 16, 16));
    assert!(matches!(
        estimate_noise(cube.view(), 9),
        Err(NoiseError::BoxTooBig { box_size: 9, .. })
    ));
    assert!(matches!(
        estimate_noise(cube.view(), 0),
        Err(NoiseError::EmptyBox)
    ));
    // The box may cover the whole image.
    assert!(estimate_noise(cube.view(), 8).is_ok());
}

#[test]
fn test_noise_from_fits_file() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("noise.fits");
    let mut data = Array4::<f32>::zeros((1, 4, 32, 32));
    data.slice_mut(s![0, 3, 16.., ..]).fill(2.0);
    write_image(
        &file,
        &ImageCube {
            data,
            wcs: CelestialWcs {
                ctype1: "RA---SIN".to_string(),
                ctype2: "DEC--SIN".to_string(),
                crval1: 0.0,
                crval2: 0.0,
                crpix1: 16.0,
                crpix2: 16.0,
                cdelt1: -1e-4,
                cdelt2: 1e-4,
            },
        },
    )
    .unwrap();
    // Half the box is 0, half is 2.
    let noise = estimate_noise_from_file(&file, 4).unwrap();
    assert_abs_diff_eq!(noise, 1.0, epsilon = 1e-9);
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use indoc::indoc;
use tempfile::tempdir;

use super::*;
use crate::fits::{read_image, write_image, ImageCube};

const NPIX: usize = 64;
const CELL_ARCSEC: f64 = 30.0;

fn projection() -> SinProjection {
    SinProjection {
        ra0: 2.1,
        dec0: 0.9,
        crpix_x: (NPIX / 2) as f64,
        crpix_y: (NPIX / 2) as f64,
        cdelt_x: -CELL_ARCSEC * ARCSEC_TO_RAD,
        cdelt_y: CELL_ARCSEC * ARCSEC_TO_RAD,
    }
}

fn record(name: &str, kind: SourceKind, ra: f64, dec: f64, maj: f64, min: f64, pa: f64) -> SourceRecord {
    SourceRecord {
        name: name.to_string(),
        kind,
        ra,
        dec,
        major_axis: maj,
        minor_axis: min,
        orientation: pa,
    }
}

fn point(ra: f64, dec: f64) -> EllipseDescriptor {
    EllipseDescriptor::from_record(&record("p", SourceKind::Point, ra, dec, 0.0, 0.0, 0.0)).unwrap()
}

#[test]
fn test_sin_projection_inverts() {
    let proj = projection();
    let (x, y) = proj.to_pixel(proj.ra0, proj.dec0).unwrap();
    assert_abs_diff_eq!(x, 32.0, epsilon = 1e-9);
    assert_abs_diff_eq!(y, 32.0, epsilon = 1e-9);

    for (x, y) in [(0.0, 0.0), (10.5, 50.0), (63.0, 2.0)] {
        let (ra, dec) = proj.to_world(x, y).unwrap();
        let (x2, y2) = proj.to_pixel(ra, dec).unwrap();
        assert_abs_diff_eq!(x, x2, epsilon = 1e-6);
        assert_abs_diff_eq!(y, y2, epsilon = 1e-6);
    }

    // RA increases to the left.
    let (x, _) = proj.to_pixel(proj.ra0 + 0.001, proj.dec0).unwrap();
    assert!(x < 32.0);
    // The far side of the sky isn't projected.
    assert!(proj.to_pixel(proj.ra0 + PI, -proj.dec0).is_none());
}

#[test]
fn test_sin_projection_from_wcs() {
    let mut wcs = CelestialWcs {
        ctype1: "RA---SIN".to_string(),
        ctype2: "DEC--SIN".to_string(),
        crval1: 1.0,
        crval2: 0.5,
        crpix1: 10.0,
        crpix2: 11.0,
        cdelt1: -1e-4,
        cdelt2: 1e-4,
    };
    let proj = SinProjection::from_wcs(&wcs).unwrap();
    assert_abs_diff_eq!(proj.crpix_y, 11.0);
    wcs.ctype1 = "RA---TAN".to_string();
    assert!(matches!(
        SinProjection::from_wcs(&wcs),
        Err(MaskError::UnsupportedProjection(_))
    ));
}

#[test]
fn test_ellipse_sizes() {
    let arcsec = |r: f64| r / ARCSEC_TO_RAD;

    let p = point(1.0, 0.5);
    assert_abs_diff_eq!(arcsec(p.major), 277.0, epsilon = 1e-9);
    assert_abs_diff_eq!(arcsec(p.minor), 277.0, epsilon = 1e-9);
    assert_abs_diff_eq!(p.pa, 0.0);

    let g = EllipseDescriptor::from_record(&record("g", SourceKind::Gaussian, 1.0, 0.5, 120.0, 80.0, 30.0))
        .unwrap();
    assert_abs_diff_eq!(arcsec(g.major), 620.0, epsilon = 1e-9);
    assert_abs_diff_eq!(arcsec(g.minor), 580.0, epsilon = 1e-9);
    assert_abs_diff_eq!(g.pa, 30.0_f64.to_radians());

    // Unresolved WENSS sources get the beam size.
    let g = EllipseDescriptor::from_record(&record("g", SourceKind::Gaussian, 1.0, 0.5, 0.0, 0.0, 0.0))
        .unwrap();
    assert_abs_diff_eq!(arcsec(g.major), 554.0, epsilon = 1e-9);
    assert_abs_diff_eq!(arcsec(g.minor), 554.0, epsilon = 1e-9);

    // The major axis is always the bigger one.
    let g = EllipseDescriptor::from_record(&record("g", SourceKind::Gaussian, 1.0, 0.5, 10.0, 100.0, 0.0))
        .unwrap();
    assert_abs_diff_eq!(arcsec(g.major), 600.0, epsilon = 1e-9);
    assert_abs_diff_eq!(arcsec(g.minor), 510.0, epsilon = 1e-9);
    assert_abs_diff_eq!(g.pa, PI / 2.0);

    let records = [
        record("a", SourceKind::Point, 1.0, 0.5, 0.0, 0.0, 0.0),
        record("b", SourceKind::Unknown("SHAPELET".to_string()), 1.0, 0.5, 0.0, 0.0, 0.0),
    ];
    let ellipses = ellipses_from_records(&records);
    assert_eq!(ellipses.len(), 1);
    assert_eq!(ellipses[0].name, "a");
}

#[test]
fn test_rotated_ellipse_membership() {
    let mut e = EllipseDescriptor {
        name: "e".to_string(),
        ra: 1.0,
        dec: 0.0,
        major: 0.01,
        minor: 0.002,
        pa: 0.0,
    };
    // With a position angle of 0, the major axis runs along Dec.
    assert!(e.contains(1.0, 0.008));
    assert!(!e.contains(1.008, 0.0));
    e.pa = PI / 2.0;
    assert!(!e.contains(1.0, 0.008));
    assert!(e.contains(1.008, 0.0));
}

#[test]
fn test_ra_wraps() {
    let e = EllipseDescriptor {
        name: "e".to_string(),
        ra: 0.0005,
        dec: 0.0,
        major: 0.001,
        minor: 0.001,
        pa: 0.0,
    };
    assert!(e.contains(2.0 * PI - 0.0003, 0.0));
}

#[test]
fn test_point_source_at_centre() {
    let proj = projection();
    let source = point(proj.ra0, proj.dec0);
    let mut mask = Array2::<f32>::zeros((NPIX, NPIX));
    let summary = rasterize(mask.view_mut(), &proj, &[source.clone()]);
    assert_eq!(
        summary,
        RasterSummary {
            drawn: 1,
            outside: 0,
            clipped: 0
        }
    );

    let c = NPIX / 2;
    assert_abs_diff_eq!(mask[(c, c)], 1.0);
    // 5 pixels is 150", inside the 277" radius; 12 pixels is not.
    assert_abs_diff_eq!(mask[(c + 5, c)], 1.0);
    assert_abs_diff_eq!(mask[(c - 5, c)], 1.0);
    assert_abs_diff_eq!(mask[(c + 12, c)], 0.0);
    assert_abs_diff_eq!(mask[(c, c + 12)], 0.0);

    // Nothing outside the bounding rectangle.
    let (xmin, xmax, ymin, ymax) = source.pixel_bounds(&proj).unwrap();
    for ((y, x), v) in mask.indexed_iter() {
        if *v > 0.0 {
            assert!((xmin..xmax).contains(&(x as i64)));
            assert!((ymin..ymax).contains(&(y as i64)));
        }
    }

    // Every row has a single run of set pixels, centred on the source.
    for row in mask.rows() {
        let set: Vec<usize> = row
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0.0)
            .map(|(i, _)| i)
            .collect();
        if let (Some(first), Some(last)) = (set.first(), set.last()) {
            assert_eq!(last - first + 1, set.len());
            assert!(*first <= c && *last >= c);
        }
    }
}

#[test]
fn test_source_outside_field() {
    let proj = projection();
    let far = point(proj.ra0, proj.dec0 + 5.0_f64.to_radians());
    let mut mask = Array2::<f32>::zeros((NPIX, NPIX));
    let summary = rasterize(mask.view_mut(), &proj, &[far]);
    assert_eq!(summary.outside, 1);
    assert_eq!(summary.drawn, 0);
    assert_abs_diff_eq!(mask.sum(), 0.0);

    // Other side of the sky.
    let behind = point(proj.ra0 + PI, -proj.dec0);
    let summary = rasterize(mask.view_mut(), &proj, &[behind]);
    assert_eq!(summary.outside, 1);
    assert_abs_diff_eq!(mask.sum(), 0.0);
}

#[test]
fn test_source_across_edge_is_clipped() {
    let proj = projection();
    let (ra, dec) = proj.to_world(1.0, 1.0).unwrap();
    let mut mask = Array2::<f32>::zeros((NPIX, NPIX));
    let summary = rasterize(mask.view_mut(), &proj, &[point(ra, dec)]);
    assert_eq!(summary.drawn, 1);
    assert_eq!(summary.clipped, 1);
    assert_abs_diff_eq!(mask[(1, 1)], 1.0);
    assert_abs_diff_eq!(mask[(0, 0)], 1.0);
}

#[test]
fn test_overlapping_sources_union() {
    let proj = projection();
    let (ra1, dec1) = proj.to_world(28.0, 30.0).unwrap();
    let (ra2, dec2) = proj.to_world(36.0, 34.0).unwrap();
    let a = point(ra1, dec1);
    let b = point(ra2, dec2);

    let mut mask_a = Array2::<f32>::zeros((NPIX, NPIX));
    rasterize(mask_a.view_mut(), &proj, &[a.clone()]);
    let mut mask_b = Array2::<f32>::zeros((NPIX, NPIX));
    rasterize(mask_b.view_mut(), &proj, &[b.clone()]);
    let mut both = Array2::<f32>::zeros((NPIX, NPIX));
    rasterize(both.view_mut(), &proj, &[a.clone(), b.clone()]);

    let union = Zip::from(&mask_a)
        .and(&mask_b)
        .map_collect(|a, b| a.max(*b));
    assert_eq!(both, union);
    // They really do overlap.
    assert!(Zip::from(&mask_a).and(&mask_b).fold(false, |acc, a, b| acc || (*a > 0.0 && *b > 0.0)));

    // Rasterizing again changes nothing, and existing pixels are kept.
    both[(0, NPIX - 1)] = 1.0;
    let before = both.clone();
    rasterize(both.view_mut(), &proj, &[a, b]);
    assert_eq!(both, before);
}

#[test]
fn test_make_mask_file() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("mask.fits");
    let proj = projection();
    let wcs = CelestialWcs {
        ctype1: "RA---SIN".to_string(),
        ctype2: "DEC--SIN".to_string(),
        crval1: proj.ra0,
        crval2: proj.dec0,
        crpix1: proj.crpix_x,
        crpix2: proj.crpix_y,
        cdelt1: proj.cdelt_x,
        cdelt2: proj.cdelt_y,
    };
    write_image(
        &image,
        &ImageCube {
            data: Array4::zeros((1, 2, NPIX, NPIX)),
            wcs,
        },
    )
    .unwrap();

    // 2.1 rad = 8h 01m 16.0s; 0.9 rad = 51d 33m 56.6s. The second source is
    // far away.
    let skymodel = dir.path().join("sky.model");
    std::fs::write(
        &skymodel,
        indoc! {"
            # (Name, Type, Ra, Dec, I, MajorAxis, MinorAxis, Orientation) = format
            centre, POINT, 2.1rad, 0.9rad, 1.0
            far, GAUSSIAN, 00:00:00.0, -30.00.00.0, 1.0, 100, 50, 10
            odd, SHAPELET, 2.1rad, 0.9rad, 1.0
        "},
    )
    .unwrap();

    let summary = make_mask_file(&image, &skymodel).unwrap();
    assert_eq!(summary.drawn, 1);
    assert_eq!(summary.outside, 1);

    let cube = read_image(&image).unwrap();
    assert_abs_diff_eq!(cube.data[(0, 0, NPIX / 2, NPIX / 2)], 1.0);
    assert!(cube.data.slice(s![0, 0, .., ..]).sum() > 10.0);
    // Only the first plane is touched.
    assert_abs_diff_eq!(cube.data.slice(s![0, 1, .., ..]).sum(), 0.0);
}

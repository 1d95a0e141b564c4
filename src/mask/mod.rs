// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Rasterizing sky-model sources into clean masks.
//!
//! Every source becomes an ellipse, padded by [`MASK_PAD_ARCSEC`]. A mask pixel
//! is set to 1 if its sky position is inside any source ellipse; other pixels
//! are left alone, so masks can be built up over several calls.

mod error;
#[cfg(test)]
mod tests;

pub use error::MaskError;

use std::{f64::consts::PI, path::Path};

use log::{debug, info, warn};
use ndarray::{prelude::*, Zip};

use crate::{
    catalog::{read_skymodel, SourceKind, SourceRecord},
    constants::{ARCSEC_TO_RAD, MASK_PAD_ARCSEC, WENSS_BEAM_ARCSEC},
    fits::{update_image, CelestialWcs},
};

/// Conversion between sky and pixel coordinates. Pixel coordinates are
/// 0-based `(x, y)`, where `x` runs along RA (the last array axis) and `y`
/// along Dec.
pub trait SkyProjection: Sync {
    /// The pixel position of `(ra, dec)` [radians], or `None` if the position
    /// can't be projected.
    fn to_pixel(&self, ra: f64, dec: f64) -> Option<(f64, f64)>;

    /// The sky position [radians] of pixel `(x, y)`, or `None` if the pixel
    /// isn't on the sky.
    fn to_world(&self, x: f64, y: f64) -> Option<(f64, f64)>;
}

/// The orthographic (SIN) projection, as written by the imager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinProjection {
    pub ra0: f64,
    pub dec0: f64,
    pub crpix_x: f64,
    pub crpix_y: f64,
    pub cdelt_x: f64,
    pub cdelt_y: f64,
}

impl SinProjection {
    pub fn from_wcs(wcs: &CelestialWcs) -> Result<SinProjection, MaskError> {
        if wcs.projection() != "SIN" {
            return Err(MaskError::UnsupportedProjection(wcs.ctype1.clone()));
        }
        Ok(SinProjection {
            ra0: wcs.crval1,
            dec0: wcs.crval2,
            crpix_x: wcs.crpix1,
            crpix_y: wcs.crpix2,
            cdelt_x: wcs.cdelt1,
            cdelt_y: wcs.cdelt2,
        })
    }
}

impl SkyProjection for SinProjection {
    fn to_pixel(&self, ra: f64, dec: f64) -> Option<(f64, f64)> {
        let (s_dec, c_dec) = dec.sin_cos();
        let (s_dec0, c_dec0) = self.dec0.sin_cos();
        let (s_dra, c_dra) = (ra - self.ra0).sin_cos();
        // Behind the tangent plane.
        if s_dec * s_dec0 + c_dec * c_dec0 * c_dra < 0.0 {
            return None;
        }
        let l = c_dec * s_dra;
        let m = s_dec * c_dec0 - c_dec * s_dec0 * c_dra;
        Some((self.crpix_x + l / self.cdelt_x, self.crpix_y + m / self.cdelt_y))
    }

    fn to_world(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let l = (x - self.crpix_x) * self.cdelt_x;
        let m = (y - self.crpix_y) * self.cdelt_y;
        let r2 = l * l + m * m;
        if r2 > 1.0 {
            return None;
        }
        let n = (1.0 - r2).sqrt();
        let (s_dec0, c_dec0) = self.dec0.sin_cos();
        let dec = (m * c_dec0 + n * s_dec0).asin();
        let ra = self.ra0 + l.atan2(n * c_dec0 - m * s_dec0);
        Some((ra.rem_euclid(2.0 * PI), dec))
    }
}

/// A source to be masked. Angles are in radians; the axes are half-axes and
/// already padded. `major >= minor > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct EllipseDescriptor {
    pub name: String,
    pub ra: f64,
    pub dec: f64,
    pub major: f64,
    pub minor: f64,
    pub pa: f64,
}

impl EllipseDescriptor {
    /// Convert a sky-model source. Sources of unknown kind give `None`.
    pub fn from_record(record: &SourceRecord) -> Option<EllipseDescriptor> {
        let (major, minor, pa) = match &record.kind {
            SourceKind::Point => {
                let r = (WENSS_BEAM_ARCSEC + MASK_PAD_ARCSEC) / 2.0 * ARCSEC_TO_RAD;
                (r, r, 0.0)
            }
            // WENSS calls everything a Gaussian; unresolved sources have a
            // zero axis.
            SourceKind::Gaussian if record.major_axis == 0.0 || record.minor_axis == 0.0 => {
                let r = (WENSS_BEAM_ARCSEC + MASK_PAD_ARCSEC) * ARCSEC_TO_RAD;
                (r, r, record.orientation.to_radians())
            }
            SourceKind::Gaussian => (
                (record.major_axis + MASK_PAD_ARCSEC) * ARCSEC_TO_RAD,
                (record.minor_axis + MASK_PAD_ARCSEC) * ARCSEC_TO_RAD,
                record.orientation.to_radians(),
            ),
            SourceKind::Unknown(kind) => {
                warn!(
                    "Source {} has unknown type '{kind}'; not masking it",
                    record.name
                );
                return None;
            }
        };
        // Swapping the axes is the same ellipse rotated by 90 degrees.
        let (major, minor, pa) = if minor > major {
            (minor, major, pa + PI / 2.0)
        } else {
            (major, minor, pa)
        };
        Some(EllipseDescriptor {
            name: record.name.clone(),
            ra: record.ra,
            dec: record.dec,
            major,
            minor,
            pa,
        })
    }

    /// Is the sky position inside this ellipse?
    pub fn contains(&self, ra: f64, dec: f64) -> bool {
        // Wrap the RA offset so sources near RA 0 work.
        let dra = (ra - self.ra + PI).rem_euclid(2.0 * PI) - PI;
        let ddec = dec - self.dec;
        let (s_pa, c_pa) = self.pa.sin_cos();
        let x = dra * s_pa + ddec * c_pa;
        let y = -dra * c_pa + ddec * s_pa;
        x * x / (self.major * self.major) + y * y / (self.minor * self.minor) < 1.0
    }

    /// The integer pixel rectangle `(xmin, xmax, ymin, ymax)` (maxima
    /// exclusive) that encloses this ellipse, or `None` if a corner can't be
    /// projected.
    fn pixel_bounds<P: SkyProjection + ?Sized>(&self, proj: &P) -> Option<(i64, i64, i64, i64)> {
        let dec_lo = self.dec - self.major;
        let dec_hi = self.dec + self.major;
        let (x1, y1) = proj.to_pixel(self.ra - self.major / dec_lo.cos(), dec_lo)?;
        let (x2, y2) = proj.to_pixel(self.ra + self.major / dec_hi.cos(), dec_hi)?;
        Some((
            x1.min(x2).floor() as i64,
            x1.max(x2).ceil() as i64,
            y1.min(y2).floor() as i64,
            y1.max(y2).ceil() as i64,
        ))
    }
}

/// Convert sky-model sources into ellipses, dropping those of unknown kind.
pub fn ellipses_from_records(records: &[SourceRecord]) -> Vec<EllipseDescriptor> {
    records
        .iter()
        .filter_map(EllipseDescriptor::from_record)
        .collect()
}

/// What happened while rasterizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RasterSummary {
    /// Sources that were (at least partly) drawn.
    pub drawn: usize,
    /// Sources entirely outside the image.
    pub outside: usize,
    /// Sources drawn, but crossing the image edge.
    pub clipped: usize,
}

/// Set every pixel of `mask` (indexed `[y, x]`) whose sky position is inside
/// any of `sources` to 1.
pub fn rasterize<P: SkyProjection + ?Sized>(
    mut mask: ArrayViewMut2<f32>,
    proj: &P,
    sources: &[EllipseDescriptor],
) -> RasterSummary {
    let (num_rows, num_cols) = mask.dim();
    let (num_rows, num_cols) = (num_rows as i64, num_cols as i64);
    let mut summary = RasterSummary::default();

    for source in sources {
        let (xmin, xmax, ymin, ymax) = match source.pixel_bounds(proj) {
            Some(b) => b,
            None => {
                warn!("Source {} can't be projected onto the mask; ignoring it", source.name);
                summary.outside += 1;
                continue;
            }
        };

        if xmin >= num_cols || ymin >= num_rows || xmax <= 0 || ymax <= 0 {
            warn!("Source {} falls outside the mask; ignoring it", source.name);
            summary.outside += 1;
            continue;
        }
        if xmin < 0 || ymin < 0 || xmax > num_cols || ymax > num_rows {
            warn!("Source {} falls across the mask edge", source.name);
            summary.clipped += 1;
        }

        let (x0, x1) = (xmin.max(0) as usize, xmax.min(num_cols) as usize);
        let (y0, y1) = (ymin.max(0) as usize, ymax.min(num_rows) as usize);
        let region = mask.slice_mut(s![y0..y1, x0..x1]);
        Zip::indexed(region).par_for_each(|(j, i), pixel| {
            if let Some((ra, dec)) = proj.to_world((x0 + i) as f64, (y0 + j) as f64) {
                if source.contains(ra, dec) {
                    *pixel = 1.0;
                }
            }
        });
        summary.drawn += 1;
    }

    debug!(
        "Rasterized {} sources ({} outside, {} clipped)",
        summary.drawn, summary.outside, summary.clipped
    );
    summary
}

/// Draw the sources of a sky model into the first plane of an existing FITS
/// mask image.
pub fn make_mask_file<P: AsRef<Path>, Q: AsRef<Path>>(
    image: P,
    skymodel: Q,
) -> Result<RasterSummary, MaskError> {
    let records = read_skymodel(skymodel.as_ref())?;
    let sources = ellipses_from_records(&records);
    info!(
        "Masking {} sources from {}",
        sources.len(),
        skymodel.as_ref().display()
    );
    let summary = update_image(image.as_ref(), |cube| -> Result<RasterSummary, MaskError> {
        let proj = SinProjection::from_wcs(&cube.wcs)?;
        Ok(rasterize(
            cube.data.slice_mut(s![0, 0, .., ..]),
            &proj,
            &sources,
        ))
    })??;
    Ok(summary)
}

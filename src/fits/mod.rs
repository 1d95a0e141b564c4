// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions for reading and writing FITS images.
//!
//! Images from the imager are 4D cubes. With the FITS axes being RA, Dec,
//! Stokes and frequency, the arrays here have shape
//! `(frequency, stokes, dec, ra)`.

mod error;
#[cfg(test)]
mod tests;

pub use error::FitsError;

use std::path::Path;

use fitsio::{
    hdu::{FitsHdu, HduInfo},
    images::{ImageDescription, ImageType},
    FitsFile,
};
use log::trace;
use ndarray::prelude::*;

/// The celestial part of an image's world coordinate system. Angles are in
/// radians and reference pixels are 0-based.
#[derive(Debug, Clone, PartialEq)]
pub struct CelestialWcs {
    pub ctype1: String,
    pub ctype2: String,
    pub crval1: f64,
    pub crval2: f64,
    pub crpix1: f64,
    pub crpix2: f64,
    pub cdelt1: f64,
    pub cdelt2: f64,
}

impl CelestialWcs {
    /// Read the first two axes of the header of the primary HDU.
    fn read(fptr: &mut FitsFile, hdu: &FitsHdu) -> Result<CelestialWcs, FitsError> {
        Ok(CelestialWcs {
            ctype1: fits_get_required_key(fptr, hdu, "CTYPE1")?,
            ctype2: fits_get_required_key(fptr, hdu, "CTYPE2")?,
            crval1: fits_get_required_key::<f64>(fptr, hdu, "CRVAL1")?.to_radians(),
            crval2: fits_get_required_key::<f64>(fptr, hdu, "CRVAL2")?.to_radians(),
            crpix1: fits_get_required_key::<f64>(fptr, hdu, "CRPIX1")? - 1.0,
            crpix2: fits_get_required_key::<f64>(fptr, hdu, "CRPIX2")? - 1.0,
            cdelt1: fits_get_required_key::<f64>(fptr, hdu, "CDELT1")?.to_radians(),
            cdelt2: fits_get_required_key::<f64>(fptr, hdu, "CDELT2")?.to_radians(),
        })
    }

    fn write(&self, fptr: &mut FitsFile, hdu: &FitsHdu) -> Result<(), FitsError> {
        let filename = fptr.filename.clone();
        let wrap = |e| fitsio_error(e, &filename, hdu);
        hdu.write_key(fptr, "CTYPE1", self.ctype1.as_str())
            .map_err(wrap)?;
        hdu.write_key(fptr, "CTYPE2", self.ctype2.as_str())
            .map_err(wrap)?;
        hdu.write_key(fptr, "CRVAL1", self.crval1.to_degrees())
            .map_err(wrap)?;
        hdu.write_key(fptr, "CRVAL2", self.crval2.to_degrees())
            .map_err(wrap)?;
        hdu.write_key(fptr, "CRPIX1", self.crpix1 + 1.0)
            .map_err(wrap)?;
        hdu.write_key(fptr, "CRPIX2", self.crpix2 + 1.0)
            .map_err(wrap)?;
        hdu.write_key(fptr, "CDELT1", self.cdelt1.to_degrees())
            .map_err(wrap)?;
        hdu.write_key(fptr, "CDELT2", self.cdelt2.to_degrees())
            .map_err(wrap)?;
        Ok(())
    }

    /// The projection code, e.g. "SIN" from "RA---SIN".
    pub fn projection(&self) -> &str {
        self.ctype1.rsplit('-').next().unwrap_or("")
    }
}

/// An image cube and its coordinate system.
#[derive(Debug, Clone)]
pub struct ImageCube {
    pub data: Array4<f32>,
    pub wcs: CelestialWcs,
}

/// Open a fits file.
#[track_caller]
pub(crate) fn fits_open<P: AsRef<Path>>(file: P) -> Result<FitsFile, FitsError> {
    FitsFile::open(file.as_ref()).map_err(|e| open_error(e, file.as_ref()))
}

/// Open a fits file for editing.
#[track_caller]
pub(crate) fn fits_edit<P: AsRef<Path>>(file: P) -> Result<FitsFile, FitsError> {
    FitsFile::edit(file.as_ref()).map_err(|e| open_error(e, file.as_ref()))
}

#[track_caller]
fn open_error(e: fitsio::errors::Error, file: &Path) -> FitsError {
    let caller = std::panic::Location::caller();
    FitsError::Open {
        fits_error: Box::new(e),
        fits_filename: file.to_path_buf().into_boxed_path(),
        source_file: caller.file(),
        source_line: caller.line(),
        source_column: caller.column(),
    }
}

#[track_caller]
fn fitsio_error(e: fitsio::errors::Error, file: &Path, hdu: &FitsHdu) -> FitsError {
    let caller = std::panic::Location::caller();
    FitsError::Fitsio {
        fits_error: Box::new(e),
        fits_filename: file.to_path_buf().into_boxed_path(),
        hdu_description: format!("{}", hdu.number + 1).into_boxed_str(),
        source_file: caller.file(),
        source_line: caller.line(),
        source_column: caller.column(),
    }
}

/// Open the primary HDU.
#[track_caller]
pub(crate) fn fits_primary_hdu(fits_fptr: &mut FitsFile) -> Result<FitsHdu, FitsError> {
    fits_fptr.primary_hdu().map_err(|e| {
        let caller = std::panic::Location::caller();
        FitsError::Fitsio {
            fits_error: Box::new(e),
            fits_filename: fits_fptr.filename.clone().into_boxed_path(),
            hdu_description: "primary".into(),
            source_file: caller.file(),
            source_line: caller.line(),
            source_column: caller.column(),
        }
    })
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword that may
/// or may not exist, pull out the value of the keyword, parsing it into the
/// desired type.
#[track_caller]
pub(crate) fn fits_get_optional_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Option<T>, FitsError> {
    let unparsed_value: String = match hdu.read_key(fits_fptr, keyword) {
        Ok(key_value) => key_value,
        Err(fitsio::errors::Error::Fits(fe)) if matches!(fe.status, 202 | 204) => return Ok(None),
        Err(e) => return Err(fitsio_error(e, &fits_fptr.filename, hdu)),
    };

    match unparsed_value.trim().parse() {
        Ok(parsed_value) => Ok(Some(parsed_value)),
        Err(_) => {
            let caller = std::panic::Location::caller();
            Err(FitsError::Parse {
                key: keyword.to_string().into_boxed_str(),
                fits_filename: fits_fptr.filename.clone().into_boxed_path(),
                hdu_num: hdu.number + 1,
                source_file: caller.file(),
                source_line: caller.line(),
                source_column: caller.column(),
            })
        }
    }
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword, pull out
/// the value of the keyword, parsing it into the desired type.
#[track_caller]
pub(crate) fn fits_get_required_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<T, FitsError> {
    match fits_get_optional_key(fits_fptr, hdu, keyword) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => {
            let caller = std::panic::Location::caller();
            Err(FitsError::MissingKey {
                key: keyword.to_string().into_boxed_str(),
                fits_filename: fits_fptr.filename.clone().into_boxed_path(),
                hdu_num: hdu.number + 1,
                source_file: caller.file(),
                source_line: caller.line(),
                source_column: caller.column(),
            })
        }
        Err(error) => Err(error),
    }
}

/// Get the 4D shape of the image on this HDU. Images with fewer axes get
/// leading axes of length 1.
#[track_caller]
fn fits_get_image_shape(fits_fptr: &FitsFile, hdu: &FitsHdu) -> Result<[usize; 4], FitsError> {
    match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => {
            if shape.len() < 2 || shape.len() > 4 {
                return Err(FitsError::BadShape {
                    fits_filename: fits_fptr.filename.clone().into_boxed_path(),
                    shape: shape.clone(),
                });
            }
            let mut dims = [1; 4];
            dims[4 - shape.len()..].copy_from_slice(shape);
            Ok(dims)
        }
        _ => {
            let caller = std::panic::Location::caller();
            Err(FitsError::NotImage {
                fits_filename: fits_fptr.filename.clone().into_boxed_path(),
                hdu_num: hdu.number + 1,
                source_file: caller.file(),
                source_line: caller.line(),
                source_column: caller.column(),
            })
        }
    }
}

fn read_cube(fptr: &mut FitsFile, hdu: &FitsHdu) -> Result<ImageCube, FitsError> {
    let shape = fits_get_image_shape(fptr, hdu)?;
    let data: Vec<f32> = hdu
        .read_image(fptr)
        .map_err(|e| fitsio_error(e, &fptr.filename, hdu))?;
    let data = Array4::from_shape_vec(shape, data).map_err(|_| FitsError::BadShape {
        fits_filename: fptr.filename.clone().into_boxed_path(),
        shape: shape.to_vec(),
    })?;
    let wcs = CelestialWcs::read(fptr, hdu)?;
    Ok(ImageCube { data, wcs })
}

/// Read the primary image of a FITS file.
pub fn read_image<P: AsRef<Path>>(file: P) -> Result<ImageCube, FitsError> {
    let mut fptr = fits_open(&file)?;
    let hdu = fits_primary_hdu(&mut fptr)?;
    let cube = read_cube(&mut fptr, &hdu)?;
    trace!(
        "Read {:?} image from {}",
        cube.data.dim(),
        file.as_ref().display()
    );
    Ok(cube)
}

/// Read the primary image of a FITS file, let `f` change it, and write it back
/// in place. The header is left alone.
pub fn update_image<P, F, T>(file: P, f: F) -> Result<T, FitsError>
where
    P: AsRef<Path>,
    F: FnOnce(&mut ImageCube) -> T,
{
    let mut fptr = fits_edit(&file)?;
    let hdu = fits_primary_hdu(&mut fptr)?;
    let mut cube = read_cube(&mut fptr, &hdu)?;
    let out = f(&mut cube);
    // Arrays from `read_cube` are always in standard layout.
    let data = cube.data.as_standard_layout();
    hdu.write_image(&mut fptr, data.as_slice().unwrap_or(&[]))
        .map_err(|e| fitsio_error(e, &fptr.filename, &hdu))?;
    Ok(out)
}

/// Write a new FITS image. An existing file is replaced.
pub fn write_image<P: AsRef<Path>>(file: P, cube: &ImageCube) -> Result<(), FitsError> {
    let file = file.as_ref();
    if file.exists() {
        std::fs::remove_file(file)
            .map_err(|e| open_error(fitsio::errors::Error::Message(e.to_string()), file))?;
    }
    let (nf, ns, ny, nx) = cube.data.dim();
    let description = ImageDescription {
        data_type: ImageType::Float,
        dimensions: &[nf, ns, ny, nx],
    };
    let mut fptr = FitsFile::create(file)
        .with_custom_primary(&description)
        .open()
        .map_err(|e| open_error(e, file))?;
    let hdu = fits_primary_hdu(&mut fptr)?;
    cube.wcs.write(&mut fptr, &hdu)?;
    let data = cube.data.as_standard_layout();
    hdu.write_image(&mut fptr, data.as_slice().unwrap_or(&[]))
        .map_err(|e| fitsio_error(e, file, &hdu))?;
    Ok(())
}

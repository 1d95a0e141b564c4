// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Everything the imaging run reads out of its parset.

use std::path::PathBuf;

use log::debug;

use super::ImagingError;
use crate::{
    constants::{DEFAULT_NOISE_BOX_SIZE, DEFAULT_NOISE_MULTIPLIER},
    parset::Parset,
};

/// The executables run by the imaging stages. Each can be replaced with
/// `tools.<default name> = /some/path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub ndppp: PathBuf,
    pub calibrate: PathBuf,
    pub parmexportcal: PathBuf,
    pub asciistats: PathBuf,
    pub statsplot: PathBuf,
    pub taql: PathBuf,
    pub awimager: PathBuf,
    pub image2fits: PathBuf,
}

impl Tools {
    fn from_parset(parset: &Parset) -> Result<Tools, ImagingError> {
        let tools = parset.subset("tools");
        let get = |name: &str| -> Result<PathBuf, ImagingError> {
            Ok(tools.get_or(name, PathBuf::from(name))?)
        };
        Ok(Tools {
            ndppp: get("NDPPP")?,
            calibrate: get("calibrate-stand-alone")?,
            parmexportcal: get("parmexportcal")?,
            asciistats: get("asciistats.py")?,
            statsplot: get("statsplot.py")?,
            taql: get("taql")?,
            awimager: get("awimager")?,
            image2fits: get("image2fits")?,
        })
    }
}

/// The calibrator observation, and how its solutions are applied to the
/// target.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratorConfig {
    pub obsid: String,
    pub skymodel: PathBuf,
    pub calibrate: Parset,
    pub transfer: Parset,
    pub transfer_skymodel: PathBuf,
}

/// `pdbclip`, which clips outliers from the calibrator's solutions.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipConfig {
    pub executable: PathBuf,
    pub sigma: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagingConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,

    pub target_obsid: String,
    pub num_beams: usize,
    pub band_sizes: Vec<usize>,
    /// If set, these files are the (single-beam) target inventory instead of
    /// whatever is in `input_dir`.
    pub target_msin: Option<Vec<PathBuf>>,
    /// One per target beam.
    pub skymodels: Vec<PathBuf>,

    pub calibrator: Option<CalibratorConfig>,
    /// Only used without a calibrator.
    pub target_calibrate: Parset,
    pub clip: Option<ClipConfig>,

    pub flag: Parset,
    pub combine: Parset,
    pub phase_only: Parset,
    pub phase_only_skymodel: Option<PathBuf>,
    /// [metres]
    pub max_baseline: Option<f64>,

    pub noise: Parset,
    pub noise_multiplier: f64,
    pub noise_box_size: usize,
    pub image: Parset,
    pub awimager_init_script: Option<PathBuf>,
    pub awimager_max_parallel: usize,

    /// Per-stage overrides of the number of concurrent tasks, from
    /// `<stage>.max_parallel`.
    stage_bounds: Parset,

    pub tools: Tools,
}

impl ImagingConfig {
    pub fn from_parset(parset: &Parset) -> Result<ImagingConfig, ImagingError> {
        let num_beams = parset.get::<usize>("n_beams")?;
        let target_msin = parset.get_opt::<Vec<PathBuf>>("target.msin")?;
        if target_msin.is_some() && num_beams != 1 {
            return Err(ImagingError::ExplicitInputsNeedOneBeam { num_beams });
        }

        let calibrator = match parset.get_opt::<String>("cal_obsid")? {
            Some(obsid) => Some(CalibratorConfig {
                obsid,
                skymodel: parset.get_path("calibrator.skymodel")?,
                calibrate: required_subset(parset, "calcal.parset")?,
                transfer: required_subset(parset, "transfer.parset")?,
                transfer_skymodel: parset.get_path("transfer.skymodel")?,
            }),
            None => None,
        };
        let target_calibrate = if calibrator.is_some() {
            Parset::default()
        } else {
            required_subset(parset, "calibrate.parset")?
        };

        let clip = if parset.contains("pdbclip.executable") {
            Some(ClipConfig {
                executable: parset.get_path("pdbclip.executable")?,
                sigma: parset.get("pdbclip.sigma")?,
            })
        } else {
            None
        };

        let image = required_subset(parset, "image.parset")?;
        let noise = required_subset(parset, "noise.parset")?;

        let config = ImagingConfig {
            input_dir: parset.get_path("input_dir")?,
            output_dir: parset.get_path("output_dir")?,
            scratch_dir: parset.get_path("scratch_dir")?,
            target_obsid: parset.get("target_obsid")?,
            num_beams,
            band_sizes: parset.get_vector("band_size")?,
            target_msin,
            skymodels: parset.get_vector("skymodels")?,
            calibrator,
            target_calibrate,
            clip,
            flag: parset.subset("flag.parset"),
            combine: required_subset(parset, "combine.parset")?,
            phase_only: parset.subset("phaseonly.parset"),
            phase_only_skymodel: optional_path(parset, "phaseonly.skymodel")?,
            max_baseline: parset.get_opt("limit.max_baseline")?,
            noise,
            noise_multiplier: parset.get_or("noise.multiplier", DEFAULT_NOISE_MULTIPLIER)?,
            noise_box_size: parset.get_or("noise.box_size", DEFAULT_NOISE_BOX_SIZE)?,
            image,
            awimager_init_script: optional_path(parset, "awimager.initscript")?,
            awimager_max_parallel: parset.get_or("awimager.max_parallel", 1)?,
            stage_bounds: stage_bounds(parset),
            tools: Tools::from_parset(parset)?,
        };
        debug!("{config:#?}");
        Ok(config)
    }

    /// The `<stage>.max_parallel` override for a stage, if there is one.
    pub fn stage_bound(&self, stage: &str) -> Result<Option<usize>, ImagingError> {
        Ok(self.stage_bounds.get_opt(stage)?)
    }
}

/// A stage's parset. An empty one is almost certainly a typo in the keys.
fn required_subset(parset: &Parset, prefix: &str) -> Result<Parset, ImagingError> {
    let subset = parset.subset(prefix);
    if subset.is_empty() {
        return Err(ImagingError::EmptySubset {
            prefix: prefix.to_string(),
        });
    }
    Ok(subset)
}

fn optional_path(parset: &Parset, key: &str) -> Result<Option<PathBuf>, ImagingError> {
    if parset.contains(key) {
        Ok(Some(parset.get_path(key)?))
    } else {
        Ok(None)
    }
}

/// Pull out every `<stage>.max_parallel` key as `<stage> = n`.
fn stage_bounds(parset: &Parset) -> Parset {
    let overrides: Vec<(String, String)> = parset
        .keys()
        .filter_map(|k| k.strip_suffix(".max_parallel"))
        .filter(|stage| !stage.contains('.') && *stage != "awimager")
        .filter_map(|stage| {
            parset
                .get_raw(&format!("{stage}.max_parallel"))
                .ok()
                .map(|v| (stage.to_string(), v.to_string()))
        })
        .collect();
    Parset::default().patch(overrides)
}

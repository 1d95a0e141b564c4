// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Work units: the independently-processable slices of an observation.
//!
//! A target observation has several beams (SAPs), each recorded as many
//! subband measurement sets. The subbands of a beam are split into bands, and
//! each beam × band is one [`WorkUnit`]. The calibrator observation has a
//! single beam, so it gives one unit per band. File counts are checked exactly;
//! an inventory that doesn't match the expected counts is never truncated.

mod error;
mod metadata;

pub use error::{MetadataError, UnitsError};
pub use metadata::{MetaValue, Metadata};

use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use log::{debug, trace};
use serde::Serialize;
use strum_macros::{Display as StrumDisplay, EnumString};
use vec1::Vec1;

use crate::io::get_all_matches_from_glob;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, StrumDisplay, EnumString, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[strum(serialize = "calibrator")]
    Calibrator,
    #[strum(serialize = "target")]
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UnitId {
    pub role: Role,
    pub obsid: String,
    pub beam: usize,
    pub band: usize,
}

impl Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} SAP{:03} band {}",
            self.role, self.obsid, self.beam, self.band
        )
    }
}

impl UnitId {
    /// The stem of this unit's product names, e.g. `L123456_SAP002_BAND01`.
    pub fn product_stem(&self) -> String {
        format!("{}_SAP{:03}_BAND{:02}", self.obsid, self.beam, self.band)
    }
}

/// One beam × band slice of an observation. The identity, inputs and output
/// directory are fixed at construction; stages only add to the metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkUnit {
    id: UnitId,
    inputs: Vec1<PathBuf>,
    output_dir: PathBuf,
    skymodel: Option<PathBuf>,
    metadata: Metadata,
}

impl WorkUnit {
    pub fn new(
        id: UnitId,
        inputs: Vec1<PathBuf>,
        output_dir: PathBuf,
        skymodel: Option<PathBuf>,
    ) -> WorkUnit {
        WorkUnit {
            id,
            inputs,
            output_dir,
            skymodel,
            metadata: Metadata::default(),
        }
    }

    pub fn id(&self) -> &UnitId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.id.role
    }

    pub fn inputs(&self) -> &Vec1<PathBuf> {
        &self.inputs
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn skymodel(&self) -> Option<&Path> {
        self.skymodel.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Record something a stage produced. Fails if the key is already set.
    pub fn record<K: Into<String>>(&mut self, key: K, value: MetaValue) -> Result<(), MetadataError> {
        let key = key.into();
        trace!("{}: recording '{key}'", self.id);
        self.metadata.insert(key, value)
    }

    /// The calibrated, combined and trimmed measurement set.
    pub fn product_ms(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.MS", self.id.product_stem()))
    }

    /// The final image.
    pub fn product_image(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.img", self.id.product_stem()))
    }

    /// The names that a new unit's output directory must not already contain.
    /// Calibrator units have no products of their own.
    pub fn reserved_outputs(&self) -> Vec<PathBuf> {
        match self.id.role {
            Role::Calibrator => vec![],
            Role::Target => vec![self.product_ms(), self.product_image()],
        }
    }

    /// The most recent per-subband data files: flagged copies if the flagging
    /// stage ran, otherwise staged copies, otherwise the raw inputs.
    pub fn current_datafiles(&self) -> &[PathBuf] {
        for key in [keys::FLAGGED, keys::STAGED] {
            if let Ok(paths) = self.metadata.get_paths(key) {
                return paths;
            }
        }
        self.inputs.as_slice()
    }
}

/// The metadata keys written by the imaging stages.
pub mod keys {
    pub const STAGED: &str = "staged";
    pub const FLAGGED: &str = "flagged";
    /// Calibrator only: the instrument tables of each subband.
    pub const SOLUTIONS: &str = "solutions";
    pub const COMBINED: &str = "combined";
    pub const BAD_STATIONS: &str = "bad_stations";
    pub const STRIPPED: &str = "stripped";
    pub const BASELINE_LIMITED: &str = "baseline_limited";
    pub const NOISE: &str = "noise";
    pub const THRESHOLD: &str = "threshold";
    pub const MASK: &str = "mask";
    pub const IMAGE: &str = "image";
}

/// The subband files of an observation, per beam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    obsid: String,
    beams: Vec<Vec<PathBuf>>,
}

impl Inventory {
    /// Find `<input_dir>/<obsid>/<obsid>_SAP<beam>_SB*_uv.MS.dppp` for each of
    /// `num_beams` beams.
    pub fn discover(
        input_dir: &Path,
        obsid: &str,
        num_beams: usize,
    ) -> Result<Inventory, UnitsError> {
        let beams = (0..num_beams)
            .map(|beam| {
                let pattern = input_dir
                    .join(obsid)
                    .join(format!("{obsid}_SAP{beam:03}_SB*_uv.MS.dppp"));
                let files = get_all_matches_from_glob(&pattern.display().to_string())?;
                debug!(
                    "Found {} subbands for {obsid} SAP{beam:03}",
                    files.len()
                );
                Ok(files)
            })
            .collect::<Result<Vec<_>, UnitsError>>()?;
        Ok(Inventory {
            obsid: obsid.to_string(),
            beams,
        })
    }

    /// An explicit list of subband files, all belonging to beam 0.
    pub fn explicit(obsid: &str, files: Vec<PathBuf>) -> Inventory {
        Inventory {
            obsid: obsid.to_string(),
            beams: vec![files],
        }
    }

    pub fn obsid(&self) -> &str {
        &self.obsid
    }

    pub fn num_beams(&self) -> usize {
        self.beams.len()
    }

    pub fn beam(&self, beam: usize) -> &[PathBuf] {
        self.beams.get(beam).map(|b| b.as_slice()).unwrap_or(&[])
    }

    pub fn num_files(&self) -> usize {
        self.beams.iter().map(|b| b.len()).sum()
    }
}

/// How many subbands go in each band. Every beam must have exactly
/// `sum(band_sizes)` subbands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedCounts {
    pub band_sizes: Vec<usize>,
}

impl ExpectedCounts {
    pub fn per_beam(&self) -> usize {
        self.band_sizes.iter().sum()
    }

    pub fn num_bands(&self) -> usize {
        self.band_sizes.len()
    }

    fn validate(&self) -> Result<(), UnitsError> {
        if self.band_sizes.is_empty() || self.band_sizes.contains(&0) {
            return Err(UnitsError::InvalidBands(self.band_sizes.clone()));
        }
        Ok(())
    }
}

/// Where units put their outputs, and which sky models they use.
#[derive(Debug, Clone)]
pub struct UnitLayout {
    pub output_dir: PathBuf,
    /// One per target beam.
    pub skymodels: Vec<PathBuf>,
    pub calibrator_skymodel: Option<PathBuf>,
}

impl UnitLayout {
    pub fn target_dir(&self, obsid: &str, beam: usize) -> PathBuf {
        self.output_dir
            .join("target")
            .join(obsid)
            .join(format!("SAP{beam:03}"))
    }

    pub fn calibrator_dir(&self, obsid: &str) -> PathBuf {
        self.output_dir.join("calibrator").join(obsid)
    }
}

/// The work units of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    /// One per band; empty if there's no calibrator observation.
    pub calibrators: Vec<WorkUnit>,
    /// One per beam × band.
    pub targets: Vec<WorkUnit>,
}

impl Decomposition {
    pub fn len(&self) -> usize {
        self.calibrators.len() + self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All units, calibrators first.
    pub fn into_units(self) -> Vec<WorkUnit> {
        self.calibrators
            .into_iter()
            .chain(self.targets)
            .collect()
    }
}

/// Split a beam's subbands into bands, checking the count first.
fn split_into_bands(
    obsid: &str,
    beam: usize,
    files: &[PathBuf],
    expected: &ExpectedCounts,
) -> Result<Vec<Vec1<PathBuf>>, UnitsError> {
    if files.len() != expected.per_beam() {
        return Err(UnitsError::InventoryMismatch {
            obsid: obsid.to_string(),
            beam,
            expected: expected.per_beam(),
            found: files.len(),
        });
    }
    let mut bands = Vec::with_capacity(expected.num_bands());
    let mut rest = files;
    for &size in &expected.band_sizes {
        let (band, tail) = rest.split_at(size);
        let band = Vec1::try_from_vec(band.to_vec())
            .map_err(|_| UnitsError::InvalidBands(expected.band_sizes.clone()))?;
        bands.push(band);
        rest = tail;
    }
    Ok(bands)
}

/// Decompose the target (and optionally calibrator) inventories into work
/// units, creating their output directories. Nothing is created unless every
/// check passes.
pub fn decompose(
    targets: &Inventory,
    calibrator: Option<&Inventory>,
    expected: &ExpectedCounts,
    layout: &UnitLayout,
) -> Result<Decomposition, UnitsError> {
    expected.validate()?;
    if targets.num_beams() == 0 {
        return Err(UnitsError::NoBeams(targets.obsid.clone()));
    }

    let mut calibrator_units = vec![];
    if let Some(cal) = calibrator {
        // The calibrator is observed in one beam only.
        let bands = split_into_bands(&cal.obsid, 0, cal.beam(0), expected)?;
        let output_dir = layout.calibrator_dir(&cal.obsid);
        for (band, inputs) in bands.into_iter().enumerate() {
            calibrator_units.push(WorkUnit::new(
                UnitId {
                    role: Role::Calibrator,
                    obsid: cal.obsid.clone(),
                    beam: 0,
                    band,
                },
                inputs,
                output_dir.clone(),
                layout.calibrator_skymodel.clone(),
            ));
        }
    }

    let mut target_units = vec![];
    for beam in 0..targets.num_beams() {
        let bands = split_into_bands(&targets.obsid, beam, targets.beam(beam), expected)?;
        let skymodel = layout.skymodels.get(beam).cloned();
        match skymodel.as_deref() {
            Some(s) if s.exists() => (),
            _ => return Err(UnitsError::MissingSkymodel { beam, path: skymodel }),
        }
        let output_dir = layout.target_dir(&targets.obsid, beam);
        for (band, inputs) in bands.into_iter().enumerate() {
            target_units.push(WorkUnit::new(
                UnitId {
                    role: Role::Target,
                    obsid: targets.obsid.clone(),
                    beam,
                    band,
                },
                inputs,
                output_dir.clone(),
                skymodel.clone(),
            ));
        }
    }

    // Refuse to clobber the products of an earlier run.
    if let Some(path) = target_units
        .iter()
        .flat_map(|u| u.reserved_outputs())
        .find(|p| p.exists())
    {
        return Err(UnitsError::OutputCollision { path });
    }

    for dir in calibrator_units
        .iter()
        .chain(target_units.iter())
        .map(|u| u.output_dir())
        .unique()
    {
        std::fs::create_dir_all(dir)?;
    }

    debug!(
        "Decomposed into {} calibrator and {} target units",
        calibrator_units.len(),
        target_units.len()
    );
    Ok(Decomposition {
        calibrators: calibrator_units,
        targets: target_units,
    })
}

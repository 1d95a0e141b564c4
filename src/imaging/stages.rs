// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The bodies of the imaging stages.

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::Serialize;

use super::{
    config::{CalibratorConfig, ClipConfig},
    stations::{limit_baselines_query, read_bad_stations, strip_stations_query},
    ImagingPipeline,
};
use crate::{
    io::copy_to_work_area,
    mask::make_mask_file,
    noise::{estimate_noise_from_file, threshold},
    parset::format_vector,
    pipeline::{Peers, StageError},
    tool::ToolCall,
    units::{keys, MetaValue, Role, WorkUnit},
};

fn file_name(path: &Path) -> Result<&std::ffi::OsStr, StageError> {
    path.file_name()
        .ok_or_else(|| StageError::Generic(format!("{} has no file name", path.display())))
}

fn unit_skymodel(unit: &WorkUnit) -> Result<PathBuf, StageError> {
    unit.skymodel()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| StageError::Generic(format!("{} has no sky model", unit.id())))
}

#[derive(Serialize)]
struct Manifest<'a> {
    version: &'a str,
    target_obsid: &'a str,
    calibrator_obsid: Option<&'a str>,
    max_baseline: Option<f64>,
    units: &'a [WorkUnit],
}

impl ImagingPipeline<'_> {
    /// A call to `exe` that logs into the unit's output directory and runs
    /// there, which is where some LOFAR tools drop their own logs.
    fn call(&self, exe: &Path, unit: &WorkUnit, stage: &str) -> ToolCall {
        ToolCall::new(exe)
            .working_dir(unit.output_dir())
            .log_file(
                unit.output_dir()
                    .join(format!("{}.{stage}.log", unit.id().product_stem())),
            )
    }

    fn awimager(&self, unit: &WorkUnit, stage: &str) -> ToolCall {
        self.call(&self.config.tools.awimager, unit, stage)
            .init_script(self.config.awimager_init_script.clone())
    }

    /// The measurement set to image: the baseline-limited one if there is one.
    fn imaging_ms(unit: &WorkUnit) -> Result<PathBuf, StageError> {
        let metadata = unit.metadata();
        if metadata.contains(keys::BASELINE_LIMITED) {
            Ok(metadata.get_path(keys::BASELINE_LIMITED)?.to_path_buf())
        } else {
            Ok(metadata.get_path(keys::STRIPPED)?.to_path_buf())
        }
    }

    /// Copy calibrator subbands into the calibrator's output directory (they
    /// carry its solutions), and target subbands into scratch.
    pub(super) fn stage_inputs(&self, unit: &mut WorkUnit) -> Result<(), StageError> {
        let dest = match unit.role() {
            Role::Calibrator => unit.output_dir().to_path_buf(),
            Role::Target => self
                .scratch
                .allocate_dir(&format!("{}.staged", unit.id().product_stem()))?
                .persist(),
        };
        debug!("Staging {} into {}", unit.id(), dest.display());
        let staged = copy_to_work_area(unit.inputs().as_slice(), &dest)?;
        unit.record(keys::STAGED, MetaValue::Paths(staged))?;
        Ok(())
    }

    pub(super) fn flag(&self, unit: &mut WorkUnit) -> Result<(), StageError> {
        let dest = match unit.role() {
            Role::Calibrator => {
                let dir = unit.output_dir().join("flagged");
                std::fs::create_dir_all(&dir)?;
                dir
            }
            Role::Target => self
                .scratch
                .allocate_dir(&format!("{}.flagged", unit.id().product_stem()))?
                .persist(),
        };

        let mut flagged = Vec::with_capacity(unit.current_datafiles().len());
        for ms in unit.current_datafiles() {
            let msout = dest.join(file_name(ms)?);
            let parset = self.config.flag.patched_file(
                self.scratch.run_dir(),
                [("msin", ms.display()), ("msout", msout.display())],
            )?;
            self.invoker
                .run(&self.call(&self.config.tools.ndppp, unit, "flag").arg(parset.path()))?;
            flagged.push(msout);
        }
        unit.record(keys::FLAGGED, MetaValue::Paths(flagged))?;
        Ok(())
    }

    pub(super) fn calibrate_calibrator(
        &self,
        cal: &CalibratorConfig,
        unit: &mut WorkUnit,
    ) -> Result<(), StageError> {
        let parset = cal.calibrate.materialize(self.scratch.run_dir())?;
        let mut solutions = vec![];
        for ms in unit.current_datafiles() {
            info!(
                "Calibrating {} with sky model {}",
                ms.display(),
                cal.skymodel.display()
            );
            self.invoker.run(
                &self
                    .call(&self.config.tools.calibrate, unit, "calibrate")
                    .arg(ms)
                    .arg(parset.path())
                    .arg(&cal.skymodel),
            )?;
            solutions.push(ms.join("instrument"));
        }
        unit.record(keys::SOLUTIONS, MetaValue::Paths(solutions))?;
        Ok(())
    }

    pub(super) fn clip_instrument(
        &self,
        clip: &ClipConfig,
        unit: &mut WorkUnit,
    ) -> Result<(), StageError> {
        for instrument in unit.metadata().get_paths(keys::SOLUTIONS)? {
            self.invoker.run(
                &self
                    .call(&clip.executable, unit, "clip")
                    .arg("--auto")
                    .arg(format!("--sigma={:.6}", clip.sigma))
                    .arg(instrument),
            )?;
        }
        Ok(())
    }

    /// Apply the solutions of the calibrator unit of the same band, subband by
    /// subband.
    pub(super) fn transfer_solutions(
        &self,
        cal: &CalibratorConfig,
        unit: &mut WorkUnit,
        peers: &Peers,
    ) -> Result<(), StageError> {
        let calibrator = peers.calibrator_for(unit.id().band)?;
        let solutions = calibrator.metadata().get_paths(keys::SOLUTIONS)?;
        let datafiles = unit.current_datafiles();
        if solutions.len() != datafiles.len() {
            return Err(StageError::Generic(format!(
                "{} has {} solution tables for {} subbands of {}",
                calibrator.id(),
                solutions.len(),
                datafiles.len(),
                unit.id()
            )));
        }

        let parset = cal.transfer.materialize(self.scratch.run_dir())?;
        for (instrument, ms) in solutions.iter().zip(datafiles) {
            info!(
                "Transferring solutions from {} to {}",
                instrument.display(),
                ms.display()
            );
            let parmdb = self.scratch.allocate_dir("parmdb")?;
            self.invoker.run(
                &self
                    .call(&self.config.tools.parmexportcal, unit, "transfer")
                    .arg(format!("in={}/", instrument.display()))
                    .arg(format!("out={}", parmdb.path().display())),
            )?;
            self.invoker.run(
                &self
                    .call(&self.config.tools.calibrate, unit, "transfer")
                    .arg("--parmdb")
                    .arg(parmdb.path())
                    .arg(ms)
                    .arg(parset.path())
                    .arg(&cal.transfer_skymodel),
            )?;
            parmdb.release()?;
        }
        Ok(())
    }

    /// Without a calibrator observation, each target subband is calibrated
    /// against the beam's sky model.
    pub(super) fn calibrate_targets(&self, unit: &mut WorkUnit) -> Result<(), StageError> {
        let skymodel = unit_skymodel(unit)?;
        let parset = self
            .config
            .target_calibrate
            .materialize(self.scratch.run_dir())?;
        for ms in unit.current_datafiles() {
            self.invoker.run(
                &self
                    .call(&self.config.tools.calibrate, unit, "calibrate")
                    .arg(ms)
                    .arg(parset.path())
                    .arg(&skymodel),
            )?;
        }
        Ok(())
    }

    pub(super) fn combine(&self, unit: &mut WorkUnit) -> Result<(), StageError> {
        let msout = self
            .scratch
            .allocate_dir(&format!("{}.combine", unit.id().product_stem()))?
            .persist()
            .join("combined.MS");
        let msin: Vec<_> = unit
            .current_datafiles()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        info!("Combining {} subbands of {}", msin.len(), unit.id());
        let parset = self.config.combine.patched_file(
            self.scratch.run_dir(),
            [
                ("msin", format_vector(&msin)),
                ("msout", msout.display().to_string()),
            ],
        )?;
        self.invoker
            .run(&self.call(&self.config.tools.ndppp, unit, "combine").arg(parset.path()))?;
        unit.record(keys::COMBINED, MetaValue::Path(msout))?;
        Ok(())
    }

    pub(super) fn phase_only(&self, unit: &mut WorkUnit) -> Result<(), StageError> {
        let combined = unit.metadata().get_path(keys::COMBINED)?;
        let skymodel = match &self.config.phase_only_skymodel {
            Some(s) => s.clone(),
            None => unit_skymodel(unit)?,
        };
        let parset = self.config.phase_only.materialize(self.scratch.run_dir())?;
        self.invoker.run(
            &self
                .call(&self.config.tools.calibrate, unit, "phase_only")
                .arg(combined)
                .arg(parset.path())
                .arg(&skymodel),
        )?;
        Ok(())
    }

    /// Find the bad stations of the combined data and write the unit's product
    /// measurement set without them.
    pub(super) fn strip_bad_stations(&self, unit: &mut WorkUnit) -> Result<(), StageError> {
        let combined = unit.metadata().get_path(keys::COMBINED)?.to_path_buf();
        let work = self
            .scratch
            .allocate_dir(&format!("{}.stats", unit.id().product_stem()))?;
        let stats_dir = work.join("stats");
        let tools = &self.config.tools;

        self.invoker.run(
            &self
                .call(&tools.asciistats, unit, "stats")
                .arg("-i")
                .arg(&combined)
                .arg("-r")
                .arg(&stats_dir),
        )?;
        let mut stats_file = file_name(&combined)?.to_os_string();
        stats_file.push(".stats");
        // The plotter writes its table next to the statistics directory, as
        // <stats_dir>.tab.
        self.invoker.run(
            &self
                .call(&tools.statsplot, unit, "stats")
                .arg("-i")
                .arg(stats_dir.join(stats_file))
                .arg("-o")
                .arg(&stats_dir),
        )?;
        let bad_stations = read_bad_stations(&work.join("stats.tab"))?;
        work.release()?;
        if bad_stations.is_empty() {
            info!("{}: no bad stations", unit.id());
        } else {
            info!("{}: bad stations {}", unit.id(), bad_stations.join(", "));
        }

        let msout = unit.product_ms();
        self.invoker.run(
            &self
                .call(&tools.taql, unit, "strip")
                .arg(strip_stations_query(&combined, &bad_stations, &msout)),
        )?;
        unit.record(keys::BAD_STATIONS, MetaValue::Strings(bad_stations))?;
        unit.record(keys::STRIPPED, MetaValue::Path(msout))?;
        Ok(())
    }

    pub(super) fn limit_baselines(
        &self,
        max_baseline: f64,
        unit: &mut WorkUnit,
    ) -> Result<(), StageError> {
        let msin = unit.metadata().get_path(keys::STRIPPED)?;
        let msout = self
            .scratch
            .allocate_dir(&format!("{}.bl_limit", unit.id().product_stem()))?
            .persist()
            .join("limited.MS");
        self.invoker.run(
            &self
                .call(&self.config.tools.taql, unit, "limit")
                .arg(limit_baselines_query(msin, max_baseline, &msout)),
        )?;
        unit.record(keys::BASELINE_LIMITED, MetaValue::Path(msout))?;
        Ok(())
    }

    /// Make a dirty image and derive the cleaning threshold from its noise.
    pub(super) fn estimate_noise(&self, unit: &mut WorkUnit) -> Result<(), StageError> {
        let ms = Self::imaging_ms(unit)?;
        let work = self
            .scratch
            .allocate_dir(&format!("{}.noise", unit.id().product_stem()))?;
        let image = work.join("noise.img");
        let fits = work.join("noise.fits");

        let mut overrides = vec![
            ("ms", ms.display().to_string()),
            ("image", image.display().to_string()),
        ];
        if let Some(max_baseline) = self.config.max_baseline {
            overrides.push(("wmax", max_baseline.to_string()));
        }
        let parset = self
            .config
            .noise
            .patched_file(self.scratch.run_dir(), overrides)?;
        self.invoker
            .run(&self.awimager(unit, "noise").arg(parset.path()))?;
        self.invoker.run(
            &self
                .call(&self.config.tools.image2fits, unit, "noise")
                .arg(format!("in={}", image.display()))
                .arg(format!("out={}", fits.display())),
        )?;

        let noise = estimate_noise_from_file(&fits, self.config.noise_box_size)?;
        let threshold = threshold(noise, self.config.noise_multiplier);
        info!("{}: noise {noise:.6} Jy, threshold {threshold:.6} Jy", unit.id());
        work.release()?;
        unit.record(keys::NOISE, MetaValue::Float(noise))?;
        unit.record(keys::THRESHOLD, MetaValue::Float(threshold))?;
        Ok(())
    }

    /// Make an empty image with the final image's geometry and draw the beam's
    /// sky model into it.
    pub(super) fn make_mask(&self, unit: &mut WorkUnit) -> Result<(), StageError> {
        let ms = Self::imaging_ms(unit)?;
        let skymodel = unit_skymodel(unit)?;
        let image_parset = &self.config.image;
        let cellsize: String = image_parset.get("cellsize")?;
        let npix: f64 = image_parset.get("npix")?;
        let stokes: String = image_parset.get("stokes")?;

        let work = self
            .scratch
            .allocate_dir(&format!("{}.mask", unit.id().product_stem()))?
            .persist();
        let image = work.join("mask.img");
        let fits = work.join("mask.fits");
        self.invoker.run(
            &self.awimager(unit, "mask").args([
                format!("cellsize={cellsize}"),
                format!("ms={}", ms.display()),
                format!("npix={}", npix as usize),
                "operation=empty".to_string(),
                format!("image={}", image.display()),
                format!("stokes={stokes}"),
            ]),
        )?;
        self.invoker.run(
            &self
                .call(&self.config.tools.image2fits, unit, "mask")
                .arg(format!("in={}", image.display()))
                .arg(format!("out={}", fits.display())),
        )?;

        let summary = make_mask_file(&fits, &skymodel)?;
        info!(
            "{}: masked {} sources ({} outside the image)",
            unit.id(),
            summary.drawn,
            summary.outside
        );
        unit.record(keys::MASK, MetaValue::Path(fits))?;
        Ok(())
    }

    pub(super) fn make_image(&self, unit: &mut WorkUnit) -> Result<(), StageError> {
        let ms = Self::imaging_ms(unit)?;
        let mask = unit.metadata().get_path(keys::MASK)?.to_path_buf();
        let threshold = unit.metadata().get_float(keys::THRESHOLD)?;
        let image = unit.product_image();

        let mut overrides = vec![
            ("ms", ms.display().to_string()),
            ("mask", mask.display().to_string()),
            ("threshold", format!("{threshold:.6}Jy")),
            ("image", image.display().to_string()),
        ];
        if let Some(max_baseline) = self.config.max_baseline {
            overrides.push(("wmax", max_baseline.to_string()));
        }
        // The image's parset is kept with the image.
        let parset = self
            .config
            .image
            .patched_file(unit.output_dir(), overrides)?;
        info!("Making image {}", image.display());
        self.invoker
            .run(&self.awimager(unit, "image").arg(parset.path()))?;
        let kept = parset.retain()?;
        debug!("Kept imaging parset {}", kept.display());
        unit.record(keys::IMAGE, MetaValue::Path(image))?;
        Ok(())
    }

    /// Describe every unit and its products in `manifest.json`, next to the
    /// target's beam directories.
    pub(super) fn write_manifest(&self, units: &mut [WorkUnit]) -> Result<(), StageError> {
        let path = self.manifest_path();
        let manifest = Manifest {
            version: env!("CARGO_PKG_VERSION"),
            target_obsid: &self.config.target_obsid,
            calibrator_obsid: self.config.calibrator.as_ref().map(|c| c.obsid.as_str()),
            max_baseline: self.config.max_baseline,
            units: &*units,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, &manifest)?;
        info!("Wrote {}", path.display());
        Ok(())
    }
}

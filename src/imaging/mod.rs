// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The imaging run: which stages it has, and what they do.
//!
//! The stage order is fixed. Configuration only decides whether optional
//! stages are present:
//!
//! | stage                  | units         | present when                      |
//! |------------------------|---------------|-----------------------------------|
//! | `stage_inputs`         | all           | always                            |
//! | `flag`                 | all           | `flag.parset.*` is non-empty      |
//! | `calibrate_calibrator` | calibrators   | `cal_obsid` is set                |
//! | `clip_instrument`      | calibrators   | `pdbclip.executable` is set       |
//! | `transfer_solutions`   | targets       | `cal_obsid` is set                |
//! | `calibrate_targets`    | targets       | `cal_obsid` is not set            |
//! | `combine`              | targets       | always                            |
//! | `phase_only`           | targets       | `phaseonly.parset.*` is non-empty |
//! | `strip_bad_stations`   | targets       | always                            |
//! | `limit_baselines`      | targets       | `limit.max_baseline` is set       |
//! | `estimate_noise`       | targets       | always                            |
//! | `make_mask`            | targets       | always                            |
//! | `make_image`           | targets       | always                            |
//! | `write_manifest`       | all, at once  | always                            |
//!
//! The three imager stages run at most `awimager.max_parallel` (default 1)
//! tasks at once, because the imager is itself multi-threaded. Any stage's
//! bound can be set with `<stage>.max_parallel`.

mod config;
mod error;
mod stages;
mod stations;

pub use config::{CalibratorConfig, ClipConfig, ImagingConfig, Tools};
pub use error::ImagingError;
pub use stations::{
    limit_baselines_query, parse_bad_stations, read_bad_stations, strip_stations_query,
};

use std::path::PathBuf;

use log::info;

use crate::{
    parset::Parset,
    pipeline::{Pipeline, PipelineStatus, Stage},
    scratch::ScratchArea,
    tool::ToolInvoker,
    units::{decompose, Decomposition, ExpectedCounts, Inventory, Role, UnitLayout, WorkUnit},
};

pub struct ImagingPipeline<'a> {
    config: ImagingConfig,
    scratch: &'a ScratchArea,
    invoker: &'a ToolInvoker,
}

impl<'a> ImagingPipeline<'a> {
    pub fn new(
        config: ImagingConfig,
        scratch: &'a ScratchArea,
        invoker: &'a ToolInvoker,
    ) -> ImagingPipeline<'a> {
        ImagingPipeline {
            config,
            scratch,
            invoker,
        }
    }

    pub fn from_parset(
        parset: &Parset,
        scratch: &'a ScratchArea,
        invoker: &'a ToolInvoker,
    ) -> Result<ImagingPipeline<'a>, ImagingError> {
        Ok(Self::new(ImagingConfig::from_parset(parset)?, scratch, invoker))
    }

    pub fn config(&self) -> &ImagingConfig {
        &self.config
    }

    /// Find the input data and split it into work units. This also checks
    /// that nothing would be overwritten, and creates the output directories.
    pub fn decompose(&self) -> Result<Decomposition, ImagingError> {
        let c = &self.config;
        let targets = match &c.target_msin {
            Some(files) => Inventory::explicit(&c.target_obsid, files.clone()),
            None => Inventory::discover(&c.input_dir, &c.target_obsid, c.num_beams)?,
        };
        let calibrator = c
            .calibrator
            .as_ref()
            .map(|cal| Inventory::discover(&c.input_dir, &cal.obsid, 1))
            .transpose()?;
        let expected = ExpectedCounts {
            band_sizes: c.band_sizes.clone(),
        };
        let layout = UnitLayout {
            output_dir: c.output_dir.clone(),
            skymodels: c.skymodels.clone(),
            calibrator_skymodel: c.calibrator.as_ref().map(|cal| cal.skymodel.clone()),
        };
        Ok(decompose(&targets, calibrator.as_ref(), &expected, &layout)?)
    }

    /// Where the product manifest is written.
    pub fn manifest_path(&self) -> PathBuf {
        self.config
            .output_dir
            .join("target")
            .join(&self.config.target_obsid)
            .join("manifest.json")
    }

    /// The stages of this run, in order.
    pub fn pipeline(&self) -> Result<Pipeline<'_>, ImagingError> {
        let c = &self.config;
        let mut stages = vec![Stage::fan_out("stage_inputs", move |u, _| {
            self.stage_inputs(u)
        })];
        if !c.flag.is_empty() {
            stages.push(Stage::fan_out("flag", move |u, _| self.flag(u)));
        }
        match &c.calibrator {
            Some(cal) => {
                stages.push(
                    Stage::fan_out("calibrate_calibrator", move |u, _| {
                        self.calibrate_calibrator(cal, u)
                    })
                    .for_role(Role::Calibrator),
                );
                if let Some(clip) = &c.clip {
                    stages.push(
                        Stage::fan_out("clip_instrument", move |u, _| {
                            self.clip_instrument(clip, u)
                        })
                        .for_role(Role::Calibrator),
                    );
                }
                stages.push(
                    Stage::fan_out("transfer_solutions", move |u, peers| {
                        self.transfer_solutions(cal, u, peers)
                    })
                    .for_role(Role::Target),
                );
            }
            None => stages.push(
                Stage::fan_out("calibrate_targets", move |u, _| self.calibrate_targets(u))
                    .for_role(Role::Target),
            ),
        }
        stages.push(Stage::fan_out("combine", move |u, _| self.combine(u)).for_role(Role::Target));
        if !c.phase_only.is_empty() {
            stages.push(
                Stage::fan_out("phase_only", move |u, _| self.phase_only(u))
                    .for_role(Role::Target),
            );
        }
        stages.push(
            Stage::fan_out("strip_bad_stations", move |u, _| self.strip_bad_stations(u))
                .for_role(Role::Target),
        );
        if let Some(max_baseline) = c.max_baseline {
            stages.push(
                Stage::fan_out("limit_baselines", move |u, _| {
                    self.limit_baselines(max_baseline, u)
                })
                .for_role(Role::Target),
            );
        }
        for stage in [
            Stage::fan_out("estimate_noise", move |u, _| self.estimate_noise(u)),
            Stage::fan_out("make_mask", move |u, _| self.make_mask(u)),
            Stage::fan_out("make_image", move |u, _| self.make_image(u)),
        ] {
            stages.push(
                stage
                    .for_role(Role::Target)
                    .max_parallel(c.awimager_max_parallel),
            );
        }
        stages.push(Stage::collective("write_manifest", move |units| {
            self.write_manifest(units)
        }));

        let mut pipeline = Pipeline::new(&format!("imaging {}", c.target_obsid));
        for stage in stages {
            let stage = match c.stage_bound(stage.name())? {
                Some(n) => stage.max_parallel(n),
                None => stage,
            };
            pipeline = pipeline.stage(stage);
        }
        Ok(pipeline)
    }

    /// Run every stage over `units`.
    pub fn run(&self, units: &mut [WorkUnit]) -> Result<PipelineStatus, ImagingError> {
        let pipeline = self.pipeline()?;
        info!(
            "Imaging {} with {} stages",
            self.config.target_obsid,
            pipeline.stages().len()
        );
        Ok(pipeline.run(units))
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Run the imaging pipeline over an observation.

use std::{borrow::Cow, path::PathBuf};

use clap::Parser;
use itertools::Itertools;
use log::info;

use super::{display_warnings, InfoPrinter, RsmError};
use crate::{
    imaging::{ImagingConfig, ImagingPipeline},
    parset::Parset,
    pipeline::{Pipeline, PipelineStatus},
    scratch::ScratchArea,
    tool::ToolInvoker,
    units::Decomposition,
};

#[derive(Parser, Debug)]
pub(super) struct RunArgs {
    /// The parset describing the observation and how to process it.
    #[clap(name = "PARSET", parse(from_os_str))]
    pub(super) parset: PathBuf,
}

impl RunArgs {
    pub(super) fn run(self, dry_run: bool, keep_scratch: bool) -> Result<(), RsmError> {
        let parset = Parset::read(&self.parset)?;
        let config = ImagingConfig::from_parset(&parset)?;
        let scratch = ScratchArea::new(&config.scratch_dir)?;
        scratch.retain_all(keep_scratch);
        let invoker = ToolInvoker::new().dry_run(dry_run);
        let imaging = ImagingPipeline::new(config, &scratch, &invoker);

        let decomposition = imaging.decompose()?;
        let pipeline = imaging.pipeline()?;
        print_plan(imaging.config(), &pipeline, &decomposition);

        if dry_run {
            info!("Dry run -- exiting now.");
            scratch.teardown()?;
            return Ok(());
        }

        let mut units = decomposition.into_units();
        let status = imaging.run(&mut units)?;
        display_warnings();
        scratch.teardown()?;
        match status {
            PipelineStatus::Failed(failure) => Err(failure.into()),
            _ => {
                info!("Products listed in {}", imaging.manifest_path().display());
                Ok(())
            }
        }
    }
}

fn print_plan(config: &ImagingConfig, pipeline: &Pipeline, decomposition: &Decomposition) {
    let mut printer = InfoPrinter::new(format!("Imaging {}", config.target_obsid).into());
    printer.push_block(vec![
        format!("Input:   {}", config.input_dir.display()).into(),
        format!("Output:  {}", config.output_dir.display()).into(),
        format!("Scratch: {}", config.scratch_dir.display()).into(),
    ]);
    printer.push_line(
        match &config.calibrator {
            Some(cal) => format!("Calibrating against {} ({})", cal.obsid, cal.skymodel.display()),
            None => "No calibrator; targets are calibrated against their own sky models".to_string(),
        }
        .into(),
    );
    printer.push_line(
        format!(
            "{} beam(s), band sizes {:?}, noise box {} px, threshold {} x noise",
            config.num_beams, config.band_sizes, config.noise_box_size, config.noise_multiplier
        )
        .into(),
    );

    let mut stages: Vec<Cow<'static, str>> = vec![format!("{} stages:", pipeline.stages().len()).into()];
    for stage in pipeline.stages() {
        let units = match (stage.is_collective(), stage.role()) {
            (true, _) => "all units at once".to_string(),
            (false, Some(role)) => format!("{role} units"),
            (false, None) => "all units".to_string(),
        };
        let bound = stage
            .bound()
            .map(|n| format!(", at most {n} at a time"))
            .unwrap_or_default();
        stages.push(format!("  {:<22} {units}{bound}", stage.name()).into());
    }
    printer.push_block(stages);

    let mut units: Vec<Cow<'static, str>> = vec![format!("{} work units:", decomposition.len()).into()];
    for unit in decomposition
        .calibrators
        .iter()
        .chain(decomposition.targets.iter())
    {
        units.push(
            format!(
                "  {}: {} subbands -> {}",
                unit.id(),
                unit.inputs().len(),
                unit.output_dir().display()
            )
            .into(),
        );
    }
    printer.push_block(units);
    printer.display();

    if let Some(files) = &config.target_msin {
        info!(
            "Explicit target inputs: {}",
            files.iter().map(|f| f.display()).join(", ")
        );
    }
}

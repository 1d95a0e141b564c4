// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command-line interface code. More specific options for `rsm-imaging`
//! subcommands are contained in modules.
//!
//! Only 3 things should be public in this module: `Rsm`, `Rsm::run`, and
//! `RsmError`.

mod error;
mod mask;
mod noise;
mod printers;
mod run;

pub use error::RsmError;
pub(crate) use printers::{display_warnings, InfoPrinter, Warn};

use clap::{AppSettings, Args, Parser, Subcommand};
use log::info;

use crate::PROGRESS_BARS;

// Add build-time information from the "built" crate.
include!(concat!(env!("OUT_DIR"), "/built.rs"));

#[derive(Debug, Parser)]
#[clap(
    name = "rsm-imaging",
    version,
    author,
    about = r#"Batch imaging pipeline for LOFAR Radio Sky Monitor (RSM) observations.
Calibration and imaging are done by the LOFAR tools (NDPPP, calibrate-stand-alone, awimager);
this program runs them over every beam and band of an observation."#
)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_subcommands = true)]
#[clap(propagate_version = true)]
#[clap(infer_long_args = true)]
pub struct Rsm {
    #[clap(flatten)]
    global_opts: GlobalArgs,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Don't draw progress bars.
    #[clap(long)]
    #[clap(global = true)]
    no_progress_bars: bool,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    #[clap(global = true)]
    verbosity: u8,

    /// Only find the input data and print out the plan of the run; no tools
    /// are run.
    #[clap(long)]
    #[clap(global = true)]
    dry_run: bool,

    /// Don't delete the scratch directory at the end of the run.
    #[clap(long)]
    #[clap(global = true)]
    keep_scratch: bool,
}

#[derive(Debug, Subcommand)]
#[clap(arg_required_else_help = true)]
enum Command {
    #[clap(alias = "image")]
    #[clap(about = "Calibrate and image every beam and band of an observation.")]
    Run(run::RunArgs),

    #[clap(about = "Draw the sources of a sky model into a FITS mask image.")]
    Mask(mask::MaskArgs),

    #[clap(about = "Estimate the noise of a FITS image, and the cleaning threshold from it.")]
    Noise(noise::NoiseArgs),
}

impl Rsm {
    pub fn run(self) -> Result<(), RsmError> {
        // Set up logging.
        let GlobalArgs {
            no_progress_bars,
            verbosity,
            dry_run,
            keep_scratch,
        } = self.global_opts;
        setup_logging(verbosity).expect("Failed to initialise logging.");
        // Enable progress bars if the user didn't say "no progress bars".
        if !no_progress_bars {
            PROGRESS_BARS.store(true);
        }

        // Print the version of rsm-imaging and its build-time information.
        let sub_command = match &self.command {
            Command::Run(_) => "run",
            Command::Mask(_) => "mask",
            Command::Noise(_) => "noise",
        };
        info!("rsm-imaging {} {}", sub_command, env!("CARGO_PKG_VERSION"));
        display_build_info();

        match self.command {
            Command::Run(args) => args.run(dry_run, keep_scratch)?,
            Command::Mask(args) => args.run()?,
            Command::Noise(args) => args.run()?,
        }

        info!("rsm-imaging {} complete.", sub_command);
        Ok(())
    }
}

/// Activate a logger. All log messages are put onto `stdout`. `env_logger`
/// automatically only uses colours and fancy symbols if we're on a tty (e.g. a
/// terminal); piped output will be formatted sensibly. Source code lines are
/// displayed in log messages when verbosity >= 3.
fn setup_logging(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        2 => builder.filter_level(log::LevelFilter::Trace),
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
            builder.format(|buf, record| {
                use std::io::Write;

                let timestamp = buf.timestamp();
                let level = record.level();
                let target = record.target();
                let line = record.line().unwrap_or(0);
                let message = record.args();

                writeln!(buf, "[{timestamp} {level} {target}:{line}] {message}")
            })
        }
    };
    builder.try_init()
}

/// Write many info-level log lines of how this executable was compiled.
fn display_build_info() {
    let dirty = match GIT_DIRTY {
        Some(true) => " (dirty)",
        _ => "",
    };
    match GIT_COMMIT_HASH_SHORT {
        Some(hash) => {
            info!("Compiled on git commit hash: {hash}{dirty}");
        }
        None => info!("Compiled on git commit hash: <no git info>"),
    }
    if let Some(hr) = GIT_HEAD_REF {
        info!("            git head ref: {}", hr);
    }
    info!("            {}", BUILT_TIME_UTC);
    info!("         with compiler {}", RUSTC_VERSION);
    info!("");
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Batch imaging pipeline for LOFAR Radio Sky Monitor observations.

Observations are decomposed into beam × band work units, which are driven
through a fixed sequence of calibration and imaging stages. Almost all of the
numerical work is done by external LOFAR tools; this crate orchestrates them,
and rasterizes sky models into clean masks.
 */

pub mod catalog;
mod cli;
pub mod constants;
pub mod fits;
pub mod imaging;
mod io;
pub mod mask;
pub mod noise;
pub mod parset;
pub mod pipeline;
pub mod scratch;
pub mod tool;
pub mod units;

// Re-exports.
pub use cli::{Rsm, RsmError};

use crossbeam_utils::atomic::AtomicCell;

/// Should progress bars be drawn? This is set once by the CLI.
pub(crate) static PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);

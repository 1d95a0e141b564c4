// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

The mask constants are shared with downstream users of the masks; do not change
them.
 */

/// Padding added to both axes of every sky-model source before it is
/// rasterized into a clean mask [arcseconds].
pub const MASK_PAD_ARCSEC: f64 = 500.0;

/// The WENSS restoring beam width. Point sources (and Gaussians with a zero
/// axis, which WENSS writes for unresolved sources) are given this size
/// [arcseconds].
pub const WENSS_BEAM_ARCSEC: f64 = 54.0;

/// The polarisation plane used for noise estimation. This is index 3, which for
/// an IQUV image is Stokes V. Nobody is sure whether that is intended.
pub const NOISE_STOKES_PLANE: usize = 3;

/// The default half-width of the box used for noise estimation [pixels].
pub const DEFAULT_NOISE_BOX_SIZE: usize = 25;

/// The default multiplier applied to the noise estimate to get the cleaning
/// threshold.
pub const DEFAULT_NOISE_MULTIPLIER: f64 = 1.0;

/// Environment variables that must not be propagated from an initialisation
/// script into a tool's environment.
pub const ENV_DENYLIST: &[&str] = &["module", "BASH_FUNC_module%%", "BASH_FUNC_module()"];

/// The shell used to source initialisation scripts.
pub const INIT_SHELL: &str = "/bin/sh";

/// Arcseconds to radians.
pub(crate) const ARCSEC_TO_RAD: f64 = std::f64::consts::PI / (180.0 * 3600.0);

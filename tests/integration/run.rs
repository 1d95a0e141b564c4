// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `run` subcommand, without any LOFAR tools; only dry runs can get past
//! decomposition.

use std::fs;
use std::path::PathBuf;

use indoc::formatdoc;
use tempfile::{tempdir, TempDir};

use crate::*;

/// An observation L1 with two beams of `num_subbands` subbands each.
fn layout(num_subbands: usize) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let d = dir.path();
    for beam in 0..2 {
        for sb in 0..num_subbands {
            let ms = d
                .join("input")
                .join("L1")
                .join(format!("L1_SAP{beam:03}_SB{sb:03}_uv.MS.dppp"));
            fs::create_dir_all(ms).unwrap();
        }
        fs::write(
            d.join(format!("beam{beam}.skymodel")),
            "format = Name, Type, Ra, Dec, I\n",
        )
        .unwrap();
    }

    let parset = d.join("imaging.parset");
    fs::write(
        &parset,
        formatdoc! {"
            input_dir = {d}/input
            output_dir = {d}/output
            scratch_dir = {d}/scratch
            target_obsid = L1
            n_beams = 2
            band_size = [2, 2]
            skymodels = [{d}/beam0.skymodel, {d}/beam1.skymodel]
            calibrate.parset.Strategy.Steps = [solve]
            combine.parset.steps = []
            image.parset.cellsize = 30arcsec
            image.parset.npix = 64
            image.parset.stokes = I
            noise.parset.npix = 64
            awimager.max_parallel = 2
            ",
            d = d.display(),
        },
    )
    .unwrap();
    (dir, parset)
}

#[test]
fn test_dry_run_prints_the_plan() {
    let (dir, parset) = layout(4);
    let (stdout, stderr) = get_cmd_output(
        rsm_imaging()
            .args(["run", "--dry-run", "--no-progress-bars"])
            .arg(&parset)
            .ok(),
    );
    assert!(stderr.is_empty(), "{stderr}");
    assert!(stdout.contains("4 work units"), "{stdout}");
    assert!(stdout.contains("target L1 SAP001 band 1: 2 subbands"), "{stdout}");
    for stage in [
        "stage_inputs",
        "calibrate_targets",
        "combine",
        "strip_bad_stations",
        "estimate_noise",
        "make_mask",
        "make_image",
        "write_manifest",
    ] {
        assert!(stdout.contains(stage), "{stage} missing from {stdout}");
    }
    assert!(stdout.contains("at most 2 at a time"), "{stdout}");
    assert!(!stdout.contains("transfer_solutions"));

    // Output directories exist, but nothing was produced, and the scratch area
    // is gone.
    let beam1 = dir.path().join("output/target/L1/SAP001");
    assert!(beam1.is_dir());
    assert_eq!(fs::read_dir(&beam1).unwrap().count(), 0);
    assert_eq!(
        fs::read_dir(dir.path().join("scratch")).unwrap().count(),
        0
    );
}

#[test]
fn test_keep_scratch() {
    let (dir, parset) = layout(4);
    rsm_imaging()
        .args(["run", "--dry-run", "--keep-scratch"])
        .arg(&parset)
        .assert()
        .success();
    assert_eq!(
        fs::read_dir(dir.path().join("scratch")).unwrap().count(),
        1
    );
}

#[test]
fn test_inventory_mismatch() {
    let (_dir, parset) = layout(3);
    let result = rsm_imaging().args(["run", "--dry-run"]).arg(&parset).ok();
    assert!(result.is_err());
    let (_, stderr) = get_cmd_output(result);
    assert!(
        stderr.contains("expected 4 subband files, but found 3"),
        "{stderr}"
    );
    assert!(stderr.contains("band_size"), "{stderr}");
}

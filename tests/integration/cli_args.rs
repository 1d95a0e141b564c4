// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::*;

#[test]
fn test_help_lists_subcommands() {
    let (stdout, _) = get_cmd_output(rsm_imaging().arg("--help").ok());
    for sub_command in ["run", "mask", "noise"] {
        assert!(stdout.contains(sub_command), "{stdout}");
    }
    assert!(stdout.contains("--dry-run"));
    assert!(stdout.contains("--keep-scratch"));
}

#[test]
fn test_version() {
    let (stdout, _) = get_cmd_output(rsm_imaging().arg("--version").ok());
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")), "{stdout}");
}

#[test]
fn test_no_subcommand_fails() {
    rsm_imaging().assert().failure();
}

#[test]
fn test_missing_parset() {
    let dir = tempfile::tempdir().unwrap();
    let result = rsm_imaging()
        .arg("run")
        .arg(dir.path().join("nothing.parset"))
        .ok();
    assert!(result.is_err());
    let (_, stderr) = get_cmd_output(result);
    assert!(stderr.starts_with("Error:"), "{stderr}");
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use approx::assert_abs_diff_eq;
use indoc::indoc;
use tempfile::tempdir;

use super::*;

const EXAMPLE: &str = indoc! {r#"
    # Settings for a test observation
    input_dir = /data/rsm
    target_obsid = L123456
    n_beams = 2
    band_size = [4, 4]
    skymodels = ["a.skymodel", "b.skymodel"]   # one per beam

    limit.max_baseline = 10000.5
    combine.parset.steps = []
    combine.parset.msin.datacolumn = CORRECTED_DATA
    combine.parset.msout.overwrite = true
"#};

#[test]
fn test_parse_and_typed_get() {
    let p: Parset = EXAMPLE.parse().unwrap();
    assert_eq!(p.len(), 9);
    assert_eq!(p.get::<String>("input_dir").unwrap(), "/data/rsm");
    assert_eq!(p.get::<usize>("n_beams").unwrap(), 2);
    assert_eq!(p.get::<i64>("n_beams").unwrap(), 2);
    assert_abs_diff_eq!(p.get::<f64>("limit.max_baseline").unwrap(), 10000.5);
    assert_eq!(p.get_vector::<usize>("band_size").unwrap(), vec![4, 4]);
    assert_eq!(
        p.get_vector::<String>("skymodels").unwrap(),
        vec!["a.skymodel".to_string(), "b.skymodel".to_string()]
    );
    assert!(p
        .get_vector::<String>("combine.parset.steps")
        .unwrap()
        .is_empty());
    assert!(p.get::<bool>("combine.parset.msout.overwrite").unwrap());
}

#[test]
fn test_missing_key_is_distinct_from_type_error() {
    let p: Parset = EXAMPLE.parse().unwrap();

    let result = p.get::<f64>("noise.multiplier");
    assert!(matches!(result, Err(ParsetError::MissingKey { .. })));

    let result = p.get::<usize>("input_dir");
    match result {
        Err(ParsetError::Type {
            key,
            value,
            expected,
        }) => {
            assert_eq!(key, "input_dir");
            assert_eq!(value, "/data/rsm");
            assert_eq!(expected, "unsigned integer");
        }
        _ => panic!("expected a type error, got {result:?}"),
    }

    // Scalars aren't vectors.
    let result = p.get_vector::<usize>("n_beams");
    assert!(matches!(result, Err(ParsetError::Type { .. })));
}

#[test]
fn test_get_opt_and_get_or() {
    let p: Parset = EXAMPLE.parse().unwrap();
    assert_eq!(p.get_opt::<usize>("n_beams").unwrap(), Some(2));
    assert_eq!(p.get_opt::<usize>("n_bands").unwrap(), None);
    assert!(p.get_opt::<usize>("input_dir").is_err());
    assert_abs_diff_eq!(p.get_or("noise.multiplier", 3.0).unwrap(), 3.0);
}

#[test]
fn test_subset_matches_unprefixed_get() {
    let p: Parset = EXAMPLE.parse().unwrap();
    let subset = p.subset("combine.parset");
    assert_eq!(subset.len(), 3);
    for key in subset.keys() {
        assert_eq!(
            subset.get_raw(key).unwrap(),
            p.get_raw(&format!("combine.parset.{key}")).unwrap()
        );
    }
    assert_eq!(
        subset.get::<String>("msin.datacolumn").unwrap(),
        p.get::<String>("combine.parset.msin.datacolumn").unwrap()
    );

    // A trailing dot on the prefix is tolerated.
    assert_eq!(p.subset("combine.parset."), subset);

    // The prefix must match whole key components.
    assert!(p.subset("combine.pars").is_empty());
}

#[test]
fn test_subset_of_nothing_is_empty() {
    let p: Parset = EXAMPLE.parse().unwrap();
    let subset = p.subset("phaseonly.parset");
    assert!(subset.is_empty());
    assert!(matches!(
        subset.get::<String>("anything"),
        Err(ParsetError::MissingKey { .. })
    ));
}

#[test]
fn test_patch_returns_new_instance() {
    let p: Parset = EXAMPLE.parse().unwrap();
    let patched = p.patch([("n_beams", "6"), ("msout", "/tmp/out.MS")]);
    assert_eq!(patched.get::<usize>("n_beams").unwrap(), 6);
    assert_eq!(patched.get::<String>("msout").unwrap(), "/tmp/out.MS");
    // The original is untouched.
    assert_eq!(p.get::<usize>("n_beams").unwrap(), 2);
    assert!(!p.contains("msout"));
    // Patching keeps the key order, with new keys at the end.
    assert_eq!(patched.keys().next(), Some("input_dir"));
    assert_eq!(patched.keys().last(), Some("msout"));
}

#[test]
fn test_get_path_substitutes_cwd() {
    let p: Parset = "working_dir = {cwd}/logs\nplain = /a/b".parse().unwrap();
    let cwd = std::env::current_dir().unwrap();
    assert_eq!(p.get_path("working_dir").unwrap(), cwd.join("logs"));
    assert_eq!(p.get_path("plain").unwrap(), PathBuf::from("/a/b"));
}

#[test]
fn test_malformed_line() {
    let result = "a = 1\nthis line has no equals sign\n".parse::<Parset>();
    match result {
        Err(ParsetError::Parse { line, text, .. }) => {
            assert_eq!(line, 2);
            assert_eq!(text, "this line has no equals sign");
        }
        _ => panic!("expected a parse error, got {result:?}"),
    }
}

#[test]
fn test_comment_inside_quotes_is_kept() {
    let p: Parset = r#"select = "sumsqr(UVW[:2]) < 1e8 # not a comment""#
        .parse()
        .unwrap();
    assert_eq!(
        p.get::<String>("select").unwrap(),
        "sumsqr(UVW[:2]) < 1e8 # not a comment"
    );
}

#[test]
fn test_materialize_round_trip_and_cleanup() {
    let dir = tempdir().unwrap();
    let p: Parset = EXAMPLE.parse().unwrap();
    let subset = p.subset("combine.parset");

    let file = subset.materialize(dir.path()).unwrap();
    let path = file.path().to_path_buf();
    assert!(path.starts_with(dir.path()));
    assert_eq!(Parset::read(&path).unwrap(), subset);

    drop(file);
    assert!(!path.exists());
}

#[test]
fn test_patched_file_can_be_retained() {
    let dir = tempdir().unwrap();
    let p: Parset = EXAMPLE.parse().unwrap();
    let file = p
        .subset("combine.parset")
        .patched_file(dir.path(), [("msout", "combined.MS")])
        .unwrap();
    let path = file.retain().unwrap();
    assert!(path.exists());
    let read = Parset::read(&path).unwrap();
    assert_eq!(read.get::<String>("msout").unwrap(), "combined.MS");
}

#[test]
fn test_format_vector() {
    assert_eq!(format_vector::<String>(&[]), "[]");
    assert_eq!(format_vector(&["a.MS", "b.MS"]), "[a.MS, b.MS]");
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Bad-station reports and the table queries that act on them.

use std::path::Path;

use itertools::Itertools;

/// Read the stations flagged as bad out of a `stats.tab` report. Comment lines
/// start with `#`; a station is bad if the last field of its line is `True`,
/// and its name is the second field.
pub fn parse_bad_stations(report: &str) -> Vec<String> {
    report
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| {
            let fields: Vec<&str> = l.split_whitespace().collect();
            match (fields.get(1), fields.last()) {
                (Some(name), Some(&"True")) => Some(name.to_string()),
                _ => None,
            }
        })
        .collect()
}

pub fn read_bad_stations(report: &Path) -> std::io::Result<Vec<String>> {
    Ok(parse_bad_stations(&std::fs::read_to_string(report)?))
}

/// A TaQL command deep-copying `msin` to `msout` without any baseline that
/// involves a bad station.
pub fn strip_stations_query(msin: &Path, bad_stations: &[String], msout: &Path) -> String {
    let (msin, msout) = (msin.display(), msout.display());
    if bad_stations.is_empty() {
        return format!("select from {msin} giving {msout} as plain");
    }
    let names = bad_stations.iter().map(|s| format!("'{s}'")).join(", ");
    format!(
        "select from {msin} where all([ANTENNA1, ANTENNA2] not in \
         [select rowid() from {msin}::ANTENNA where NAME in [{names}]]) \
         giving {msout} as plain"
    )
}

/// A TaQL command making a reference table of `msin` with only the baselines
/// shorter than `max_baseline` [metres].
pub fn limit_baselines_query(msin: &Path, max_baseline: f64, msout: &Path) -> String {
    format!(
        "select from {} where sumsqr(UVW[:2]) < {:.1e} giving {}",
        msin.display(),
        max_baseline * max_baseline,
        msout.display()
    )
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading BBS ("makesourcedb") text sky models.
//!
//! A sky model starts with a format line naming its columns, e.g.
//!
//! ```text
//! # (Name, Type, Ra, Dec, I, ReferenceFrequency='60e6', SpectralIndex='[]', MajorAxis, MinorAxis, Orientation) = format
//! 3C196, POINT, 08:13:36.06, +48.13.02.6, 153.0, , [-0.56, -0.05]
//! wenss1, GAUSSIAN, 08:20:01.2, +47.30.11.0, 1.2, , , 120.0, 80.0, 35.0
//! ```
//!
//! Only the columns needed for masking are interpreted. Patch lines (those
//! without a name) are skipped.

mod error;

pub use error::CatalogError;

use std::path::Path;

use log::debug;

use crate::cli::Warn;

/// The kind of a sky-model component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Point,
    Gaussian,
    Unknown(String),
}

impl SourceKind {
    fn parse(s: &str) -> SourceKind {
        match s.to_ascii_uppercase().as_str() {
            "POINT" => SourceKind::Point,
            "GAUSSIAN" => SourceKind::Gaussian,
            _ => SourceKind::Unknown(s.to_string()),
        }
    }
}

/// One source from a sky model.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub name: String,
    pub kind: SourceKind,
    /// [radians]
    pub ra: f64,
    /// [radians]
    pub dec: f64,
    /// Full width of the major axis [arcseconds]. Zero if not given.
    pub major_axis: f64,
    /// [arcseconds]
    pub minor_axis: f64,
    /// Position angle [degrees].
    pub orientation: f64,
}

/// Column positions (and defaults) from a format line.
struct Format {
    columns: Vec<(String, Option<String>)>,
}

impl Format {
    fn parse(line: &str) -> Option<Format> {
        let line = line.trim_start_matches('#').trim();
        let spec = if let Some(rest) = line.strip_prefix("format") {
            // "format = Name, Type, ..."
            rest.trim_start().strip_prefix('=')?.trim()
        } else {
            // "(Name, Type, ...) = format"
            let (spec, tail) = line.rsplit_once('=')?;
            if tail.trim() != "format" {
                return None;
            }
            spec.trim().trim_start_matches('(').trim_end_matches(')')
        };
        let columns = split_fields(spec)
            .into_iter()
            .map(|col| match col.split_once('=') {
                Some((name, default)) => (
                    name.trim().to_string(),
                    Some(default.trim().trim_matches('\'').trim_matches('"').to_string()),
                ),
                None => (col.trim().to_string(), None),
            })
            .collect();
        Some(Format { columns })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|(c, _)| c.eq_ignore_ascii_case(name))
    }

    fn require(&self, name: &'static str) -> Result<usize, CatalogError> {
        self.position(name).ok_or(CatalogError::MissingColumn(name))
    }

    /// The value of column `i` on a line, falling back to the column's
    /// default. Empty values count as absent.
    fn value<'a>(&'a self, fields: &'a [&'a str], i: usize) -> Option<&'a str> {
        fields
            .get(i)
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .or_else(|| self.columns[i].1.as_deref().filter(|d| !d.is_empty()))
    }
}

/// Split on commas that aren't inside brackets or quotes.
fn split_fields(s: &str) -> Vec<&str> {
    let mut fields = vec![];
    let mut depth = 0_i32;
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '\'' | '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => depth += 1,
            ']' if !in_quotes => depth -= 1,
            ',' if !in_quotes && depth == 0 => {
                fields.push(&s[start..i]);
                start = i + 1;
            }
            _ => (),
        }
    }
    fields.push(&s[start..]);
    fields
}

/// Parse sexagesimal components `a`, `b`, `c` into `a + b/60 + c/3600`,
/// carrying the sign of `a`.
fn sexagesimal(parts: &[&str]) -> Option<f64> {
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let negative = parts[0].trim().starts_with('-');
    let mut value = 0.0;
    for (part, scale) in parts.iter().zip([1.0, 60.0, 3600.0]) {
        let v: f64 = part.trim().trim_start_matches(['+', '-']).parse().ok()?;
        value += v / scale;
    }
    Some(if negative { -value } else { value })
}

/// A value with an explicit "deg" or "rad" unit, in radians.
fn with_unit(s: &str) -> Option<f64> {
    if let Some(v) = s.strip_suffix("deg") {
        v.trim().parse::<f64>().ok().map(f64::to_radians)
    } else if let Some(v) = s.strip_suffix("rad") {
        v.trim().parse().ok()
    } else {
        None
    }
}

/// Parse a right ascension into radians. Accepted forms are `hh:mm:ss.s`,
/// `hhHmmMss.sS` and numbers with a `deg` or `rad` unit. Bare numbers are
/// taken to be degrees.
pub fn parse_ra(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Some(v) = with_unit(s) {
        return Some(v);
    }
    let hours = if s.contains(':') {
        sexagesimal(&s.split(':').collect::<Vec<_>>())?
    } else if s.contains(['h', 'H']) {
        let parts: Vec<&str> = s
            .split(['h', 'H', 'm', 'M', 's', 'S'])
            .filter(|p| !p.is_empty())
            .collect();
        sexagesimal(&parts)?
    } else {
        return s.parse::<f64>().ok().map(f64::to_radians);
    };
    Some((hours * 15.0).to_radians())
}

/// Parse a declination into radians. Accepted forms are `dd.mm.ss.s`,
/// `dd:mm:ss.s`, `ddDmmMss.sS` and numbers with a `deg` or `rad` unit. Bare
/// numbers are taken to be degrees.
pub fn parse_dec(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Some(v) = with_unit(s) {
        return Some(v);
    }
    let degrees = if s.contains(':') {
        sexagesimal(&s.split(':').collect::<Vec<_>>())?
    } else if s.contains(['d', 'D']) {
        let parts: Vec<&str> = s
            .split(['d', 'D', 'm', 'M', 's', 'S'])
            .filter(|p| !p.is_empty())
            .collect();
        sexagesimal(&parts)?
    } else if s.matches('.').count() >= 2 {
        // dd.mm.ss[.s]; the fourth part is the fractional seconds.
        let parts: Vec<&str> = s.splitn(4, '.').collect();
        let seconds = match parts.get(3) {
            Some(frac) => format!("{}.{frac}", parts[2]),
            None => parts[2].to_string(),
        };
        sexagesimal(&[parts[0], parts[1], &seconds])?
    } else {
        s.parse::<f64>().ok()?
    };
    Some(degrees.to_radians())
}

/// Parse the text of a sky model.
pub fn parse_skymodel(text: &str) -> Result<Vec<SourceRecord>, CatalogError> {
    let mut format = None;
    let mut sources = vec![];

    for (i, line) in text.lines().enumerate() {
        let line_num = i + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if format.is_none() {
            if let Some(f) = Format::parse(trimmed) {
                format = Some(f);
                continue;
            }
        }
        if trimmed.starts_with('#') {
            continue;
        }
        let format = format.as_ref().ok_or(CatalogError::NoFormat)?;
        let name_col = format.require("Name")?;
        let type_col = format.require("Type")?;
        let ra_col = format.require("Ra")?;
        let dec_col = format.require("Dec")?;

        let fields = split_fields(trimmed);
        let name = match format.value(&fields, name_col) {
            Some(n) => n.to_string(),
            // Patch definition.
            None => continue,
        };
        let kind = SourceKind::parse(format.value(&fields, type_col).unwrap_or("POINT"));

        let parse_angle = |col: usize, field: &'static str, f: fn(&str) -> Option<f64>| {
            let value = format.value(&fields, col).unwrap_or("");
            f(value).ok_or_else(|| CatalogError::Parse {
                line_num,
                field,
                value: value.to_string(),
            })
        };
        let ra = parse_angle(ra_col, "Ra", parse_ra)?;
        let dec = parse_angle(dec_col, "Dec", parse_dec)?;

        // Empty shape fields are zero.
        let parse_float = |name: &'static str| -> Result<f64, CatalogError> {
            match format.position(name).and_then(|c| format.value(&fields, c)) {
                None => Ok(0.0),
                Some(v) => v.parse().map_err(|_| CatalogError::Parse {
                    line_num,
                    field: name,
                    value: v.to_string(),
                }),
            }
        };
        let major_axis = parse_float("MajorAxis")?;
        let minor_axis = parse_float("MinorAxis")?;
        let orientation = parse_float("Orientation")?;

        if let SourceKind::Unknown(k) = &kind {
            format!("Sky model line {line_num}: source {name} has unknown type '{k}'").warn();
        }
        sources.push(SourceRecord {
            name,
            kind,
            ra,
            dec,
            major_axis,
            minor_axis,
            orientation,
        });
    }

    if format.is_none() {
        return Err(CatalogError::NoFormat);
    }
    debug!("Read {} sky-model sources", sources.len());
    Ok(sources)
}

/// Read a sky model file.
pub fn read_skymodel<P: AsRef<Path>>(path: P) -> Result<Vec<SourceRecord>, CatalogError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::IO {
        path: path.to_path_buf(),
        source,
    })?;
    parse_skymodel(&text)
}

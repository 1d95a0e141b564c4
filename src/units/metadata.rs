// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The per-unit metadata bag.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::Serialize;

use super::MetadataError;

/// A value produced by a stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Path(PathBuf),
    Paths(Vec<PathBuf>),
    Float(f64),
    Strings(Vec<String>),
}

/// What the stages have produced for a unit so far. Keys can only be added;
/// a stage never overwrites another stage's key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: BTreeMap<String, MetaValue>,
}

impl Metadata {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn insert<K: Into<String>>(&mut self, key: K, value: MetaValue) -> Result<(), MetadataError> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(MetadataError::AlreadySet { key });
        }
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&MetaValue, MetadataError> {
        self.entries.get(key).ok_or_else(|| MetadataError::Missing {
            key: key.to_string(),
        })
    }

    pub fn get_path(&self, key: &str) -> Result<&Path, MetadataError> {
        match self.get(key)? {
            MetaValue::Path(p) => Ok(p),
            _ => Err(wrong_type(key, "path")),
        }
    }

    pub fn get_paths(&self, key: &str) -> Result<&[PathBuf], MetadataError> {
        match self.get(key)? {
            MetaValue::Paths(p) => Ok(p),
            _ => Err(wrong_type(key, "list of paths")),
        }
    }

    pub fn get_float(&self, key: &str) -> Result<f64, MetadataError> {
        match self.get(key)? {
            MetaValue::Float(f) => Ok(*f),
            _ => Err(wrong_type(key, "float")),
        }
    }

    pub fn get_strings(&self, key: &str) -> Result<&[String], MetadataError> {
        match self.get(key)? {
            MetaValue::Strings(s) => Ok(s),
            _ => Err(wrong_type(key, "list of strings")),
        }
    }
}

fn wrong_type(key: &str, expected: &'static str) -> MetadataError {
    MetadataError::WrongType {
        key: key.to_string(),
        expected,
    }
}

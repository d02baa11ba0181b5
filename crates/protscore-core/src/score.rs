//! Typed score records
//!
//! A plugin declares its score names once. Every [`Score`] it returns shares
//! that name list and carries exactly one value per name, so a record can never
//! be missing a key or carry an extra one.

use crate::error::{Error, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Ordered, non-empty, duplicate-free list of score names
#[derive(Clone, PartialEq, Eq)]
pub struct ScoreNames(Arc<[String]>);

impl ScoreNames {
    /// Create a name list, rejecting empty lists, blank names, and duplicates
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        if names.is_empty() {
            return Err(Error::config("a plugin must declare at least one score name"));
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.trim().is_empty() {
                return Err(Error::config("score names must not be blank"));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::config(format!("duplicate score name '{}'", name)));
            }
        }

        Ok(Self(names.into()))
    }

    /// Number of names
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Never true for a constructed list
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names in declaration order
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Position of a name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n == name)
    }

    /// Owned copy of the names
    pub fn to_vec(&self) -> Vec<String> {
        self.0.to_vec()
    }
}

impl fmt::Debug for ScoreNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Scores for one sequence, keyed by the plugin's score names
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    names: ScoreNames,
    values: Vec<f32>,
}

impl Score {
    /// Zip a model output row with the declared names.
    ///
    /// The row must carry exactly one value per name.
    pub fn from_row(names: &ScoreNames, values: Vec<f32>) -> Result<Self> {
        if values.len() != names.len() {
            return Err(Error::shape(format!(
                "score row has {} values but {} score names are declared",
                values.len(),
                names.len()
            )));
        }

        Ok(Self {
            names: names.clone(),
            values,
        })
    }

    /// Value for a score name
    pub fn get(&self, name: &str) -> Option<f32> {
        self.names.index_of(name).map(|idx| self.values[idx])
    }

    /// Iterate `(name, value)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.names
            .as_slice()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Names this record is keyed by
    pub fn names(&self) -> &ScoreNames {
        &self.names
    }

    /// Values in declaration order
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of entries (always equal to the number of score names)
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false for a record built by `from_row`
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Convert into a plain map
    pub fn to_map(&self) -> BTreeMap<String, f32> {
        self.iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

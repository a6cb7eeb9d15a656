//! Class label table
//!
//! Maps class ids returned by the classifier to display names. The table is
//! built once before inference and has no mutators.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;
use crate::types::ClassId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelTable {
    entries: BTreeMap<ClassId, String>,
}

impl LabelTable {
    pub fn new(entries: BTreeMap<ClassId, String>) -> Self {
        Self { entries }
    }

    /// Assign ids 1, 2, 3, ... to `names` in order
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = names
            .into_iter()
            .zip(1..)
            .map(|(name, id)| (id, name.into()))
            .collect();
        Self { entries }
    }

    /// Look up the display name of a class
    pub fn resolve(&self, id: ClassId) -> Result<&str, TrackerError> {
        self.entries
            .get(&id)
            .map(String::as_str)
            .ok_or(TrackerError::UnknownLabel(id))
    }

    /// First id in `1..=class_count` without an entry, if any
    pub fn first_missing(&self, class_count: ClassId) -> Option<ClassId> {
        (1..=class_count).find(|id| !self.entries.contains_key(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &str)> {
        self.entries.iter().map(|(id, name)| (*id, name.as_str()))
    }
}

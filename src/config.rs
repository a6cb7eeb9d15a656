//! Run configuration
//!
//! Class count, per-class quota and the label table are fixed before a run
//! starts. They are read from a JSON file and may be overridden from the
//! command line.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;
use crate::labels::LabelTable;
use crate::transport::DEFAULT_PORT;
use crate::types::ClassId;

/// Default number of samples recorded per class
pub const DEFAULT_SAMPLES_PER_CLASS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// UDP address the tracker sends to
    pub listen: SocketAddr,
    /// Samples recorded for each class
    pub samples_per_class: usize,
    /// Number of classes to record; defaults to the number of labels
    pub class_count: Option<ClassId>,
    /// Display names keyed by class id
    pub labels: LabelTable,
    /// Fixed seed for the dataset shuffle (reproducible runs)
    pub shuffle_seed: Option<u64>,
    /// Write the collected dataset here, in libsvm format, before training
    pub export_dataset: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            samples_per_class: DEFAULT_SAMPLES_PER_CLASS,
            class_count: None,
            labels: LabelTable::default(),
            shuffle_seed: None,
            export_dataset: None,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, TrackerError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, TrackerError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Effective number of classes
    pub fn classes(&self) -> ClassId {
        self.class_count.unwrap_or(self.labels.len() as ClassId)
    }

    /// Check the settings that must hold before a run can start
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.samples_per_class == 0 {
            return Err(TrackerError::Config(
                "samples_per_class must be at least 1".to_string(),
            ));
        }

        let classes = self.classes();
        if classes == 0 {
            return Err(TrackerError::Config(
                "at least one class is required (set labels or class_count)".to_string(),
            ));
        }

        if let Some(missing) = self.labels.first_missing(classes) {
            return Err(TrackerError::Config(format!(
                "class {} of {} has no label",
                missing, classes
            )));
        }

        Ok(())
    }
}

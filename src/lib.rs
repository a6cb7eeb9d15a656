//! osf-expression - Facial expression training and live classification
//!
//! Consumes OpenSeeFace tracking packets from UDP and runs them through a
//! fixed pipeline: wire decoding → feature projection → per-class sample
//! collection → dataset shuffling → training → continuous inference.
//!
//! ## Modules
//!
//! - **Decoding**: [`decoder`] parses the fixed 1785-byte packet layout
//! - **Features**: [`features`] projects frames onto the canonical feature order
//! - **Collection**: [`collector`] and [`dataset`] assemble labeled training data
//! - **Orchestration**: [`pipeline`] sequences collection, training and inference
//! - **Classifier**: [`classifier`] defines the trainer/predictor boundary

pub mod classifier;
pub mod collector;
pub mod config;
pub mod dataset;
pub mod decoder;
pub mod error;
pub mod features;
pub mod labels;
pub mod logging;
pub mod pipeline;
pub mod transport;
pub mod types;

pub use classifier::{CentroidTrainer, Classifier, Trainer};
pub use config::Config;
pub use decoder::{FrameDecoder, FRAME_SIZE};
pub use error::{FormatError, TrackerError, TrainingError};
pub use features::{FeatureProjector, FeatureVector, FEATURE_COUNT, PROJECTION_VERSION};
pub use labels::LabelTable;
pub use pipeline::{Phase, Step, TrainingOrchestrator};
pub use transport::{CaptureSource, PacketSource, UdpSource};
pub use types::{ClassId, Frame, LabeledSample, Prediction};

/// Crate version reported by the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name stamped on CLI output
pub const PRODUCER_NAME: &str = "osf-expression";

//! Feature projection
//!
//! This module maps a decoded [`Frame`] onto the fixed-order numeric vector
//! handed to the classifier. The field set and order form a versioned
//! contract: every model is trained against one projection, so changing
//! [`FEATURE_FIELDS`] invalidates all previously trained models.
//!
//! Provenance metadata (timestamp, tracking id, image size) and the raw
//! landmark and PnP point clouds are deliberately left out.

use serde::{Deserialize, Serialize};

use crate::types::Frame;

/// Identifier of the projection implemented by [`FEATURE_FIELDS`]
pub const PROJECTION_VERSION: &str = "compact-v1";

/// Length of every feature vector
pub const FEATURE_COUNT: usize = 26;

/// A single projected field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureField {
    EyeBlinkRight,
    EyeBlinkLeft,
    Quaternion(QuaternionPart),
    Euler(Axis),
    Translation(Axis),
    EyeLeft,
    EyeRight,
    EyeSteepnessLeft,
    EyeUpDownLeft,
    EyeQuirkLeft,
    EyeSteepnessRight,
    EyeUpDownRight,
    EyeQuirkRight,
    MouthCornerUpDownLeft,
    MouthCornerInOutLeft,
    MouthCornerUpDownRight,
    MouthCornerInOutRight,
    MouthOpen,
    MouthWide,
}

/// Canonical feature order. Index `i` of every [`FeatureVector`] holds
/// `FEATURE_FIELDS[i]`.
pub const FEATURE_FIELDS: [FeatureField; FEATURE_COUNT] = [
    FeatureField::EyeBlinkRight,
    FeatureField::EyeBlinkLeft,
    FeatureField::Quaternion(QuaternionPart::X),
    FeatureField::Quaternion(QuaternionPart::Y),
    FeatureField::Quaternion(QuaternionPart::Z),
    FeatureField::Quaternion(QuaternionPart::W),
    FeatureField::Euler(Axis::X),
    FeatureField::Euler(Axis::Y),
    FeatureField::Euler(Axis::Z),
    FeatureField::Translation(Axis::X),
    FeatureField::Translation(Axis::Y),
    FeatureField::Translation(Axis::Z),
    FeatureField::EyeLeft,
    FeatureField::EyeRight,
    FeatureField::EyeSteepnessLeft,
    FeatureField::EyeUpDownLeft,
    FeatureField::EyeQuirkLeft,
    FeatureField::EyeSteepnessRight,
    FeatureField::EyeUpDownRight,
    FeatureField::EyeQuirkRight,
    FeatureField::MouthCornerUpDownLeft,
    FeatureField::MouthCornerInOutLeft,
    FeatureField::MouthCornerUpDownRight,
    FeatureField::MouthCornerInOutRight,
    FeatureField::MouthOpen,
    FeatureField::MouthWide,
];

/// Component of a Euler angle or translation triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

/// Component of the rotation quaternion, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuaternionPart {
    X,
    Y,
    Z,
    W,
}

impl QuaternionPart {
    pub fn index(self) -> usize {
        match self {
            QuaternionPart::X => 0,
            QuaternionPart::Y => 1,
            QuaternionPart::Z => 2,
            QuaternionPart::W => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            QuaternionPart::X => "x",
            QuaternionPart::Y => "y",
            QuaternionPart::Z => "z",
            QuaternionPart::W => "w",
        }
    }
}

impl FeatureField {
    /// Stable, human-readable name (e.g. `quaternion.w`)
    pub fn name(&self) -> String {
        match self {
            FeatureField::EyeBlinkRight => "eye_blink_right".to_string(),
            FeatureField::EyeBlinkLeft => "eye_blink_left".to_string(),
            FeatureField::Quaternion(part) => format!("quaternion.{}", part.name()),
            FeatureField::Euler(axis) => format!("euler.{}", axis.name()),
            FeatureField::Translation(axis) => format!("translation.{}", axis.name()),
            FeatureField::EyeLeft => "eye_left".to_string(),
            FeatureField::EyeRight => "eye_right".to_string(),
            FeatureField::EyeSteepnessLeft => "eye_steepness_left".to_string(),
            FeatureField::EyeUpDownLeft => "eye_updown_left".to_string(),
            FeatureField::EyeQuirkLeft => "eye_quirk_left".to_string(),
            FeatureField::EyeSteepnessRight => "eye_steepness_right".to_string(),
            FeatureField::EyeUpDownRight => "eye_updown_right".to_string(),
            FeatureField::EyeQuirkRight => "eye_quirk_right".to_string(),
            FeatureField::MouthCornerUpDownLeft => "mouth_corner_updown_left".to_string(),
            FeatureField::MouthCornerInOutLeft => "mouth_corner_inout_left".to_string(),
            FeatureField::MouthCornerUpDownRight => "mouth_corner_updown_right".to_string(),
            FeatureField::MouthCornerInOutRight => "mouth_corner_inout_right".to_string(),
            FeatureField::MouthOpen => "mouth_open".to_string(),
            FeatureField::MouthWide => "mouth_wide".to_string(),
        }
    }

    /// Read this field from a frame
    pub fn extract(&self, frame: &Frame) -> f32 {
        let e = &frame.expression;
        match *self {
            FeatureField::EyeBlinkRight => frame.eye_blink_right,
            FeatureField::EyeBlinkLeft => frame.eye_blink_left,
            FeatureField::Quaternion(part) => frame.quaternion[part.index()],
            FeatureField::Euler(axis) => frame.euler[axis.index()],
            FeatureField::Translation(axis) => frame.translation[axis.index()],
            FeatureField::EyeLeft => e.eye_left,
            FeatureField::EyeRight => e.eye_right,
            FeatureField::EyeSteepnessLeft => e.eye_steepness_left,
            FeatureField::EyeUpDownLeft => e.eye_updown_left,
            FeatureField::EyeQuirkLeft => e.eye_quirk_left,
            FeatureField::EyeSteepnessRight => e.eye_steepness_right,
            FeatureField::EyeUpDownRight => e.eye_updown_right,
            FeatureField::EyeQuirkRight => e.eye_quirk_right,
            FeatureField::MouthCornerUpDownLeft => e.mouth_corner_updown_left,
            FeatureField::MouthCornerInOutLeft => e.mouth_corner_inout_left,
            FeatureField::MouthCornerUpDownRight => e.mouth_corner_updown_right,
            FeatureField::MouthCornerInOutRight => e.mouth_corner_inout_right,
            FeatureField::MouthOpen => e.mouth_open,
            FeatureField::MouthWide => e.mouth_wide,
        }
    }
}

/// Fixed-order classifier input derived from one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f32; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(values: [f32; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Values paired with their 1-based feature index, as external
    /// trainers and predictors number them
    pub fn indexed(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.0.iter().enumerate().map(|(i, v)| (i + 1, *v))
    }
}

/// Projector from frames to feature vectors
pub struct FeatureProjector;

impl FeatureProjector {
    /// Project a frame onto the canonical feature order
    pub fn project(frame: &Frame) -> FeatureVector {
        let mut values = [0.0; FEATURE_COUNT];
        for (slot, field) in values.iter_mut().zip(FEATURE_FIELDS.iter()) {
            *slot = field.extract(frame);
        }
        FeatureVector(values)
    }

    /// Names of the projected fields, in vector order
    pub fn field_names() -> Vec<String> {
        FEATURE_FIELDS.iter().map(|f| f.name()).collect()
    }
}

//! Core types for the osf-expression pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: decoded tracking frames, labeled samples, and inference output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::FeatureVector;

/// Number of 2D facial landmarks reported per frame
pub const LANDMARK_COUNT: usize = 68;

/// Number of 3D model-space points used by the PnP pose fit
pub const PNP_POINT_COUNT: usize = 70;

/// Class identifier. Assigned sequentially from 1 as classes are recorded.
pub type ClassId = u32;

/// Eye and mouth shape coefficients carried at the tail of every packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpressionCoefficients {
    pub eye_left: f32,
    pub eye_right: f32,

    pub eye_steepness_left: f32,
    pub eye_updown_left: f32,
    pub eye_quirk_left: f32,

    pub eye_steepness_right: f32,
    pub eye_updown_right: f32,
    pub eye_quirk_right: f32,

    pub mouth_corner_updown_left: f32,
    pub mouth_corner_inout_left: f32,
    pub mouth_corner_updown_right: f32,
    pub mouth_corner_inout_right: f32,

    pub mouth_open: f32,
    pub mouth_wide: f32,
}

/// One decoded instant of face-tracking telemetry
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Capture time as reported by the tracker (seconds)
    pub timestamp: f64,
    /// Tracked face identifier
    pub id: i32,
    /// Source image width (pixels)
    pub width: f32,
    /// Source image height (pixels)
    pub height: f32,
    pub eye_blink_right: f32,
    pub eye_blink_left: f32,
    /// Whether the tracker considered this frame a successful fit
    pub success: bool,
    /// Residual of the PnP pose fit
    pub pnp_error: f32,
    /// Head rotation as a quaternion (x, y, z, w)
    pub quaternion: [f32; 4],
    /// Head rotation as Euler angles (degrees)
    pub euler: [f32; 3],
    /// Head translation in camera space
    pub translation: [f32; 3],
    pub landmark_confidence: [f32; LANDMARK_COUNT],
    /// 2D landmark positions in image space
    pub landmarks: [[f32; 2]; LANDMARK_COUNT],
    /// 3D model points after the pose fit
    pub pnp_points: [[f32; 3]; PNP_POINT_COUNT],
    pub expression: ExpressionCoefficients,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            timestamp: 0.0,
            id: 0,
            width: 0.0,
            height: 0.0,
            eye_blink_right: 0.0,
            eye_blink_left: 0.0,
            success: false,
            pnp_error: 0.0,
            quaternion: [0.0; 4],
            euler: [0.0; 3],
            translation: [0.0; 3],
            landmark_confidence: [0.0; LANDMARK_COUNT],
            landmarks: [[0.0; 2]; LANDMARK_COUNT],
            pnp_points: [[0.0; 3]; PNP_POINT_COUNT],
            expression: ExpressionCoefficients::default(),
        }
    }
}

/// A feature vector tagged with the class it was recorded for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub label: ClassId,
    pub features: FeatureVector,
}

/// One classified frame, as emitted during inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Identifier of the run that produced this prediction
    pub session_id: String,
    /// Class id returned by the classifier
    pub class_id: ClassId,
    /// Display name resolved from the label table
    pub label: String,
    /// Tracker timestamp of the classified frame
    pub frame_timestamp: f64,
    /// Tracked face identifier of the classified frame
    pub tracking_id: i32,
    /// When the frame was classified
    pub received_at: DateTime<Utc>,
}

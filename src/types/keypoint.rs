//! Keypoint frames produced by the upstream pose model

use serde::{Deserialize, Serialize};

/// A single estimated joint location in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    /// Detection confidence (0.0-1.0)
    pub confidence: f64,
}

impl Keypoint {
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }
}

/// One frame of pose output plus the image extent used for normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointFrame {
    pub keypoints: Vec<Keypoint>,
    /// Frame width in pixels
    pub width: f64,
    /// Frame height in pixels
    pub height: f64,
}

impl KeypointFrame {
    pub fn new(keypoints: Vec<Keypoint>, width: f64, height: f64) -> Self {
        Self { keypoints, width, height }
    }

    /// Frame of `len` joints, all at the origin with zero confidence
    pub fn empty(len: usize, width: f64, height: f64) -> Self {
        Self::new(vec![Keypoint::new(0.0, 0.0, 0.0); len], width, height)
    }

    /// Set one joint (builder style, handy for fixtures and replays)
    pub fn with_joint(mut self, index: usize, x: f64, y: f64, confidence: f64) -> Self {
        if index >= self.keypoints.len() {
            self.keypoints.resize(index + 1, Keypoint::new(0.0, 0.0, 0.0));
        }
        self.keypoints[index] = Keypoint::new(x, y, confidence);
        self
    }

    pub fn joint(&self, index: usize) -> Option<&Keypoint> {
        self.keypoints.get(index)
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// Usable extent for normalization
    pub fn has_dimensions(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// Joint position as fractions of the frame extent
    pub fn normalized(&self, index: usize) -> Option<(f64, f64)> {
        let kp = self.joint(index)?;
        Some((kp.x / self.width, kp.y / self.height))
    }
}

/// COCO-17 joint indices of the reference skeleton
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl Joint {
    pub fn index(self) -> usize {
        self as usize
    }
}

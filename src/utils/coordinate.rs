use std::fmt;
use anyhow::Error;
use serde::{Deserialize, Serialize};

pub const NUM_HAND_LANDMARKS: usize = 21;

/// Hand keypoint indices, wrist first, then four joints per finger from base to tip.
pub mod hand_index {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_DIP: usize = 7;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_DIP: usize = 11;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_DIP: usize = 15;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Landmark3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Landmark3D { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// from_score maps the model's right-hand probability to a label and its score.
    pub fn from_score(right_score: f32) -> (Self, f32) {
        if right_score >= 0.5 {
            (Handedness::Right, right_score)
        } else {
            (Handedness::Left, 1.0 - right_score)
        }
    }
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handedness::Left => write!(f, "Left"),
            Handedness::Right => write!(f, "Right"),
        }
    }
}

/// One detected hand: 21 frame-normalized landmarks plus what the detector knows about it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HandLandmarks {
    pub landmarks: Vec<Landmark3D>,
    pub world_landmarks: Vec<Landmark3D>,
    pub handedness: Handedness,
    pub handedness_score: f32,
    #[serde(skip)]
    pub presence: f32,
}

impl HandLandmarks {
    pub fn new(landmarks: Vec<Landmark3D>) -> Result<Self, Error> {
        if landmarks.len() != NUM_HAND_LANDMARKS {
            return Err(Error::msg(format!(
                "a hand has {} landmarks, got {}", NUM_HAND_LANDMARKS, landmarks.len()
            )))
        }
        Ok(HandLandmarks {
            landmarks,
            world_landmarks: vec![],
            handedness: Handedness::Right,
            handedness_score: 1.0,
            presence: 1.0,
        })
    }

    pub fn with_world_landmarks(mut self, world_landmarks: Vec<Landmark3D>) -> Result<Self, Error> {
        if !world_landmarks.is_empty() && world_landmarks.len() != NUM_HAND_LANDMARKS {
            return Err(Error::msg(format!(
                "a hand has {} world landmarks, got {}", NUM_HAND_LANDMARKS, world_landmarks.len()
            )))
        }
        self.world_landmarks = world_landmarks;
        Ok(self)
    }

    pub fn with_handedness(mut self, handedness: Handedness, score: f32) -> Self {
        self.handedness = handedness;
        self.handedness_score = score;
        self
    }

    pub fn with_presence(mut self, presence: f32) -> Self {
        self.presence = presence;
        self
    }

    pub fn flatten(&self) -> Vec<f32> {
        self.landmarks.iter().flat_map(|l| [l.x, l.y, l.z]).collect()
    }
}

pub fn flat_to_landmarks(values: &[f32]) -> Result<Vec<Landmark3D>, Error> {
    if values.len() != NUM_HAND_LANDMARKS * 3 {
        return Err(Error::msg(format!(
            "expected {} landmark values, got {}", NUM_HAND_LANDMARKS * 3, values.len()
        )))
    }
    Ok(values.chunks_exact(3).map(|c| Landmark3D::new(c[0], c[1], c[2])).collect())
}

#[cfg(test)]
mod tests {
    use crate::utils::coordinate::{flat_to_landmarks, HandLandmarks, Handedness, Landmark3D};

    fn ramp() -> Vec<f32> {
        (0..63).map(|v| v as f32 / 100.0).collect()
    }

    #[test]
    fn test_flat_landmarks_keep_order() {
        let hand = HandLandmarks::new(flat_to_landmarks(&ramp()).unwrap()).unwrap();
        assert_eq!(hand.landmarks[1], Landmark3D::new(0.03, 0.04, 0.05));
        assert_eq!(hand.flatten(), ramp());
    }

    #[test]
    fn test_wrong_landmark_count_is_rejected() {
        assert!(flat_to_landmarks(&[0.0; 60]).is_err());
        assert!(HandLandmarks::new(vec![Landmark3D::default(); 20]).is_err());
    }

    #[test]
    fn test_handedness_from_score() {
        assert_eq!(Handedness::from_score(0.9), (Handedness::Right, 0.9));
        let (label, score) = Handedness::from_score(0.2);
        assert_eq!(label, Handedness::Left);
        assert!((score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_hand_serializes_in_camel_case() {
        let hand = HandLandmarks::new(flat_to_landmarks(&ramp()).unwrap()).unwrap()
            .with_handedness(Handedness::Left, 0.75);
        let value = serde_json::to_value(&hand).unwrap();

        assert_eq!(value["handedness"], "Left");
        assert_eq!(value["handednessScore"], 0.75);
        assert_eq!(value["landmarks"].as_array().unwrap().len(), 21);
        assert!(value["worldLandmarks"].as_array().unwrap().is_empty());
        assert!(value.get("presence").is_none());
    }
}

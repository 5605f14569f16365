use std::fmt;
use anyhow::Error;
use serde::{Deserialize, Serialize};
use crate::config::config::ClassifierConfig;
use crate::helper::hand_helper::{count_extended, fingers_extended, mean_y};
use crate::utils::coordinate::Landmark3D;

pub const LABEL_NO_HAND: &str = "Ninguno";
pub const LABEL_UNKNOWN: &str = "Desconocido";

// Position of the index finger in the extension array.
const INDEX_FINGER: usize = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Sign {
    Hola,
    Gracias,
    PorFavor,
    Adios,
    Si,
    No,
}

impl Sign {
    /// Signs in the order their rules are evaluated.
    pub const ALL: [Sign; 6] = [Sign::Hola, Sign::Gracias, Sign::PorFavor, Sign::Adios, Sign::Si, Sign::No];

    pub fn key(&self) -> &'static str {
        match self {
            Sign::Hola => "hola",
            Sign::Gracias => "gracias",
            Sign::PorFavor => "por_favor",
            Sign::Adios => "adios",
            Sign::Si => "si",
            Sign::No => "no",
        }
    }

    pub fn label(&self) -> String {
        self.key()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Finger state shared by the rules for one hand.
struct HandFeatures {
    extended: [bool; 5],
    count: usize,
    mean_y: f32,
}

impl HandFeatures {
    fn extract(landmarks: &[Landmark3D]) -> Result<Self, Error> {
        let extended = fingers_extended(landmarks)?;
        Ok(HandFeatures {
            extended,
            count: count_extended(&extended),
            mean_y: mean_y(landmarks),
        })
    }
}

// Open hand, palm forward.
fn score_hola(f: &HandFeatures) -> f32 {
    if f.count >= 4 { 0.8 } else { 0.3 }
}

// Hand raised toward the chin.
fn score_gracias(f: &HandFeatures) -> f32 {
    if f.mean_y < 0.3 { 0.7 } else { 0.2 }
}

// Circle on the chest; no landmark test yet.
fn score_por_favor(_f: &HandFeatures) -> f32 {
    0.6
}

// Waving hand.
fn score_adios(f: &HandFeatures) -> f32 {
    if f.count >= 3 { 0.75 } else { 0.25 }
}

// Closed fist.
fn score_si(f: &HandFeatures) -> f32 {
    if f.count <= 1 { 0.7 } else { 0.2 }
}

// Index finger alone.
fn score_no(f: &HandFeatures) -> f32 {
    if f.extended[INDEX_FINGER] && f.count <= 2 { 0.75 } else { 0.25 }
}

#[derive(Debug, Clone)]
pub struct SignClassifier {
    pub min_confidence: f32,
}

impl SignClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        SignClassifier {
            min_confidence: config.min_confidence,
        }
    }

    /// score_all runs every rule against the hand, in evaluation order.
    pub fn score_all(&self, landmarks: &[Landmark3D]) -> Result<Vec<(Sign, f32)>, Error> {
        let features = HandFeatures::extract(landmarks)?;
        Ok(Sign::ALL
            .iter()
            .map(|&sign| {
                let score = match sign {
                    Sign::Hola => score_hola(&features),
                    Sign::Gracias => score_gracias(&features),
                    Sign::PorFavor => score_por_favor(&features),
                    Sign::Adios => score_adios(&features),
                    Sign::Si => score_si(&features),
                    Sign::No => score_no(&features),
                };
                (sign, score)
            })
            .collect())
    }

    /// classify picks the best scoring sign for one hand.
    ///
    /// The first rule with the strictly highest score wins. When that score is
    /// below the minimum confidence the label is `Desconocido`.
    ///
    /// # Arguments
    /// * `landmarks` - 21 frame-normalized hand landmarks
    ///
    /// # Returns
    /// * `(String, f32)` - label and confidence
    pub fn classify(&self, landmarks: &[Landmark3D]) -> Result<(String, f32), Error> {
        let mut best: Option<Sign> = None;
        let mut max_confidence = 0.0f32;

        for (sign, score) in self.score_all(landmarks)? {
            if score > max_confidence {
                max_confidence = score;
                best = Some(sign);
            }
        }

        match best {
            Some(sign) if max_confidence >= self.min_confidence => Ok((sign.label(), max_confidence)),
            _ => Ok((LABEL_UNKNOWN.to_string(), max_confidence)),
        }
    }
}

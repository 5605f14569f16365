use std::fs;
use std::path::Path;
use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TritonConfig {
    pub url: String,
    pub timeout: i32,
}

impl TritonConfig {
    pub fn new() -> Self {
        TritonConfig {
            url: "http://localhost:8001".to_string(),
            timeout: 20,
        }
    }
}

impl Default for TritonConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    Nhwc,
    Nchw,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HandLandmarkConfig {
    pub model_name: String,
    pub model_version: String,
    pub mean: f32,
    pub scale: f32,
    pub imsize: i32,
    pub layout: TensorLayout,
    pub landmarks_output: String,
    pub presence_output: String,
    pub handedness_output: String,
    pub world_landmarks_output: String,
    pub apply_sigmoid: bool,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub max_num_hands: usize,
}

impl HandLandmarkConfig {
    pub fn new() -> Self {
        HandLandmarkConfig {
            model_name: "hand_landmark".to_string(),
            model_version: "".to_string(),
            mean: 0.0,
            scale: 1.0 / 255.0,
            imsize: 224,
            layout: TensorLayout::Nhwc,
            landmarks_output: "Identity".to_string(),
            presence_output: "Identity_1".to_string(),
            handedness_output: "Identity_2".to_string(),
            world_landmarks_output: "Identity_3".to_string(),
            apply_sigmoid: true,
            min_detection_confidence: 0.7,
            min_tracking_confidence: 0.5,
            max_num_hands: 1,
        }
    }
}

impl Default for HandLandmarkConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub min_confidence: f32,
}

impl ClassifierConfig {
    pub fn new() -> Self {
        ClassifierConfig {
            min_confidence: 0.5,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Mirror frames horizontally before detection (front camera).
    pub mirror: bool,
    /// Capacity of the event channel handed to listeners.
    pub event_buffer: usize,
}

impl StreamConfig {
    pub fn new() -> Self {
        StreamConfig {
            mirror: false,
            event_buffer: 16,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub triton: TritonConfig,
    pub hand_landmark: HandLandmarkConfig,
    pub classifier: ClassifierConfig,
    pub stream: StreamConfig,
}

impl PipelineConfig {
    /// from_json_file loads the pipeline configuration from a JSON file.
    ///
    /// Fields missing from the file keep their default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, Error> {
        let config: PipelineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.hand_landmark.imsize <= 0 {
            return Err(Error::msg("hand_landmark.imsize must be positive"))
        }
        if self.hand_landmark.max_num_hands == 0 {
            return Err(Error::msg("hand_landmark.max_num_hands must be at least 1"))
        }
        if !(0.0..=1.0).contains(&self.classifier.min_confidence) {
            return Err(Error::msg("classifier.min_confidence must be within [0, 1]"))
        }
        if self.stream.event_buffer == 0 {
            return Err(Error::msg("stream.event_buffer must be at least 1"))
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::config::{PipelineConfig, TensorLayout};

    #[test]
    fn test_partial_json_keeps_defaults() {
        let raw = r#"{"triton":{"url":"http://triton:8001"},"hand_landmark":{"layout":"nchw","min_detection_confidence":0.5}}"#;
        let config = PipelineConfig::from_json_str(raw).unwrap();

        assert_eq!(config.triton.url, "http://triton:8001");
        assert_eq!(config.triton.timeout, 20);
        assert_eq!(config.hand_landmark.layout, TensorLayout::Nchw);
        assert_eq!(config.hand_landmark.min_detection_confidence, 0.5);
        assert_eq!(config.hand_landmark.imsize, 224);
        assert_eq!(config.classifier.min_confidence, 0.5);
    }

    #[test]
    fn test_invalid_min_confidence_is_rejected() {
        let raw = r#"{"classifier":{"min_confidence":1.5}}"#;
        assert!(PipelineConfig::from_json_str(raw).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(PipelineConfig::from_json_file("/nonexistent/sign-detector.json").is_err());
    }
}

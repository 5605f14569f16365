use anyhow::Error;
use opencv::core::Mat;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::config::config::PipelineConfig;
use crate::helper::hand_helper::draw_overlay;
use crate::modules::detector::HandLandmarkDetector;
use crate::modules::hand_landmark_client::HandLandmarkClient;
use crate::modules::sign_classifier::{SignClassifier, LABEL_NO_HAND};
use crate::utils::coordinate::{flat_to_landmarks, HandLandmarks};
use crate::utils::image::{bgr_to_rgb, decode_image};

/// Best guess for one frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignResult {
    pub sign: String,
    pub confidence: f32,
    /// Flat `[x0, y0, z0, x1, ...]` landmarks of the classified hand.
    pub landmarks: Option<Vec<f32>>,
}

impl SignResult {
    pub fn no_hand() -> Self {
        SignResult {
            sign: LABEL_NO_HAND.to_string(),
            confidence: 0.0,
            landmarks: None,
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Reply body for the mobile app.
#[derive(Debug, Serialize)]
struct AppReply<'a> {
    sign: &'a str,
    confidence: f32,
}

#[derive(Debug, Clone)]
pub struct SignLanguagePipeline<D> {
    detector: D,
    classifier: SignClassifier,
}

impl SignLanguagePipeline<HandLandmarkClient> {
    /// from_config connects to the landmark model and builds the pipeline.
    pub async fn from_config(config: &PipelineConfig) -> Result<Self, Error> {
        config.validate()?;
        let detector = HandLandmarkClient::connect(&config.triton, config.hand_landmark.clone()).await?;
        Ok(Self::new(detector, SignClassifier::new(config.classifier.clone())))
    }
}

impl<D: HandLandmarkDetector> SignLanguagePipeline<D> {

    /// new initializes new instance of the pipeline
    pub fn new(detector: D, classifier: SignClassifier) -> Self {
        SignLanguagePipeline {
            detector,
            classifier,
        }
    }

    /// classify_hands classifies the first detected hand.
    ///
    /// # Arguments
    /// * `hands` - hands found in the frame
    ///
    /// # Returns
    /// * `SignResult`
    pub fn classify_hands(&self, hands: &[HandLandmarks]) -> Result<SignResult, Error> {
        let hand = match hands.first() {
            None => return Ok(SignResult::no_hand()),
            Some(hand) => hand,
        };
        let (sign, confidence) = self.classifier.classify(&hand.landmarks)?;
        Ok(SignResult {
            sign,
            confidence,
            landmarks: Some(hand.flatten()),
        })
    }

    /// process_frame detects the hand in a camera frame and guesses the sign.
    ///
    /// # Arguments
    /// * `frame` - OpenCV matrix in BGR order
    ///
    /// # Returns
    /// * `SignResult`
    pub async fn process_frame(&self, frame: &Mat) -> Result<SignResult, Error> {
        let rgb = bgr_to_rgb(frame)?;
        let hands = self.detector.detect(rgb).await?;
        let result = self.classify_hands(&hands)?;
        debug!(sign = %result.sign, confidence = result.confidence, "frame classified");
        Ok(result)
    }

    /// annotate_frame classifies a BGR frame and draws the result onto it.
    ///
    /// A failed detection is logged and leaves the frame untouched, so a live
    /// preview keeps running through transient model errors.
    pub async fn annotate_frame(&self, frame: &mut Mat) -> Result<Option<SignResult>, Error> {
        let result = match self.process_frame(frame).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "cannot classify frame");
                return Ok(None)
            }
        };
        let landmarks = match &result.landmarks {
            Some(values) => flat_to_landmarks(values)?,
            None => vec![],
        };
        draw_overlay(frame, &result.sign, result.confidence, &landmarks)?;
        Ok(Some(result))
    }

    /// process_encoded_image handles an encoded image sent by the mobile app.
    ///
    /// # Arguments
    /// * `im_bytes` - JPEG or PNG bytes
    ///
    /// # Returns
    /// * `String` - JSON object with `sign` and `confidence`
    pub async fn process_encoded_image(&self, im_bytes: &[u8]) -> Result<String, Error> {
        let frame = decode_image(im_bytes)?;
        let result = self.process_frame(&frame).await?;
        let reply = AppReply {
            sign: &result.sign,
            confidence: result.confidence,
        };
        Ok(serde_json::to_string(&reply)?)
    }
}

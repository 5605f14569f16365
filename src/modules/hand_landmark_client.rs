use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use anyhow::Error;
use ndarray::Array4;
use opencv::core::Mat;
use tracing::{debug, info};
use crate::config::config::{HandLandmarkConfig, TritonConfig};
use crate::helper::hand_helper::{letterbox, to_input_tensor, Letterbox};
use crate::modules::detector::HandLandmarkDetector;
use crate::triton_client::client::triton::model_infer_request::{InferInputTensor, InferRequestedOutputTensor};
use crate::triton_client::client::triton::{InferTensorContents, ModelConfigRequest, ModelConfigResponse,
                                           ModelInferRequest, ModelInferResponse};
use crate::triton_client::client::TritonInferenceClient;
use crate::utils::coordinate::{flat_to_landmarks, HandLandmarks, Handedness, NUM_HAND_LANDMARKS};
use crate::utils::utils::{sigmoid, u8_to_f32_vec};

/// Raw tensors of one landmark model call, before thresholds are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHandOutput {
    pub landmarks: Vec<f32>,
    pub presence: f32,
    pub handedness: f32,
    pub world_landmarks: Option<Vec<f32>>,
}

/// Hand landmark model served by Triton.
#[derive(Clone, Debug)]
pub struct HandLandmarkClient {
    triton_infer_client: TritonInferenceClient,
    triton_model_config: ModelConfigResponse,
    config: HandLandmarkConfig,
    tracking: TrackingState,
}

impl HandLandmarkClient {
    pub fn new(triton_infer_client: TritonInferenceClient,
               triton_model_config: ModelConfigResponse,
               config: HandLandmarkConfig) -> Result<Self, Error> {
        let model_config = match &triton_model_config.config {
            None => {
                return Err(Error::msg("hand_landmark_client - hand landmark model config is empty"))
            }
            Some(model_config) => model_config
        };
        if model_config.input.is_empty() {
            return Err(Error::msg("hand_landmark_client - hand landmark model has no input"))
        }

        Ok(HandLandmarkClient {
            triton_infer_client,
            triton_model_config,
            config,
            tracking: TrackingState::default(),
        })
    }

    /// connect checks that the server and model are ready and loads the model config.
    pub async fn connect(triton_config: &TritonConfig, config: HandLandmarkConfig) -> Result<Self, Error> {
        let triton_infer_client = TritonInferenceClient::connect(triton_config).await?;

        if !triton_infer_client.server_live().await? {
            return Err(Error::msg(format!("triton server at {} is not live", triton_config.url)))
        }
        if !triton_infer_client.model_ready(&config.model_name, &config.model_version).await? {
            return Err(Error::msg(format!("model {} is not ready", config.model_name)))
        }

        let triton_model_config = triton_infer_client.model_config(ModelConfigRequest {
            name: config.model_name.clone(),
            version: config.model_version.clone(),
        }).await?;

        info!(model = %config.model_name, imsize = config.imsize, "hand landmark model ready");
        Self::new(triton_infer_client, triton_model_config, config)
    }

    fn preprocess(&self, rgb: &Mat) -> Result<(Array4<f32>, Letterbox), Error> {
        let (boxed, lb) = letterbox(rgb, self.config.imsize)?;
        let tensor = to_input_tensor(&boxed, self.config.mean, self.config.scale, self.config.layout)?;
        Ok((tensor, lb))
    }

    fn build_request(&self, tensor: Array4<f32>) -> Result<ModelInferRequest, Error> {
        build_request(&self.config, &self.triton_model_config, tensor)
    }

    fn postprocess(&self, response: &ModelInferResponse, lb: Letterbox) -> Result<Vec<HandLandmarks>, Error> {
        let raw = decode_outputs(&self.config, response)?;
        let hands = postprocess_hand(&self.config, raw, lb, self.tracking.threshold(&self.config))?;
        self.tracking.update(&hands);
        Ok(hands)
    }
}

/// Remembers whether the previous frame had a hand, which lowers the presence
/// threshold from `min_detection_confidence` to `min_tracking_confidence`.
#[derive(Clone, Debug, Default)]
pub struct TrackingState {
    tracking: Arc<AtomicBool>,
}

impl TrackingState {
    pub fn threshold(&self, config: &HandLandmarkConfig) -> f32 {
        if self.tracking.load(Ordering::Relaxed) {
            config.min_tracking_confidence
        } else {
            config.min_detection_confidence
        }
    }

    pub fn update(&self, hands: &[HandLandmarks]) {
        self.tracking.store(!hands.is_empty(), Ordering::Relaxed);
    }
}

/// build_request wraps the input tensor into a `ModelInfer` request for the landmark model.
pub fn build_request(config: &HandLandmarkConfig,
                     triton_model_config: &ModelConfigResponse,
                     tensor: Array4<f32>) -> Result<ModelInferRequest, Error> {
    let model_config = match &triton_model_config.config {
        None => {
            return Err(Error::msg("hand_landmark_client - hand landmark model config is empty"))
        }
        Some(model_config) => model_config
    };
    let input_cfg = match model_config.input.first() {
        None => return Err(Error::msg("hand_landmark_client - hand landmark model has no input")),
        Some(input_cfg) => input_cfg,
    };
    let datatype = input_cfg.data_type().as_str_name()[5..].to_uppercase();
    if datatype != "FP32" {
        return Err(Error::msg(format!("hand_landmark_client - unsupported input datatype {datatype}")))
    }

    let output_names = [
        &config.landmarks_output,
        &config.presence_output,
        &config.handedness_output,
        &config.world_landmarks_output,
    ];

    Ok(ModelInferRequest {
        model_name: config.model_name.to_owned(),
        model_version: config.model_version.to_owned(),
        id: "".to_string(),
        parameters: Default::default(),
        inputs: vec![InferInputTensor {
            name: input_cfg.name.to_string(),
            datatype,
            shape: tensor.shape().iter().map(|&x| x as i64).collect(),
            parameters: Default::default(),
            contents: Some(InferTensorContents {
                fp32_contents: tensor.iter().copied().collect(),
                ..Default::default()
            }),
        }],
        outputs: output_names
            .iter()
            .filter(|name| !name.is_empty())
            .map(|name| InferRequestedOutputTensor {
                name: name.to_string(),
                parameters: Default::default(),
            })
            .collect(),
        raw_input_contents: vec![],
    })
}

impl HandLandmarkDetector for HandLandmarkClient {
    fn detect(&self, rgb: Mat) -> impl Future<Output = Result<Vec<HandLandmarks>, Error>> + Send {
        let prepared = self
            .preprocess(&rgb)
            .and_then(|(tensor, lb)| Ok((self.build_request(tensor)?, lb)));
        let client = self.clone();

        async move {
            let (request, lb) = prepared?;
            let response = client.triton_infer_client.model_infer(request).await?;
            let hands = client.postprocess(&response, lb)?;
            debug!(hands = hands.len(), "hand landmark inference done");
            Ok(hands)
        }
    }
}

fn output_values(response: &ModelInferResponse, name: &str) -> Result<Option<Vec<f32>>, Error> {
    let position = match response.outputs.iter().position(|o| o.name == name) {
        None => return Ok(None),
        Some(position) => position,
    };
    if let Some(raw) = response.raw_output_contents.get(position) {
        return Ok(Some(u8_to_f32_vec(raw)?))
    }
    match &response.outputs[position].contents {
        Some(contents) => Ok(Some(contents.fp32_contents.clone())),
        None => Err(Error::msg(format!("hand_landmark_client - output {name} has no data"))),
    }
}

fn required_output(response: &ModelInferResponse, name: &str) -> Result<Vec<f32>, Error> {
    output_values(response, name)?
        .ok_or_else(|| Error::msg(format!("hand_landmark_client - missing output {name}")))
}

fn first_value(values: &[f32], name: &str) -> Result<f32, Error> {
    values
        .first()
        .copied()
        .ok_or_else(|| Error::msg(format!("hand_landmark_client - output {name} is empty")))
}

/// decode_outputs pulls the named landmark model outputs out of an inference response.
pub fn decode_outputs(config: &HandLandmarkConfig, response: &ModelInferResponse) -> Result<RawHandOutput, Error> {
    let landmarks = required_output(response, &config.landmarks_output)?;
    let presence = first_value(&required_output(response, &config.presence_output)?, &config.presence_output)?;
    let handedness = first_value(&required_output(response, &config.handedness_output)?, &config.handedness_output)?;
    let world_landmarks = output_values(response, &config.world_landmarks_output)?;

    Ok(RawHandOutput { landmarks, presence, handedness, world_landmarks })
}

/// postprocess_hand turns raw model outputs into at most one hand.
///
/// # Arguments
/// * `config` - hand landmark model settings
/// * `raw` - decoded model outputs
/// * `lb` - letterbox used to build the model input
/// * `min_presence` - presence score below which the hand is dropped
///
/// # Returns
/// * `Vec<HandLandmarks>` - empty when no hand is present
pub fn postprocess_hand(config: &HandLandmarkConfig, raw: RawHandOutput, lb: Letterbox, min_presence: f32) -> Result<Vec<HandLandmarks>, Error> {
    let (presence, right_score) = if config.apply_sigmoid {
        (sigmoid(raw.presence), sigmoid(raw.handedness))
    } else {
        (raw.presence, raw.handedness)
    };

    if presence < min_presence {
        return Ok(vec![])
    }

    if raw.landmarks.len() < NUM_HAND_LANDMARKS * 3 {
        return Err(Error::msg(format!(
            "hand_landmark_client - expected {} landmark values, got {}", NUM_HAND_LANDMARKS * 3, raw.landmarks.len()
        )))
    }
    let landmarks = raw.landmarks[..NUM_HAND_LANDMARKS * 3]
        .chunks_exact(3)
        .map(|c| lb.unproject(c[0], c[1], c[2]))
        .collect();

    let world_landmarks = match raw.world_landmarks {
        Some(values) if values.len() >= NUM_HAND_LANDMARKS * 3 => flat_to_landmarks(&values[..NUM_HAND_LANDMARKS * 3])?,
        _ => vec![],
    };

    let (handedness, handedness_score) = Handedness::from_score(right_score);
    let hand = HandLandmarks::new(landmarks)?
        .with_world_landmarks(world_landmarks)?
        .with_handedness(handedness, handedness_score)
        .with_presence(presence);

    Ok(vec![hand].into_iter().take(config.max_num_hands).collect())
}

#[cfg(test)]
mod tests {
    use crate::config::config::HandLandmarkConfig;
    use crate::helper::hand_helper::Letterbox;
    use ndarray::Array4;
    use crate::modules::hand_landmark_client::{build_request, decode_outputs, postprocess_hand, RawHandOutput, TrackingState};
    use crate::triton_client::client::triton::model_infer_response::InferOutputTensor;
    use crate::triton_client::client::triton::{DataType, ModelConfig, ModelConfigResponse, ModelInferResponse, ModelInput};
    use crate::utils::coordinate::Handedness;

    fn output(name: &str, shape: Vec<i64>) -> InferOutputTensor {
        InferOutputTensor {
            name: name.to_string(),
            datatype: "FP32".to_string(),
            shape,
            parameters: Default::default(),
            contents: None,
        }
    }

    fn to_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn raw(presence: f32, handedness: f32) -> RawHandOutput {
        RawHandOutput {
            landmarks: (0..63).map(|i| (i % 3) as f32 * 56.0).collect(),
            presence,
            handedness,
            world_landmarks: Some(vec![0.01; 63]),
        }
    }

    fn model_config(data_type: DataType) -> ModelConfigResponse {
        ModelConfigResponse {
            config: Some(ModelConfig {
                name: "hand_landmark".to_string(),
                input: vec![ModelInput {
                    name: "input_1".to_string(),
                    data_type: data_type as i32,
                    dims: vec![224, 224, 3],
                    ..Default::default()
                }],
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_build_request() {
        let mut config = HandLandmarkConfig::new();
        config.world_landmarks_output = "".to_string();
        let tensor = Array4::<f32>::from_elem((1, 4, 4, 3), 0.5);

        let request = build_request(&config, &model_config(DataType::TypeFp32), tensor).unwrap();
        assert_eq!(request.model_name, "hand_landmark");
        assert_eq!(request.inputs.len(), 1);

        let input = &request.inputs[0];
        assert_eq!(input.name, "input_1");
        assert_eq!(input.datatype, "FP32");
        assert_eq!(input.shape, vec![1, 4, 4, 3]);
        assert_eq!(input.contents.as_ref().unwrap().fp32_contents.len(), 48);

        let outputs: Vec<&str> = request.outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(outputs, vec!["Identity", "Identity_1", "Identity_2"]);
    }

    #[test]
    fn test_build_request_rejects_non_float_input() {
        let config = HandLandmarkConfig::new();
        let tensor = Array4::<f32>::zeros((1, 4, 4, 3));
        assert!(build_request(&config, &model_config(DataType::TypeUint8), tensor.clone()).is_err());
        assert!(build_request(&config, &ModelConfigResponse { config: None }, tensor).is_err());
    }

    #[test]
    fn test_tracking_lowers_presence_threshold() {
        let config = HandLandmarkConfig::new();
        let lb = Letterbox::fit(224, 224, 224).unwrap();
        let tracking = TrackingState::default();
        let step = |presence: f32| {
            let hands = postprocess_hand(&config, raw(presence, 0.0), lb, tracking.threshold(&config)).unwrap();
            tracking.update(&hands);
            hands.len()
        };

        // sigmoid(0.5) is about 0.62.
        assert_eq!(step(0.5), 0);
        assert_eq!(step(4.0), 1);
        assert_eq!(step(0.5), 1);
        assert_eq!(step(-4.0), 0);
        assert_eq!(step(0.5), 0);
    }

    #[test]
    fn test_decode_outputs_by_name() {
        let config = HandLandmarkConfig::new();
        // Outputs come back in a different order than requested.
        let response = ModelInferResponse {
            model_name: "hand_landmark".to_string(),
            outputs: vec![
                output("Identity_2", vec![1, 1]),
                output("Identity", vec![1, 63]),
                output("Identity_1", vec![1, 1]),
            ],
            raw_output_contents: vec![
                to_bytes(&[-2.0]),
                to_bytes(&[1.0; 63]),
                to_bytes(&[3.0]),
            ],
            ..Default::default()
        };

        let decoded = decode_outputs(&config, &response).unwrap();
        assert_eq!(decoded.landmarks.len(), 63);
        assert_eq!(decoded.presence, 3.0);
        assert_eq!(decoded.handedness, -2.0);
        assert!(decoded.world_landmarks.is_none());
    }

    #[test]
    fn test_decode_outputs_missing_landmarks() {
        let config = HandLandmarkConfig::new();
        let response = ModelInferResponse {
            outputs: vec![output("Identity_1", vec![1, 1])],
            raw_output_contents: vec![to_bytes(&[3.0])],
            ..Default::default()
        };
        assert!(decode_outputs(&config, &response).is_err());
    }

    #[test]
    fn test_postprocess_unprojects_landmarks() {
        let config = HandLandmarkConfig::new();
        let lb = Letterbox::fit(640, 480, 224).unwrap();

        let hands = postprocess_hand(&config, raw(4.0, 3.0), lb, 0.7).unwrap();
        assert_eq!(hands.len(), 1);

        let hand = &hands[0];
        assert_eq!(hand.landmarks.len(), 21);
        assert!((hand.landmarks[0].y - 56.0 / 168.0).abs() < 1e-6);
        assert!((hand.landmarks[0].z - 112.0 / 224.0).abs() < 1e-6);
        assert_eq!(hand.world_landmarks.len(), 21);
        assert_eq!(hand.handedness, Handedness::Right);
        assert!(hand.presence > 0.98);
    }

    #[test]
    fn test_postprocess_drops_absent_hand() {
        let config = HandLandmarkConfig::new();
        let lb = Letterbox::fit(224, 224, 224).unwrap();

        // sigmoid(0.5) is about 0.62, under the detection threshold but over the tracking one.
        assert!(postprocess_hand(&config, raw(0.5, 0.0), lb, config.min_detection_confidence).unwrap().is_empty());
        assert_eq!(postprocess_hand(&config, raw(0.5, 0.0), lb, config.min_tracking_confidence).unwrap().len(), 1);
    }

    #[test]
    fn test_postprocess_without_sigmoid() {
        let mut config = HandLandmarkConfig::new();
        config.apply_sigmoid = false;
        let lb = Letterbox::fit(224, 224, 224).unwrap();

        let hands = postprocess_hand(&config, raw(0.9, 0.1), lb, 0.7).unwrap();
        assert_eq!(hands[0].handedness, Handedness::Left);
        assert!((hands[0].handedness_score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_postprocess_rejects_short_landmarks() {
        let config = HandLandmarkConfig::new();
        let lb = Letterbox::fit(224, 224, 224).unwrap();
        let mut short = raw(4.0, 0.0);
        short.landmarks.truncate(30);
        assert!(postprocess_hand(&config, short, lb, 0.7).is_err());
    }
}
